//! JSON pass-through payloads.
//!
//! The body keeps the content of its kind's JSON node and stores it in the
//! container as compact UTF-8 JSON.  Appending merges objects key by key,
//! concatenates arrays and lets the newer scalar win.

use serde_json::{Map, Value};
use std::io::{Read, Write};

use super::{FormatType, SectionBody, SectionKind};
use crate::error::{Result, XclBinError};

#[derive(Debug)]
pub struct JsonBody {
    kind:  SectionKind,
    node:  &'static str,
    value: Option<Value>,
    image: Vec<u8>,
}

impl JsonBody {
    pub fn new(kind: SectionKind) -> Self {
        let node = kind.json_node().unwrap_or_default();
        Self { kind, node, value: None, image: Vec::new() }
    }

    pub fn value(&self) -> Option<&Value> { self.value.as_ref() }

    fn set_value(&mut self, value: Value) -> Result<()> {
        self.image = serde_json::to_vec(&value)
            .map_err(|e| XclBinError::Format(format!("Serializing {}: {e}", self.kind)))?;
        self.value = Some(value);
        Ok(())
    }

    fn source_name(&self) -> String {
        format!("the JSON image of section '{}'", self.kind)
    }
}

impl SectionBody for JsonBody {
    fn kind(&self) -> SectionKind { self.kind }

    fn image(&self) -> &[u8] { &self.image }

    fn read_image(&mut self, bytes: Vec<u8>) -> Result<()> {
        if bytes.is_empty() {
            self.purge_buffers();
            return Ok(());
        }
        // Foreign images stay opaque: kept byte for byte, no JSON payload.
        self.value = match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(
                    section = %self.kind,
                    "Image is not valid JSON ({e}); keeping {} raw bytes",
                    bytes.len()
                );
                None
            }
        };
        self.image = bytes;
        Ok(())
    }

    fn supports_add_format(&self, format: FormatType) -> bool {
        format == FormatType::Json
    }

    fn supports_dump_format(&self, format: FormatType) -> bool {
        matches!(format, FormatType::Json | FormatType::Raw)
    }

    fn read_payload(&mut self, input: &mut dyn Read, format: FormatType) -> Result<()> {
        if format != FormatType::Json {
            return Err(XclBinError::Unsupported(format!(
                "The {} section does not support reading the {format} file type", self.kind
            )));
        }
        let mut text = Vec::new();
        input.read_to_end(&mut text)?;
        let tree: Value = serde_json::from_slice(&text)
            .map_err(|e| XclBinError::json(self.source_name(), e))?;
        self.read_json_section_image(&tree)
    }

    fn dump_contents(&self, out: &mut dyn Write, format: FormatType) -> Result<()> {
        match format {
            FormatType::Json => {
                let mut tree = Map::new();
                self.get_payload(&mut tree)?;
                serde_json::to_writer_pretty(&mut *out, &Value::Object(tree))
                    .map_err(|e| XclBinError::Format(format!("Writing {}: {e}", self.kind)))?;
                out.write_all(b"\n")?;
            }
            FormatType::Raw => out.write_all(&self.image)?,
            other => {
                return Err(XclBinError::Unsupported(format!(
                    "The {} section does not support writing to a {other} file type", self.kind
                )))
            }
        }
        Ok(())
    }

    fn get_payload(&self, tree: &mut Map<String, Value>) -> Result<()> {
        if let Some(v) = &self.value {
            tree.insert(self.node.to_owned(), v.clone());
        }
        Ok(())
    }

    fn read_json_section_image(&mut self, tree: &Value) -> Result<()> {
        match tree.get(self.node) {
            Some(v) => self.set_value(v.clone()),
            None => {
                tracing::trace!(section = %self.kind, node = self.node, "JSON node absent; section left empty");
                self.purge_buffers();
                Ok(())
            }
        }
    }

    fn append_to_section_metadata(&self, append: &Value, payload: &mut Map<String, Value>) -> Result<()> {
        let target = payload
            .entry(self.node.to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
        merge_json(target, append);
        Ok(())
    }

    fn purge_buffers(&mut self) {
        self.value = None;
        self.image.clear();
    }
}

/// Deep merge `src` into `dst`.
pub fn merge_json(dst: &mut Value, src: &Value) {
    match (dst, src) {
        (Value::Object(d), Value::Object(s)) => {
            for (k, v) in s {
                match d.get_mut(k) {
                    Some(existing) => merge_json(existing, v),
                    None => { d.insert(k.clone(), v.clone()); }
                }
            }
        }
        (Value::Array(d), Value::Array(s)) => d.extend(s.iter().cloned()),
        (d, s) => *d = s.clone(),
    }
}
