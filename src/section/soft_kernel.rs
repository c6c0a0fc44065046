//! Soft (processing-system) kernels: a shared-library image plus metadata.
//!
//! The section is split into two sub-sections, `OBJ` (raw library bytes) and
//! `METADATA` (JSON under `soft_kernel_metadata`).  The stored image is:
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0      | 4    | offset of `mpo_name` |
//! | 4      | 4    | offset of the library image |
//! | 8      | 4    | library image size |
//! | 12     | 4    | offset of `mpo_version` |
//! | 16     | 4    | offset of `mpo_md5_value` |
//! | 20     | 4    | offset of `mpo_symbol_name` |
//! | 24     | 4    | instance count |
//! | 28     | 36   | padding |
//! | 64     | 16   | reserved |
//! | 80     | ..   | NUL-terminated strings, then the library image |
//!
//! All offsets are relative to the start of the section.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use std::io::{Cursor, Read, Write};

use super::{FormatType, SectionBody, SectionKind};
use crate::error::{Result, XclBinError};
use crate::util::fixed_str;

pub const SUB_SECTION_OBJ:      &str = "OBJ";
pub const SUB_SECTION_METADATA: &str = "METADATA";

const METADATA_NODE: &str = "soft_kernel_metadata";
const IMAGE_HEADER_SIZE: usize = 80;

// ── Metadata ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftKernelMetadata {
    pub mpo_name:        String,
    pub mpo_version:     String,
    pub mpo_md5_value:   String,
    pub mpo_symbol_name: String,
    #[serde(serialize_with = "as_string", deserialize_with = "string_or_number")]
    pub m_num_instances: u32,
}

fn as_string<S: serde::Serializer>(v: &u32, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(&v.to_string())
}

/// Instance counts are written as strings but hand-edited files often use
/// bare numbers.
fn string_or_number<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<u32, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Count {
        Num(u32),
        Str(String),
    }
    match Count::deserialize(d)? {
        Count::Num(n) => Ok(n),
        Count::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

impl SoftKernelMetadata {
    /// Metadata for a freshly packaged library: placeholder version and
    /// checksum.
    pub fn new(mpo_name: &str, symbol: &str, num_instances: u32) -> Self {
        Self {
            mpo_name:        mpo_name.to_owned(),
            mpo_version:     "0.0.0".to_owned(),
            mpo_md5_value:   "0".repeat(32),
            mpo_symbol_name: symbol.to_owned(),
            m_num_instances: num_instances,
        }
    }

    pub fn to_json(&self) -> Value {
        json!({ METADATA_NODE: self })
    }
}

// ── Body ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct SoftKernelBody {
    obj:      Vec<u8>,
    metadata: Option<SoftKernelMetadata>,
    image:    Vec<u8>,
}

impl SoftKernelBody {
    pub fn new() -> Self { Self::default() }

    pub fn obj(&self) -> &[u8] { &self.obj }

    pub fn metadata(&self) -> Option<&SoftKernelMetadata> { self.metadata.as_ref() }

    fn unsupported_sub(name: &str) -> XclBinError {
        XclBinError::Unsupported(format!(
            "Section 'SOFT_KERNEL' does not support the subsection: '{name}'"
        ))
    }

    fn wrong_format(sub: &str, format: FormatType) -> XclBinError {
        XclBinError::Unsupported(format!(
            "SOFT_KERNEL subsection '{sub}' does not support the {format} format"
        ))
    }

    /// Regenerate the stored image from the two sub-sections.
    fn rebuild_image(&mut self) -> Result<()> {
        self.image.clear();
        if self.obj.is_empty() && self.metadata.is_none() {
            return Ok(());
        }
        let empty = SoftKernelMetadata::new("", "", 0);
        let md = self.metadata.as_ref().unwrap_or(&empty);

        let mut strings = Vec::new();
        let mut push = |s: &str| -> Result<u32> {
            let at = u32::try_from(IMAGE_HEADER_SIZE + strings.len())
                .map_err(|_| XclBinError::Format("SOFT_KERNEL metadata is too large".into()))?;
            strings.extend_from_slice(s.as_bytes());
            strings.push(0);
            Ok(at)
        };
        let name_off    = push(&md.mpo_name)?;
        let version_off = push(&md.mpo_version)?;
        let md5_off     = push(&md.mpo_md5_value)?;
        let symbol_off  = push(&md.mpo_symbol_name)?;

        let too_big = || XclBinError::Format("SOFT_KERNEL image exceeds 4 GiB".into());
        let image_off  = u32::try_from(IMAGE_HEADER_SIZE + strings.len()).map_err(|_| too_big())?;
        let image_size = u32::try_from(self.obj.len()).map_err(|_| too_big())?;

        let mut out = Vec::with_capacity(image_off as usize + self.obj.len());
        out.write_u32::<LittleEndian>(name_off)?;
        out.write_u32::<LittleEndian>(image_off)?;
        out.write_u32::<LittleEndian>(image_size)?;
        out.write_u32::<LittleEndian>(version_off)?;
        out.write_u32::<LittleEndian>(md5_off)?;
        out.write_u32::<LittleEndian>(symbol_off)?;
        out.write_u32::<LittleEndian>(md.m_num_instances)?;
        out.resize(IMAGE_HEADER_SIZE, 0);
        out.extend_from_slice(&strings);
        out.extend_from_slice(&self.obj);
        self.image = out;
        Ok(())
    }
}

/// NUL-terminated string at `offset`.
fn string_at(bytes: &[u8], offset: u32) -> Result<String> {
    bytes.get(offset as usize..).map(fixed_str).ok_or_else(|| {
        XclBinError::Format(format!("SOFT_KERNEL string offset 0x{offset:x} is out of range"))
    })
}

impl SectionBody for SoftKernelBody {
    fn kind(&self) -> SectionKind { SectionKind::SoftKernel }

    fn image(&self) -> &[u8] { &self.image }

    fn read_image(&mut self, bytes: Vec<u8>) -> Result<()> {
        if bytes.is_empty() {
            self.purge_buffers();
            return Ok(());
        }
        if bytes.len() < IMAGE_HEADER_SIZE {
            return Err(XclBinError::TruncatedInput {
                what:     "SOFT_KERNEL header",
                expected: IMAGE_HEADER_SIZE as u64,
            });
        }
        let mut cur = Cursor::new(&bytes[..]);
        let name_off    = cur.read_u32::<LittleEndian>()?;
        let image_off   = cur.read_u32::<LittleEndian>()?;
        let image_size  = cur.read_u32::<LittleEndian>()?;
        let version_off = cur.read_u32::<LittleEndian>()?;
        let md5_off     = cur.read_u32::<LittleEndian>()?;
        let symbol_off  = cur.read_u32::<LittleEndian>()?;
        let instances   = cur.read_u32::<LittleEndian>()?;

        let start = image_off as usize;
        let obj = start
            .checked_add(image_size as usize)
            .and_then(|end| bytes.get(start..end))
            .ok_or_else(|| XclBinError::Format(format!(
                "SOFT_KERNEL image (offset 0x{image_off:x}, size 0x{image_size:x}) exceeds the section"
            )))?
            .to_vec();

        self.metadata = Some(SoftKernelMetadata {
            mpo_name:        string_at(&bytes, name_off)?,
            mpo_version:     string_at(&bytes, version_off)?,
            mpo_md5_value:   string_at(&bytes, md5_off)?,
            mpo_symbol_name: string_at(&bytes, symbol_off)?,
            m_num_instances: instances,
        });
        self.obj = obj;
        self.image = bytes;
        Ok(())
    }

    fn supports_add_format(&self, _format: FormatType) -> bool { false }

    fn supports_dump_format(&self, format: FormatType) -> bool {
        format == FormatType::Raw
    }

    fn read_payload(&mut self, _input: &mut dyn Read, _format: FormatType) -> Result<()> {
        Err(XclBinError::Unsupported(
            "SOFT_KERNEL sections are built from their OBJ and METADATA subsections".into(),
        ))
    }

    fn dump_contents(&self, out: &mut dyn Write, format: FormatType) -> Result<()> {
        if format != FormatType::Raw {
            return Err(XclBinError::Unsupported(format!(
                "The SOFT_KERNEL section does not support writing to a {format} file type"
            )));
        }
        out.write_all(&self.image)?;
        Ok(())
    }

    fn purge_buffers(&mut self) {
        self.obj.clear();
        self.metadata = None;
        self.image.clear();
    }

    fn supports_sub_section(&self, name: &str) -> bool {
        name.eq_ignore_ascii_case(SUB_SECTION_OBJ) || name.eq_ignore_ascii_case(SUB_SECTION_METADATA)
    }

    fn sub_section_exists(&self, name: &str) -> bool {
        if name.eq_ignore_ascii_case(SUB_SECTION_OBJ) {
            !self.obj.is_empty()
        } else if name.eq_ignore_ascii_case(SUB_SECTION_METADATA) {
            self.metadata.is_some()
        } else {
            false
        }
    }

    fn read_sub_payload(&mut self, name: &str, input: &mut dyn Read, format: FormatType) -> Result<()> {
        if name.eq_ignore_ascii_case(SUB_SECTION_OBJ) {
            if format != FormatType::Raw {
                return Err(Self::wrong_format(SUB_SECTION_OBJ, format));
            }
            let mut obj = Vec::new();
            input.read_to_end(&mut obj)?;
            self.obj = obj;
        } else if name.eq_ignore_ascii_case(SUB_SECTION_METADATA) {
            if format != FormatType::Json {
                return Err(Self::wrong_format(SUB_SECTION_METADATA, format));
            }
            let mut text = Vec::new();
            input.read_to_end(&mut text)?;
            let tree: Value = serde_json::from_slice(&text)
                .map_err(|e| XclBinError::json("the SOFT_KERNEL metadata", e))?;
            let node = tree.get(METADATA_NODE).ok_or_else(|| {
                XclBinError::Format(format!("SOFT_KERNEL metadata is missing the '{METADATA_NODE}' node"))
            })?;
            let md = SoftKernelMetadata::deserialize(node)
                .map_err(|e| XclBinError::json("the SOFT_KERNEL metadata", e))?;
            self.metadata = Some(md);
        } else {
            return Err(Self::unsupported_sub(name));
        }
        self.rebuild_image()
    }

    fn dump_sub_section(&self, name: &str, out: &mut dyn Write, format: FormatType) -> Result<()> {
        if name.eq_ignore_ascii_case(SUB_SECTION_OBJ) {
            if format != FormatType::Raw {
                return Err(Self::wrong_format(SUB_SECTION_OBJ, format));
            }
            out.write_all(&self.obj)?;
        } else if name.eq_ignore_ascii_case(SUB_SECTION_METADATA) {
            if format != FormatType::Json {
                return Err(Self::wrong_format(SUB_SECTION_METADATA, format));
            }
            let tree = self.metadata.as_ref().map(SoftKernelMetadata::to_json).unwrap_or(Value::Null);
            serde_json::to_writer_pretty(&mut *out, &tree)
                .map_err(|e| XclBinError::Format(format!("Writing SOFT_KERNEL metadata: {e}")))?;
            out.write_all(b"\n")?;
        } else {
            return Err(Self::unsupported_sub(name));
        }
        Ok(())
    }
}
