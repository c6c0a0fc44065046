//! JSON shadow of the header and section table ("mirror data").
//!
//! The mirror is written after the last payload, between two ASCII
//! sentinels, and holds everything needed to rebuild the container without
//! trusting the binary header:
//!
//! ```text
//! XCLBIN_MIRROR_DATA_START{"schema_version":{..},"header":{..},
//!   "section_header":{..},"section_header":{..}}XCLBIN_MIRROR_DATA_END
//! ```
//!
//! `section_header` repeats once per section, so the top level is kept as an
//! ordered list of `(key, value)` pairs rather than a JSON map.
//!
//! The sentinels are not escaped.  A payload that happens to contain
//! `XCLBIN_MIRROR_DATA_START` will be mistaken for the mirror on migration;
//! existing archives depend on this encoding, so it is left as is.

pub mod header;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map, Value};
use std::fmt;
use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::error::{Result, XclBinError};
use crate::util::{json_leaf, string_to_u64};

pub use header::{header_from_json, header_to_json};

pub const MIRROR_DATA_START: &[u8] = b"XCLBIN_MIRROR_DATA_START";
pub const MIRROR_DATA_END:   &[u8] = b"XCLBIN_MIRROR_DATA_END";

/// Schema version written into every mirror.
pub const SCHEMA_VERSION: (u32, u32, u32) = (1, 0, 0);

pub const KEY_SCHEMA_VERSION: &str = "schema_version";
pub const KEY_HEADER:         &str = "header";
pub const KEY_SECTION_HEADER: &str = "section_header";

const SCAN_CHUNK: usize = 64 * 1024;

// ── Section entry ────────────────────────────────────────────────────────────

/// One `section_header` entry.
#[derive(Debug, Clone, PartialEq)]
pub struct MirrorSection {
    /// Raw kind tag; may name a kind this build does not know.
    pub kind:    u32,
    pub name:    String,
    pub offset:  u64,
    pub size:    u64,
    /// JSON image, present only for kinds that round-trip through JSON.
    pub payload: Option<Value>,
}

impl MirrorSection {
    pub fn to_json(&self) -> Value {
        let mut node = Map::new();
        node.insert("Kind".into(),   Value::String(self.kind.to_string()));
        node.insert("Name".into(),   Value::String(self.name.clone()));
        node.insert("Offset".into(), Value::String(format!("0x{:x}", self.offset)));
        node.insert("Size".into(),   Value::String(format!("0x{:x}", self.size)));
        if let Some(payload) = &self.payload {
            node.insert("payload".into(), payload.clone());
        }
        Value::Object(node)
    }

    pub fn from_json(node: &Value) -> Result<Self> {
        let field = |key: &str| {
            json_leaf(node, key).ok_or_else(|| {
                XclBinError::Format(format!("Mirror section_header entry is missing '{key}'"))
            })
        };
        let kind = string_to_u64(&field("Kind")?, false)?;
        Ok(Self {
            kind:    u32::try_from(kind).map_err(|_| {
                XclBinError::Format(format!("Mirror section kind {kind} is out of range"))
            })?,
            name:    json_leaf(node, "Name").unwrap_or_default(),
            offset:  string_to_u64(&field("Offset")?, false)?,
            size:    string_to_u64(&field("Size")?, false)?,
            payload: node.get("payload").cloned(),
        })
    }
}

// ── Record ───────────────────────────────────────────────────────────────────

/// Ordered top-level entries of a mirror; keys may repeat.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MirrorRecord {
    entries: Vec<(String, Value)>,
}

impl MirrorRecord {
    pub fn new() -> Self { Self::default() }

    pub fn entries(&self) -> &[(String, Value)] { &self.entries }

    pub fn push(&mut self, key: &str, value: Value) {
        self.entries.push((key.to_owned(), value));
    }

    pub fn push_schema_version(&mut self) {
        let (major, minor, patch) = SCHEMA_VERSION;
        self.push(KEY_SCHEMA_VERSION, json!({
            "major": major.to_string(),
            "minor": minor.to_string(),
            "patch": patch.to_string(),
        }));
    }

    pub fn push_section(&mut self, section: &MirrorSection) {
        self.push(KEY_SECTION_HEADER, section.to_json());
    }

    /// The `section_header` entries, in order.
    pub fn sections(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().filter(|(k, _)| k == KEY_SECTION_HEADER).map(|(_, v)| v)
    }
}

impl Serialize for MirrorRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for MirrorRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct RecordVisitor;

        impl<'de> Visitor<'de> for RecordVisitor {
            type Value = MirrorRecord;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a JSON object of mirror entries")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<MirrorRecord, A::Error> {
                let mut entries = Vec::new();
                while let Some((key, value)) = access.next_entry::<String, Value>()? {
                    entries.push((key, value));
                }
                Ok(MirrorRecord { entries })
            }
        }

        deserializer.deserialize_map(RecordVisitor)
    }
}

// ── Write ────────────────────────────────────────────────────────────────────

pub fn write_mirror<W: Write>(writer: &mut W, record: &MirrorRecord, pretty: bool) -> Result<()> {
    writer.write_all(MIRROR_DATA_START)?;
    if pretty {
        serde_json::to_writer_pretty(&mut *writer, record).map_err(io::Error::from)?;
    } else {
        serde_json::to_writer(&mut *writer, record).map_err(io::Error::from)?;
    }
    writer.write_all(MIRROR_DATA_END)?;
    Ok(())
}

// ── Read ─────────────────────────────────────────────────────────────────────

/// Absolute offset of the first `needle` at or after the reader's position.
/// Leaves the reader somewhere past the scanned region.
pub fn find_bytes_in_stream<R: Read + Seek>(reader: &mut R, needle: &[u8]) -> io::Result<Option<u64>> {
    if needle.is_empty() {
        return reader.stream_position().map(Some);
    }
    let mut base = reader.stream_position()?;
    let mut window: Vec<u8> = Vec::with_capacity(SCAN_CHUNK + needle.len());
    let mut chunk = vec![0u8; SCAN_CHUNK];
    loop {
        let n = match reader.read(&mut chunk) {
            Ok(0) => return Ok(None),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        window.extend_from_slice(&chunk[..n]);
        if let Some(pos) = window.windows(needle.len()).position(|w| w == needle) {
            return Ok(Some(base + pos as u64));
        }
        // Keep a tail so a needle split across reads is still found.
        let keep = (needle.len() - 1).min(window.len());
        let consumed = window.len() - keep;
        window.drain(..consumed);
        base += consumed as u64;
    }
}

/// Locate, extract and parse the mirror of a container stream.
pub fn find_and_read_mirror_data<R: Read + Seek>(reader: &mut R) -> Result<MirrorRecord> {
    tracing::trace!("Searching for mirrored data");
    reader.seek(SeekFrom::Start(0))?;
    let start = find_bytes_in_stream(reader, MIRROR_DATA_START)?
        .ok_or(XclBinError::MissingMirrorData)?;
    tracing::trace!(offset = format_args!("0x{start:x}"), "Found MIRROR_DATA_START");
    let start = start + MIRROR_DATA_START.len() as u64;

    reader.seek(SeekFrom::Start(start))?;
    let end = find_bytes_in_stream(reader, MIRROR_DATA_END)?
        .ok_or(XclBinError::MalformedMirrorData)?;
    let len = end - start;
    tracing::trace!(size = format_args!("0x{len:x}"), "Found MIRROR_DATA_END");

    reader.seek(SeekFrom::Start(start))?;
    let mut buf = Vec::new();
    (&mut *reader).take(len).read_to_end(&mut buf)?;

    serde_json::from_slice(&buf)
        .map_err(|e| XclBinError::json("the mirror metadata in the xclbin archive", e))
}
