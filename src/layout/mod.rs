//! Section table and payload placement.
//!
//! ```text
//! [ header 456 B ][ table 40 B x N ][pad][ payload 0 ][pad][ payload 1 ] ...
//! ```
//!
//! Every payload starts on an 8-byte boundary.  Offsets only ever grow, so
//! payloads never overlap.  The table entry format is:
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0      | 4    | kind tag |
//! | 4      | 16   | name (NUL-terminated) |
//! | 20     | 4    | padding |
//! | 24     | 8    | payload offset |
//! | 32     | 8    | payload size |

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Seek, Write};

use crate::error::{Result, XclBinError};
use crate::header::{AXLF_HEADER_SIZE, SECTION_HEADER_SIZE};
use crate::mirror::{MirrorRecord, MirrorSection};
use crate::registry::SectionRegistry;
use crate::util::{bytes_to_align, copy_fixed_str, fixed_str};

pub const SECTION_NAME_SIZE: usize = 16;

// ── Table entry ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionHeaderEntry {
    pub kind:   u32,
    pub name:   String,
    pub offset: u64,
    pub size:   u64,
}

impl SectionHeaderEntry {
    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let mut name = [0u8; SECTION_NAME_SIZE];
        copy_fixed_str(&mut name, &self.name);
        w.write_u32::<LittleEndian>(self.kind)?;
        w.write_all(&name)?;
        w.write_all(&[0u8; 4])?;
        w.write_u64::<LittleEndian>(self.offset)?;
        w.write_u64::<LittleEndian>(self.size)
    }

    pub fn read<R: Read>(r: &mut R) -> io::Result<Self> {
        let kind = r.read_u32::<LittleEndian>()?;
        let mut name = [0u8; SECTION_NAME_SIZE];
        r.read_exact(&mut name)?;
        let mut pad = [0u8; 4];
        r.read_exact(&mut pad)?;
        Ok(Self {
            kind,
            name:   fixed_str(&name),
            offset: r.read_u64::<LittleEndian>()?,
            size:   r.read_u64::<LittleEndian>()?,
        })
    }
}

/// Read `count` contiguous table entries from the reader's position.
pub fn read_table<R: Read>(reader: &mut R, count: u32) -> Result<Vec<SectionHeaderEntry>> {
    let mut entries = Vec::with_capacity(count.min(1024) as usize);
    for _ in 0..count {
        let entry = SectionHeaderEntry::read(reader).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => XclBinError::TruncatedInput {
                what:     "section header table",
                expected: u64::from(count) * SECTION_HEADER_SIZE,
            },
            _ => XclBinError::Io(e),
        })?;
        entries.push(entry);
    }
    Ok(entries)
}

// ── Placement ────────────────────────────────────────────────────────────────

/// Where one payload lands in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub offset: u64,
    pub size:   u64,
}

/// Place payloads of the given sizes after the header and an N-entry table.
pub fn compute_layout(sizes: &[u64]) -> Vec<Placement> {
    let mut offset = AXLF_HEADER_SIZE + SECTION_HEADER_SIZE * sizes.len() as u64;
    sizes
        .iter()
        .map(|&size| {
            offset += bytes_to_align(offset);
            let placed = Placement { offset, size };
            offset += size;
            placed
        })
        .collect()
}

// ── Writer ───────────────────────────────────────────────────────────────────

/// Write the section table and every payload, recording a mirror entry per
/// section as it goes.  The stream must be positioned just past the header.
pub fn write_all<W: Write + Seek>(
    writer:   &mut W,
    sections: &SectionRegistry,
    mirror:   &mut MirrorRecord,
) -> Result<Vec<SectionHeaderEntry>> {
    let sizes: Vec<u64> = sections.iter().map(|s| s.size()).collect();
    let placements = compute_layout(&sizes);

    let table: Vec<SectionHeaderEntry> = sections
        .iter()
        .zip(&placements)
        .map(|(s, p)| SectionHeaderEntry {
            kind:   s.kind().as_u32(),
            name:   s.name().to_owned(),
            offset: p.offset,
            size:   p.size,
        })
        .collect();

    tracing::trace!(entries = table.len(), "Writing section header table");
    for entry in &table {
        entry.write(writer)?;
    }

    for ((section, entry), placement) in sections.iter().zip(&table).zip(&placements) {
        let pos = writer.stream_position()?;
        let pad = bytes_to_align(pos);
        if pad > 0 {
            writer.write_all(&vec![0u8; pad as usize])?;
        }

        let actual = writer.stream_position()?;
        if actual != placement.offset {
            return Err(XclBinError::OffsetMismatch { expected: placement.offset, actual });
        }

        tracing::debug!(
            section = %section.display_name(),
            offset  = format_args!("0x{:x}", entry.offset),
            size    = format_args!("0x{:x}", entry.size),
            "Writing section"
        );
        section.write_xclbin_binary_buffer(writer)?;

        let mut payload = serde_json::Map::new();
        if section.supports_json_image() {
            section.get_payload(&mut payload)?;
        }
        mirror.push_section(&MirrorSection {
            kind:    entry.kind,
            name:    entry.name.clone(),
            offset:  entry.offset,
            size:    entry.size,
            payload: (!payload.is_empty()).then(|| serde_json::Value::Object(payload)),
        });
    }
    Ok(table)
}
