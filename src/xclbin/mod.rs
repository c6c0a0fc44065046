//! The in-memory container: header plus section registry.
//!
//! ```no_run
//! use xclbin::xclbin::{ReadOptions, WriteOptions, XclBin};
//!
//! let mut xb = XclBin::read("in.xclbin", ReadOptions::default())?;
//! xb.set_key_value("USER:owner:me")?;
//! xb.write("out.xclbin", WriteOptions::default())?;
//! # Ok::<(), xclbin::error::XclBinError>(())
//! ```
//!
//! Mutations only touch memory.  Nothing reaches disk until [`XclBin::write`]
//! runs, so a failed batch never leaves a half-edited container behind.

mod keyvalue;
mod mutate;
mod pskernel;

use serde_json::{Map, Value};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;
use uuid::Uuid;

use crate::error::{Result, XclBinError};
use crate::header::{Axlf, XclBinMode, AXLF_HEADER_SIZE};
use crate::layout::{self, read_table};
use crate::mirror::{
    find_and_read_mirror_data, header_from_json, header_to_json, write_mirror, MirrorRecord,
    MirrorSection, KEY_HEADER, KEY_SCHEMA_VERSION, KEY_SECTION_HEADER,
};
use crate::registry::{SectionId, SectionRegistry};
use crate::section::{Section, SectionKind};
use crate::util::{copy_fixed_str, hex_to_buffer, json_leaf, string_to_u64};

// ── Options ──────────────────────────────────────────────────────────────────

/// Configuration for [`XclBin::write`].
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    /// Keep the current container UUID instead of generating a new one.
    pub skip_uuid_insertion: bool,
    /// Indent the mirror JSON.
    pub pretty_mirror:       bool,
}

/// Configuration for [`XclBin::read`].
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// Rebuild from the mirror data instead of the binary header and table.
    pub migrate: bool,
}

// ── XclBin ───────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct XclBin {
    header:   Axlf,
    sections: SectionRegistry,
}

impl Default for XclBin {
    fn default() -> Self { Self::new() }
}

impl XclBin {
    /// An empty container with a freshly initialized header.
    pub fn new() -> Self {
        Self { header: Axlf::new(), sections: SectionRegistry::new() }
    }

    pub fn header(&self) -> &Axlf { &self.header }

    pub fn header_mut(&mut self) -> &mut Axlf { &mut self.header }

    pub fn sections(&self) -> &SectionRegistry { &self.sections }

    pub fn find_section(&self, kind: SectionKind, index_name: &str) -> Option<&Section> {
        self.sections.find(kind, index_name)
    }

    /// Take ownership of a section built elsewhere.
    pub fn add_section_object(&mut self, section: Section) -> SectionId {
        let id = self.sections.add(section);
        self.sync_section_count();
        id
    }

    pub fn remove_section_object(&mut self, id: SectionId) -> Result<Section> {
        let section = self.sections.remove(id)?;
        self.sync_section_count();
        tracing::trace!(section = %section.display_name(), "Removed section");
        Ok(section)
    }

    fn sync_section_count(&mut self) {
        self.header.header.num_sections = self.sections.len() as u32;
    }

    fn section_mut(&mut self, id: SectionId) -> Result<&mut Section> {
        self.sections
            .get_mut(id)
            .ok_or_else(|| XclBinError::MissingSection("Section is no longer part of this container".into()))
    }

    // ── Read ─────────────────────────────────────────────────────────────────

    pub fn read<P: AsRef<Path>>(path: P, opts: ReadOptions) -> Result<Self> {
        let path = path.as_ref();
        tracing::trace!(path = %path.display(), migrate = opts.migrate, "Reading xclbin binary file");
        let mut reader = open_input(path)?;
        Self::read_from(&mut reader, opts)
    }

    pub fn read_from<R: Read + Seek>(reader: &mut R, opts: ReadOptions) -> Result<Self> {
        if opts.migrate {
            Self::read_mirror_image(reader)
        } else {
            Self::read_binary(reader)
        }
    }

    fn read_binary<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        reader.seek(SeekFrom::Start(0))?;
        let header = Axlf::read(&mut *reader)?;
        let count = header.header.num_sections;

        reader.seek(SeekFrom::Start(AXLF_HEADER_SIZE))?;
        let table = read_table(reader, count)?;

        let mut xb = Self { header, sections: SectionRegistry::new() };
        for (i, entry) in table.iter().enumerate() {
            tracing::trace!("Examining section {} of {}", i + 1, count);
            let Some(kind) = SectionKind::from_u32(entry.kind) else {
                tracing::warn!(kind = entry.kind, name = %entry.name, "Skipping section of unknown kind");
                continue;
            };
            let mut section = table_section(kind, &entry.name)?;
            section.read_xclbin_binary(reader, entry.offset, entry.size)?;
            xb.sections.add(section);
        }
        xb.sync_section_count();
        Ok(xb)
    }

    fn read_mirror_image<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        let record = find_and_read_mirror_data(reader)?;

        let mut xb = Self { header: Axlf::default(), sections: SectionRegistry::new() };
        for (key, value) in record.entries() {
            tracing::trace!(entry = %key, "Processing mirror entry");
            match key.as_str() {
                KEY_SCHEMA_VERSION => {
                    tracing::trace!("Examining the xclbin version schema");
                }
                KEY_HEADER => xb.header = header_from_json(value)?,
                KEY_SECTION_HEADER => {
                    let entry = MirrorSection::from_json(value)?;
                    let Some(kind) = SectionKind::from_u32(entry.kind) else {
                        tracing::warn!(kind = entry.kind, name = %entry.name, "Skipping mirrored section of unknown kind");
                        continue;
                    };
                    let mut section = table_section(kind, &entry.name)?;
                    match &entry.payload {
                        Some(payload) if section.supports_json_image() => {
                            section.read_json_section_image(payload)?
                        }
                        _ => section.read_xclbin_binary(reader, entry.offset, entry.size)?,
                    }
                    xb.sections.add(section);
                }
                other => tracing::warn!(entry = %other, "Skipping unknown mirror entry"),
            }
        }
        xb.header.header.length = reader.seek(SeekFrom::End(0))?;
        xb.sync_section_count();
        Ok(xb)
    }

    // ── Write ────────────────────────────────────────────────────────────────

    /// Write the container to `path`; returns the file length.
    pub fn write<P: AsRef<Path>>(&mut self, path: P, opts: WriteOptions) -> Result<u64> {
        let path = path.as_ref();
        tracing::trace!(path = %path.display(), "Writing the xclbin binary file");
        let mut writer = create_output(path)?;
        let length = self.write_to(&mut writer, opts)?;
        writer.flush()?;
        tracing::info!("Successfully wrote ({length} bytes) to the output file: {}", path.display());
        Ok(length)
    }

    /// Header, table, payloads, mirror; then the header again with the final
    /// length.  Writing starts at offset 0 and the stream is left positioned
    /// at the end of the image.  Bytes already past that point are not
    /// truncated; the returned length is the image size, not the stream size.
    pub fn write_to<W: Write + Seek>(&mut self, writer: &mut W, opts: WriteOptions) -> Result<u64> {
        if opts.skip_uuid_insertion {
            tracing::trace!("Skipping xclbin's UUID insertion");
        } else {
            self.update_uuid();
        }
        self.sync_section_count();

        let mut mirror = MirrorRecord::new();
        mirror.push_schema_version();

        writer.seek(SeekFrom::Start(0))?;
        self.header.write(&mut *writer)?;
        mirror.push(KEY_HEADER, header_to_json(&self.header));

        layout::write_all(writer, &self.sections, &mut mirror)?;
        write_mirror(writer, &mirror, opts.pretty_mirror)?;

        let length = writer.stream_position()?;
        self.header.header.length = length;
        writer.seek(SeekFrom::Start(0))?;
        self.header.write(&mut *writer)?;
        writer.seek(SeekFrom::Start(length))?;
        Ok(length)
    }

    /// Replace the container UUID with a random one.
    pub fn update_uuid(&mut self) {
        let uuid = Uuid::new_v4();
        self.header.header.uuid = *uuid.as_bytes();
        tracing::trace!(uuid = %uuid.simple(), "Updated xclbin UUID");
    }

    /// Refresh header fields derived from a section's content.  Only
    /// BUILD_METADATA carries such fields (feature-ROM timestamp, UUID and
    /// platform name).
    pub fn update_header_from_section(&mut self, id: SectionId) -> Result<()> {
        let Some(section) = self.sections.get(id) else { return Ok(()) };
        if section.kind() != SectionKind::BuildMetadata {
            return Ok(());
        }
        let mut tree = Map::new();
        section.get_payload(&mut tree)?;

        let dsa = tree
            .get("build_metadata")
            .and_then(|b| b.get("dsa"))
            .ok_or_else(|| XclBinError::Format(
                "BUILD_METADATA does not contain the 'build_metadata.dsa' node".into()
            ))?;
        let empty = Value::Object(Map::new());
        let rom = dsa
            .get("feature_roms")
            .and_then(Value::as_array)
            .and_then(|roms| roms.first())
            .unwrap_or(&empty);

        let h = &mut self.header.header;
        h.feature_rom_time_stamp =
            string_to_u64(&json_leaf(rom, "timeSinceEpoch").unwrap_or_default(), false)?;
        let uuid = json_leaf(rom, "uuid").unwrap_or_else(|| "0".repeat(32));
        hex_to_buffer(&uuid, &mut h.rom_uuid)?;
        let mut vbnv = json_leaf(rom, "vbnvName").unwrap_or_default();

        // Older tools used snake_case names.
        if h.feature_rom_time_stamp == 0 {
            h.feature_rom_time_stamp =
                string_to_u64(&json_leaf(rom, "time_epoch").unwrap_or_default(), false)?;
        }
        if vbnv.is_empty() {
            vbnv = json_leaf(rom, "vbnv_name").unwrap_or_default();
        }
        copy_fixed_str(&mut h.platform_vbnv, &vbnv);

        tracing::debug!(
            feature_rom_time_stamp = h.feature_rom_time_stamp,
            platform = %vbnv,
            "Header updated from BUILD_METADATA"
        );
        Ok(())
    }

    // ── Report ───────────────────────────────────────────────────────────────

    /// Human-readable summary of the header and section table.
    pub fn report_info<W: Write>(&self, mut out: W, input: &str) -> io::Result<()> {
        let h = &self.header.header;
        let mode = XclBinMode::from_u16(h.mode)
            .map(|m| m.key_name().to_owned())
            .unwrap_or_else(|| format!("unknown ({})", h.mode));

        writeln!(out, "── xclbin ──────────────────────────────────────────────")?;
        writeln!(out, "  File              {input}")?;
        writeln!(out, "  Magic             {}", self.header.magic_str())?;
        writeln!(out, "  Version           {}", h.version_string())?;
        writeln!(out, "  Timestamp         {}", h.time_stamp)?;
        writeln!(out, "  UUID              {}", hex::encode(h.uuid))?;
        writeln!(out, "  Mode              {mode}")?;
        writeln!(out, "  Action mask       0x{:x}", h.action_mask)?;
        writeln!(out, "  Platform VBNV     {}", h.platform_vbnv_str())?;
        writeln!(out, "  Feature ROM time  {}", h.feature_rom_time_stamp)?;
        writeln!(out, "  Feature ROM UUID  {}", hex::encode(h.rom_uuid))?;
        writeln!(out, "  Debug bin         {}", h.debug_bin_str())?;
        writeln!(out, "  Signature length  {}", self.header.signature_length)?;
        writeln!(out, "  Length            {} B", h.length)?;
        writeln!(out, "  Sections          {}", self.sections.len())?;

        let sizes: Vec<u64> = self.sections.iter().map(Section::size).collect();
        let placements = layout::compute_layout(&sizes);
        writeln!(out)?;
        writeln!(out, "  {:<24} {:<16} {:>10} {:>10}", "Kind", "Name", "Offset", "Size")?;
        for (section, p) in self.sections.iter().zip(&placements) {
            writeln!(
                out,
                "  {:<24} {:<16} {:>10} {:>10}",
                section.display_name(),
                section.name(),
                format!("0x{:x}", p.offset),
                format!("0x{:x}", p.size),
            )?;
        }
        Ok(())
    }
}

/// A section created from a table or mirror entry; for indexed kinds the
/// stored name is the index.
fn table_section(kind: SectionKind, name: &str) -> Result<Section> {
    let index = if kind.supports_index() { name } else { "" };
    let mut section = Section::create(kind, index)?;
    section.set_name(name);
    Ok(section)
}

// ── File helpers ─────────────────────────────────────────────────────────────

pub(crate) fn open_input(path: &Path) -> Result<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| XclBinError::open_read(path, e))
}

pub(crate) fn create_output(path: &Path) -> Result<BufWriter<File>> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|e| XclBinError::open_write(path, e))
}

pub(crate) fn read_json_file(path: &Path) -> Result<Value> {
    let mut text = Vec::new();
    open_input(path)?.read_to_end(&mut text)?;
    serde_json::from_slice(&text)
        .map_err(|e| XclBinError::json(format!("the file '{}'", path.display()), e))
}

/// File name without directory or extension.
pub(crate) fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::AXLF_SIZE;
    use crate::section::FormatType;
    use serde_json::json;
    use std::io::Cursor;

    fn with_firmware(bytes: &[u8]) -> XclBin {
        let mut xb = XclBin::new();
        let mut s = Section::create(SectionKind::Firmware, "").unwrap();
        s.read_payload(&mut &bytes[..], FormatType::Raw).unwrap();
        s.set_name("fw");
        xb.add_section_object(s);
        xb
    }

    #[test]
    fn length_field_matches_stream() {
        let mut xb = with_firmware(b"0123456789");
        let mut cur = Cursor::new(Vec::new());
        let len = xb.write_to(&mut cur, WriteOptions::default()).unwrap();
        let buf = cur.into_inner();
        assert_eq!(len, buf.len() as u64);
        assert_eq!(&buf[304..312], &len.to_le_bytes());
        assert_eq!(xb.header().header.length, len);
    }

    #[test]
    fn length_ignores_stale_bytes_in_stream() {
        let opts = WriteOptions { skip_uuid_insertion: true, ..Default::default() };
        let mut xb = with_firmware(b"0123456789");
        let mut fresh = Cursor::new(Vec::new());
        let expected = xb.write_to(&mut fresh, opts.clone()).unwrap();

        let mut cur = Cursor::new(vec![0xEE; 10_000]);
        let len = xb.write_to(&mut cur, opts).unwrap();
        assert_eq!(len, expected);
        assert_eq!(cur.position(), len);
        let buf = cur.into_inner();
        assert_eq!(&buf[304..312], &len.to_le_bytes());
        assert_eq!(&buf[..len as usize], &fresh.get_ref()[..]);
        let end = crate::mirror::MIRROR_DATA_END;
        assert_eq!(&buf[len as usize - end.len()..len as usize], end);
        assert!(buf[len as usize..].iter().all(|&b| b == 0xEE));
    }

    #[test]
    fn uuid_changes_unless_skipped() {
        let mut xb = with_firmware(b"x");
        let before = xb.header().header.uuid;
        xb.write_to(&mut Cursor::new(Vec::new()), WriteOptions { skip_uuid_insertion: true, ..Default::default() }).unwrap();
        assert_eq!(xb.header().header.uuid, before);
        xb.write_to(&mut Cursor::new(Vec::new()), WriteOptions::default()).unwrap();
        assert_ne!(xb.header().header.uuid, before);
    }

    #[test]
    fn binary_read_skips_unknown_kinds() {
        let mut xb = with_firmware(b"abc");
        let mut cur = Cursor::new(Vec::new());
        xb.write_to(&mut cur, WriteOptions::default()).unwrap();
        let mut buf = cur.into_inner();
        // Patch the first table entry's kind to something unknown.
        buf[AXLF_HEADER_SIZE as usize..][..4].copy_from_slice(&999u32.to_le_bytes());
        let back = XclBin::read_from(&mut Cursor::new(buf), ReadOptions::default()).unwrap();
        assert!(back.sections().is_empty());
        assert_eq!(back.header().header.num_sections, 0);
    }

    #[test]
    fn binary_read_keeps_non_json_image_of_json_kind() {
        let mut xb = with_firmware(b"abc");
        let mut cur = Cursor::new(Vec::new());
        xb.write_to(&mut cur, WriteOptions::default()).unwrap();
        let mut buf = cur.into_inner();
        let tag = SectionKind::MemTopology.as_u32();
        buf[AXLF_HEADER_SIZE as usize..][..4].copy_from_slice(&tag.to_le_bytes());
        let back = XclBin::read_from(&mut Cursor::new(buf), ReadOptions::default()).unwrap();
        let s = back.sections().find(SectionKind::MemTopology, "").unwrap();
        assert_eq!(s.image(), b"abc");
    }

    #[test]
    fn empty_container_round_trips() {
        let mut xb = XclBin::new();
        let mut cur = Cursor::new(Vec::new());
        xb.write_to(&mut cur, WriteOptions::default()).unwrap();
        let buf = cur.into_inner();
        assert!(buf.len() as u64 > AXLF_SIZE - 40);
        let back = XclBin::read_from(&mut Cursor::new(buf), ReadOptions::default()).unwrap();
        assert_eq!(back.header(), xb.header());
    }

    #[test]
    fn build_metadata_fallback_names() {
        let mut xb = XclBin::new();
        let mut s = Section::create(SectionKind::BuildMetadata, "").unwrap();
        let tree = json!({ "build_metadata": { "dsa": { "feature_roms": [
            { "time_epoch": "42", "vbnv_name": "old_platform" }
        ] } } });
        s.read_json_section_image(&tree).unwrap();
        let id = xb.add_section_object(s);
        xb.update_header_from_section(id).unwrap();
        assert_eq!(xb.header().header.feature_rom_time_stamp, 42);
        assert_eq!(xb.header().header.platform_vbnv_str(), "old_platform");
        assert_eq!(xb.header().header.rom_uuid, [0u8; 16]);
    }

    #[test]
    fn build_metadata_without_dsa_fails() {
        let mut xb = XclBin::new();
        let mut s = Section::create(SectionKind::BuildMetadata, "").unwrap();
        s.read_json_section_image(&json!({ "build_metadata": { "x": 1 } })).unwrap();
        let id = xb.add_section_object(s);
        assert!(matches!(xb.update_header_from_section(id), Err(XclBinError::Format(_))));
    }

    #[test]
    fn info_lists_sections() {
        let xb = with_firmware(b"abc");
        let mut out = Vec::new();
        xb.report_info(&mut out, "mem").unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("FIRMWARE"));
        assert!(text.contains("Sections          1"));
    }
}
