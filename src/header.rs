//! Fixed-layout container header ("axlf").
//!
//! # On-disk layout (little-endian)
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0      | 8    | magic `"xclbin2\0"` |
//! | 8      | 4    | signature length (`-1` = unsigned) |
//! | 12     | 28   | reserved (0xFF) |
//! | 40     | 256  | key block (0xFF, reserved for signing) |
//! | 296    | 8    | unique id |
//! | 304    | 152  | nested [`AxlfHeader`] |
//! | 456    | 40   | first section-table entry (placeholder) |
//!
//! Only the first 456 bytes are written as "the header"; the section table
//! that follows is emitted by the layout engine.  Readers consume the full
//! 496 bytes, matching the size of the C record this format descends from.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::Utc;
use std::fmt;
use std::io::{self, Cursor, Read, Write};

use crate::error::{Result, XclBinError};
use crate::util::fixed_str;

pub const MAGIC: &[u8; 8] = b"xclbin2\0";
pub const MAGIC_STR: &str = "xclbin2";

/// Signature length value meaning "no signature present".
pub const SIGNATURE_UNSIGNED: i32 = -1;

pub const KEY_BLOCK_SIZE: usize = 256;
pub const RESERVED_SIZE:  usize = 28;
pub const VBNV_SIZE:      usize = 64;
pub const UUID_SIZE:      usize = 16;
pub const DEBUG_BIN_SIZE: usize = 16;

/// Size of one section-table entry.
pub const SECTION_HEADER_SIZE: u64 = 40;
/// Size of the full header record including the placeholder table entry.
pub const AXLF_SIZE: u64 = 496;
/// Bytes actually written for the header; the table follows immediately.
pub const AXLF_HEADER_SIZE: u64 = AXLF_SIZE - SECTION_HEADER_SIZE;

/// Action-mask bit: load the AI-engine array when the image is loaded.
pub const AM_LOAD_AIE: u16 = 0x1;

// ── Mode ─────────────────────────────────────────────────────────────────────

/// How the contained image is meant to be loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum XclBinMode {
    Flat        = 0,
    Pr          = 1,
    Tandem      = 2,
    TandemPr    = 3,
    HwEmu       = 4,
    SwEmu       = 5,
    HwEmuPr     = 6,
}

impl XclBinMode {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(XclBinMode::Flat),
            1 => Some(XclBinMode::Pr),
            2 => Some(XclBinMode::Tandem),
            3 => Some(XclBinMode::TandemPr),
            4 => Some(XclBinMode::HwEmu),
            5 => Some(XclBinMode::SwEmu),
            6 => Some(XclBinMode::HwEmuPr),
            _ => None,
        }
    }

    /// Name used by the `SYS:mode:<value>` key-value setting.
    pub fn key_name(self) -> &'static str {
        match self {
            XclBinMode::Flat     => "flat",
            XclBinMode::Pr       => "hw_pr",
            XclBinMode::Tandem   => "tandem",
            XclBinMode::TandemPr => "tandem_pr",
            XclBinMode::HwEmu    => "hw_emu",
            XclBinMode::SwEmu    => "sw_emu",
            XclBinMode::HwEmuPr  => "hw_emu_pr",
        }
    }

    pub fn from_key_name(s: &str) -> Option<Self> {
        match s {
            "flat"      => Some(XclBinMode::Flat),
            "hw_pr"     => Some(XclBinMode::Pr),
            "tandem"    => Some(XclBinMode::Tandem),
            "tandem_pr" => Some(XclBinMode::TandemPr),
            "hw_emu"    => Some(XclBinMode::HwEmu),
            "sw_emu"    => Some(XclBinMode::SwEmu),
            "hw_emu_pr" => Some(XclBinMode::HwEmuPr),
            _           => None,
        }
    }
}

impl fmt::Display for XclBinMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key_name())
    }
}

// ── Version ──────────────────────────────────────────────────────────────────

/// Parse `"patch"` or `"major.minor.patch"`.
pub fn parse_version(text: &str) -> Result<(u8, u8, u16)> {
    let tokens: Vec<&str> = text.trim().split('.').collect();
    let bad = || XclBinError::Format(format!(
        "Invalid version string '{text}'; expected <patch> or <major>.<minor>.<patch>"
    ));
    match tokens.as_slice() {
        [patch] => Ok((0, 0, patch.parse().map_err(|_| bad())?)),
        [major, minor, patch] => Ok((
            major.parse().map_err(|_| bad())?,
            minor.parse().map_err(|_| bad())?,
            patch.parse().map_err(|_| bad())?,
        )),
        _ => Err(bad()),
    }
}

// ── Nested header ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxlfHeader {
    /// Total file length; patched once the write is complete.
    pub length:                 u64,
    pub time_stamp:             u64,
    pub feature_rom_time_stamp: u64,
    pub version_patch:          u16,
    pub version_major:          u8,
    pub version_minor:          u8,
    pub mode:                   u16,
    pub action_mask:            u16,
    pub rom_uuid:               [u8; UUID_SIZE],
    pub platform_vbnv:          [u8; VBNV_SIZE],
    pub uuid:                   [u8; UUID_SIZE],
    pub debug_bin:              [u8; DEBUG_BIN_SIZE],
    pub num_sections:           u32,
}

impl Default for AxlfHeader {
    fn default() -> Self {
        Self {
            length:                 0,
            time_stamp:             0,
            feature_rom_time_stamp: 0,
            version_patch:          0,
            version_major:          0,
            version_minor:          0,
            mode:                   XclBinMode::Flat as u16,
            action_mask:            0,
            rom_uuid:               [0u8; UUID_SIZE],
            platform_vbnv:          [0u8; VBNV_SIZE],
            uuid:                   [0u8; UUID_SIZE],
            debug_bin:              [0u8; DEBUG_BIN_SIZE],
            num_sections:           0,
        }
    }
}

impl AxlfHeader {
    pub fn version_string(&self) -> String {
        format!("{}.{}.{}", self.version_major, self.version_minor, self.version_patch)
    }

    pub fn platform_vbnv_str(&self) -> String { fixed_str(&self.platform_vbnv) }

    pub fn debug_bin_str(&self) -> String { fixed_str(&self.debug_bin) }

    fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u64::<LittleEndian>(self.length)?;
        w.write_u64::<LittleEndian>(self.time_stamp)?;
        w.write_u64::<LittleEndian>(self.feature_rom_time_stamp)?;
        w.write_u16::<LittleEndian>(self.version_patch)?;
        w.write_u8(self.version_major)?;
        w.write_u8(self.version_minor)?;
        w.write_u16::<LittleEndian>(self.mode)?;
        w.write_u16::<LittleEndian>(self.action_mask)?;
        w.write_all(&self.rom_uuid)?;
        w.write_all(&self.platform_vbnv)?;
        w.write_all(&self.uuid)?;
        w.write_all(&self.debug_bin)?;
        w.write_u32::<LittleEndian>(self.num_sections)?;
        w.write_all(&[0u8; 4]) // tail padding to 8-byte alignment
    }

    fn read<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut h = AxlfHeader {
            length:                 r.read_u64::<LittleEndian>()?,
            time_stamp:             r.read_u64::<LittleEndian>()?,
            feature_rom_time_stamp: r.read_u64::<LittleEndian>()?,
            version_patch:          r.read_u16::<LittleEndian>()?,
            version_major:          r.read_u8()?,
            version_minor:          r.read_u8()?,
            mode:                   r.read_u16::<LittleEndian>()?,
            action_mask:            r.read_u16::<LittleEndian>()?,
            ..AxlfHeader::default()
        };
        r.read_exact(&mut h.rom_uuid)?;
        r.read_exact(&mut h.platform_vbnv)?;
        r.read_exact(&mut h.uuid)?;
        r.read_exact(&mut h.debug_bin)?;
        h.num_sections = r.read_u32::<LittleEndian>()?;
        let mut pad = [0u8; 4];
        r.read_exact(&mut pad)?;
        Ok(h)
    }
}

// ── Container header ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Axlf {
    pub magic:            [u8; 8],
    pub signature_length: i32,
    pub reserved:         [u8; RESERVED_SIZE],
    pub key_block:        [u8; KEY_BLOCK_SIZE],
    pub unique_id:        u64,
    pub header:           AxlfHeader,
}

impl Default for Axlf {
    /// An all-zero record; see [`Axlf::new`] for a ready-to-write header.
    fn default() -> Self {
        Self {
            magic:            [0u8; 8],
            signature_length: 0,
            reserved:         [0u8; RESERVED_SIZE],
            key_block:        [0u8; KEY_BLOCK_SIZE],
            unique_id:        0,
            header:           AxlfHeader::default(),
        }
    }
}

impl Axlf {
    /// Fresh header: magic set, unsigned, reserved areas 0xFF, stamped with
    /// the current time and this build's version.
    pub fn new() -> Self {
        let now = Utc::now().timestamp().max(0) as u64;
        let (major, minor, patch) = parse_version(env!("CARGO_PKG_VERSION")).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Unable to parse the build version; using 0.0.0");
            (0, 0, 0)
        });
        Self {
            magic:            *MAGIC,
            signature_length: SIGNATURE_UNSIGNED,
            reserved:         [0xFF; RESERVED_SIZE],
            key_block:        [0xFF; KEY_BLOCK_SIZE],
            unique_id:        now,
            header: AxlfHeader {
                time_stamp:    now,
                version_major: major,
                version_minor: minor,
                version_patch: patch,
                ..AxlfHeader::default()
            },
        }
    }

    pub fn magic_str(&self) -> String { fixed_str(&self.magic) }

    /// Write the header minus the placeholder table entry, then flush.
    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(&self.magic)?;
        writer.write_i32::<LittleEndian>(self.signature_length)?;
        writer.write_all(&self.reserved)?;
        writer.write_all(&self.key_block)?;
        writer.write_u64::<LittleEndian>(self.unique_id)?;
        self.header.write(&mut writer)?;
        writer.flush()
    }

    /// Read the full 496-byte record from the reader's current position.
    pub fn read<R: Read>(mut reader: R) -> Result<Self> {
        let mut buf = [0u8; AXLF_SIZE as usize];
        let got = read_full(&mut reader, &mut buf)?;
        if got < buf.len() {
            return Err(XclBinError::TruncatedInput { what: "header", expected: AXLF_SIZE });
        }

        let mut cur = Cursor::new(&buf[..]);
        let mut ax = Axlf::default();
        cur.read_exact(&mut ax.magic)?;
        if ax.magic[..7] != MAGIC[..7] {
            return Err(XclBinError::BadMagic { found: ax.magic_str() });
        }
        ax.signature_length = cur.read_i32::<LittleEndian>()?;
        cur.read_exact(&mut ax.reserved)?;
        cur.read_exact(&mut ax.key_block)?;
        ax.unique_id = cur.read_u64::<LittleEndian>()?;
        ax.header = AxlfHeader::read(&mut cur)?;
        Ok(ax)
    }
}

/// Fill as much of `buf` as the reader can supply; returns the byte count.
pub(crate) fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
