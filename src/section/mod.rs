//! Section kinds, the section payload contract and the kind-keyed factory.
//!
//! # Kinds
//! The set of section kinds is closed: every kind carries a frozen numeric
//! tag (written into the section table), a canonical upper-case name used on
//! the command line, and a small capability table: whether the kind is a
//! JSON pass-through (and under which JSON node), whether several instances
//! may coexist (distinguished by an index name) and whether it is split into
//! named sub-sections.
//!
//! # Payload behaviour
//! What a section does with its bytes lives behind [`SectionBody`].  The
//! container never looks inside a payload; it only asks the body for its
//! binary image, its JSON image, or to reload itself from either.  New
//! behaviours are added to [`create_body`], not by extending [`Section`].

pub mod json;
pub mod raw;
pub mod soft_kernel;

use serde_json::{Map, Value};
use std::fmt;
use std::io::{Read, Seek, SeekFrom, Write};

use crate::error::{Result, XclBinError};
use crate::util::truncate_str;

pub use json::JsonBody;
pub use raw::RawBody;
pub use soft_kernel::{SoftKernelBody, SoftKernelMetadata};

/// Longest name that fits the 16-byte, NUL-terminated table field.
pub const MAX_SECTION_NAME_LEN: usize = 15;

// ── Kinds ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum SectionKind {
    Bitstream            = 0,
    ClearingBitstream    = 1,
    EmbeddedMetadata     = 2,
    Firmware             = 3,
    DebugData            = 4,
    SchedFirmware        = 5,
    MemTopology          = 6,
    Connectivity         = 7,
    IpLayout             = 8,
    DebugIpLayout        = 9,
    DesignCheckPoint     = 10,
    ClockFreqTopology    = 11,
    Mcs                  = 12,
    Bmc                  = 13,
    BuildMetadata        = 14,
    KeyValueMetadata     = 15,
    UserMetadata         = 16,
    DnaCertificate       = 17,
    Pdi                  = 18,
    BitstreamPartialPdi  = 19,
    PartitionMetadata    = 20,
    EmulationData        = 21,
    SystemMetadata       = 22,
    SoftKernel           = 23,
    AskFlash             = 24,
    AieMetadata          = 25,
    AskGroupTopology     = 26,
    AskGroupConnectivity = 27,
    SmartNic             = 28,
    AieResources         = 29,
    Overlay              = 30,
    VenderMetadata       = 31,
    AiePartition         = 32,
}

/// How a kind stores its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyStyle {
    /// Opaque bytes.
    Raw,
    /// A JSON document kept under the kind's JSON node.
    Json,
    /// Shared-library image plus generated metadata.
    SoftKernel,
}

const ALL_KINDS: [SectionKind; 33] = [
    SectionKind::Bitstream,
    SectionKind::ClearingBitstream,
    SectionKind::EmbeddedMetadata,
    SectionKind::Firmware,
    SectionKind::DebugData,
    SectionKind::SchedFirmware,
    SectionKind::MemTopology,
    SectionKind::Connectivity,
    SectionKind::IpLayout,
    SectionKind::DebugIpLayout,
    SectionKind::DesignCheckPoint,
    SectionKind::ClockFreqTopology,
    SectionKind::Mcs,
    SectionKind::Bmc,
    SectionKind::BuildMetadata,
    SectionKind::KeyValueMetadata,
    SectionKind::UserMetadata,
    SectionKind::DnaCertificate,
    SectionKind::Pdi,
    SectionKind::BitstreamPartialPdi,
    SectionKind::PartitionMetadata,
    SectionKind::EmulationData,
    SectionKind::SystemMetadata,
    SectionKind::SoftKernel,
    SectionKind::AskFlash,
    SectionKind::AieMetadata,
    SectionKind::AskGroupTopology,
    SectionKind::AskGroupConnectivity,
    SectionKind::SmartNic,
    SectionKind::AieResources,
    SectionKind::Overlay,
    SectionKind::VenderMetadata,
    SectionKind::AiePartition,
];

impl SectionKind {
    pub fn all() -> &'static [SectionKind] { &ALL_KINDS }

    #[inline]
    pub fn as_u32(self) -> u32 { self as u32 }

    pub fn from_u32(value: u32) -> Option<Self> {
        ALL_KINDS.get(value as usize).copied()
    }

    /// Canonical name, as written on the command line and in reports.
    pub fn name(self) -> &'static str {
        match self {
            SectionKind::Bitstream            => "BITSTREAM",
            SectionKind::ClearingBitstream    => "CLEARING_BITSTREAM",
            SectionKind::EmbeddedMetadata     => "EMBEDDED_METADATA",
            SectionKind::Firmware             => "FIRMWARE",
            SectionKind::DebugData            => "DEBUG_DATA",
            SectionKind::SchedFirmware        => "SCHED_FIRMWARE",
            SectionKind::MemTopology          => "MEM_TOPOLOGY",
            SectionKind::Connectivity         => "CONNECTIVITY",
            SectionKind::IpLayout             => "IP_LAYOUT",
            SectionKind::DebugIpLayout        => "DEBUG_IP_LAYOUT",
            SectionKind::DesignCheckPoint     => "DESIGN_CHECK_POINT",
            SectionKind::ClockFreqTopology    => "CLOCK_FREQ_TOPOLOGY",
            SectionKind::Mcs                  => "MCS",
            SectionKind::Bmc                  => "BMC",
            SectionKind::BuildMetadata        => "BUILD_METADATA",
            SectionKind::KeyValueMetadata     => "KEYVALUE_METADATA",
            SectionKind::UserMetadata         => "USER_METADATA",
            SectionKind::DnaCertificate       => "DNA_CERTIFICATE",
            SectionKind::Pdi                  => "PDI",
            SectionKind::BitstreamPartialPdi  => "BITSTREAM_PARTIAL_PDI",
            SectionKind::PartitionMetadata    => "PARTITION_METADATA",
            SectionKind::EmulationData        => "EMULATION_DATA",
            SectionKind::SystemMetadata       => "SYSTEM_METADATA",
            SectionKind::SoftKernel           => "SOFT_KERNEL",
            SectionKind::AskFlash             => "ASK_FLASH",
            SectionKind::AieMetadata          => "AIE_METADATA",
            SectionKind::AskGroupTopology     => "GROUP_TOPOLOGY",
            SectionKind::AskGroupConnectivity => "GROUP_CONNECTIVITY",
            SectionKind::SmartNic             => "SMARTNIC",
            SectionKind::AieResources         => "AIE_RESOURCES",
            SectionKind::Overlay              => "OVERLAY",
            SectionKind::VenderMetadata       => "VENDER_METADATA",
            SectionKind::AiePartition         => "AIE_PARTITION",
        }
    }

    /// Look up a kind by its canonical name (case-insensitive).
    pub fn from_name(s: &str) -> Option<Self> {
        let upper = s.trim().to_uppercase();
        ALL_KINDS.iter().copied().find(|k| k.name() == upper)
    }

    /// Like [`SectionKind::from_name`] but reports an unknown name as an error.
    pub fn parse(s: &str) -> Result<Self> {
        Self::from_name(s).ok_or_else(|| {
            XclBinError::Format(format!("Section name '{s}' is not recognized"))
        })
    }

    /// The node a JSON pass-through kind lives under.
    pub fn json_node(self) -> Option<&'static str> {
        match self {
            SectionKind::MemTopology          => Some("mem_topology"),
            SectionKind::Connectivity         => Some("connectivity"),
            SectionKind::IpLayout             => Some("ip_layout"),
            SectionKind::DebugIpLayout        => Some("debug_ip_layout"),
            SectionKind::ClockFreqTopology    => Some("clock_freq_topology"),
            SectionKind::BuildMetadata        => Some("build_metadata"),
            SectionKind::KeyValueMetadata     => Some("keyvalue_metadata"),
            SectionKind::PartitionMetadata    => Some("partition_metadata"),
            SectionKind::SystemMetadata       => Some("system_metadata"),
            SectionKind::AieMetadata          => Some("aie_metadata"),
            SectionKind::AskGroupTopology     => Some("group_topology"),
            SectionKind::AskGroupConnectivity => Some("group_connectivity"),
            _                                 => None,
        }
    }

    pub fn from_json_node(node: &str) -> Option<Self> {
        ALL_KINDS.iter().copied().find(|k| k.json_node() == Some(node))
    }

    /// Kinds that may appear several times, keyed by index name.
    pub fn supports_index(self) -> bool {
        matches!(
            self,
            SectionKind::SoftKernel | SectionKind::VenderMetadata | SectionKind::AiePartition
        )
    }

    pub fn supports_sub_sections(self) -> bool {
        matches!(self.body_style(), BodyStyle::SoftKernel)
    }

    pub fn body_style(self) -> BodyStyle {
        match self {
            SectionKind::SoftKernel => BodyStyle::SoftKernel,
            k if k.json_node().is_some() => BodyStyle::Json,
            _ => BodyStyle::Raw,
        }
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Format types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatType {
    /// No format was given.
    Undefined,
    /// A format was given but is not one we know.
    Unknown,
    Raw,
    Json,
    Html,
    Txt,
}

impl FormatType {
    pub fn from_name(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            ""     => FormatType::Undefined,
            "RAW"  => FormatType::Raw,
            "JSON" => FormatType::Json,
            "HTML" => FormatType::Html,
            "TXT"  => FormatType::Txt,
            _      => FormatType::Unknown,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FormatType::Undefined => "UNDEFINED",
            FormatType::Unknown   => "UNKNOWN",
            FormatType::Raw       => "RAW",
            FormatType::Json      => "JSON",
            FormatType::Html      => "HTML",
            FormatType::Txt       => "TXT",
        }
    }
}

impl fmt::Display for FormatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Body contract ────────────────────────────────────────────────────────────

/// Payload behaviour of one section kind.
///
/// Only [`image`](SectionBody::image), [`read_image`](SectionBody::read_image),
/// the format queries and the payload readers/dumpers are mandatory; JSON and
/// sub-section support default to "not supported".
pub trait SectionBody: fmt::Debug {
    fn kind(&self) -> SectionKind;

    /// The bytes written into the container for this section.
    fn image(&self) -> &[u8];

    /// Reload from bytes taken out of a container.
    fn read_image(&mut self, bytes: Vec<u8>) -> Result<()>;

    fn supports_add_format(&self, format: FormatType) -> bool;
    fn supports_dump_format(&self, format: FormatType) -> bool;

    /// Load from a user-supplied file in the given format.
    fn read_payload(&mut self, input: &mut dyn Read, format: FormatType) -> Result<()>;

    fn dump_contents(&self, out: &mut dyn Write, format: FormatType) -> Result<()>;

    /// Add this section's JSON image to `tree`, keyed by its JSON node.
    fn get_payload(&self, _tree: &mut Map<String, Value>) -> Result<()> {
        Ok(())
    }

    /// Reload from a JSON tree that holds this kind's node at the top level.
    fn read_json_section_image(&mut self, _tree: &Value) -> Result<()> {
        Err(XclBinError::Unsupported(format!(
            "Section '{}' cannot be built from a JSON image", self.kind()
        )))
    }

    /// Merge `append` (the content of this kind's node) into `payload`.
    fn append_to_section_metadata(&self, _append: &Value, _payload: &mut Map<String, Value>) -> Result<()> {
        Err(XclBinError::Unsupported(format!(
            "Section '{}' does not support appending metadata", self.kind()
        )))
    }

    fn purge_buffers(&mut self);

    fn supports_sub_section(&self, _name: &str) -> bool { false }

    fn sub_section_exists(&self, _name: &str) -> bool { false }

    fn read_sub_payload(&mut self, name: &str, _input: &mut dyn Read, _format: FormatType) -> Result<()> {
        Err(XclBinError::Unsupported(format!(
            "Section '{}' does not support the subsection: '{name}'", self.kind()
        )))
    }

    fn dump_sub_section(&self, name: &str, _out: &mut dyn Write, _format: FormatType) -> Result<()> {
        Err(XclBinError::Unsupported(format!(
            "Section '{}' does not support the subsection: '{name}'", self.kind()
        )))
    }
}

// ── Factory ──────────────────────────────────────────────────────────────────

/// Build an empty payload holder for `kind`.
pub fn create_body(kind: SectionKind) -> Box<dyn SectionBody> {
    match kind.body_style() {
        BodyStyle::Raw        => Box::new(RawBody::new(kind)),
        BodyStyle::Json       => Box::new(JsonBody::new(kind)),
        BodyStyle::SoftKernel => Box::new(SoftKernelBody::new()),
    }
}

// ── Section ──────────────────────────────────────────────────────────────────

/// One section owned by a container.
#[derive(Debug)]
pub struct Section {
    kind:       SectionKind,
    name:       String,
    index_name: String,
    body:       Box<dyn SectionBody>,
}

impl Section {
    /// Create an empty section.  An index name is only accepted for kinds
    /// that support one; for those kinds the index name is also the name
    /// stored in the section table.
    pub fn create(kind: SectionKind, index_name: &str) -> Result<Self> {
        if !index_name.is_empty() && !kind.supports_index() {
            return Err(XclBinError::UnsupportedIndexUsage(format!(
                "Section '{kind}' does not support index names (given '{index_name}')"
            )));
        }
        let index_name = truncate_str(index_name, MAX_SECTION_NAME_LEN).to_owned();
        Ok(Self {
            kind,
            name: index_name.clone(),
            index_name,
            body: create_body(kind),
        })
    }

    pub fn kind(&self) -> SectionKind { self.kind }

    pub fn name(&self) -> &str { &self.name }

    pub fn index_name(&self) -> &str { &self.index_name }

    pub fn size(&self) -> u64 { self.body.image().len() as u64 }

    pub fn image(&self) -> &[u8] { self.body.image() }

    /// `KIND` or `KIND[index]`, for messages.
    pub fn display_name(&self) -> String {
        if self.index_name.is_empty() {
            self.kind.name().to_owned()
        } else {
            format!("{}[{}]", self.kind.name(), self.index_name)
        }
    }

    /// Set the table name.  Indexed sections keep their index name.
    pub fn set_name(&mut self, name: &str) {
        if !self.index_name.is_empty() {
            tracing::trace!(section = %self.display_name(), "Keeping index name as section name");
            return;
        }
        self.name = truncate_str(name, MAX_SECTION_NAME_LEN).to_owned();
    }

    /// Read `size` bytes at `offset` from a container stream into this section.
    pub fn read_xclbin_binary<R: Read + Seek>(&mut self, reader: &mut R, offset: u64, size: u64) -> Result<()> {
        reader.seek(SeekFrom::Start(offset))?;
        // Grow as bytes arrive so a corrupt size cannot force a huge allocation.
        let mut bytes = Vec::new();
        (&mut *reader).take(size).read_to_end(&mut bytes)?;
        if (bytes.len() as u64) < size {
            return Err(XclBinError::TruncatedInput { what: "section payload", expected: size });
        }
        self.body.read_image(bytes)
    }

    /// Write the binary image at the stream's current position.
    pub fn write_xclbin_binary_buffer<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(self.body.image())
    }

    pub fn supports_add_format(&self, format: FormatType) -> bool {
        self.body.supports_add_format(format)
    }

    pub fn supports_dump_format(&self, format: FormatType) -> bool {
        self.body.supports_dump_format(format)
    }

    /// True when the section can round-trip through a JSON image.
    pub fn supports_json_image(&self) -> bool {
        self.supports_add_format(FormatType::Json) && self.supports_dump_format(FormatType::Json)
    }

    pub fn read_payload(&mut self, input: &mut dyn Read, format: FormatType) -> Result<()> {
        self.body.read_payload(input, format)
    }

    pub fn read_sub_payload(&mut self, sub: &str, input: &mut dyn Read, format: FormatType) -> Result<()> {
        self.body.read_sub_payload(sub, input, format)
    }

    pub fn dump_contents(&self, out: &mut dyn Write, format: FormatType) -> Result<()> {
        self.body.dump_contents(out, format)
    }

    pub fn dump_sub_section(&self, sub: &str, out: &mut dyn Write, format: FormatType) -> Result<()> {
        self.body.dump_sub_section(sub, out, format)
    }

    pub fn get_payload(&self, tree: &mut Map<String, Value>) -> Result<()> {
        self.body.get_payload(tree)
    }

    pub fn read_json_section_image(&mut self, tree: &Value) -> Result<()> {
        self.body.read_json_section_image(tree)
    }

    pub fn append_to_section_metadata(&self, append: &Value, payload: &mut Map<String, Value>) -> Result<()> {
        self.body.append_to_section_metadata(append, payload)
    }

    pub fn purge_buffers(&mut self) {
        self.body.purge_buffers()
    }

    pub fn supports_sub_section(&self, sub: &str) -> bool {
        self.body.supports_sub_section(sub)
    }

    pub fn sub_section_exists(&self, sub: &str) -> bool {
        self.body.sub_section_exists(sub)
    }
}
