//! Error type shared by every xclbin operation.
//!
//! Every failure aborts the operation in progress; nothing is retried and no
//! partially mutated container is ever written to disk.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, XclBinError>;

#[derive(Error, Debug)]
pub enum XclBinError {
    #[error("Unable to open the file for {action}: {}", path.display())]
    FileOpen {
        action: &'static str,
        path:   PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Input stream is smaller than the expected {what} size ({expected} bytes)")]
    TruncatedInput { what: &'static str, expected: u64 },
    #[error("The xclbin appears to be corrupted (header magic is {found:?}, expected \"xclbin2\")")]
    BadMagic { found: String },
    #[error("{0}")]
    Format(String),
    #[error("Parsing {source_name} on line {line}, column {column}: {message}")]
    JsonParse {
        source_name: String,
        line:        usize,
        column:      usize,
        message:     String,
    },
    #[error("{0}")]
    MissingSection(String),
    #[error("Section '{0}' already exists")]
    DuplicateSection(String),
    #[error("Key '{0}' not found.")]
    MissingKey(String),
    #[error("{0}")]
    UnsupportedIndexUsage(String),
    #[error("{0}")]
    Unsupported(String),
    /// The layout engine and the stream disagree about where a section starts.
    #[error("Expected offset (0x{expected:x}) does not match actual (0x{actual:x})")]
    OffsetMismatch { expected: u64, actual: u64 },
    #[error("Mirror backup data not found in given file. The archive image does not contain \
             any metadata to migrate the data image to the current format; this is usually \
             the result of attempting to migrate a pre-2018.3 archive")]
    MissingMirrorData,
    #[error("Mirror backup data not well formed in given file (missing end marker)")]
    MalformedMirrorData,
}

impl XclBinError {
    /// True when the failure means "the requested section is not there".
    pub fn is_missing_section(&self) -> bool {
        matches!(self, XclBinError::MissingSection(_))
    }

    pub(crate) fn json(source_name: impl Into<String>, err: serde_json::Error) -> Self {
        XclBinError::JsonParse {
            source_name: source_name.into(),
            line:        err.line(),
            column:      err.column(),
            message:     err.to_string(),
        }
    }

    pub(crate) fn open_read(path: impl Into<PathBuf>, source: io::Error) -> Self {
        XclBinError::FileOpen { action: "reading", path: path.into(), source }
    }

    pub(crate) fn open_write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        XclBinError::FileOpen { action: "writing", path: path.into(), source }
    }
}
