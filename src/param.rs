//! Section operation descriptors: `<SECTION>[<INDEX>]-<SUBSECTION>:<FORMAT>:<FILE>`.
//!
//! ```
//! use xclbin::param::ParameterSectionData;
//! use xclbin::section::FormatType;
//!
//! let psd: ParameterSectionData = "SOFT_KERNEL[k1]-OBJ:raw:/tmp/lib.so".parse()?;
//! assert_eq!(psd.section_name(), "SOFT_KERNEL");
//! assert_eq!(psd.section_index_name(), "k1");
//! assert_eq!(psd.sub_section_name(), "OBJ");
//! assert_eq!(psd.format(), FormatType::Raw);
//! # Ok::<(), xclbin::error::XclBinError>(())
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Result, XclBinError};
use crate::registry::split_section_index;
use crate::section::FormatType;
use crate::util::split_three;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSectionData {
    original:      String,
    section_name:  String,
    index_name:    String,
    sub_section:   String,
    format:        FormatType,
    format_name:   String,
    file:          PathBuf,
}

impl ParameterSectionData {
    pub fn parse(text: &str) -> Result<Self> {
        let (target, format_name, file) = split_three(text).ok_or_else(|| {
            XclBinError::Format(format!(
                "Expected format <section>:<format>:<file> when using a section option, got '{text}'"
            ))
        })?;

        // The sub-section follows the first '-' after any index suffix.
        let index_end = target.find(']').map(|i| i + 1).unwrap_or(0);
        let (with_index, sub_section) = match target[index_end..].find('-') {
            Some(dash) => {
                let at = index_end + dash;
                (&target[..at], &target[at + 1..])
            }
            None => (target, ""),
        };
        let (section_name, index_name) = split_section_index(with_index)?;

        Ok(Self {
            original:     text.to_owned(),
            section_name: section_name.to_owned(),
            index_name:   index_name.to_owned(),
            sub_section:  sub_section.to_owned(),
            format:       FormatType::from_name(format_name),
            format_name:  format_name.to_owned(),
            file:         PathBuf::from(file),
        })
    }

    /// Kind name without any index suffix; empty for the "every section in
    /// the file" form (`:JSON:file`).
    pub fn section_name(&self) -> &str { &self.section_name }

    pub fn section_index_name(&self) -> &str { &self.index_name }

    /// `NAME` or `NAME[INDEX]`.
    pub fn section_name_with_index(&self) -> String {
        if self.index_name.is_empty() {
            self.section_name.clone()
        } else {
            format!("{}[{}]", self.section_name, self.index_name)
        }
    }

    pub fn sub_section_name(&self) -> &str { &self.sub_section }

    pub fn format(&self) -> FormatType { self.format }

    pub fn format_name(&self) -> &str { &self.format_name }

    pub fn file(&self) -> &Path { &self.file }

    pub fn original(&self) -> &str { &self.original }
}

impl FromStr for ParameterSectionData {
    type Err = XclBinError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ParameterSectionData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_section() {
        let p = ParameterSectionData::parse("BUILD_METADATA:JSON:meta.json").unwrap();
        assert_eq!(p.section_name(), "BUILD_METADATA");
        assert_eq!(p.section_index_name(), "");
        assert_eq!(p.sub_section_name(), "");
        assert_eq!(p.format(), FormatType::Json);
        assert_eq!(p.file(), Path::new("meta.json"));
    }

    #[test]
    fn index_and_sub_section() {
        let p = ParameterSectionData::parse("SOFT_KERNEL[my-kern]-METADATA:json:C:\\md.json").unwrap();
        assert_eq!(p.section_name(), "SOFT_KERNEL");
        assert_eq!(p.section_index_name(), "my-kern");
        assert_eq!(p.sub_section_name(), "METADATA");
        assert_eq!(p.section_name_with_index(), "SOFT_KERNEL[my-kern]");
        assert_eq!(p.file(), Path::new("C:\\md.json"));
    }

    #[test]
    fn wildcard_and_formats() {
        let p = ParameterSectionData::parse(":JSON:all.json").unwrap();
        assert_eq!(p.section_name(), "");
        assert_eq!(ParameterSectionData::parse("BITSTREAM::f").unwrap().format(), FormatType::Undefined);
        assert_eq!(ParameterSectionData::parse("BITSTREAM:xml:f").unwrap().format(), FormatType::Unknown);
    }

    #[test]
    fn malformed() {
        assert!(ParameterSectionData::parse("BITSTREAM:RAW").is_err());
        assert!(ParameterSectionData::parse("SOFT_KERNEL[k:RAW:f").is_err());
    }
}
