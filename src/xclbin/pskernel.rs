//! Packaging a shared library as a SOFT_KERNEL section.

use serde_json::to_vec;
use std::path::Path;

use super::{open_input, XclBin};
use crate::error::{Result, XclBinError};
use crate::section::soft_kernel::{SUB_SECTION_METADATA, SUB_SECTION_OBJ};
use crate::section::{FormatType, Section, SectionKind, SoftKernelMetadata, MAX_SECTION_NAME_LEN};
use crate::util::{split_three, truncate_str};

/// `<symbol_name>:<instances>:<path_to_shared_library>`; the path may
/// itself contain colons.
fn parse_ps_kernel(text: &str) -> Result<(&str, u32, &Path)> {
    let bad = || XclBinError::Format(format!(
        "Expected format <symbol_name>:<instances>:<path_to_shared_library> when adding a PS Kernel. \
         Received: {text}"
    ));
    let (symbol, instances, path) = split_three(text).ok_or_else(bad)?;
    if symbol.is_empty() || path.is_empty() {
        return Err(bad());
    }
    let instances = instances.trim().parse().map_err(|_| {
        XclBinError::Format(format!("Invalid PS kernel instance count '{instances}' in '{text}'"))
    })?;
    Ok((symbol, instances, Path::new(path)))
}

impl XclBin {
    /// Add a SOFT_KERNEL section holding the library image and generated
    /// metadata, indexed by the symbol name.
    pub fn add_ps_kernel(&mut self, text: &str) -> Result<()> {
        let (symbol, instances, path) = parse_ps_kernel(text)?;
        let mut library = open_input(path)?;

        let index = truncate_str(symbol, MAX_SECTION_NAME_LEN);
        if self.sections.find(SectionKind::SoftKernel, index).is_some() {
            tracing::error!("The PS Kernel (e.g SOFT_KERNEL) section with the symbolic name '{symbol}' already exists");
            return Err(XclBinError::DuplicateSection(format!("SOFT_KERNEL[{index}]")));
        }

        let mut section = Section::create(SectionKind::SoftKernel, symbol)?;

        tracing::trace!(symbol, "Adding PS kernel subsection OBJ");
        section.read_sub_payload(SUB_SECTION_OBJ, &mut library, FormatType::Raw)?;

        tracing::trace!(symbol, "Adding PS kernel subsection METADATA");
        let metadata = SoftKernelMetadata::new(symbol, symbol, instances);
        let image = to_vec(&metadata.to_json()).map_err(std::io::Error::from)?;
        section.read_sub_payload(SUB_SECTION_METADATA, &mut image.as_slice(), FormatType::Json)?;

        self.add_section_object(section);
        tracing::info!("Section: SOFT_KERNEL (PS KERNEL), SubName: '{symbol}' was successfully added");
        Ok(())
    }
}
