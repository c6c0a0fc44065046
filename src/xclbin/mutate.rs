//! Section-level edits driven by [`ParameterSectionData`] descriptors.

use serde_json::{Map, Value};
use std::io::Write;

use super::{create_output, file_stem, open_input, read_json_file, XclBin};
use crate::error::{Result, XclBinError};
use crate::mirror::KEY_SCHEMA_VERSION;
use crate::param::ParameterSectionData;
use crate::registry::SectionId;
use crate::section::{FormatType, Section, SectionKind};
use crate::util::json_is_empty;

/// Indexed kinds need an index; the rest must not have one.
fn check_index_usage(kind: SectionKind, index: &str) -> Result<()> {
    if kind.supports_index() && index.is_empty() {
        return Err(XclBinError::UnsupportedIndexUsage(format!(
            "Section '{kind}' requires an index name (e.g. {kind}[<index>])"
        )));
    }
    if !kind.supports_index() && !index.is_empty() {
        return Err(XclBinError::UnsupportedIndexUsage(format!(
            "Section '{kind}' does not support index names (given '{index}')"
        )));
    }
    Ok(())
}

fn require_wildcard_json(psd: &ParameterSectionData, action: &str) -> Result<()> {
    if !psd.section_name().is_empty() {
        return Err(XclBinError::Format(format!(
            "Section given for a wildcard JSON section {action} is not empty: '{}'", psd.original()
        )));
    }
    if psd.format() != FormatType::Json {
        return Err(XclBinError::Format(format!(
            "Expecting JSON format type, got '{}'", psd.format_name()
        )));
    }
    Ok(())
}

/// Top-level `(json node, kind)` pairs of a whole-file JSON document.
fn json_sections<'a>(tree: &'a Value, psd: &ParameterSectionData) -> Result<Vec<(&'a str, &'a Value, SectionKind)>> {
    let map = tree.as_object().ok_or_else(|| XclBinError::Format(format!(
        "The file '{}' does not contain a JSON object", psd.file().display()
    )))?;
    let mut out = Vec::with_capacity(map.len());
    for (key, value) in map {
        if key == KEY_SCHEMA_VERSION {
            tracing::trace!(key = %key, "Skipping");
            continue;
        }
        let kind = SectionKind::from_json_node(key).ok_or_else(|| XclBinError::Format(format!(
            "Unknown JSON section '{key}' in file: {}", psd.file().display()
        )))?;
        out.push((key.as_str(), value, kind));
    }
    Ok(out)
}

impl XclBin {
    /// Add one section (or sub-section) from a file.  A payload that comes out
    /// empty is dropped without error, except raw DEBUG_DATA.
    pub fn add_section(&mut self, psd: &ParameterSectionData) -> Result<()> {
        if !psd.sub_section_name().is_empty() {
            return self.add_sub_section(psd);
        }

        let kind = SectionKind::parse(psd.section_name())?;
        let index = psd.section_index_name();
        check_index_usage(kind, index)?;
        let mut input = open_input(psd.file())?;

        if self.sections.find(kind, index).is_some() {
            return Err(XclBinError::DuplicateSection(psd.section_name_with_index()));
        }

        let mut section = Section::create(kind, index)?;
        if !section.supports_add_format(psd.format()) {
            return Err(XclBinError::Unsupported(format!(
                "The {kind} section does not support reading the {} file type", psd.format()
            )));
        }
        section.read_payload(&mut input, psd.format())?;
        section.set_name(&file_stem(psd.file()));

        let allow_zero_size = kind == SectionKind::DebugData && psd.format() == FormatType::Raw;
        if !allow_zero_size && section.size() == 0 {
            tracing::info!(
                "Section: '{kind}'({}) was empty. No action taken. Format: {}, File: '{}'",
                kind.as_u32(), psd.format(), psd.file().display()
            );
            return Ok(());
        }

        let size = section.size();
        let id = self.add_section_object(section);
        self.update_header_from_section(id)?;
        tracing::info!(
            "Section: '{kind}'({}) was successfully added. Size: {size} bytes, Format: {}, File: '{}'",
            kind.as_u32(), psd.format(), psd.file().display()
        );
        Ok(())
    }

    /// Reload an existing section from a file.
    pub fn replace_section(&mut self, psd: &ParameterSectionData) -> Result<()> {
        let kind = SectionKind::parse(psd.section_name())?;
        let id = self.sections.find_id(kind, psd.section_index_name()).ok_or_else(|| {
            XclBinError::MissingSection(format!(
                "Section '{}' does not exist", psd.section_name_with_index()
            ))
        })?;
        let mut input = open_input(psd.file())?;

        let section = self.section_mut(id)?;
        if !section.supports_add_format(psd.format()) {
            return Err(XclBinError::Unsupported(format!(
                "The {kind} section does not support reading the {} file type", psd.format()
            )));
        }
        section.purge_buffers();
        section.read_payload(&mut input, psd.format())?;
        section.set_name(&file_stem(psd.file()));
        let size = section.size();

        self.update_header_from_section(id)?;
        tracing::info!(
            "Section: '{kind}'({}) was successfully replaced. Size: {size} bytes, Format: {}, File: '{}'",
            kind.as_u32(), psd.format(), psd.file().display()
        );
        Ok(())
    }

    /// Replace the section if present, otherwise add it.
    pub fn add_replace_section(&mut self, psd: &ParameterSectionData) -> Result<()> {
        let kind = SectionKind::parse(psd.section_name())?;
        if self.sections.find(kind, psd.section_index_name()).is_some() {
            self.remove_section(&psd.section_name_with_index())?;
        }
        self.add_section(psd)
    }

    /// Merge a JSON file into an existing section, or add it if absent.
    pub fn add_merge_section(&mut self, psd: &ParameterSectionData) -> Result<()> {
        let kind = SectionKind::parse(psd.section_name())?;
        if psd.format() != FormatType::Json {
            return Err(XclBinError::Unsupported(
                "Adding or merging of sections are only supported with the JSON format".into(),
            ));
        }

        let Some(id) = self.sections.find_id(kind, psd.section_index_name()) else {
            return self.add_section(psd);
        };

        let tree = read_json_file(psd.file())?;
        let node = kind.json_node().ok_or_else(|| XclBinError::Unsupported(format!(
            "Section '{kind}' has no JSON representation to merge into"
        )))?;
        let merge = tree.get(node).filter(|v| !json_is_empty(v)).ok_or_else(|| {
            XclBinError::Format(format!(
                "Nothing to add for the section '{kind}'. Either the JSON node name '{node}' \
                 is missing or the contents of this node is empty."
            ))
        })?;

        self.merge_into(id, merge)?;
        tracing::info!(
            "Section: '{kind}'({}) merged successfully with File: '{}'",
            kind.as_u32(), psd.file().display()
        );
        Ok(())
    }

    /// Merge every top-level node of a JSON file into its section.  Only
    /// PARTITION_METADATA and IP_LAYOUT are created when missing.
    pub fn append_sections(&mut self, psd: &ParameterSectionData) -> Result<()> {
        require_wildcard_json(psd, "append")?;
        let tree = read_json_file(psd.file())?;

        for (key, value, kind) in json_sections(&tree, psd)? {
            tracing::trace!(key, "Processing");
            let id = match self.sections.find_id(kind, "") {
                Some(id) => id,
                None if matches!(kind, SectionKind::PartitionMetadata | SectionKind::IpLayout) => {
                    self.add_section_object(Section::create(kind, "")?)
                }
                None => {
                    return Err(XclBinError::MissingSection(format!(
                        "Section '{kind}' doesn't exist for JSON key '{key}'. \
                         Must have an existing section in order to append."
                    )))
                }
            };
            self.merge_into(id, value)?;
            tracing::info!(
                "Section: '{kind}'({}) was successfully appended to. Format: {}, File: '{}'",
                kind.as_u32(), psd.format(), psd.file().display()
            );
        }
        Ok(())
    }

    /// Add one new section per top-level node of a JSON file.
    pub fn add_sections(&mut self, psd: &ParameterSectionData) -> Result<()> {
        require_wildcard_json(psd, "add")?;
        let tree = read_json_file(psd.file())?;

        for (key, _, kind) in json_sections(&tree, psd)? {
            tracing::trace!(key, "Processing");
            if self.sections.find(kind, "").is_some() {
                return Err(XclBinError::DuplicateSection(kind.name().to_owned()));
            }

            let mut section = Section::create(kind, "")?;
            section.read_json_section_image(&tree).map_err(|e| {
                tracing::error!(section = %kind, "Unable to add the JSON image to the section");
                e
            })?;

            if section.size() == 0 {
                tracing::info!(
                    "Section: '{kind}'({}) was empty. No action taken. Format: {}, Node: '{key}'",
                    kind.as_u32(), psd.format()
                );
                continue;
            }
            let id = self.add_section_object(section);
            self.update_header_from_section(id)?;
            tracing::info!(
                "Section: '{kind}'({}) was successfully added. Format: {}, Node: '{key}'",
                kind.as_u32(), psd.format()
            );
        }
        Ok(())
    }

    /// Current payload + `merge`, reloaded into the section.
    fn merge_into(&mut self, id: SectionId, merge: &Value) -> Result<()> {
        let section = self.section_mut(id)?;
        let mut payload = Map::new();
        section.get_payload(&mut payload)?;
        section.append_to_section_metadata(merge, &mut payload).map_err(|e| {
            tracing::error!(
                section = %section.kind(),
                json = %merge,
                "An error occurred while merging the JSON image into the section"
            );
            e
        })?;
        section.purge_buffers();
        section.read_json_section_image(&Value::Object(payload))
    }

    // ── Sub-sections ─────────────────────────────────────────────────────────

    /// Add one named sub-section, creating the parent section if needed.
    pub fn add_sub_section(&mut self, psd: &ParameterSectionData) -> Result<()> {
        let sub = psd.sub_section_name();
        if sub.is_empty() {
            return Err(XclBinError::Format(format!("No subsection specified: '{}'", psd.original())));
        }
        let kind = SectionKind::parse(psd.section_name())?;
        if !kind.supports_sub_sections() {
            return Err(XclBinError::Unsupported(format!(
                "Section '{}' does not support subsections", psd.section_name()
            )));
        }
        let index = psd.section_index_name();
        let unsupported = || XclBinError::Unsupported(format!(
            "Section '{kind}' does not support the subsection: '{sub}'"
        ));

        let size = match self.sections.find_id(kind, index) {
            Some(id) => {
                let section = self.section_mut(id)?;
                if !section.supports_sub_section(sub) {
                    return Err(unsupported());
                }
                if section.sub_section_exists(sub) {
                    return Err(XclBinError::DuplicateSection(format!("{}-{sub}", section.display_name())));
                }
                let mut input = open_input(psd.file())?;
                section.read_sub_payload(sub, &mut input, psd.format())?;
                section.size()
            }
            None => {
                check_index_usage(kind, index)?;
                let mut section = Section::create(kind, index)?;
                if !section.supports_sub_section(sub) {
                    return Err(unsupported());
                }
                section.set_name(&file_stem(psd.file()));
                let mut input = open_input(psd.file())?;
                section.read_sub_payload(sub, &mut input, psd.format())?;
                let size = section.size();
                self.add_section_object(section);
                size
            }
        };

        tracing::info!(
            "Section: '{}-{sub}'({}) was successfully added. Size: {size} bytes, Format: {}, File: '{}'",
            psd.section_name_with_index(), kind.as_u32(), psd.format(), psd.file().display()
        );
        Ok(())
    }

    pub fn dump_sub_section(&self, psd: &ParameterSectionData) -> Result<()> {
        let sub = psd.sub_section_name();
        if sub.is_empty() {
            return Err(XclBinError::Format(format!("No subsection specified: '{}'", psd.original())));
        }
        let kind = SectionKind::parse(psd.section_name())?;
        if !kind.supports_sub_sections() {
            return Err(XclBinError::Unsupported(format!(
                "Section '{}' does not support subsections", psd.section_name()
            )));
        }
        let section = self.sections.find(kind, psd.section_index_name()).ok_or_else(|| {
            XclBinError::MissingSection(format!(
                "Section '{}' does not exist", psd.section_name_with_index()
            ))
        })?;
        if !section.supports_sub_section(sub) {
            return Err(XclBinError::Unsupported(format!(
                "Section '{kind}' does not support the subsection: '{sub}'"
            )));
        }
        if !section.sub_section_exists(sub) {
            return Err(XclBinError::MissingSection(format!(
                "Section '{kind}' subsection '{sub}' doesn't exist"
            )));
        }

        let mut out = create_output(psd.file())?;
        section.dump_sub_section(sub, &mut out, psd.format())?;
        out.flush()?;
        tracing::info!(
            "Section: '{}-{sub}'({}) was successfully written. Format: {}, File: '{}'",
            psd.section_name_with_index(), kind.as_u32(), psd.format(), psd.file().display()
        );
        Ok(())
    }

    // ── Dump / remove ────────────────────────────────────────────────────────

    pub fn dump_section(&self, psd: &ParameterSectionData) -> Result<()> {
        if !psd.sub_section_name().is_empty() {
            return self.dump_sub_section(psd);
        }

        let kind = SectionKind::parse(psd.section_name())?;
        let section = self.sections.find(kind, psd.section_index_name()).ok_or_else(|| {
            XclBinError::MissingSection(format!(
                "Section '{}' does not exist", psd.section_name_with_index()
            ))
        })?;

        match psd.format() {
            FormatType::Unknown => {
                return Err(XclBinError::Format(format!(
                    "Unknown format type '{}' in the dump section option: '{}'",
                    psd.format_name(), psd.original()
                )))
            }
            FormatType::Undefined => {
                return Err(XclBinError::Format(format!(
                    "The format type is missing from the dump section option: '{}'. \
                     Expected: <SECTION>:<FORMAT>:<OUTPUT_FILE>",
                    psd.original()
                )))
            }
            format if !section.supports_dump_format(format) => {
                return Err(XclBinError::Unsupported(format!(
                    "The {kind} section does not support writing to a {format} file type"
                )))
            }
            _ => {}
        }

        let mut out = create_output(psd.file())?;
        section.dump_contents(&mut out, psd.format())?;
        out.flush()?;
        tracing::info!(
            "Section: '{kind}'({}) was successfully written. Format: {}, File: '{}'",
            kind.as_u32(), psd.format(), psd.file().display()
        );
        Ok(())
    }

    /// Write the JSON images of every section into one document.  Formats
    /// other than JSON have nothing to combine and write nothing.
    pub fn dump_sections(&self, psd: &ParameterSectionData) -> Result<()> {
        if !psd.section_name().is_empty() {
            return Err(XclBinError::Format(format!(
                "Section given for a wildcard JSON section to dump is not empty: '{}'", psd.original()
            )));
        }
        if psd.format() != FormatType::Json {
            tracing::warn!(format = %psd.format(), "Only JSON images can be dumped for all sections; nothing written");
            return Ok(());
        }

        let mut tree = Map::new();
        for section in self.sections.iter() {
            tracing::trace!(section = %section.display_name(), "Examining");
            section.get_payload(&mut tree)?;
        }

        let mut out = create_output(psd.file())?;
        serde_json::to_writer_pretty(&mut out, &Value::Object(tree)).map_err(std::io::Error::from)?;
        out.write_all(b"\n")?;
        out.flush()?;
        tracing::info!(
            "Successfully wrote all of sections which support the format '{}' to the file: '{}'",
            psd.format(), psd.file().display()
        );
        Ok(())
    }

    /// Remove by `NAME` or `NAME[INDEX]`.
    pub fn remove_section(&mut self, name: &str) -> Result<()> {
        tracing::trace!(section = name, "Removing section");
        let removed = self.sections.remove_by_name(name)?;
        self.sync_section_count();
        tracing::info!(
            "Section '{}'({}) was successfully removed",
            removed.display_name(), removed.kind().as_u32()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn psd(text: &str) -> ParameterSectionData {
        ParameterSectionData::parse(text).unwrap()
    }

    fn write_json(dir: &TempDir, name: &str, v: &Value) -> String {
        let path = dir.path().join(name);
        fs::write(&path, serde_json::to_vec_pretty(v).unwrap()).unwrap();
        path.display().to_string()
    }

    #[test]
    fn add_uses_file_stem_and_rejects_duplicates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("my_bitstream.bit");
        fs::write(&path, b"bits").unwrap();

        let mut xb = XclBin::new();
        let arg = psd(&format!("BITSTREAM:RAW:{}", path.display()));
        xb.add_section(&arg).unwrap();
        let s = xb.find_section(SectionKind::Bitstream, "").unwrap();
        assert_eq!(s.name(), "my_bitstream");
        assert_eq!(s.image(), b"bits");
        assert!(matches!(xb.add_section(&arg), Err(XclBinError::DuplicateSection(_))));
    }

    #[test]
    fn long_index_names_stay_unique() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("v.bin");
        fs::write(&path, b"vendor").unwrap();

        let mut xb = XclBin::new();
        let arg = psd(&format!("VENDER_METADATA[abcdefghijklmnopqrst]:RAW:{}", path.display()));
        xb.add_section(&arg).unwrap();
        assert!(matches!(xb.add_section(&arg), Err(XclBinError::DuplicateSection(_))));
        assert_eq!(xb.sections().len(), 1);

        xb.replace_section(&arg).unwrap();
        xb.remove_section("VENDER_METADATA[abcdefghijklmnopqrst]").unwrap();
        assert!(xb.sections().is_empty());
    }

    #[test]
    fn empty_payloads_are_dropped_except_debug_data() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.bin");
        fs::write(&path, b"").unwrap();

        let mut xb = XclBin::new();
        xb.add_section(&psd(&format!("FIRMWARE:RAW:{}", path.display()))).unwrap();
        assert!(xb.sections().is_empty());
        xb.add_section(&psd(&format!("DEBUG_DATA:RAW:{}", path.display()))).unwrap();
        assert_eq!(xb.sections().len(), 1);
        assert_eq!(xb.header().header.num_sections, 1);
    }

    #[test]
    fn wrong_add_format_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_json(&dir, "bm.json", &json!({}));
        let mut xb = XclBin::new();
        assert!(matches!(
            xb.add_section(&psd(&format!("BUILD_METADATA:RAW:{path}"))),
            Err(XclBinError::Unsupported(_))
        ));
    }

    #[test]
    fn replace_requires_existing_section() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.bin");
        fs::write(&path, b"a").unwrap();
        let mut xb = XclBin::new();
        let err = xb.replace_section(&psd(&format!("PDI:RAW:{}", path.display()))).unwrap_err();
        assert!(err.is_missing_section());

        xb.add_replace_section(&psd(&format!("PDI:RAW:{}", path.display()))).unwrap();
        fs::write(&path, b"bb").unwrap();
        xb.replace_section(&psd(&format!("PDI:RAW:{}", path.display()))).unwrap();
        assert_eq!(xb.find_section(SectionKind::Pdi, "").unwrap().image(), b"bb");
    }

    #[test]
    fn merge_requires_non_empty_node() {
        let dir = TempDir::new().unwrap();
        let first = write_json(&dir, "ip.json", &json!({ "ip_layout": { "m_count": "1" } }));
        let empty = write_json(&dir, "empty.json", &json!({ "ip_layout": {} }));
        let more  = write_json(&dir, "more.json", &json!({ "ip_layout": { "m_extra": "x" } }));

        let mut xb = XclBin::new();
        xb.add_merge_section(&psd(&format!("IP_LAYOUT:JSON:{first}"))).unwrap();
        assert!(matches!(
            xb.add_merge_section(&psd(&format!("IP_LAYOUT:JSON:{empty}"))),
            Err(XclBinError::Format(_))
        ));
        xb.add_merge_section(&psd(&format!("IP_LAYOUT:JSON:{more}"))).unwrap();

        let mut tree = Map::new();
        xb.find_section(SectionKind::IpLayout, "").unwrap().get_payload(&mut tree).unwrap();
        assert_eq!(tree["ip_layout"], json!({ "m_count": "1", "m_extra": "x" }));
        assert!(xb.add_merge_section(&psd(&format!("IP_LAYOUT:RAW:{first}"))).is_err());
    }

    #[test]
    fn append_creates_only_two_kinds() {
        let dir = TempDir::new().unwrap();
        let ok = write_json(&dir, "ok.json", &json!({
            "schema_version": { "major": "1" },
            "partition_metadata": { "a": "1" },
            "ip_layout": { "b": "2" }
        }));
        let missing = write_json(&dir, "missing.json", &json!({ "mem_topology": { "c": "3" } }));
        let unknown = write_json(&dir, "unknown.json", &json!({ "not_a_node": {} }));

        let mut xb = XclBin::new();
        xb.append_sections(&psd(&format!(":JSON:{ok}"))).unwrap();
        assert_eq!(xb.sections().len(), 2);
        assert!(xb.append_sections(&psd(&format!(":JSON:{missing}"))).unwrap_err().is_missing_section());
        assert!(matches!(xb.append_sections(&psd(&format!(":JSON:{unknown}"))), Err(XclBinError::Format(_))));
        assert!(xb.append_sections(&psd(&format!("IP_LAYOUT:JSON:{ok}"))).is_err());
    }

    #[test]
    fn add_many_from_one_file() {
        let dir = TempDir::new().unwrap();
        let all = write_json(&dir, "all.json", &json!({
            "schema_version": { "major": "1" },
            "mem_topology": { "m_count": "0" },
            "connectivity": {}
        }));
        let mut xb = XclBin::new();
        xb.add_sections(&psd(&format!(":JSON:{all}"))).unwrap();
        assert!(xb.find_section(SectionKind::MemTopology, "").is_some());
        // An empty object still serializes to "{}", so it is kept.
        assert!(xb.find_section(SectionKind::Connectivity, "").is_some());
        assert!(matches!(
            xb.add_sections(&psd(&format!(":JSON:{all}"))),
            Err(XclBinError::DuplicateSection(_))
        ));
        assert!(xb.add_sections(&psd(&format!(":RAW:{all}"))).is_err());
    }

    #[test]
    fn dump_section_checks_format() {
        let dir = TempDir::new().unwrap();
        let src = write_json(&dir, "bm.json", &json!({ "build_metadata": { "dsa": {} } }));
        let out = dir.path().join("out.json").display().to_string();

        let mut xb = XclBin::new();
        xb.add_section(&psd(&format!("BUILD_METADATA:JSON:{src}"))).unwrap();
        assert!(matches!(xb.dump_section(&psd(&format!("BUILD_METADATA:xml:{out}"))), Err(XclBinError::Format(_))));
        assert!(matches!(xb.dump_section(&psd(&format!("BUILD_METADATA::{out}"))), Err(XclBinError::Format(_))));
        assert!(matches!(xb.dump_section(&psd(&format!("BUILD_METADATA:HTML:{out}"))), Err(XclBinError::Unsupported(_))));
        assert!(xb.dump_section(&psd(&format!("MEM_TOPOLOGY:JSON:{out}"))).unwrap_err().is_missing_section());

        xb.dump_section(&psd(&format!("BUILD_METADATA:JSON:{out}"))).unwrap();
        let back: Value = serde_json::from_slice(&fs::read(&out).unwrap()).unwrap();
        assert_eq!(back, json!({ "build_metadata": { "dsa": {} } }));
    }

    #[test]
    fn dump_all_sections_as_json() {
        let dir = TempDir::new().unwrap();
        let all = write_json(&dir, "all.json", &json!({
            "mem_topology": { "m_count": "0" },
            "ip_layout": { "m_count": "1" }
        }));
        let out = dir.path().join("dump.json");
        let mut xb = XclBin::new();
        xb.add_sections(&psd(&format!(":JSON:{all}"))).unwrap();
        xb.dump_sections(&psd(&format!(":JSON:{}", out.display()))).unwrap();
        let back: Value = serde_json::from_slice(&fs::read(&out).unwrap()).unwrap();
        assert_eq!(back["ip_layout"]["m_count"], "1");

        let raw_out = dir.path().join("none.bin");
        xb.dump_sections(&psd(&format!(":RAW:{}", raw_out.display()))).unwrap();
        assert!(!raw_out.exists());
    }

    #[test]
    fn sub_sections_need_a_supporting_kind() {
        let dir = TempDir::new().unwrap();
        let lib = dir.path().join("lib.so");
        fs::write(&lib, b"\x7fELF").unwrap();
        let lib = lib.display().to_string();

        let mut xb = XclBin::new();
        assert!(matches!(
            xb.add_section(&psd(&format!("BITSTREAM-OBJ:RAW:{lib}"))),
            Err(XclBinError::Unsupported(_))
        ));
        assert!(matches!(
            xb.add_section(&psd(&format!("SOFT_KERNEL[k]-DATA:RAW:{lib}"))),
            Err(XclBinError::Unsupported(_))
        ));
        xb.add_section(&psd(&format!("SOFT_KERNEL[k]-OBJ:RAW:{lib}"))).unwrap();
        assert!(matches!(
            xb.add_section(&psd(&format!("SOFT_KERNEL[k]-OBJ:RAW:{lib}"))),
            Err(XclBinError::DuplicateSection(_))
        ));

        let out = dir.path().join("obj.out");
        xb.dump_section(&psd(&format!("SOFT_KERNEL[k]-OBJ:RAW:{}", out.display()))).unwrap();
        assert_eq!(fs::read(&out).unwrap(), b"\x7fELF");
        assert!(xb
            .dump_section(&psd(&format!("SOFT_KERNEL[k]-METADATA:JSON:{}", out.display())))
            .unwrap_err()
            .is_missing_section());
    }

    #[test]
    fn remove_updates_count() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fw.bin");
        fs::write(&path, b"fw").unwrap();
        let mut xb = XclBin::new();
        xb.add_section(&psd(&format!("FIRMWARE:RAW:{}", path.display()))).unwrap();
        xb.remove_section("FIRMWARE").unwrap();
        assert_eq!(xb.header().header.num_sections, 0);
        assert!(xb.remove_section("FIRMWARE").unwrap_err().is_missing_section());
        assert!(matches!(xb.remove_section("FIRMWARE[x]"), Err(XclBinError::UnsupportedIndexUsage(_))));
    }
}
