//! Ordered, exclusively owned collection of sections.
//!
//! Sections are handed out by [`SectionId`], a handle that stays valid until
//! the section is removed.  The table order on disk is insertion order.

use crate::error::{Result, XclBinError};
use crate::section::{Section, SectionKind, MAX_SECTION_NAME_LEN};
use crate::util::truncate_str;

/// Identity of one section inside a [`SectionRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SectionId(u64);

#[derive(Debug, Default)]
pub struct SectionRegistry {
    sections: Vec<(SectionId, Section)>,
    next_id:  u64,
}

impl SectionRegistry {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.sections.len() }

    pub fn is_empty(&self) -> bool { self.sections.is_empty() }

    /// Append a section; callers check uniqueness first.
    pub fn add(&mut self, section: Section) -> SectionId {
        let id = SectionId(self.next_id);
        self.next_id += 1;
        tracing::trace!(section = %section.display_name(), "Registering section");
        self.sections.push((id, section));
        id
    }

    /// First section matching `(kind, index_name)`.  The index is compared
    /// as stored, i.e. cut to the table's name width.
    pub fn find(&self, kind: SectionKind, index_name: &str) -> Option<&Section> {
        self.find_id(kind, index_name).and_then(|id| self.get(id))
    }

    pub fn find_id(&self, kind: SectionKind, index_name: &str) -> Option<SectionId> {
        let index_name = truncate_str(index_name, MAX_SECTION_NAME_LEN);
        self.sections
            .iter()
            .find(|(_, s)| s.kind() == kind && s.index_name() == index_name)
            .map(|(id, _)| *id)
    }

    pub fn get(&self, id: SectionId) -> Option<&Section> {
        self.sections.iter().find(|(i, _)| *i == id).map(|(_, s)| s)
    }

    pub fn get_mut(&mut self, id: SectionId) -> Option<&mut Section> {
        self.sections.iter_mut().find(|(i, _)| *i == id).map(|(_, s)| s)
    }

    /// Take a section out of the registry.
    pub fn remove(&mut self, id: SectionId) -> Result<Section> {
        let pos = self.sections.iter().position(|(i, _)| *i == id).ok_or_else(|| {
            XclBinError::MissingSection("Section to remove is not part of this container".into())
        })?;
        let (_, section) = self.sections.remove(pos);
        Ok(section)
    }

    /// Remove by `NAME` or `NAME[INDEX]`.
    pub fn remove_by_name(&mut self, text: &str) -> Result<Section> {
        let (name, index) = split_section_index(text)?;
        let kind = SectionKind::parse(name)?;

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

        let id = self.find_id(kind, index).ok_or_else(|| {
            XclBinError::MissingSection(format!("Section '{text}' does not exist"))
        })?;
        self.remove(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Section> {
        self.sections.iter().map(|(_, s)| s)
    }
}

/// Split `NAME[INDEX]` into `("NAME", "INDEX")`; a bare `NAME` gives an
/// empty index.
pub fn split_section_index(text: &str) -> Result<(&str, &str)> {
    let Some(open) = text.find('[') else {
        if text.contains(']') {
            return Err(XclBinError::Format(format!("Unexpected ']' in section name '{text}'")));
        }
        return Ok((text, ""));
    };
    let rest = &text[open + 1..];
    let Some(index) = rest.strip_suffix(']') else {
        return Err(XclBinError::Format(format!(
            "Section name '{text}' is missing the closing ']'"
        )));
    };
    if index.contains('[') || index.contains(']') {
        return Err(XclBinError::Format(format!("Malformed section index in '{text}'")));
    }
    if index.is_empty() {
        return Err(XclBinError::Format(format!("Empty section index in '{text}'")));
    }
    Ok((&text[..open], index))
}
