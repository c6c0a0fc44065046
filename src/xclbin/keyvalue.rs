//! `SYS:` header fields and `USER:` key-value metadata.

use serde_json::{json, Map, Value};

use super::XclBin;
use crate::error::{Result, XclBinError};
use crate::header::{XclBinMode, AM_LOAD_AIE};
use crate::registry::SectionId;
use crate::section::{Section, SectionKind};
use crate::util::{copy_fixed_str, hex_to_buffer, split_three, string_to_u64};

/// `(domain, key, value)`; the domain is upper-cased.
fn key_value_components(text: &str) -> Result<(String, &str, &str)> {
    let (domain, key, value) = split_three(text).ok_or_else(|| {
        XclBinError::Format(format!(
            "Expected format [USER | SYS]:<key>:<value> when adding a key value pair. Received: {text}"
        ))
    })?;
    Ok((domain.to_uppercase(), key, value))
}

impl XclBin {
    /// Apply one `DOMAIN:KEY:VALUE` token.
    pub fn set_key_value(&mut self, text: &str) -> Result<()> {
        let (domain, key, value) = key_value_components(text)?;
        tracing::trace!(domain = %domain, key, value, "Setting key-value pair");

        match domain.as_str() {
            "SYS" => self.set_system_key(text, key, value),
            "USER" => self.set_user_key(key, value),
            _ => Err(XclBinError::Format(format!(
                "Unknown key domain '{domain}' for key-value pair '{text}'. Expected either 'USER' or 'SYS'."
            ))),
        }
    }

    fn set_system_key(&mut self, text: &str, key: &str, value: &str) -> Result<()> {
        let h = &mut self.header.header;
        match key {
            "mode" => {
                let mode = XclBinMode::from_key_name(value).ok_or_else(|| {
                    XclBinError::Format(format!(
                        "Unknown value '{value}' for key '{key}'. Key-value pair: '{text}'."
                    ))
                })?;
                h.mode = mode as u16;
            }
            "action_mask" => {
                let mut mask = 0;
                for bit in value.split('|') {
                    match bit {
                        "LOAD_AIE" => mask |= AM_LOAD_AIE,
                        _ => {
                            return Err(XclBinError::Format(format!(
                                "Unknown bit mask '{bit}' for the key '{key}'. Key-value pair: '{text}'."
                            )))
                        }
                    }
                }
                h.action_mask = mask;
            }
            "FeatureRomTimestamp" => h.feature_rom_time_stamp = string_to_u64(value, false)?,
            "FeatureRomUUID" => hex_to_buffer(value, &mut h.rom_uuid)?,
            "PlatformVBNV" => copy_fixed_str(&mut h.platform_vbnv, value),
            "XclbinUUID" => {
                tracing::warn!(
                    "Changing the 'XclbinUUID' property to a non-unique value can result in \
                     non-deterministic negative runtime behavior"
                );
                hex_to_buffer(value, &mut h.uuid)?;
            }
            _ => {
                return Err(XclBinError::Format(format!(
                    "Unknown key '{key}' for key-value pair '{text}'."
                )))
            }
        }
        Ok(())
    }

    fn set_user_key(&mut self, key: &str, value: &str) -> Result<()> {
        let id = match self.sections.find_id(SectionKind::KeyValueMetadata, "") {
            Some(id) => id,
            None => self.add_section_object(Section::create(SectionKind::KeyValueMetadata, "")?),
        };

        let mut pairs = self.user_key_values(id)?;
        match pairs.iter_mut().find(|kv| kv.get("key").and_then(Value::as_str) == Some(key)) {
            Some(kv) => {
                tracing::info!("Updating key '{key}' to '{value}'");
                kv.insert("value".into(), Value::String(value.to_owned()));
            }
            None => {
                tracing::info!("Creating new key '{key}' with the value '{value}'");
                let mut kv = Map::new();
                kv.insert("key".into(), Value::String(key.to_owned()));
                kv.insert("value".into(), Value::String(value.to_owned()));
                pairs.push(kv);
            }
        }
        self.store_user_key_values(id, pairs)
    }

    /// Remove a `USER` key.
    pub fn remove_key(&mut self, key: &str) -> Result<()> {
        tracing::trace!(key, "Removing user key");
        let id = self
            .sections
            .find_id(SectionKind::KeyValueMetadata, "")
            .ok_or_else(|| XclBinError::MissingKey(key.to_owned()))?;

        let mut pairs = self.user_key_values(id)?;
        let pos = pairs
            .iter()
            .position(|kv| kv.get("key").and_then(Value::as_str) == Some(key))
            .ok_or_else(|| XclBinError::MissingKey(key.to_owned()))?;
        pairs.remove(pos);
        tracing::info!("Removing key '{key}'");
        self.store_user_key_values(id, pairs)
    }

    /// Current `keyvalue_metadata.key_values` entries.
    fn user_key_values(&self, id: SectionId) -> Result<Vec<Map<String, Value>>> {
        let Some(section) = self.sections.get(id) else { return Ok(Vec::new()) };
        let mut tree = Map::new();
        section.get_payload(&mut tree)?;
        let list = tree
            .get("keyvalue_metadata")
            .and_then(|n| n.get("key_values"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(list
            .into_iter()
            .filter_map(|v| match v {
                Value::Object(kv) => Some(kv),
                _ => None,
            })
            .collect())
    }

    fn store_user_key_values(&mut self, id: SectionId, pairs: Vec<Map<String, Value>>) -> Result<()> {
        let list: Vec<Value> = pairs.into_iter().map(Value::Object).collect();
        let tree = json!({ "keyvalue_metadata": { "key_values": list } });
        self.section_mut(id)?.read_json_section_image(&tree)
    }

    /// Value of a `USER` key, if set.
    pub fn user_key_value(&self, key: &str) -> Option<String> {
        let id = self.sections.find_id(SectionKind::KeyValueMetadata, "")?;
        self.user_key_values(id)
            .ok()?
            .into_iter()
            .find(|kv| kv.get("key").and_then(Value::as_str) == Some(key))
            .and_then(|kv| kv.get("value").and_then(Value::as_str).map(str::to_owned))
    }
}
