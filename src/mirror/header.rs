//! Header <-> mirror JSON.
//!
//! Numbers are written as strings.  The unique id is always hexadecimal;
//! the UUIDs and the key block are plain hex byte strings.

use serde_json::{Map, Value};

use crate::error::{Result, XclBinError};
use crate::header::{parse_version, Axlf, RESERVED_SIZE, SIGNATURE_UNSIGNED};
use crate::util::{copy_fixed_str, hex_to_buffer, json_leaf, string_to_u64};

pub fn header_to_json(ax: &Axlf) -> Value {
    let h = &ax.header;
    let mut node = Map::new();
    let mut put = |key: &str, value: String| {
        node.insert(key.to_owned(), Value::String(value));
    };
    put("Magic",               ax.magic_str());
    put("SignatureLength",     ax.signature_length.to_string());
    put("KeyBlock",            hex::encode(ax.key_block));
    put("UniqueID",            format!("{:x}", ax.unique_id));
    put("TimeStamp",           h.time_stamp.to_string());
    put("FeatureRomTimeStamp", h.feature_rom_time_stamp.to_string());
    put("Version",             h.version_string());
    put("Mode",                h.mode.to_string());
    put("ActionMask",          h.action_mask.to_string());
    put("FeatureRomUUID",      hex::encode(h.rom_uuid));
    put("PlatformVBNV",        h.platform_vbnv_str());
    put("XclBinUUID",          hex::encode(h.uuid));
    put("DebugBin",            h.debug_bin_str());
    Value::Object(node)
}

/// Rebuild a header from its mirror.  Length and section count are not
/// mirrored and come back zeroed; the reserved bytes get their fixed 0xFF
/// fill.
pub fn header_from_json(node: &Value) -> Result<Axlf> {
    let required = |key: &str| {
        json_leaf(node, key).ok_or_else(|| {
            XclBinError::Format(format!("Mirror header is missing the '{key}' entry"))
        })
    };

    let mut ax = Axlf { reserved: [0xFF; RESERVED_SIZE], ..Axlf::default() };
    let magic = required("Magic")?;
    copy_fixed_str(&mut ax.magic, &magic);

    ax.signature_length = match json_leaf(node, "SignatureLength") {
        Some(text) => text.trim().parse().map_err(|_| {
            XclBinError::Format(format!("Invalid SignatureLength '{text}' in mirror header"))
        })?,
        None => SIGNATURE_UNSIGNED,
    };
    hex_to_buffer(&required("KeyBlock")?, &mut ax.key_block)?;
    ax.unique_id = string_to_u64(&required("UniqueID")?, true)?;

    let h = &mut ax.header;
    h.time_stamp             = string_to_u64(&required("TimeStamp")?, false)?;
    h.feature_rom_time_stamp = string_to_u64(&required("FeatureRomTimeStamp")?, false)?;
    (h.version_major, h.version_minor, h.version_patch) = parse_version(&required("Version")?)?;

    let narrow = |key: &str, value: u64| {
        u16::try_from(value).map_err(|_| {
            XclBinError::Format(format!("Mirror header '{key}' value {value} does not fit 16 bits"))
        })
    };
    h.mode = narrow("Mode", string_to_u64(&required("Mode")?, false)?)?;
    h.action_mask = match json_leaf(node, "ActionMask") {
        Some(text) => narrow("ActionMask", string_to_u64(&text, false)?)?,
        None => 0,
    };

    hex_to_buffer(&required("FeatureRomUUID")?, &mut h.rom_uuid)?;
    copy_fixed_str(&mut h.platform_vbnv, &required("PlatformVBNV")?);
    hex_to_buffer(&required("XclBinUUID")?, &mut h.uuid)?;
    copy_fixed_str(&mut h.debug_bin, &required("DebugBin")?);
    Ok(ax)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{XclBinMode, AM_LOAD_AIE};

    #[test]
    fn header_survives_the_mirror() {
        let mut ax = Axlf::new();
        ax.unique_id = 0xdead_beef_0042;
        ax.header.mode = XclBinMode::HwEmu as u16;
        ax.header.action_mask = AM_LOAD_AIE;
        ax.header.feature_rom_time_stamp = 100;
        ax.header.rom_uuid = [0xab; 16];
        ax.header.uuid = [0x11; 16];
        copy_fixed_str(&mut ax.header.platform_vbnv, "xilinx_u250");
        copy_fixed_str(&mut ax.header.debug_bin, "dbg");

        let back = header_from_json(&header_to_json(&ax)).unwrap();
        assert_eq!(back, ax);
    }

    #[test]
    fn older_mirrors_lack_action_mask() {
        let mut node = header_to_json(&Axlf::new());
        node.as_object_mut().unwrap().remove("ActionMask");
        node.as_object_mut().unwrap().remove("SignatureLength");
        let ax = header_from_json(&node).unwrap();
        assert_eq!(ax.header.action_mask, 0);
        assert_eq!(ax.signature_length, SIGNATURE_UNSIGNED);
    }

    #[test]
    fn missing_field_is_an_error() {
        let mut node = header_to_json(&Axlf::new());
        node.as_object_mut().unwrap().remove("Version");
        assert!(matches!(header_from_json(&node), Err(XclBinError::Format(_))));
    }
}
