//! Small conversions shared by the header codec, the mirror and the
//! key-value editor.

use serde_json::Value;

use crate::error::{Result, XclBinError};

/// Every section payload starts on this boundary.
pub const SECTION_ALIGNMENT: u64 = 8;

/// Bytes of padding needed to move `offset` up to the next 8-byte boundary.
#[inline]
pub fn bytes_to_align(offset: u64) -> u64 {
    (SECTION_ALIGNMENT - offset % SECTION_ALIGNMENT) % SECTION_ALIGNMENT
}

/// Parse a decimal or `0x`-prefixed hexadecimal number.
///
/// With `force_hex` the text is always read as hexadecimal, prefix or not.
pub fn string_to_u64(text: &str, force_hex: bool) -> Result<u64> {
    let text = text.trim();
    let (digits, radix) = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(rest) => (rest, 16),
        None if force_hex => (text, 16),
        None => (text, 10),
    };
    if digits.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(digits, radix)
        .map_err(|e| XclBinError::Format(format!("Invalid numeric value '{text}': {e}")))
}

/// Decode a hex string into a fixed-width buffer.
///
/// Dashes are ignored so UUIDs can be given in their hyphenated form.  A
/// shorter string fills the leading bytes and zeroes the rest.
pub fn hex_to_buffer(text: &str, out: &mut [u8]) -> Result<()> {
    let cleaned: String = text.chars().filter(|c| *c != '-').collect();
    if cleaned.len() > out.len() * 2 {
        return Err(XclBinError::Format(format!(
            "Hex string '{text}' is longer than the {} byte destination", out.len()
        )));
    }
    let bytes = hex::decode(&cleaned)
        .map_err(|e| XclBinError::Format(format!("Invalid hex string '{text}': {e}")))?;
    out.fill(0);
    out[..bytes.len()].copy_from_slice(&bytes);
    Ok(())
}

/// Copy `text` into a fixed, NUL-terminated field, truncating as needed.
pub fn copy_fixed_str(out: &mut [u8], text: &str) {
    out.fill(0);
    let bytes = truncate_str(text, out.len().saturating_sub(1)).as_bytes();
    out[..bytes.len()].copy_from_slice(bytes);
}

/// Read a NUL-terminated string out of a fixed field.
pub fn fixed_str(field: &[u8]) -> String {
    let end = field.iter().position(|b| *b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// Longest prefix of `text` that fits in `max` bytes on a char boundary.
pub fn truncate_str(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Split `text` on the first two colons only; the third token keeps any
/// further colons (file paths such as `C:\lib.so`).
pub fn split_three(text: &str) -> Option<(&str, &str, &str)> {
    let mut parts = text.splitn(3, ':');
    Some((parts.next()?, parts.next()?, parts.next()?))
}

/// Read a JSON leaf that may have been written either as a string or as a
/// bare number or bool.
pub fn json_leaf(node: &Value, key: &str) -> Option<String> {
    match node.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b)   => Some(b.to_string()),
        _                => None,
    }
}

/// True for `null`, `{}`, `[]` and `""`.
pub fn json_is_empty(node: &Value) -> bool {
    match node {
        Value::Null      => true,
        Value::Object(m) => m.is_empty(),
        Value::Array(a)  => a.is_empty(),
        Value::String(s) => s.is_empty(),
        _                => false,
    }
}
