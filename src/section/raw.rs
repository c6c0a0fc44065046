//! Opaque byte payloads (bitstreams, PDIs, firmware, debug data, ...).

use std::io::{Read, Write};

use super::{FormatType, SectionBody, SectionKind};
use crate::error::{Result, XclBinError};

#[derive(Debug)]
pub struct RawBody {
    kind:  SectionKind,
    bytes: Vec<u8>,
}

impl RawBody {
    pub fn new(kind: SectionKind) -> Self {
        Self { kind, bytes: Vec::new() }
    }
}

impl SectionBody for RawBody {
    fn kind(&self) -> SectionKind { self.kind }

    fn image(&self) -> &[u8] { &self.bytes }

    fn read_image(&mut self, bytes: Vec<u8>) -> Result<()> {
        self.bytes = bytes;
        Ok(())
    }

    fn supports_add_format(&self, format: FormatType) -> bool {
        format == FormatType::Raw
    }

    fn supports_dump_format(&self, format: FormatType) -> bool {
        format == FormatType::Raw
    }

    fn read_payload(&mut self, input: &mut dyn Read, format: FormatType) -> Result<()> {
        if format != FormatType::Raw {
            return Err(XclBinError::Unsupported(format!(
                "The {} section does not support reading the {format} file type", self.kind
            )));
        }
        self.bytes.clear();
        input.read_to_end(&mut self.bytes)?;
        Ok(())
    }

    fn dump_contents(&self, out: &mut dyn Write, format: FormatType) -> Result<()> {
        if format != FormatType::Raw {
            return Err(XclBinError::Unsupported(format!(
                "The {} section does not support writing to a {format} file type", self.kind
            )));
        }
        out.write_all(&self.bytes)?;
        Ok(())
    }

    fn purge_buffers(&mut self) {
        self.bytes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_in_raw_out() {
        let mut body = RawBody::new(SectionKind::Bitstream);
        body.read_payload(&mut &b"\x01\x02\x03"[..], FormatType::Raw).unwrap();
        assert_eq!(body.image(), &[1, 2, 3]);

        let mut out = Vec::new();
        body.dump_contents(&mut out, FormatType::Raw).unwrap();
        assert_eq!(out, vec![1, 2, 3]);

        assert!(body.dump_contents(&mut out, FormatType::Json).is_err());
        body.purge_buffers();
        assert!(body.image().is_empty());
    }

    #[test]
    fn no_json_image() {
        let mut body = RawBody::new(SectionKind::Pdi);
        assert!(matches!(
            body.read_json_section_image(&serde_json::json!({})),
            Err(XclBinError::Unsupported(_))
        ));
    }
}
