//! Generic type-length-value layouts.
//!
//! Covers the byte-aligned TLV families: 1 or 2 byte type, 1, 2 or 4 byte
//! length, either byte order, length counting the value only or the whole
//! record, and optional alignment padding after the value.

use serde::{Deserialize, Serialize};

use crate::cursor::{ByteCursor, Endian};
use crate::error::{Error, WalkError};
use crate::header::{HeaderDecoder, RecordHeader, TypeCode};
use crate::registry::HandlerRegistry;

use super::FormatAdapter;

/// Byte layout of one TLV family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlvLayout {
    /// Bytes in the type field (1 or 2)
    pub type_width: u8,
    /// Bytes in the length field (1, 2 or 4)
    pub length_width: u8,
    #[serde(default)]
    pub endian: Endian,
    /// Length field counts the type and length fields too
    #[serde(default)]
    pub length_includes_header: bool,
    /// Values are padded to a multiple of this many bytes (1 = no padding)
    #[serde(default = "default_alignment")]
    pub alignment: u8,
}

fn default_alignment() -> u8 {
    1
}

impl TlvLayout {
    /// 1-byte type, 1-byte value length
    pub const TYPE8_LEN8: TlvLayout = TlvLayout {
        type_width: 1,
        length_width: 1,
        endian: Endian::Big,
        length_includes_header: false,
        alignment: 1,
    };

    /// 2-byte type, 2-byte value length, big endian
    pub const TYPE16_LEN16: TlvLayout = TlvLayout {
        type_width: 2,
        length_width: 2,
        endian: Endian::Big,
        length_includes_header: false,
        alignment: 1,
    };

    /// STUN attribute: 2-byte type, 2-byte value length, values padded to 4
    pub const STUN_ATTRIBUTE: TlvLayout = TlvLayout {
        type_width: 2,
        length_width: 2,
        endian: Endian::Big,
        length_includes_header: false,
        alignment: 4,
    };

    /// Reject widths and alignments the decoder cannot handle
    pub fn validate(&self) -> Result<(), Error> {
        if !matches!(self.type_width, 1 | 2) {
            return Err(Error::Config(format!(
                "TLV type_width must be 1 or 2, got {}",
                self.type_width
            )));
        }
        if !matches!(self.length_width, 1 | 2 | 4) {
            return Err(Error::Config(format!(
                "TLV length_width must be 1, 2 or 4, got {}",
                self.length_width
            )));
        }
        if self.alignment == 0 {
            return Err(Error::Config("TLV alignment must be at least 1".into()));
        }
        Ok(())
    }

    pub fn header_size(&self) -> usize {
        self.type_width as usize + self.length_width as usize
    }

    fn read_width(&self, c: &mut ByteCursor<'_>, width: u8) -> Result<u32, WalkError> {
        Ok(match width {
            1 => c.read_u8()? as u32,
            2 => c.read_u16(self.endian)? as u32,
            _ => c.read_u32(self.endian)?,
        })
    }

    fn write_width(&self, out: &mut Vec<u8>, width: u8, value: u32) {
        let bytes = match self.endian {
            Endian::Big => value.to_be_bytes(),
            Endian::Little => value.to_le_bytes(),
        };
        let width = width as usize;
        match self.endian {
            Endian::Big => out.extend_from_slice(&bytes[4 - width..]),
            Endian::Little => out.extend_from_slice(&bytes[..width]),
        }
    }

    fn pad(&self, len: u64) -> u64 {
        let align = self.alignment.max(1) as u64;
        (align - len % align) % align
    }

    /// Encode one record, padding the value as the layout requires
    pub fn encode(&self, type_code: u32, value: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.header_size() + value.len() + 3);
        self.write_width(&mut out, self.type_width, type_code);
        let len = if self.length_includes_header {
            value.len() + self.header_size()
        } else {
            value.len()
        };
        self.write_width(&mut out, self.length_width, len as u32);
        out.extend_from_slice(value);
        out.resize(out.len() + self.pad(len as u64) as usize, 0);
        out
    }
}

impl HeaderDecoder for TlvLayout {
    fn name(&self) -> &'static str {
        "tlv"
    }

    fn min_header_size(&self) -> usize {
        self.header_size()
    }

    fn decode(&self, cursor: &ByteCursor<'_>) -> Result<RecordHeader, WalkError> {
        let mut c = *cursor;
        let type_code = self.read_width(&mut c, self.type_width)?;
        let length = self.read_width(&mut c, self.length_width)? as u64;
        let header_size = self.header_size();
        let padding = self.pad(length);
        let declared = if self.length_includes_header {
            length + padding
        } else {
            header_size as u64 + length + padding
        };

        let mut header = RecordHeader::new(declared, TypeCode(type_code), header_size);
        header.padding = padding as usize;
        Ok(header)
    }
}

/// TLV adapter driven entirely by configuration
pub struct TlvFormat {
    layout: TlvLayout,
    registry: HandlerRegistry,
}

impl TlvFormat {
    /// `containers` lists type codes whose values hold nested TLVs
    pub fn new(layout: TlvLayout, containers: &[u32]) -> Self {
        let registry = containers
            .iter()
            .fold(HandlerRegistry::new(), |registry, &code| {
                registry.container(TypeCode(code))
            });
        Self { layout, registry }
    }

    pub fn layout(&self) -> &TlvLayout {
        &self.layout
    }
}

impl FormatAdapter for TlvFormat {
    fn name(&self) -> &'static str {
        "tlv"
    }

    fn decoder(&self) -> &dyn HeaderDecoder {
        &self.layout
    }

    fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    fn probe(&self, buf: &[u8]) -> bool {
        buf.len() >= self.layout.header_size()
    }
}
