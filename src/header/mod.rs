//! Record header decoding.
//!
//! Every format family exposes the same `{declared_length, type_code,
//! header_size}` view of its record prefix through [`HeaderDecoder`].
//! The family-specific byte layouts live in `crate::formats`.

use std::fmt;

use serde::{Serialize, Serializer};

use crate::cursor::ByteCursor;
use crate::error::WalkError;

/// Numeric record type. FourCC codes are packed big-endian.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeCode(pub u32);

impl TypeCode {
    /// Pack 4 ASCII bytes into a type code
    pub const fn fourcc(cc: &[u8; 4]) -> Self {
        Self(u32::from_be_bytes(*cc))
    }

    pub fn value(self) -> u32 {
        self.0
    }

    /// The code as 4 printable ASCII characters, if it is one
    pub fn as_fourcc(self) -> Option<String> {
        let bytes = self.0.to_be_bytes();
        if bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
            Some(bytes.iter().map(|&b| b as char).collect())
        } else {
            None
        }
    }
}

impl fmt::Display for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_fourcc() {
            Some(cc) => f.write_str(&cc),
            None => write!(f, "0x{:x}", self.0),
        }
    }
}

impl fmt::Debug for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeCode({})", self)
    }
}

impl Serialize for TypeCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl From<u32> for TypeCode {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Decoded common prefix of one record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecordHeader {
    /// Size of the entire record, header included
    pub declared_length: u64,
    /// Record type used for handler dispatch
    pub type_code: TypeCode,
    /// Bytes the header itself consumed (grows with extended encodings)
    pub header_size: usize,
    /// ISOBMFF `uuid` user type carried in the header
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extended_type: Option<[u8; 16]>,
    /// Trailing alignment bytes inside `declared_length` that are not body
    pub padding: usize,
}

impl RecordHeader {
    pub fn new(declared_length: u64, type_code: TypeCode, header_size: usize) -> Self {
        Self {
            declared_length,
            type_code,
            header_size,
            extended_type: None,
            padding: 0,
        }
    }

    /// Length of the body as seen by handlers (header and padding removed).
    ///
    /// Only meaningful once the walker has checked
    /// `declared_length >= header_size`.
    pub fn body_length(&self) -> usize {
        (self.declared_length as usize)
            .saturating_sub(self.header_size)
            .saturating_sub(self.padding)
    }
}

/// Byte layout policy of one format family.
///
/// `decode` reads from a copy of the cursor; the walker alone decides how
/// far to advance. Implementations report raw values: `declared_length <
/// header_size` and the size ceiling are checked by the caller.
pub trait HeaderDecoder: Send + Sync {
    /// Short family name used in logs
    fn name(&self) -> &'static str;

    /// Smallest number of bytes any header of this family occupies
    fn min_header_size(&self) -> usize;

    fn decode(&self, cursor: &ByteCursor<'_>) -> Result<RecordHeader, WalkError>;
}

impl<D: HeaderDecoder + ?Sized> HeaderDecoder for Box<D> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn min_header_size(&self) -> usize {
        (**self).min_header_size()
    }

    fn decode(&self, cursor: &ByteCursor<'_>) -> Result<RecordHeader, WalkError> {
        (**self).decode(cursor)
    }
}

/// Decode one header.
///
/// Fails with `Truncated` when fewer than `min_header_size` bytes remain,
/// and with `SizeTooLarge` when the declared length does not fit the host's
/// `usize`. The configured `max_record_size` is checked by the walker.
pub fn decode_header<D: HeaderDecoder + ?Sized>(
    decoder: &D,
    cursor: &ByteCursor<'_>,
) -> Result<RecordHeader, WalkError> {
    let min = decoder.min_header_size();
    if cursor.remaining() < min {
        return Err(WalkError::Truncated {
            offset: cursor.offset(),
            needed: min,
            available: cursor.remaining(),
        });
    }

    let header = decoder.decode(cursor)?;
    if header.header_size == 0 {
        return Err(WalkError::MalformedHeader {
            offset: cursor.offset(),
            reason: format!("{} decoder consumed no header bytes", decoder.name()),
        });
    }

    let ceiling = usize::MAX as u64;
    if header.declared_length > ceiling {
        return Err(WalkError::SizeTooLarge {
            offset: cursor.offset(),
            declared: header.declared_length,
            ceiling,
        });
    }

    tracing::trace!(
        "{} header at {}: type={} declared={} header_size={}",
        decoder.name(),
        cursor.offset(),
        header.type_code,
        header.declared_length,
        header.header_size
    );
    Ok(header)
}
