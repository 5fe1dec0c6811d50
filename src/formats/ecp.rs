//! IEEE 802.1Qbg ECP frames carrying VDP TLVs.
//!
//! The 4-byte ECP header (4-bit version, 2-bit op, 10-bit subtype, 16-bit
//! sequence number) is followed by LLDP-style TLVs whose 16-bit header
//! packs a 7-bit type and a 9-bit value length.

use crate::cursor::{ByteCursor, Endian};
use crate::diagnostics::{DiagnosticKind, DiagnosticRecord};
use crate::error::{LeafError, WalkError};
use crate::header::{HeaderDecoder, RecordHeader, TypeCode};
use crate::registry::{FieldSink, HandlerRegistry, ParseContext};

use super::{FormatAdapter, RecordSpan};

pub const ECP_HEADER_SIZE: usize = 4;
pub const ECP_VERSION: u8 = 1;

/// End of TLVs marker
pub const END: TypeCode = TypeCode(0);
pub const PRE_ASSOCIATE: TypeCode = TypeCode(1);
pub const PRE_ASSOCIATE_WITH_RR: TypeCode = TypeCode(2);
pub const ASSOCIATE: TypeCode = TypeCode(3);
pub const DISASSOCIATE: TypeCode = TypeCode(4);
pub const MANAGER_ID: TypeCode = TypeCode(5);
pub const ORG_SPECIFIC: TypeCode = TypeCode(127);

/// 7-bit type, 9-bit length, big endian
#[derive(Debug, Clone, Copy, Default)]
pub struct BitPackedTlv;

impl HeaderDecoder for BitPackedTlv {
    fn name(&self) -> &'static str {
        "bit-packed-tlv"
    }

    fn min_header_size(&self) -> usize {
        2
    }

    fn decode(&self, cursor: &ByteCursor<'_>) -> Result<RecordHeader, WalkError> {
        let word = cursor.peek_u16(Endian::Big)?;
        let type_code = TypeCode((word >> 9) as u32);
        let length = (word & 0x01FF) as u64;
        Ok(RecordHeader::new(2 + length, type_code, 2))
    }
}

fn parse_association(
    body: &mut ByteCursor<'_>,
    _ctx: &ParseContext<'_>,
    fields: &mut FieldSink,
) -> Result<(), LeafError> {
    let at = body.offset();
    fields.add("reason", at, body.read_u8()?);
    fields.add("manager_id", body.offset(), body.read_bytes(16)?);
    fields.add("vsi_type", body.offset(), body.read_u24(Endian::Big)?);
    fields.add("vsi_version", body.offset(), body.read_u8()?);
    fields.add("vsiid_format", body.offset(), body.read_u8()?);
    fields.add("vsiid", body.offset(), body.read_bytes(16)?);
    fields.add("filter_format", body.offset(), body.read_u8()?);

    let at = body.offset();
    let count = body.read_u16(Endian::Big)? as usize;
    fields.add("filter_count", at, count);
    // Only the VID-only filter format is decoded entry by entry
    if body.remaining() < count * 2 {
        return Err(LeafError::LengthMismatch {
            field: "filter_info",
            declared: count * 2,
            available: body.remaining(),
        });
    }
    for _ in 0..count {
        let at = body.offset();
        fields.add("vid", at, body.read_u16(Endian::Big)? & 0x0FFF);
    }
    Ok(())
}

fn parse_manager_id(
    body: &mut ByteCursor<'_>,
    _ctx: &ParseContext<'_>,
    fields: &mut FieldSink,
) -> Result<(), LeafError> {
    let at = body.offset();
    fields.add("manager_id", at, body.read_bytes(16)?);
    Ok(())
}

fn parse_org_specific(
    body: &mut ByteCursor<'_>,
    _ctx: &ParseContext<'_>,
    fields: &mut FieldSink,
) -> Result<(), LeafError> {
    let at = body.offset();
    fields.add("oui", at, body.read_u24(Endian::Big)?);
    fields.add("subtype", at + 3, body.read_u8()?);
    let at = body.offset();
    fields.add("info", at, body.rest());
    Ok(())
}

pub fn default_registry() -> HandlerRegistry {
    HandlerRegistry::new()
        .leaf(PRE_ASSOCIATE, parse_association)
        .leaf(PRE_ASSOCIATE_WITH_RR, parse_association)
        .leaf(ASSOCIATE, parse_association)
        .leaf(DISASSOCIATE, parse_association)
        .leaf(MANAGER_ID, parse_manager_id)
        .leaf(ORG_SPECIFIC, parse_org_specific)
        .skip(END)
}

/// ECP/VDP adapter
pub struct Ecp {
    decoder: BitPackedTlv,
    registry: HandlerRegistry,
}

impl Ecp {
    pub fn new() -> Self {
        Self {
            decoder: BitPackedTlv,
            registry: default_registry(),
        }
    }
}

impl Default for Ecp {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatAdapter for Ecp {
    fn name(&self) -> &'static str {
        "ecp"
    }

    fn decoder(&self) -> &dyn HeaderDecoder {
        &self.decoder
    }

    fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    fn probe(&self, buf: &[u8]) -> bool {
        buf.len() >= ECP_HEADER_SIZE + 2 && buf[0] >> 4 == ECP_VERSION
    }

    fn record_span<'a>(&self, buf: &'a [u8]) -> Result<RecordSpan<'a>, WalkError> {
        let preamble = ByteCursor::new(buf).read_bytes(ECP_HEADER_SIZE)?;
        let mut c = ByteCursor::new(buf);
        let word = c.read_u16(Endian::Big)?;
        let sequence = c.read_u16(Endian::Big)?;
        let version = (word >> 12) as u8;
        if version != ECP_VERSION {
            return Ok(RecordSpan {
                cursor: c.sub_cursor(0, 0)?,
                preamble,
                diagnostic: Some(DiagnosticRecord::new(
                    DiagnosticKind::MalformedHeader,
                    0,
                    format!("unsupported ECP version {}", version),
                )),
            });
        }
        tracing::debug!(
            "ECP op={} subtype={} seq={}",
            (word >> 10) & 0x3,
            word & 0x3FF,
            sequence
        );
        Ok(RecordSpan {
            cursor: c,
            preamble,
            diagnostic: None,
        })
    }
}

/// Encode one bit-packed TLV
pub fn encode_tlv(type_code: u8, value: &[u8]) -> Vec<u8> {
    let word = ((type_code as u16 & 0x7F) << 9) | (value.len() as u16 & 0x01FF);
    let mut out = word.to_be_bytes().to_vec();
    out.extend_from_slice(value);
    out
}

/// Encode an ECP data unit around already-encoded TLVs
pub fn build_frame(op: u8, subtype: u16, sequence: u16, tlvs: &[u8]) -> Vec<u8> {
    let word = ((ECP_VERSION as u16) << 12) | ((op as u16 & 0x3) << 10) | (subtype & 0x3FF);
    let mut out = Vec::with_capacity(ECP_HEADER_SIZE + tlvs.len());
    out.extend_from_slice(&word.to_be_bytes());
    out.extend_from_slice(&sequence.to_be_bytes());
    out.extend_from_slice(tlvs);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WalkerConfig;
    use crate::registry::FieldValue;
    use crate::walker::RecordKind;

    fn association(vids: &[u16], claimed: u16) -> Vec<u8> {
        let mut v = vec![0x00];
        v.extend_from_slice(&[0xAA; 16]);
        v.extend_from_slice(&[0x00, 0x12, 0x34]);
        v.push(1);
        v.push(5);
        v.extend_from_slice(&[0xBB; 16]);
        v.push(1);
        v.extend_from_slice(&claimed.to_be_bytes());
        for vid in vids {
            v.extend_from_slice(&vid.to_be_bytes());
        }
        v
    }

    #[test]
    fn test_bit_packed_header() {
        let tlv = encode_tlv(127, &[0; 300]);
        let header = BitPackedTlv.decode(&ByteCursor::new(&tlv)).unwrap();
        assert_eq!(header.type_code, ORG_SPECIFIC);
        assert_eq!(header.declared_length, 302);
        assert_eq!(header.header_size, 2);
    }

    #[test]
    fn test_walk_associate() {
        let mut tlvs = encode_tlv(3, &association(&[10, 20], 2));
        tlvs.extend(encode_tlv(0, &[]));
        let frame = build_frame(0, 1, 42, &tlvs);

        let ecp = Ecp::new();
        assert!(ecp.probe(&frame));
        let out = ecp.walk(&frame, &WalkerConfig::default()).unwrap();
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.records[0].offset, 4);
        assert_eq!(out.records[0].kind, RecordKind::Leaf);
        assert_eq!(
            out.records[0].field("vsi_type"),
            Some(&FieldValue::Uint(0x1234))
        );
        assert_eq!(out.records[0].field("filter_count"), Some(&FieldValue::Uint(2)));
        assert_eq!(out.records[1].kind, RecordKind::Skipped);
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn test_filter_count_overrun_is_leaf_error() {
        let mut tlvs = encode_tlv(3, &association(&[10], 200));
        tlvs.extend(encode_tlv(5, &[0x11; 16]));
        let frame = build_frame(0, 1, 1, &tlvs);

        let out = Ecp::new().walk(&frame, &WalkerConfig::default()).unwrap();
        assert_eq!(out.records[0].kind, RecordKind::Failed);
        assert_eq!(out.records[1].kind, RecordKind::Leaf);
        assert_eq!(out.count(DiagnosticKind::LeafError), 1);
    }

    #[test]
    fn test_wrong_version_is_diagnostic() {
        let mut frame = build_frame(0, 1, 1, &encode_tlv(5, &[0x11; 16]));
        frame[0] = 0x20;
        let out = Ecp::new().walk(&frame, &WalkerConfig::default()).unwrap();
        assert!(out.records.is_empty());
        assert_eq!(out.diagnostics.len(), 1);
        assert_eq!(out.diagnostics[0].kind, DiagnosticKind::MalformedHeader);
        assert_eq!(out.diagnostics[0].byte_offset, 0);
    }

    #[test]
    fn test_short_ecp_header_is_error() {
        let frame = build_frame(0, 1, 1, &[]);
        assert!(matches!(
            Ecp::new().walk(&frame[..3], &WalkerConfig::default()),
            Err(WalkError::Truncated { offset: 0, .. })
        ));
        let out = Ecp::new().walk(&frame, &WalkerConfig::default()).unwrap();
        assert!(out.records.is_empty());
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn test_span_starts_after_frame_header() {
        let frame = build_frame(0, 1, 7, &encode_tlv(5, &[0x11; 16]));
        let span = Ecp::new().record_span(&frame).unwrap();
        assert_eq!(span.preamble, &frame[..4]);
        assert_eq!(span.cursor.offset(), 4);
        assert!(span.diagnostic.is_none());
    }
}
