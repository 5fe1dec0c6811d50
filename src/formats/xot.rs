//! X.25 over TCP (RFC 1613).
//!
//! Each packet is a 4-byte XOT header (`version u16 = 0`, `length u16`)
//! followed by an X.25 packet of `length` bytes. The record type is the
//! X.25 packet type identifier, normalized so that sequence-number bits do
//! not produce a different type per packet.

use crate::cursor::{ByteCursor, Endian};
use crate::error::{LeafError, WalkError};
use crate::header::{HeaderDecoder, RecordHeader, TypeCode};
use crate::registry::{FieldSink, HandlerRegistry, ParseContext};

use super::FormatAdapter;

pub const XOT_HEADER_SIZE: usize = 4;
/// GFI/LCGN, LCN, packet type identifier
pub const X25_HEADER_SIZE: usize = 3;

pub const DATA: TypeCode = TypeCode(0x00);
pub const RR: TypeCode = TypeCode(0x01);
pub const RNR: TypeCode = TypeCode(0x05);
pub const REJ: TypeCode = TypeCode(0x09);
pub const CALL_REQUEST: TypeCode = TypeCode(0x0B);
pub const CALL_ACCEPTED: TypeCode = TypeCode(0x0F);
pub const CLEAR_REQUEST: TypeCode = TypeCode(0x13);
pub const CLEAR_CONFIRMATION: TypeCode = TypeCode(0x17);
pub const INTERRUPT: TypeCode = TypeCode(0x23);
pub const RESET_REQUEST: TypeCode = TypeCode(0x1B);
pub const RESTART_REQUEST: TypeCode = TypeCode(0xFB);
/// Packet too short to carry an X.25 header
pub const INCOMPLETE: TypeCode = TypeCode(0x100);

/// Map a packet type identifier to its record type
pub fn normalize_packet_type(id: u8) -> TypeCode {
    if id & 0x01 == 0 {
        return DATA;
    }
    match id & 0x1F {
        0x01 => RR,
        0x05 => RNR,
        0x09 => REJ,
        _ => TypeCode(id as u32),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct XotHeaderDecoder;

impl HeaderDecoder for XotHeaderDecoder {
    fn name(&self) -> &'static str {
        "xot"
    }

    fn min_header_size(&self) -> usize {
        XOT_HEADER_SIZE
    }

    fn decode(&self, cursor: &ByteCursor<'_>) -> Result<RecordHeader, WalkError> {
        let mut c = *cursor;
        let version = c.read_u16(Endian::Big)?;
        if version != 0 {
            return Err(WalkError::MalformedHeader {
                offset: cursor.offset(),
                reason: format!("XOT version {} is not 0", version),
            });
        }
        let length = c.read_u16(Endian::Big)? as usize;
        let type_code = if length < X25_HEADER_SIZE {
            INCOMPLETE
        } else {
            c.peek_u8_at(2)
                .map(normalize_packet_type)
                .unwrap_or(INCOMPLETE)
        };
        Ok(RecordHeader::new(
            (XOT_HEADER_SIZE + length) as u64,
            type_code,
            XOT_HEADER_SIZE,
        ))
    }
}

/// Read the GFI/LCN bytes and the packet type identifier
fn packet_header(body: &mut ByteCursor<'_>, fields: &mut FieldSink) -> Result<u8, LeafError> {
    let at = body.offset();
    let word = body.read_u16(Endian::Big)?;
    fields.add("gfi", at, word >> 12);
    fields.add("lcn", at, word & 0x0FFF);
    Ok(body.read_u8()?)
}

/// Unpack `count` BCD digits starting at the high nibble of `bytes[0]`,
/// skipping the first `skip` nibbles
fn bcd_digits(bytes: &[u8], skip: usize, count: usize) -> Result<String, LeafError> {
    (skip..skip + count)
        .map(|i| {
            let byte = bytes[i / 2];
            let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0F };
            char::from_digit(nibble as u32, 10).ok_or_else(|| {
                LeafError::Invalid(format!("address digit 0x{:x} is not BCD", nibble))
            })
        })
        .collect()
}

/// Address block and facilities of CALL REQUEST / CALL ACCEPTED
fn parse_call(
    body: &mut ByteCursor<'_>,
    ctx: &ParseContext<'_>,
    fields: &mut FieldSink,
) -> Result<(), LeafError> {
    packet_header(body, fields)?;
    // CALL ACCEPTED may stop after the packet header
    if ctx.type_code() == CALL_ACCEPTED && body.is_empty() {
        return Ok(());
    }

    let at = body.offset();
    let lengths = body.read_u8()?;
    let calling_len = (lengths >> 4) as usize;
    let called_len = (lengths & 0x0F) as usize;
    let digits = body.read_bytes((calling_len + called_len + 1) / 2)?;
    fields.add("called", at + 1, bcd_digits(digits, 0, called_len)?);
    fields.add("calling", at + 1, bcd_digits(digits, called_len, calling_len)?);

    if body.is_empty() {
        return Ok(());
    }
    let at = body.offset();
    let facilities_len = body.read_u8()? as usize;
    if facilities_len > body.remaining() {
        return Err(LeafError::LengthMismatch {
            field: "facilities",
            declared: facilities_len,
            available: body.remaining(),
        });
    }
    fields.add("facilities", at + 1, body.read_bytes(facilities_len)?);
    if !body.is_empty() {
        fields.add("user_data", body.offset(), body.rest());
    }
    Ok(())
}

fn parse_clear(
    body: &mut ByteCursor<'_>,
    _ctx: &ParseContext<'_>,
    fields: &mut FieldSink,
) -> Result<(), LeafError> {
    packet_header(body, fields)?;
    let at = body.offset();
    fields.add("cause", at, body.read_u8()?);
    if !body.is_empty() {
        fields.add("diagnostic", at + 1, body.read_u8()?);
    }
    Ok(())
}

fn parse_data(
    body: &mut ByteCursor<'_>,
    _ctx: &ParseContext<'_>,
    fields: &mut FieldSink,
) -> Result<(), LeafError> {
    let at = body.offset();
    let gfi = body.peek_u8()?;
    let id = packet_header(body, fields)?;
    fields.add("q", at, (gfi >> 7) & 1);
    fields.add("pr", at + 2, id >> 5);
    fields.add("more", at + 2, (id >> 4) & 1);
    fields.add("ps", at + 2, (id >> 1) & 0x07);
    fields.add("payload", body.offset(), body.rest());
    Ok(())
}

fn parse_flow_control(
    body: &mut ByteCursor<'_>,
    _ctx: &ParseContext<'_>,
    fields: &mut FieldSink,
) -> Result<(), LeafError> {
    let at = body.offset();
    let id = packet_header(body, fields)?;
    fields.add("pr", at + 2, id >> 5);
    Ok(())
}

fn parse_incomplete(
    body: &mut ByteCursor<'_>,
    _ctx: &ParseContext<'_>,
    _fields: &mut FieldSink,
) -> Result<(), LeafError> {
    Err(LeafError::LengthMismatch {
        field: "x25_header",
        declared: X25_HEADER_SIZE,
        available: body.remaining(),
    })
}

pub fn default_registry() -> HandlerRegistry {
    HandlerRegistry::new()
        .leaf(CALL_REQUEST, parse_call)
        .leaf(CALL_ACCEPTED, parse_call)
        .leaf(CLEAR_REQUEST, parse_clear)
        .leaf(DATA, parse_data)
        .leaf(RR, parse_flow_control)
        .leaf(RNR, parse_flow_control)
        .leaf(REJ, parse_flow_control)
        .leaf(INCOMPLETE, parse_incomplete)
        .skip(CLEAR_CONFIRMATION)
        .skip(INTERRUPT)
        .skip(RESET_REQUEST)
        .skip(RESTART_REQUEST)
}

/// XOT adapter
pub struct Xot {
    decoder: XotHeaderDecoder,
    registry: HandlerRegistry,
}

impl Xot {
    pub fn new() -> Self {
        Self {
            decoder: XotHeaderDecoder,
            registry: default_registry(),
        }
    }
}

impl Default for Xot {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatAdapter for Xot {
    fn name(&self) -> &'static str {
        "xot"
    }

    fn decoder(&self) -> &dyn HeaderDecoder {
        &self.decoder
    }

    fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    fn probe(&self, buf: &[u8]) -> bool {
        // version 0, plausible length, GFI general format 1 or 2
        buf.len() >= XOT_HEADER_SIZE + X25_HEADER_SIZE
            && buf[0] == 0
            && buf[1] == 0
            && u16::from_be_bytes([buf[2], buf[3]]) as usize >= X25_HEADER_SIZE
            && matches!(buf[4] & 0x30, 0x10 | 0x20)
    }
}

/// Encode one XOT packet around an X.25 packet
pub fn build_packet(lcn: u16, packet_type: u8, rest: &[u8]) -> Vec<u8> {
    let length = (X25_HEADER_SIZE + rest.len()) as u16;
    let mut out = Vec::with_capacity(XOT_HEADER_SIZE + length as usize);
    out.extend_from_slice(&[0, 0]);
    out.extend_from_slice(&length.to_be_bytes());
    out.extend_from_slice(&(0x1000 | (lcn & 0x0FFF)).to_be_bytes());
    out.push(packet_type);
    out.extend_from_slice(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WalkerConfig;
    use crate::diagnostics::DiagnosticKind;
    use crate::registry::FieldValue;
    use crate::walker::RecordKind;

    #[test]
    fn test_normalize_packet_type() {
        assert_eq!(normalize_packet_type(0x00), DATA);
        assert_eq!(normalize_packet_type(0xE4), DATA);
        assert_eq!(normalize_packet_type(0x41), RR);
        assert_eq!(normalize_packet_type(0xA5), RNR);
        assert_eq!(normalize_packet_type(0x29), REJ);
        assert_eq!(normalize_packet_type(0x0B), CALL_REQUEST);
        assert_eq!(normalize_packet_type(0x13), CLEAR_REQUEST);
    }

    #[test]
    fn test_short_packet_is_incomplete() {
        let header = XotHeaderDecoder
            .decode(&ByteCursor::new(&[0, 0, 0, 2, 0x10, 0x01]))
            .unwrap();
        assert_eq!(header.type_code, INCOMPLETE);
        assert_eq!(header.declared_length, 6);
    }

    #[test]
    fn test_nonzero_version_rejected() {
        let err = XotHeaderDecoder
            .decode(&ByteCursor::new(&[0, 1, 0, 3, 0x10, 0x01, 0x0B]))
            .unwrap_err();
        assert!(matches!(err, WalkError::MalformedHeader { .. }));
    }

    #[test]
    fn test_walk_call_setup() {
        // called 1234 (4 digits), calling 567 (3 digits)
        let mut rest = vec![0x34, 0x12, 0x34, 0x56, 0x70];
        rest.extend_from_slice(&[2, 0x42, 0x07]);
        rest.extend_from_slice(b"hi");
        let mut stream = build_packet(1, 0x0B, &rest);
        stream.extend(build_packet(1, 0x0F, &[]));
        stream.extend(build_packet(1, 0x22, b"payload"));
        stream.extend(build_packet(1, 0x13, &[0x00, 0x00]));

        let xot = Xot::new();
        assert!(xot.probe(&stream));
        let out = xot.walk(&stream, &WalkerConfig::default()).unwrap();
        assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
        let call = &out.records[0];
        assert_eq!(call.type_code(), CALL_REQUEST);
        assert_eq!(call.field("called"), Some(&FieldValue::Text("1234".into())));
        assert_eq!(call.field("calling"), Some(&FieldValue::Text("567".into())));
        assert_eq!(call.field("lcn"), Some(&FieldValue::Uint(1)));
        assert_eq!(call.field("user_data"), Some(&FieldValue::Bytes(b"hi".to_vec())));

        assert_eq!(out.records[1].kind, RecordKind::Leaf);
        assert_eq!(out.records[2].type_code(), DATA);
        assert_eq!(out.records[2].field("ps"), Some(&FieldValue::Uint(1)));
        assert_eq!(out.records[2].field("pr"), Some(&FieldValue::Uint(1)));
        assert_eq!(out.records[3].type_code(), CLEAR_REQUEST);
    }

    #[test]
    fn test_facilities_overrun_is_leaf_error() {
        let stream = build_packet(2, 0x0B, &[0x00, 0x09, 0x01]);
        let out = Xot::new().walk(&stream, &WalkerConfig::default()).unwrap();
        assert_eq!(out.records[0].kind, RecordKind::Failed);
        assert_eq!(out.count(DiagnosticKind::LeafError), 1);
    }

    #[test]
    fn test_incomplete_packet_does_not_stop_stream() {
        let mut stream = vec![0, 0, 0, 1, 0x10];
        stream.extend(build_packet(3, 0x41, &[]));
        let out = Xot::new().walk(&stream, &WalkerConfig::default()).unwrap();
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.records[0].kind, RecordKind::Failed);
        assert_eq!(out.records[1].type_code(), RR);
        assert_eq!(out.records[1].field("pr"), Some(&FieldValue::Uint(2)));
    }
}
