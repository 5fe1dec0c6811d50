//! STUN (RFC 5389) message adapter.
//!
//! A 20-byte message header precedes the attributes:
//! ```text
//! ┌──────────────┬──────────────┬───────────────┬─────────────────┐
//! │ Message type │ Length       │ Magic cookie  │ Transaction ID  │
//! │ 2 bytes      │ 2 bytes      │ 0x2112A442    │ 12 bytes        │
//! └──────────────┴──────────────┴───────────────┴─────────────────┘
//! ```
//! Attributes are 2+2 TLVs whose values are padded to 4 bytes.

use std::net::{Ipv4Addr, Ipv6Addr};

use crate::cursor::{ByteCursor, Endian};
use crate::diagnostics::{DiagnosticKind, DiagnosticRecord};
use crate::error::{LeafError, WalkError};
use crate::header::{HeaderDecoder, TypeCode};
use crate::registry::{FieldSink, HandlerRegistry, ParseContext};

use super::tlv::TlvLayout;
use super::{FormatAdapter, RecordSpan};

/// Fixed message header size
pub const MESSAGE_HEADER_SIZE: usize = 20;

pub const MAGIC_COOKIE: u32 = 0x2112_A442;

pub const MAPPED_ADDRESS: TypeCode = TypeCode(0x0001);
pub const USERNAME: TypeCode = TypeCode(0x0006);
pub const MESSAGE_INTEGRITY: TypeCode = TypeCode(0x0008);
pub const ERROR_CODE: TypeCode = TypeCode(0x0009);
pub const UNKNOWN_ATTRIBUTES: TypeCode = TypeCode(0x000A);
pub const REALM: TypeCode = TypeCode(0x0014);
pub const NONCE: TypeCode = TypeCode(0x0015);
pub const XOR_MAPPED_ADDRESS: TypeCode = TypeCode(0x0020);
pub const SOFTWARE: TypeCode = TypeCode(0x8022);
pub const FINGERPRINT: TypeCode = TypeCode(0x8028);

/// USERNAME values are capped at 513 bytes
const MAX_USERNAME: usize = 513;

fn utf8_value(
    body: &mut ByteCursor<'_>,
    name: &'static str,
    fields: &mut FieldSink,
) -> Result<(), LeafError> {
    let at = body.offset();
    let raw = body.read_bytes(body.remaining())?;
    let text = std::str::from_utf8(raw)
        .map_err(|e| LeafError::Invalid(format!("{} is not UTF-8: {}", name, e)))?;
    fields.add(name, at, text);
    Ok(())
}

fn parse_text(
    body: &mut ByteCursor<'_>,
    ctx: &ParseContext<'_>,
    fields: &mut FieldSink,
) -> Result<(), LeafError> {
    let name = match ctx.type_code() {
        USERNAME => "username",
        REALM => "realm",
        NONCE => "nonce",
        _ => "software",
    };
    if ctx.type_code() == USERNAME && body.remaining() > MAX_USERNAME {
        return Err(LeafError::LengthMismatch {
            field: "username",
            declared: body.remaining(),
            available: MAX_USERNAME,
        });
    }
    utf8_value(body, name, fields)
}

/// Magic cookie followed by the transaction ID, the IPv6 XOR key
fn xor_key(preamble: &[u8]) -> Result<[u8; 16], LeafError> {
    let mut header = ByteCursor::new(preamble);
    header
        .skip(4)
        .and_then(|_| header.read_array())
        .map_err(|_| {
            LeafError::Invalid("IPv6 XOR-MAPPED-ADDRESS without a message header".to_string())
        })
}

/// MAPPED-ADDRESS and XOR-MAPPED-ADDRESS
fn parse_address(
    body: &mut ByteCursor<'_>,
    ctx: &ParseContext<'_>,
    fields: &mut FieldSink,
) -> Result<(), LeafError> {
    let xor = ctx.type_code() == XOR_MAPPED_ADDRESS;
    body.skip(1)?;
    let at = body.offset();
    let family = body.read_u8()?;
    fields.add("family", at, family);

    let mut port = body.read_u16(Endian::Big)?;
    if xor {
        port ^= (MAGIC_COOKIE >> 16) as u16;
    }
    fields.add("port", at + 1, port);

    let at = body.offset();
    match family {
        0x01 => {
            let mut addr = body.read_u32(Endian::Big)?;
            if xor {
                addr ^= MAGIC_COOKIE;
            }
            fields.add("address", at, Ipv4Addr::from(addr).to_string());
        }
        0x02 if xor => {
            let mut addr: [u8; 16] = body.read_array()?;
            for (byte, key) in addr.iter_mut().zip(xor_key(ctx.preamble)?) {
                *byte ^= key;
            }
            fields.add("address", at, Ipv6Addr::from(addr).to_string());
        }
        0x02 => {
            let addr: [u8; 16] = body.read_array()?;
            fields.add("address", at, Ipv6Addr::from(addr).to_string());
        }
        other => {
            return Err(LeafError::Invalid(format!(
                "unknown address family 0x{:02x}",
                other
            )))
        }
    }
    Ok(())
}

fn parse_error_code(
    body: &mut ByteCursor<'_>,
    _ctx: &ParseContext<'_>,
    fields: &mut FieldSink,
) -> Result<(), LeafError> {
    body.skip(2)?;
    let at = body.offset();
    let class = body.read_u8()? & 0x07;
    let number = body.read_u8()?;
    if !(3..=6).contains(&class) || number > 99 {
        return Err(LeafError::Invalid(format!(
            "error class {} number {} out of range",
            class, number
        )));
    }
    fields.add("code", at, class as u32 * 100 + number as u32);
    utf8_value(body, "reason", fields)
}

fn parse_fixed(
    body: &mut ByteCursor<'_>,
    ctx: &ParseContext<'_>,
    fields: &mut FieldSink,
) -> Result<(), LeafError> {
    let at = body.offset();
    match ctx.type_code() {
        MESSAGE_INTEGRITY => {
            if body.remaining() != 20 {
                return Err(LeafError::LengthMismatch {
                    field: "message_integrity",
                    declared: body.remaining(),
                    available: 20,
                });
            }
            fields.add("hmac_sha1", at, body.read_bytes(20)?);
        }
        _ => {
            if body.remaining() != 4 {
                return Err(LeafError::LengthMismatch {
                    field: "fingerprint",
                    declared: body.remaining(),
                    available: 4,
                });
            }
            fields.add("crc32", at, body.read_u32(Endian::Big)?);
        }
    }
    Ok(())
}

fn parse_unknown_attributes(
    body: &mut ByteCursor<'_>,
    _ctx: &ParseContext<'_>,
    fields: &mut FieldSink,
) -> Result<(), LeafError> {
    while !body.is_empty() {
        let at = body.offset();
        fields.add("attribute", at, TypeCode(body.read_u16(Endian::Big)? as u32));
    }
    Ok(())
}

/// Handlers for the RFC 5389 attributes
pub fn default_registry() -> HandlerRegistry {
    HandlerRegistry::new()
        .leaf(MAPPED_ADDRESS, parse_address)
        .leaf(XOR_MAPPED_ADDRESS, parse_address)
        .leaf(USERNAME, parse_text)
        .leaf(REALM, parse_text)
        .leaf(NONCE, parse_text)
        .leaf(SOFTWARE, parse_text)
        .leaf(ERROR_CODE, parse_error_code)
        .leaf(MESSAGE_INTEGRITY, parse_fixed)
        .leaf(FINGERPRINT, parse_fixed)
        .leaf(UNKNOWN_ATTRIBUTES, parse_unknown_attributes)
}

/// STUN adapter
pub struct Stun {
    layout: TlvLayout,
    registry: HandlerRegistry,
}

impl Stun {
    pub fn new() -> Self {
        Self {
            layout: TlvLayout::STUN_ATTRIBUTE,
            registry: default_registry(),
        }
    }
}

impl Default for Stun {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatAdapter for Stun {
    fn name(&self) -> &'static str {
        "stun"
    }

    fn decoder(&self) -> &dyn HeaderDecoder {
        &self.layout
    }

    fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    fn probe(&self, buf: &[u8]) -> bool {
        let c = ByteCursor::new(buf);
        buf.len() >= MESSAGE_HEADER_SIZE
            && buf[0] & 0xC0 == 0
            && c.sub_cursor(4, 8)
                .and_then(|mut cookie| cookie.read_u32(Endian::Big))
                .map(|cookie| cookie == MAGIC_COOKIE)
                .unwrap_or(false)
    }

    fn record_span<'a>(&self, buf: &'a [u8]) -> Result<RecordSpan<'a>, WalkError> {
        let preamble = ByteCursor::new(buf).read_bytes(MESSAGE_HEADER_SIZE)?;
        let mut c = ByteCursor::new(buf);
        let message_type = c.read_u16(Endian::Big)?;
        let length = c.read_u16(Endian::Big)? as usize;
        let cookie = c.read_u32(Endian::Big)?;
        c.skip(12)?;

        if message_type & 0xC000 != 0 || cookie != MAGIC_COOKIE {
            let diagnostic = DiagnosticRecord::new(
                DiagnosticKind::MalformedHeader,
                0,
                format!(
                    "not a STUN message (type 0x{:04x}, cookie 0x{:08x})",
                    message_type, cookie
                ),
            );
            return Ok(RecordSpan {
                cursor: c.sub_cursor(0, 0)?,
                preamble,
                diagnostic: Some(diagnostic),
            });
        }
        tracing::debug!(
            "STUN message type 0x{:04x} with {} bytes of attributes",
            message_type,
            length
        );

        let available = c.remaining();
        let span = RecordSpan {
            cursor: c.sub_cursor(0, length.min(available))?,
            preamble,
            diagnostic: None,
        };
        if length > available {
            return Ok(span.with_diagnostic(DiagnosticRecord::new(
                DiagnosticKind::TruncatedRecord,
                0,
                format!(
                    "message length {} exceeds {} bytes after the header",
                    length, available
                ),
            )));
        }
        Ok(span)
    }
}

/// Encode a message header followed by already-encoded attributes
pub fn build_message(message_type: u16, transaction_id: [u8; 12], attributes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(MESSAGE_HEADER_SIZE + attributes.len());
    out.extend_from_slice(&message_type.to_be_bytes());
    out.extend_from_slice(&(attributes.len() as u16).to_be_bytes());
    out.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());
    out.extend_from_slice(&transaction_id);
    out.extend_from_slice(attributes);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WalkerConfig;
    use crate::registry::FieldValue;
    use crate::walker::RecordKind;

    const BINDING_RESPONSE: u16 = 0x0101;

    fn attr(code: TypeCode, value: &[u8]) -> Vec<u8> {
        TlvLayout::STUN_ATTRIBUTE.encode(code.value(), value)
    }

    #[test]
    fn test_sniff_and_span() {
        let msg = build_message(BINDING_RESPONSE, [7; 12], &attr(SOFTWARE, b"x"));
        let stun = Stun::new();
        assert!(stun.probe(&msg));
        let span = stun.record_span(&msg).unwrap();
        assert_eq!(span.cursor.offset(), 20);
        assert_eq!(span.cursor.remaining(), 8);
        assert_eq!(span.preamble, &msg[..20]);
        assert!(span.diagnostic.is_none());
    }

    #[test]
    fn test_bad_cookie_is_diagnostic() {
        let mut bad = build_message(BINDING_RESPONSE, [7; 12], &attr(SOFTWARE, b"x"));
        bad[4] = 0;
        let stun = Stun::new();
        assert!(!stun.probe(&bad));

        let out = stun.walk(&bad, &WalkerConfig::default()).unwrap();
        assert!(out.records.is_empty());
        assert_eq!(out.diagnostics.len(), 1);
        assert_eq!(out.diagnostics[0].kind, DiagnosticKind::MalformedHeader);
        assert_eq!(out.diagnostics[0].byte_offset, 0);
    }

    #[test]
    fn test_short_message_header_is_error() {
        let msg = build_message(BINDING_RESPONSE, [7; 12], &[]);
        assert!(matches!(
            Stun::new().walk(&msg[..19], &WalkerConfig::default()),
            Err(WalkError::Truncated { offset: 0, .. })
        ));
    }

    #[test]
    fn test_attribute_length_past_message_is_truncated() {
        let mut msg = build_message(BINDING_RESPONSE, [0; 12], &[]);
        msg[3] = 8;
        let out = Stun::new().walk(&msg, &WalkerConfig::default()).unwrap();
        assert!(out.records.is_empty());
        assert_eq!(out.count(DiagnosticKind::TruncatedRecord), 1);
    }

    #[test]
    fn test_cut_message_keeps_attributes_that_fit() {
        let msg = build_message(0x0001, [7; 12], &[0u8; 8]);
        let out = Stun::new().walk(&msg[..24], &WalkerConfig::default()).unwrap();
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].offset, 20);
        assert_eq!(out.count(DiagnosticKind::TruncatedRecord), 1);

        let mut attrs = attr(USERNAME, b"bob");
        attrs.extend(attr(SOFTWARE, b"cut short"));
        let msg = build_message(BINDING_RESPONSE, [4; 12], &attrs);
        let out = Stun::new().walk(&msg[..34], &WalkerConfig::default()).unwrap();
        assert_eq!(out.records.len(), 1);
        assert_eq!(
            out.records[0].field("username"),
            Some(&FieldValue::Text("bob".into()))
        );
        // the message, then the SOFTWARE attribute whose value was cut
        let offsets: Vec<_> = out
            .diagnostics
            .iter()
            .filter(|d| d.kind == DiagnosticKind::TruncatedRecord)
            .map(|d| d.byte_offset)
            .collect();
        assert_eq!(offsets, vec![0, 28]);
    }

    #[test]
    fn test_xor_mapped_ipv6_address() {
        let transaction_id = [0xB7, 0xE7, 0xA7, 0x01, 0xBC, 0x34, 0xD6, 0x86, 0xFA, 0x87, 0xDF, 0xAE];
        let address: Ipv6Addr = "2001:db8:1234:5678:11:2233:4455:6677".parse().unwrap();
        let mut key = MAGIC_COOKIE.to_be_bytes().to_vec();
        key.extend_from_slice(&transaction_id);

        let mut value = vec![0, 0x02];
        value.extend_from_slice(&(32853u16 ^ 0x2112).to_be_bytes());
        value.extend(address.octets().iter().zip(&key).map(|(a, k)| a ^ k));
        let msg = build_message(BINDING_RESPONSE, transaction_id, &attr(XOR_MAPPED_ADDRESS, &value));

        let out = Stun::new().walk(&msg, &WalkerConfig::default()).unwrap();
        assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
        assert_eq!(
            out.records[0].field("address"),
            Some(&FieldValue::Text(address.to_string()))
        );
        assert_eq!(out.records[0].field("port"), Some(&FieldValue::Uint(32853)));
    }

    #[test]
    fn test_xor_ipv6_without_message_header_fails() {
        let mut value = vec![0, 0x02, 0, 0];
        value.extend_from_slice(&[0; 16]);
        let data = attr(XOR_MAPPED_ADDRESS, &value);
        let out = crate::walker::walk(
            &data,
            &TlvLayout::STUN_ATTRIBUTE,
            &default_registry(),
            &WalkerConfig::default(),
        )
        .unwrap();
        assert_eq!(out.records[0].kind, RecordKind::Failed);
        assert_eq!(out.count(DiagnosticKind::LeafError), 1);
    }

    #[test]
    fn test_walk_binding_response() {
        let mut attrs = Vec::new();
        // 192.0.2.1:32853 xored
        let mut xor = vec![0, 0x01];
        xor.extend_from_slice(&(32853u16 ^ 0x2112).to_be_bytes());
        xor.extend_from_slice(&(0xC000_0201u32 ^ MAGIC_COOKIE).to_be_bytes());
        attrs.extend(attr(XOR_MAPPED_ADDRESS, &xor));
        attrs.extend(attr(SOFTWARE, b"test vector"));
        attrs.extend(attr(FINGERPRINT, &0xDEADBEEFu32.to_be_bytes()));
        let msg = build_message(BINDING_RESPONSE, [1; 12], &attrs);

        let out = Stun::new().walk(&msg, &WalkerConfig::default()).unwrap();
        assert_eq!(out.records.len(), 3);
        assert!(out.diagnostics.is_empty());
        assert_eq!(out.records[0].offset, 20);
        assert_eq!(
            out.records[0].field("address"),
            Some(&FieldValue::Text("192.0.2.1".into()))
        );
        assert_eq!(out.records[0].field("port"), Some(&FieldValue::Uint(32853)));
        assert_eq!(
            out.records[1].field("software"),
            Some(&FieldValue::Text("test vector".into()))
        );
        // "test vector" is 11 bytes, padded to 12
        assert_eq!(out.records[2].offset, 20 + 12 + 16);
    }

    #[test]
    fn test_bad_error_code_does_not_stop_walk() {
        let mut attrs = attr(ERROR_CODE, &[0, 0, 9, 1, b'x']);
        attrs.extend(attr(USERNAME, b"alice"));
        let msg = build_message(0x0111, [2; 12], &attrs);

        let out = Stun::new().walk(&msg, &WalkerConfig::default()).unwrap();
        assert_eq!(out.records[0].kind, RecordKind::Failed);
        assert_eq!(out.records[1].kind, RecordKind::Leaf);
        assert_eq!(
            out.records[1].field("username"),
            Some(&FieldValue::Text("alice".into()))
        );
        assert_eq!(out.count(DiagnosticKind::LeafError), 1);
    }

    #[test]
    fn test_error_code_value() {
        let msg = build_message(0x0111, [2; 12], &attr(ERROR_CODE, b"\0\0\x04\x01Unauthorized"));
        let out = Stun::new().walk(&msg, &WalkerConfig::default()).unwrap();
        assert_eq!(out.records[0].field("code"), Some(&FieldValue::Uint(401)));
        assert_eq!(
            out.records[0].field("reason"),
            Some(&FieldValue::Text("Unauthorized".into()))
        );
    }

    #[test]
    fn test_integrity_length_checked() {
        let msg = build_message(BINDING_RESPONSE, [3; 12], &attr(MESSAGE_INTEGRITY, &[0; 12]));
        let out = Stun::new().walk(&msg, &WalkerConfig::default()).unwrap();
        assert_eq!(out.records[0].kind, RecordKind::Failed);
    }
}
