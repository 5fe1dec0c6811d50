//! AOL P3 link-layer frames.
//!
//! ```text
//! 0x5a | crc u16 | len u16 | tx seq | rx seq | type | payload ... | 0x0d
//! ```
//! `len` counts from the tx sequence byte up to the end of the payload, so
//! a whole frame is `len + 6` bytes.

use crate::cursor::{ByteCursor, Endian};
use crate::error::{LeafError, WalkError};
use crate::header::{HeaderDecoder, RecordHeader, TypeCode};
use crate::registry::{FieldSink, HandlerRegistry, ParseContext};

use super::FormatAdapter;

pub const MAGIC: u8 = 0x5a;
pub const END_BYTE: u8 = 0x0d;
pub const HEADER_SIZE: usize = 8;

pub const DATA: TypeCode = TypeCode(0x20);
pub const SS: TypeCode = TypeCode(0x21);
pub const SSR: TypeCode = TypeCode(0x22);
pub const INIT: TypeCode = TypeCode(0x23);
pub const ACK: TypeCode = TypeCode(0x24);
pub const NAK: TypeCode = TypeCode(0x25);
pub const HEARTBEAT: TypeCode = TypeCode(0x26);

/// Smallest `len`: the tx, rx and type bytes
const MIN_LEN: u16 = 3;

#[derive(Debug, Clone, Copy, Default)]
pub struct FrameHeaderDecoder;

impl HeaderDecoder for FrameHeaderDecoder {
    fn name(&self) -> &'static str {
        "p3"
    }

    fn min_header_size(&self) -> usize {
        HEADER_SIZE
    }

    fn decode(&self, cursor: &ByteCursor<'_>) -> Result<RecordHeader, WalkError> {
        let mut c = *cursor;
        let magic = c.read_u8()?;
        if magic != MAGIC {
            return Err(WalkError::MalformedHeader {
                offset: cursor.offset(),
                reason: format!("bad frame magic 0x{:02x}", magic),
            });
        }
        let _crc = c.read_u16(Endian::Big)?;
        let len = c.read_u16(Endian::Big)?;
        c.skip(2)?;
        let frame_type = c.read_u8()?;
        if len < MIN_LEN {
            return Err(WalkError::MalformedHeader {
                offset: cursor.offset(),
                reason: format!("frame length {} shorter than its header", len),
            });
        }
        Ok(RecordHeader::new(
            len as u64 + 6,
            TypeCode(frame_type as u32),
            HEADER_SIZE,
        ))
    }
}

/// Split off and verify the trailing end byte
fn strip_end_byte<'a>(body: &ByteCursor<'a>) -> Result<ByteCursor<'a>, LeafError> {
    let len = body.remaining();
    if len == 0 {
        return Err(LeafError::Invalid("frame has no end byte".into()));
    }
    let end = body.peek_u8_at(len - 1)?;
    if end != END_BYTE {
        return Err(LeafError::Invalid(format!(
            "frame ends with 0x{:02x}, expected 0x{:02x}",
            end, END_BYTE
        )));
    }
    Ok(body.sub_cursor(0, len - 1)?)
}

fn parse_data(
    body: &mut ByteCursor<'_>,
    _ctx: &ParseContext<'_>,
    fields: &mut FieldSink,
) -> Result<(), LeafError> {
    let mut payload = strip_end_byte(body)?;
    let at = payload.offset();
    let token = payload.read_array::<2>()?;
    if !token.iter().all(u8::is_ascii_graphic) {
        return Err(LeafError::Invalid(format!("token {:02x?} is not ASCII", token)));
    }
    fields.add("token", at, String::from_utf8_lossy(&token).into_owned());
    fields.add("payload", payload.offset(), payload.rest());
    Ok(())
}

fn parse_init(
    body: &mut ByteCursor<'_>,
    _ctx: &ParseContext<'_>,
    fields: &mut FieldSink,
) -> Result<(), LeafError> {
    let mut payload = strip_end_byte(body)?;
    let at = payload.offset();
    fields.add("platform", at, payload.read_u8()?);
    fields.add("version", at + 1, payload.read_u8()?);
    fields.add("subversion", at + 2, payload.read_u8()?);
    Ok(())
}

/// Control frames carry nothing but the end byte
fn parse_control(
    body: &mut ByteCursor<'_>,
    _ctx: &ParseContext<'_>,
    fields: &mut FieldSink,
) -> Result<(), LeafError> {
    let payload = strip_end_byte(body)?;
    if !payload.is_empty() {
        fields.add("payload", payload.offset(), payload.rest());
    }
    Ok(())
}

pub fn default_registry() -> HandlerRegistry {
    HandlerRegistry::new()
        .leaf(DATA, parse_data)
        .leaf(INIT, parse_init)
        .leaf(SS, parse_control)
        .leaf(SSR, parse_control)
        .leaf(ACK, parse_control)
        .leaf(NAK, parse_control)
        .leaf(HEARTBEAT, parse_control)
}

/// P3 adapter
pub struct P3 {
    decoder: FrameHeaderDecoder,
    registry: HandlerRegistry,
}

impl P3 {
    pub fn new() -> Self {
        Self {
            decoder: FrameHeaderDecoder,
            registry: default_registry(),
        }
    }
}

impl Default for P3 {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatAdapter for P3 {
    fn name(&self) -> &'static str {
        "p3"
    }

    fn decoder(&self) -> &dyn HeaderDecoder {
        &self.decoder
    }

    fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    fn probe(&self, buf: &[u8]) -> bool {
        self.decoder.decode(&ByteCursor::new(buf)).is_ok()
    }
}

/// Encode one frame; the CRC field is left zero
pub fn build_frame(frame_type: TypeCode, tx: u8, rx: u8, payload: &[u8]) -> Vec<u8> {
    let len = (payload.len() + MIN_LEN as usize) as u16;
    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len() + 1);
    out.push(MAGIC);
    out.extend_from_slice(&[0, 0]);
    out.extend_from_slice(&len.to_be_bytes());
    out.push(tx);
    out.push(rx);
    out.push(frame_type.value() as u8);
    out.extend_from_slice(payload);
    out.push(END_BYTE);
    out
}
