//! ISOBMFF (MP4) box adapter.
//!
//! Box header: `size u32 BE | type FourCC`, then
//! - `size == 1`: a 64-bit `largesize` follows and replaces `size`
//! - `size == 0`: "extends to end of file", passed through as a declared
//!   length of 0 so the walker rejects it as `MalformedLength`
//! - `type == 'uuid'`: a 16-byte user type follows and belongs to the header

use crate::cursor::{ByteCursor, Endian};
use crate::error::{LeafError, WalkError};
use crate::header::{HeaderDecoder, RecordHeader, TypeCode};
use crate::registry::{FieldSink, HandlerRegistry, ParseContext};

use super::FormatAdapter;

pub const FTYP: TypeCode = TypeCode::fourcc(b"ftyp");
pub const STYP: TypeCode = TypeCode::fourcc(b"styp");
pub const MOOV: TypeCode = TypeCode::fourcc(b"moov");
pub const MVHD: TypeCode = TypeCode::fourcc(b"mvhd");
pub const TRAK: TypeCode = TypeCode::fourcc(b"trak");
pub const TKHD: TypeCode = TypeCode::fourcc(b"tkhd");
pub const EDTS: TypeCode = TypeCode::fourcc(b"edts");
pub const MDIA: TypeCode = TypeCode::fourcc(b"mdia");
pub const MDHD: TypeCode = TypeCode::fourcc(b"mdhd");
pub const HDLR: TypeCode = TypeCode::fourcc(b"hdlr");
pub const MINF: TypeCode = TypeCode::fourcc(b"minf");
pub const DINF: TypeCode = TypeCode::fourcc(b"dinf");
pub const DREF: TypeCode = TypeCode::fourcc(b"dref");
pub const STBL: TypeCode = TypeCode::fourcc(b"stbl");
pub const STSD: TypeCode = TypeCode::fourcc(b"stsd");
pub const UDTA: TypeCode = TypeCode::fourcc(b"udta");
pub const META: TypeCode = TypeCode::fourcc(b"meta");
pub const MVEX: TypeCode = TypeCode::fourcc(b"mvex");
pub const MOOF: TypeCode = TypeCode::fourcc(b"moof");
pub const TRAF: TypeCode = TypeCode::fourcc(b"traf");
pub const MFRA: TypeCode = TypeCode::fourcc(b"mfra");
pub const MDAT: TypeCode = TypeCode::fourcc(b"mdat");
pub const FREE: TypeCode = TypeCode::fourcc(b"free");
pub const SKIP: TypeCode = TypeCode::fourcc(b"skip");
pub const SIDX: TypeCode = TypeCode::fourcc(b"sidx");
pub const UUID: TypeCode = TypeCode::fourcc(b"uuid");

/// Boxes that may appear first in a file or segment
const TOP_LEVEL: &[TypeCode] = &[FTYP, STYP, MOOV, MOOF, MDAT, FREE, SKIP, SIDX, UUID, META];

/// Box header decoder
#[derive(Debug, Clone, Copy, Default)]
pub struct BoxHeaderDecoder;

impl HeaderDecoder for BoxHeaderDecoder {
    fn name(&self) -> &'static str {
        "isobmff"
    }

    fn min_header_size(&self) -> usize {
        8
    }

    fn decode(&self, cursor: &ByteCursor<'_>) -> Result<RecordHeader, WalkError> {
        let mut c = *cursor;
        let size = c.read_u32(Endian::Big)?;
        let box_type = TypeCode::fourcc(&c.read_array::<4>()?);

        let mut header = RecordHeader::new(size as u64, box_type, 8);
        if size == 1 {
            header.declared_length = c.read_u64(Endian::Big)?;
            header.header_size += 8;
        }
        if box_type == UUID {
            header.extended_type = Some(c.read_array::<16>()?);
            header.header_size += 16;
        }
        Ok(header)
    }
}

/// Read the version/flags word of a full box
fn full_box(body: &mut ByteCursor<'_>, fields: &mut FieldSink) -> Result<u8, LeafError> {
    let at = body.offset();
    let version = body.read_u8()?;
    let flags = body.read_u24(Endian::Big)?;
    fields.add("version", at, version);
    fields.add("flags", at + 1, flags);
    Ok(version)
}

/// Read a field that is 32 bits in version 0 and 64 bits in version 1
fn versioned(body: &mut ByteCursor<'_>, version: u8) -> Result<u64, LeafError> {
    Ok(match version {
        0 => body.read_u32(Endian::Big)? as u64,
        _ => body.read_u64(Endian::Big)?,
    })
}

fn check_version(version: u8, ctx: &ParseContext<'_>) -> Result<(), LeafError> {
    if version > 1 {
        return Err(LeafError::Invalid(format!(
            "unsupported {} version {}",
            ctx.type_code(),
            version
        )));
    }
    Ok(())
}

fn parse_ftyp(
    body: &mut ByteCursor<'_>,
    _ctx: &ParseContext<'_>,
    fields: &mut FieldSink,
) -> Result<(), LeafError> {
    let at = body.offset();
    fields.add("major_brand", at, TypeCode::fourcc(&body.read_array::<4>()?));
    fields.add("minor_version", at + 4, body.read_u32(Endian::Big)?);
    while body.remaining() >= 4 {
        let at = body.offset();
        fields.add(
            "compatible_brand",
            at,
            TypeCode::fourcc(&body.read_array::<4>()?),
        );
    }
    if !body.is_empty() {
        return Err(LeafError::Invalid(format!(
            "{} trailing bytes after compatible brands",
            body.remaining()
        )));
    }
    Ok(())
}

fn parse_mvhd(
    body: &mut ByteCursor<'_>,
    ctx: &ParseContext<'_>,
    fields: &mut FieldSink,
) -> Result<(), LeafError> {
    let version = full_box(body, fields)?;
    check_version(version, ctx)?;
    let at = body.offset();
    fields.add("creation_time", at, versioned(body, version)?);
    fields.add("modification_time", body.offset(), versioned(body, version)?);
    fields.add("timescale", body.offset(), body.read_u32(Endian::Big)?);
    fields.add("duration", body.offset(), versioned(body, version)?);
    Ok(())
}

fn parse_mdhd(
    body: &mut ByteCursor<'_>,
    ctx: &ParseContext<'_>,
    fields: &mut FieldSink,
) -> Result<(), LeafError> {
    parse_mvhd(body, ctx, fields)?;
    let at = body.offset();
    let packed = body.read_u16(Endian::Big)?;
    // ISO-639-2/T code, three 5-bit letters offset from 0x60
    let language: String = [10u16, 5, 0]
        .iter()
        .map(|shift| (((packed >> shift) & 0x1f) as u8 + 0x60) as char)
        .collect();
    fields.add("language", at, language);
    Ok(())
}

fn parse_tkhd(
    body: &mut ByteCursor<'_>,
    ctx: &ParseContext<'_>,
    fields: &mut FieldSink,
) -> Result<(), LeafError> {
    let version = full_box(body, fields)?;
    check_version(version, ctx)?;
    versioned(body, version)?;
    versioned(body, version)?;
    fields.add("track_id", body.offset(), body.read_u32(Endian::Big)?);
    body.skip(4)?;
    fields.add("duration", body.offset(), versioned(body, version)?);
    // reserved(8) layer(2) alternate_group(2) volume(2) reserved(2) matrix(36)
    body.skip(52)?;
    fields.add("width", body.offset(), body.read_u32(Endian::Big)? >> 16);
    fields.add("height", body.offset(), body.read_u32(Endian::Big)? >> 16);
    Ok(())
}

fn parse_hdlr(
    body: &mut ByteCursor<'_>,
    _ctx: &ParseContext<'_>,
    fields: &mut FieldSink,
) -> Result<(), LeafError> {
    full_box(body, fields)?;
    body.skip(4)?;
    let at = body.offset();
    fields.add("handler_type", at, TypeCode::fourcc(&body.read_array::<4>()?));
    body.skip(12)?;
    let at = body.offset();
    let name = body.read_cstring_ascii(body.remaining())?;
    fields.add("name", at, name);
    Ok(())
}

/// ISOBMFF adapter
pub struct IsoBmff {
    decoder: BoxHeaderDecoder,
    registry: HandlerRegistry,
}

impl IsoBmff {
    pub fn new() -> Self {
        Self {
            decoder: BoxHeaderDecoder,
            registry: default_registry(),
        }
    }
}

impl Default for IsoBmff {
    fn default() -> Self {
        Self::new()
    }
}

/// Containers and leaf handlers for the common movie/fragment boxes
pub fn default_registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    for container in [MOOV, TRAK, EDTS, MDIA, MINF, DINF, STBL, UDTA, MVEX, MOOF, TRAF, MFRA] {
        registry = registry.container(container);
    }
    registry
        // version/flags
        .container_with_prefix(META, 4)
        // version/flags + entry_count
        .container_with_prefix(STSD, 8)
        .container_with_prefix(DREF, 8)
        .leaf(FTYP, parse_ftyp)
        .leaf(STYP, parse_ftyp)
        .leaf(MVHD, parse_mvhd)
        .leaf(MDHD, parse_mdhd)
        .leaf(TKHD, parse_tkhd)
        .leaf(HDLR, parse_hdlr)
        .skip(MDAT)
        .skip(FREE)
        .skip(SKIP)
}

impl FormatAdapter for IsoBmff {
    fn name(&self) -> &'static str {
        "isobmff"
    }

    fn decoder(&self) -> &dyn HeaderDecoder {
        &self.decoder
    }

    fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    fn probe(&self, buf: &[u8]) -> bool {
        let mut c = ByteCursor::new(buf);
        match (c.read_u32(Endian::Big), c.read_array::<4>()) {
            (Ok(size), Ok(cc)) => {
                (size == 1 || size >= 8) && TOP_LEVEL.contains(&TypeCode::fourcc(&cc))
            }
            _ => false,
        }
    }
}

/// Encode a box with a 32-bit size
pub fn build_box(box_type: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + body.len());
    out.extend_from_slice(&((8 + body.len()) as u32).to_be_bytes());
    out.extend_from_slice(box_type);
    out.extend_from_slice(body);
    out
}

/// Encode a box using the `size == 1` 64-bit length form
pub fn build_large_box(box_type: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(16 + body.len());
    out.extend_from_slice(&1u32.to_be_bytes());
    out.extend_from_slice(box_type);
    out.extend_from_slice(&((16 + body.len()) as u64).to_be_bytes());
    out.extend_from_slice(body);
    out
}
