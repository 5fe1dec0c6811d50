//! End-to-end walks over hand-built buffers.

use record_walker::formats::isobmff::{self, build_box, build_large_box, BoxHeaderDecoder};
use record_walker::formats::{FormatAdapter, IsoBmff, TlvFormat, TlvLayout};
use record_walker::{
    walk, ByteCursor, DiagnosticKind, FieldSink, FieldValue, HandlerRegistry, LeafError,
    ParseContext, RecordKind, TypeCode, WalkError, WalkerConfig,
};

fn mp4_walk<'a>(data: &'a [u8], config: &WalkerConfig) -> record_walker::WalkOutput<'a> {
    IsoBmff::new().walk(data, config).unwrap()
}

#[test]
fn test_zero_size_box_is_malformed_not_error() {
    let out = mp4_walk(&[0u8; 8], &WalkerConfig::default());
    assert!(out.records.is_empty());
    assert_eq!(out.diagnostics.len(), 1);
    assert_eq!(out.diagnostics[0].kind, DiagnosticKind::MalformedLength);
    assert_eq!(out.diagnostics[0].byte_offset, 0);
}

#[test]
fn test_declared_length_past_buffer_is_truncated_record() {
    let mut data = vec![0u8; 20];
    data[..4].copy_from_slice(&1000u32.to_be_bytes());
    data[4..8].copy_from_slice(b"moov");

    let out = mp4_walk(&data, &WalkerConfig::default());
    assert!(out.records.is_empty());
    assert_eq!(out.count(DiagnosticKind::TruncatedRecord), 1);
}

#[test]
fn test_self_nesting_stops_at_max_depth() {
    // moov > trak > mdia, repeated until 150 levels deep
    let levels = [b"moov", b"trak", b"mdia"];
    let mut data = build_box(b"free", &[]);
    for i in (0..150).rev() {
        data = build_box(levels[i % 3], &data);
    }

    let out = mp4_walk(&data, &WalkerConfig::default().with_max_depth(100));
    assert_eq!(out.max_depth(), Some(100));
    assert_eq!(out.records.len(), 101);
    assert_eq!(out.count(DiagnosticKind::DepthExceeded), 1);

    let last = out.records.last().unwrap();
    assert_eq!(last.depth, 100);
    assert_eq!(last.kind, RecordKind::Opaque);
    assert!(out.records[..100]
        .iter()
        .all(|r| r.kind == RecordKind::Container));
}

const GROUP: TypeCode = TypeCode(0x10);
const LABEL: TypeCode = TypeCode(0x20);

/// u8 length followed by that many ASCII bytes
fn parse_label(
    body: &mut ByteCursor<'_>,
    _ctx: &ParseContext<'_>,
    fields: &mut FieldSink,
) -> Result<(), LeafError> {
    let len = body.read_u8()? as usize;
    if len > body.remaining() {
        return Err(LeafError::LengthMismatch {
            field: "label",
            declared: len,
            available: body.remaining(),
        });
    }
    let at = body.offset();
    let text = body.read_cstring_ascii(len)?;
    fields.add("label", at, text);
    Ok(())
}

#[test]
fn test_leaf_error_keeps_next_sibling() {
    let layout = TlvLayout::TYPE8_LEN8;
    let mut children = layout.encode(LABEL.value(), &[9, b'b', b'a', b'd']);
    children.extend(layout.encode(LABEL.value(), &[2, b'o', b'k']));
    let data = layout.encode(GROUP.value(), &children);

    let registry = HandlerRegistry::new()
        .container(GROUP)
        .leaf(LABEL, parse_label);
    let out = walk(&data, &layout, &registry, &WalkerConfig::default()).unwrap();

    assert_eq!(out.records.len(), 3);
    assert_eq!(out.records[1].kind, RecordKind::Failed);
    assert_eq!(out.records[2].kind, RecordKind::Leaf);
    assert_eq!(out.records[2].offset, 2 + 6);
    assert_eq!(
        out.records[2].field("label"),
        Some(&FieldValue::Text("ok".into()))
    );
    assert_eq!(out.count(DiagnosticKind::LeafError), 1);
    assert_eq!(out.diagnostics[0].type_code, Some(LABEL));
}

#[test]
fn test_large_size_over_ceiling_is_skipped() {
    let mut data = vec![0, 0, 0, 1];
    data.extend_from_slice(b"mdat");
    data.extend_from_slice(&(1u64 << 40).to_be_bytes());
    data.extend_from_slice(&[0xEE; 16]);

    let out = mp4_walk(&data, &WalkerConfig::default());
    assert!(out.records.is_empty());
    assert_eq!(out.count(DiagnosticKind::SizeTooLarge), 1);
}

#[test]
fn test_box_over_ceiling_keeps_next_sibling() {
    let mut data = build_box(b"free", &[0; 32]);
    data.extend(build_box(b"skip", &[]));

    let out = mp4_walk(&data, &WalkerConfig::default().with_max_record_size(32));
    assert_eq!(out.records.len(), 1);
    assert_eq!(out.records[0].offset, 40);
    assert_eq!(out.records[0].type_code(), TypeCode::fourcc(b"skip"));
    assert_eq!(out.records[0].kind, RecordKind::Skipped);
    assert_eq!(out.diagnostics.len(), 1);
    assert_eq!(out.diagnostics[0].kind, DiagnosticKind::SizeTooLarge);
    assert_eq!(out.diagnostics[0].byte_offset, 0);
}

#[test]
fn test_large_size_within_ceiling_is_walked() {
    let data = build_large_box(b"free", &[1, 2, 3]);
    let out = mp4_walk(&data, &WalkerConfig::default());
    assert_eq!(out.records.len(), 1);
    assert_eq!(out.records[0].header.header_size, 16);
    assert_eq!(out.records[0].body, &[1, 2, 3]);
}

#[test]
fn test_first_header_short_is_call_error() {
    let err = IsoBmff::new()
        .walk(&[0, 0, 0], &WalkerConfig::default())
        .unwrap_err();
    assert!(matches!(err, WalkError::Truncated { offset: 0, .. }));

    let out = mp4_walk(&[], &WalkerConfig::default());
    assert!(out.records.is_empty());
}

fn sample_movie() -> Vec<u8> {
    let mut tkhd_a = vec![0u8; 84];
    tkhd_a[12..16].copy_from_slice(&1u32.to_be_bytes());
    let mut tkhd_b = vec![0u8; 84];
    tkhd_b[12..16].copy_from_slice(&2u32.to_be_bytes());

    let mut moov = build_box(b"trak", &build_box(b"tkhd", &tkhd_a));
    moov.extend(build_box(b"trak", &build_box(b"tkhd", &tkhd_b)));
    let mut data = build_box(b"ftyp", b"isom\0\0\0\x01isomiso2");
    data.extend(build_box(b"moov", &moov));
    data
}

#[test]
fn test_well_formed_movie_tiles_input() {
    let data = sample_movie();
    let out = mp4_walk(&data, &WalkerConfig::default());
    assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
    assert_eq!(out.records.len(), 6);

    // Siblings at each level cover their parent exactly
    let top: Vec<_> = out.records.iter().filter(|r| r.depth == 0).collect();
    assert_eq!(top[0].range().start, 0);
    assert_eq!(top[0].range().end, top[1].range().start);
    assert_eq!(top[1].range().end, data.len());

    let moov = top[1];
    let traks: Vec<_> = out.records.iter().filter(|r| r.depth == 1).collect();
    assert_eq!(traks[0].range().start, moov.body_range().start);
    assert_eq!(traks[0].range().end, traks[1].range().start);
    assert_eq!(traks[1].range().end, moov.range().end);

    for tkhd in out.records.iter().filter(|r| r.depth == 2) {
        assert_eq!(tkhd.type_code(), isobmff::TKHD);
        assert_eq!(tkhd.range(), {
            let parent = out
                .records
                .iter()
                .find(|r| r.depth == 1 && r.range().contains(&tkhd.offset))
                .unwrap();
            parent.body_range()
        });
    }
    assert_eq!(out.records[3].field("track_id"), Some(&FieldValue::Uint(1)));
    assert_eq!(out.records[5].field("track_id"), Some(&FieldValue::Uint(2)));
}

#[test]
fn test_walk_is_deterministic() {
    let mut data = sample_movie();
    data.extend_from_slice(&[0, 0, 0, 9, b'j', b'u', b'n', b'k']);
    let adapter = IsoBmff::new();
    let config = WalkerConfig::default();
    let first = adapter.walk(&data, &config).unwrap();
    let second = adapter.walk(&data, &config).unwrap();
    assert_eq!(first.records, second.records);
    assert_eq!(first.diagnostics, second.diagnostics);
    assert!(!first.diagnostics.is_empty());
}

#[test]
fn test_length_governs_advancement() {
    // Handlers that read nothing, part, or all of the body
    let layout = TlvLayout::TYPE16_LEN16;
    let registry = HandlerRegistry::new()
        .leaf(TypeCode(1), |_: &mut ByteCursor<'_>, _: &ParseContext<'_>, _: &mut FieldSink| Ok(()))
        .leaf(TypeCode(2), |b: &mut ByteCursor<'_>, _: &ParseContext<'_>, _: &mut FieldSink| {
            b.skip(1)?;
            Ok(())
        })
        .leaf(TypeCode(3), |b: &mut ByteCursor<'_>, _: &ParseContext<'_>, _: &mut FieldSink| {
            b.read_bytes(1 << 20)?;
            Ok(())
        });

    let mut data = Vec::new();
    let mut expected = Vec::new();
    for (ty, len) in [(1u32, 5usize), (2, 7), (3, 3), (1, 0), (2, 11)] {
        expected.push(data.len());
        data.extend(layout.encode(ty, &vec![0xAB; len]));
    }

    let out = walk(&data, &layout, &registry, &WalkerConfig::default()).unwrap();
    let offsets: Vec<_> = out.records.iter().map(|r| r.offset).collect();
    assert_eq!(offsets, expected);
    assert_eq!(out.count(DiagnosticKind::LeafError), 1);
}

#[test]
fn test_diagnostic_cap_counts_suppressed() {
    let mut data = Vec::new();
    for _ in 0..10 {
        data.extend(build_box(b"zzzz", &[]));
    }
    let config = WalkerConfig {
        max_diagnostics: 4,
        ..Default::default()
    };
    let out = walk(&data, &BoxHeaderDecoder, &HandlerRegistry::new(), &config).unwrap();
    assert_eq!(out.records.len(), 10);
    assert_eq!(out.diagnostics.len(), 4);
    assert_eq!(out.suppressed, 6);
}

#[test]
fn test_configured_tlv_format_parses_nested_groups() {
    let layout = TlvLayout::TYPE8_LEN8;
    let inner = layout.encode(0x01, b"x");
    let data = layout.encode(0x30, &layout.encode(0x31, &inner));
    let format = TlvFormat::new(layout, &[0x30, 0x31]);
    let out = format.walk(&data, &WalkerConfig::default()).unwrap();
    let depths: Vec<_> = out.records.iter().map(|r| r.depth).collect();
    assert_eq!(depths, vec![0, 1, 2]);
    assert_eq!(out.records[2].parent, Some(TypeCode(0x31)));
}
