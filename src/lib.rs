//! Bounds-checked walker for nested length-prefixed binary records.
//!
//! A format is described by a [`HeaderDecoder`] (how to read one record
//! header) and a [`HandlerRegistry`] (which record types are containers,
//! which have leaf parsers, which are skipped). [`RecordWalker`] drives both
//! over a buffer, producing records depth-first and collecting
//! [`DiagnosticRecord`]s instead of failing on malformed input.
//!
//! ```
//! use record_walker::formats::{isobmff, FormatAdapter, IsoBmff};
//! use record_walker::WalkerConfig;
//!
//! let mut file = isobmff::build_box(b"ftyp", b"isom\0\0\x02\0");
//! file.extend(isobmff::build_box(b"moov", &isobmff::build_box(b"free", &[])));
//!
//! let out = IsoBmff::new().walk(&file, &WalkerConfig::default()).unwrap();
//! assert_eq!(out.records.len(), 3);
//! assert_eq!(out.records[2].depth, 1);
//! ```

pub mod config;
pub mod config_file;
pub mod cursor;
pub mod diagnostics;
pub mod error;
pub mod formats;
pub mod header;
pub mod registry;
pub mod walker;

pub use config::WalkerConfig;
pub use cursor::{ByteCursor, Endian};
pub use diagnostics::{DiagnosticKind, DiagnosticRecord, DiagnosticSink, Severity};
pub use error::{Error, LeafError, Result, WalkError};
pub use header::{decode_header, HeaderDecoder, RecordHeader, TypeCode};
pub use registry::{
    Capability, Field, FieldSink, FieldValue, HandlerRegistry, LeafHandler, ParseContext,
};
pub use walker::{
    walk, walk_cursor, walk_owned, OwnedRecord, OwnedWalk, Record, RecordKind, RecordWalker,
    WalkOutput,
};
