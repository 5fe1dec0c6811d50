//! Owned walk results backed by a shared `Bytes` buffer.
//!
//! Lets a presentation layer keep records after the walk returns without
//! copying bodies: each body is a `Bytes::slice` of the input.

use bytes::Bytes;
use serde::{Serialize, Serializer};

use super::{walk, RecordKind, WalkOutput};
use crate::config::WalkerConfig;
use crate::diagnostics::DiagnosticRecord;
use crate::error::WalkError;
use crate::header::{HeaderDecoder, RecordHeader, TypeCode};
use crate::registry::{Field, HandlerRegistry};

/// Bytes of a body shown in JSON output
const PREVIEW_LEN: usize = 16;

fn serialize_preview<S: Serializer>(body: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
    let shown = &body[..body.len().min(PREVIEW_LEN)];
    let mut hex = String::with_capacity(shown.len() * 2 + 3);
    for b in shown {
        hex.push_str(&format!("{:02x}", b));
    }
    if body.len() > PREVIEW_LEN {
        hex.push_str("...");
    }
    serializer.serialize_str(&hex)
}

/// A record that owns (a reference-counted slice of) its body
#[derive(Debug, Clone, Serialize)]
pub struct OwnedRecord {
    pub header: RecordHeader,
    pub offset: usize,
    pub depth: u32,
    pub kind: RecordKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<TypeCode>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<Field>,
    #[serde(rename = "body_preview", serialize_with = "serialize_preview")]
    pub body: Bytes,
}

impl OwnedRecord {
    pub fn type_code(&self) -> TypeCode {
        self.header.type_code
    }
}

/// Result of [`walk_owned`]
#[derive(Debug, Clone, Serialize)]
pub struct OwnedWalk {
    pub records: Vec<OwnedRecord>,
    pub diagnostics: Vec<DiagnosticRecord>,
    pub suppressed: usize,
}

impl OwnedWalk {
    /// Detach `output` from the borrow of `buffer`, which it was walked over
    pub fn from_output(buffer: &Bytes, output: WalkOutput<'_>) -> Self {
        let records = output
            .records
            .into_iter()
            .map(|record| {
                let body = buffer.slice(record.body_range());
                OwnedRecord {
                    header: record.header,
                    offset: record.offset,
                    depth: record.depth,
                    kind: record.kind,
                    parent: record.parent,
                    fields: record.fields,
                    body,
                }
            })
            .collect();
        Self {
            records,
            diagnostics: output.diagnostics,
            suppressed: output.suppressed,
        }
    }
}

/// Walk `buffer` and detach the results from its borrow
pub fn walk_owned(
    buffer: Bytes,
    decoder: &dyn HeaderDecoder,
    registry: &HandlerRegistry,
    config: &WalkerConfig,
) -> Result<OwnedWalk, WalkError> {
    let output = walk(&buffer, decoder, registry, config)?;
    Ok(OwnedWalk::from_output(&buffer, output))
}
