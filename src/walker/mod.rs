//! Record walking engine.
//!
//! [`RecordWalker`] is a forward-only iterator over the records of one
//! buffer. It keeps an explicit stack of container frames instead of
//! recursing, so children are produced depth-first before the parent's next
//! sibling and nesting is bounded by `max_depth`.
//!
//! Per container frame:
//! - decode a header at the cursor; a header that does not fit, a declared
//!   length below the header size, or one past the end of the frame stops
//!   this frame with a diagnostic
//! - a declared length over `max_record_size` skips the record if it fits
//!   in the frame and stops the frame if it does not
//! - advance the frame cursor by the declared length, before the body is
//!   looked at, so a handler can never desynchronize its siblings
//! - dispatch: push a child frame for containers, call leaf handlers on a
//!   cursor scoped to the body, note unknown types

mod owned;
mod record;

pub use owned::{walk_owned, OwnedRecord, OwnedWalk};
pub use record::{Record, RecordKind};

use crate::config::WalkerConfig;
use crate::cursor::ByteCursor;
use crate::diagnostics::{DiagnosticKind, DiagnosticRecord, DiagnosticSink};
use crate::error::WalkError;
use crate::header::{decode_header, HeaderDecoder, TypeCode};
use crate::registry::{Capability, FieldSink, HandlerRegistry, ParseContext};

/// Cursor state of one container being walked
#[derive(Debug, Clone, Copy)]
struct Frame<'buf> {
    cursor: ByteCursor<'buf>,
    depth: u32,
}

/// Lazy, depth-first walk over one buffer.
///
/// Yields `Err` at most once, and only when the first top-level header
/// does not fit; every other problem becomes a diagnostic.
pub struct RecordWalker<'buf, 'w> {
    decoder: &'w dyn HeaderDecoder,
    registry: &'w HandlerRegistry,
    config: WalkerConfig,
    stack: Vec<Frame<'buf>>,
    /// Container types of every frame above the root, outermost first
    ancestors: Vec<TypeCode>,
    diagnostics: DiagnosticSink,
    /// Message header bytes in front of the walked span
    preamble: &'buf [u8],
    visited: usize,
    top_level_decoded: bool,
}

impl<'buf, 'w> RecordWalker<'buf, 'w> {
    /// Walk the whole buffer
    pub fn new(
        buffer: &'buf [u8],
        decoder: &'w dyn HeaderDecoder,
        registry: &'w HandlerRegistry,
        config: &WalkerConfig,
    ) -> Self {
        Self::over(ByteCursor::new(buffer), decoder, registry, config)
    }

    /// Walk the span covered by `cursor`, e.g. the attribute area after a
    /// fixed message header
    pub fn over(
        cursor: ByteCursor<'buf>,
        decoder: &'w dyn HeaderDecoder,
        registry: &'w HandlerRegistry,
        config: &WalkerConfig,
    ) -> Self {
        tracing::debug!(
            "Walking {} bytes at {} as {}",
            cursor.remaining(),
            cursor.offset(),
            decoder.name()
        );
        Self {
            decoder,
            registry,
            config: config.clone(),
            stack: vec![Frame { cursor, depth: 0 }],
            ancestors: Vec::new(),
            diagnostics: DiagnosticSink::new(config.max_diagnostics),
            preamble: &[],
            visited: 0,
            top_level_decoded: false,
        }
    }

    /// Attach the already decoded message header that precedes the span.
    ///
    /// Leaf handlers see it as [`ParseContext::preamble`]. With a preamble
    /// in place the outermost header has been decoded, so a first record
    /// that does not fit is reported as a diagnostic instead of an `Err`.
    pub fn with_preamble(mut self, preamble: &'buf [u8]) -> Self {
        self.preamble = preamble;
        self.top_level_decoded |= !preamble.is_empty();
        self
    }

    /// Record a problem found before walking, e.g. in a message header
    pub fn with_diagnostic(mut self, record: DiagnosticRecord) -> Self {
        self.diagnostics.push(record);
        self
    }

    /// Diagnostics recorded so far
    pub fn diagnostics(&self) -> &DiagnosticSink {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> DiagnosticSink {
        self.diagnostics
    }

    /// Drain the walker into a [`WalkOutput`]
    pub fn finish(mut self) -> Result<WalkOutput<'buf>, WalkError> {
        let mut records = Vec::new();
        for record in self.by_ref() {
            records.push(record?);
        }
        let sink = self.into_diagnostics();
        let suppressed = sink.suppressed();
        tracing::debug!(
            "Walk finished: {} records, {} diagnostics",
            records.len(),
            sink.len()
        );
        Ok(WalkOutput {
            records,
            diagnostics: sink.into_records(),
            suppressed,
        })
    }

    fn pop_frame(&mut self) {
        if let Some(frame) = self.stack.pop() {
            if frame.depth > 0 {
                self.ancestors.pop();
            }
        }
    }

    fn report(&mut self, record: DiagnosticRecord) {
        self.diagnostics.push(record);
    }

    fn next_record(&mut self) -> Option<Result<Record<'buf>, WalkError>> {
        loop {
            let frame = *self.stack.last()?;

            if frame.cursor.is_empty() {
                self.pop_frame();
                continue;
            }

            if self.visited >= self.config.max_records {
                self.report(
                    DiagnosticRecord::new(
                        DiagnosticKind::RecordLimit,
                        frame.cursor.offset(),
                        format!("stopped after {} records", self.visited),
                    )
                    .at_depth(frame.depth),
                );
                self.stack.clear();
                self.ancestors.clear();
                return None;
            }

            let start = frame.cursor.offset();
            let header = match decode_header(self.decoder, &frame.cursor) {
                Ok(header) => header,
                Err(err) => {
                    if frame.depth == 0
                        && !self.top_level_decoded
                        && matches!(err, WalkError::Truncated { .. })
                    {
                        self.stack.clear();
                        return Some(Err(err));
                    }
                    let kind = DiagnosticKind::for_header_error(&err);
                    self.report(
                        DiagnosticRecord::new(kind, err.offset(), err.to_string())
                            .at_depth(frame.depth),
                    );
                    self.pop_frame();
                    continue;
                }
            };
            if frame.depth == 0 {
                self.top_level_decoded = true;
            }

            let declared = header.declared_length;
            if declared < header.header_size as u64 {
                let message = if declared == 0 {
                    "declared length 0 (extends to end of span) is not supported".to_string()
                } else {
                    format!(
                        "declared length {} is smaller than header size {}",
                        declared, header.header_size
                    )
                };
                self.report(
                    DiagnosticRecord::new(DiagnosticKind::MalformedLength, start, message)
                        .at_depth(frame.depth)
                        .with_type(header.type_code),
                );
                self.pop_frame();
                continue;
            }

            if declared > self.config.max_record_size {
                let fits = declared <= frame.cursor.remaining() as u64;
                let err = WalkError::SizeTooLarge {
                    offset: start,
                    declared,
                    ceiling: self.config.max_record_size,
                };
                let message = if fits {
                    format!("{}; record skipped", err)
                } else {
                    format!("{}; rest of container not walked", err)
                };
                self.report(
                    DiagnosticRecord::new(DiagnosticKind::SizeTooLarge, start, message)
                        .at_depth(frame.depth)
                        .with_type(header.type_code),
                );
                let mut next_sibling = frame.cursor;
                if fits && next_sibling.skip(declared as usize).is_ok() {
                    if let Some(top) = self.stack.last_mut() {
                        top.cursor = next_sibling;
                    }
                    self.visited += 1;
                } else {
                    self.pop_frame();
                }
                continue;
            }

            if declared > frame.cursor.remaining() as u64 {
                self.report(
                    DiagnosticRecord::new(
                        DiagnosticKind::TruncatedRecord,
                        start,
                        format!(
                            "declared length {} exceeds {} bytes left in container",
                            declared,
                            frame.cursor.remaining()
                        ),
                    )
                    .at_depth(frame.depth)
                    .with_type(header.type_code),
                );
                self.pop_frame();
                continue;
            }

            // Length checked against the frame above, so neither the skip
            // nor the sub-cursors below can fail.
            let len = declared as usize;
            let record_cursor = frame.cursor;
            let mut next_sibling = record_cursor;
            if next_sibling.skip(len).is_err() {
                self.pop_frame();
                continue;
            }
            if let Some(top) = self.stack.last_mut() {
                top.cursor = next_sibling;
            }
            self.visited += 1;

            let body_end = len.saturating_sub(header.padding).max(header.header_size);
            let body_cursor = match record_cursor.sub_cursor(header.header_size, body_end) {
                Ok(body) => body,
                Err(_) => continue,
            };

            tracing::debug!(
                "Record {} at {} depth={} len={}",
                header.type_code,
                start,
                frame.depth,
                len
            );

            let mut record = Record {
                header,
                offset: start,
                depth: frame.depth,
                kind: RecordKind::Unknown,
                parent: self.ancestors.last().copied(),
                fields: Vec::new(),
                body: body_cursor.rest(),
            };

            let registry = self.registry;
            match registry.lookup(header.type_code) {
                Capability::Container { prefix } => {
                    let prefix = *prefix;
                    if frame.depth >= self.config.max_depth {
                        record.kind = RecordKind::Opaque;
                        self.report(
                            DiagnosticRecord::new(
                                DiagnosticKind::DepthExceeded,
                                start,
                                format!(
                                    "nesting deeper than {} not walked",
                                    self.config.max_depth
                                ),
                            )
                            .at_depth(frame.depth)
                            .with_type(header.type_code),
                        );
                    } else {
                        match body_cursor.sub_cursor(prefix, body_cursor.remaining()) {
                            Ok(children) => {
                                record.kind = RecordKind::Container;
                                self.stack.push(Frame {
                                    cursor: children,
                                    depth: frame.depth + 1,
                                });
                                self.ancestors.push(header.type_code);
                            }
                            Err(err) => {
                                record.kind = RecordKind::Opaque;
                                self.report(
                                    DiagnosticRecord::new(
                                        DiagnosticKind::TruncatedContainer,
                                        body_cursor.offset(),
                                        format!("container prefix does not fit: {}", err),
                                    )
                                    .at_depth(frame.depth)
                                    .with_type(header.type_code),
                                );
                            }
                        }
                    }
                }
                Capability::Leaf(handler) => {
                    let ctx = ParseContext {
                        header,
                        offset: start,
                        depth: frame.depth,
                        ancestors: &self.ancestors,
                        preamble: self.preamble,
                    };
                    let mut body = body_cursor;
                    let mut fields = FieldSink::new();
                    let outcome = handler.parse(&mut body, &ctx, &mut fields);
                    record.fields = fields.into_fields();
                    match outcome {
                        Ok(()) => record.kind = RecordKind::Leaf,
                        Err(err) => {
                            record.kind = RecordKind::Failed;
                            self.report(
                                DiagnosticRecord::new(
                                    DiagnosticKind::LeafError,
                                    start,
                                    err.to_string(),
                                )
                                .at_depth(frame.depth)
                                .with_type(header.type_code),
                            );
                        }
                    }
                }
                Capability::Skip => {
                    if registry.is_registered(header.type_code) {
                        record.kind = RecordKind::Skipped;
                    } else if self.config.report_unknown {
                        self.report(
                            DiagnosticRecord::new(
                                DiagnosticKind::UnknownType,
                                start,
                                format!("no handler for type {}", header.type_code),
                            )
                            .at_depth(frame.depth)
                            .with_type(header.type_code),
                        );
                    }
                }
            }

            return Some(Ok(record));
        }
    }
}

impl<'buf, 'w> Iterator for RecordWalker<'buf, 'w> {
    type Item = Result<Record<'buf>, WalkError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record()
    }
}

/// Everything one completed walk produced
#[derive(Debug, Clone)]
pub struct WalkOutput<'buf> {
    /// Records in buffer order, parents before their children
    pub records: Vec<Record<'buf>>,
    pub diagnostics: Vec<DiagnosticRecord>,
    /// Diagnostics dropped past `max_diagnostics`
    pub suppressed: usize,
}

impl<'buf> WalkOutput<'buf> {
    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.diagnostics.iter().filter(|d| d.kind == kind).count()
    }

    pub fn max_depth(&self) -> Option<u32> {
        self.records.iter().map(|r| r.depth).max()
    }
}

/// Walk `buffer` to completion.
///
/// Fails only when not even the first top-level header fits.
pub fn walk<'buf>(
    buffer: &'buf [u8],
    decoder: &dyn HeaderDecoder,
    registry: &HandlerRegistry,
    config: &WalkerConfig,
) -> Result<WalkOutput<'buf>, WalkError> {
    walk_cursor(ByteCursor::new(buffer), decoder, registry, config)
}

/// Walk the span of `cursor` to completion
pub fn walk_cursor<'buf>(
    cursor: ByteCursor<'buf>,
    decoder: &dyn HeaderDecoder,
    registry: &HandlerRegistry,
    config: &WalkerConfig,
) -> Result<WalkOutput<'buf>, WalkError> {
    RecordWalker::over(cursor, decoder, registry, config).finish()
}
