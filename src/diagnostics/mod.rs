//! Non-fatal findings collected during one walk
//!
//! The sink is append-only and owned by the top-level walk. Its size is
//! capped; findings past the cap are only counted.

use std::fmt;

use serde::Serialize;

use crate::error::WalkError;
use crate::header::TypeCode;

/// What went wrong (or was merely noticed)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Not even a header fits in the rest of a container
    TruncatedContainer,
    /// Declared length runs past the enclosing span
    TruncatedRecord,
    /// Declared length below header size, or an unsupported sentinel
    MalformedLength,
    /// Header bytes violate the format
    MalformedHeader,
    /// Declared length above the configured ceiling
    SizeTooLarge,
    /// Recursion guard tripped; subtree left opaque
    DepthExceeded,
    /// No handler registered for the type
    UnknownType,
    /// A leaf handler failed on its body
    LeafError,
    /// Iteration guard tripped; walk stopped
    RecordLimit,
}

/// How loud a finding should be when presented
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Note,
    Warning,
    Error,
}

impl DiagnosticKind {
    pub fn severity(self) -> Severity {
        match self {
            DiagnosticKind::UnknownType => Severity::Note,
            DiagnosticKind::DepthExceeded
            | DiagnosticKind::TruncatedContainer
            | DiagnosticKind::LeafError
            | DiagnosticKind::RecordLimit => Severity::Warning,
            DiagnosticKind::TruncatedRecord
            | DiagnosticKind::MalformedLength
            | DiagnosticKind::MalformedHeader
            | DiagnosticKind::SizeTooLarge => Severity::Error,
        }
    }

    /// Kind used when a header-level engine error stops a container
    pub fn for_header_error(err: &WalkError) -> Self {
        match err {
            WalkError::Truncated { .. } => DiagnosticKind::TruncatedContainer,
            WalkError::MalformedLength { .. } => DiagnosticKind::MalformedLength,
            WalkError::MalformedHeader { .. } => DiagnosticKind::MalformedHeader,
            WalkError::SizeTooLarge { .. } => DiagnosticKind::SizeTooLarge,
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiagnosticKind::TruncatedContainer => "truncated container",
            DiagnosticKind::TruncatedRecord => "truncated record",
            DiagnosticKind::MalformedLength => "malformed length",
            DiagnosticKind::MalformedHeader => "malformed header",
            DiagnosticKind::SizeTooLarge => "size too large",
            DiagnosticKind::DepthExceeded => "depth exceeded",
            DiagnosticKind::UnknownType => "unknown type",
            DiagnosticKind::LeafError => "leaf error",
            DiagnosticKind::RecordLimit => "record limit",
        };
        f.write_str(name)
    }
}

/// One finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticRecord {
    pub kind: DiagnosticKind,
    /// Absolute byte offset in the top-level buffer
    pub byte_offset: usize,
    /// Nesting depth of the container being walked
    pub depth: u32,
    /// Type of the offending record, when its header was decoded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_code: Option<TypeCode>,
    pub message: String,
}

impl DiagnosticRecord {
    pub fn new(kind: DiagnosticKind, byte_offset: usize, message: impl Into<String>) -> Self {
        Self {
            kind,
            byte_offset,
            depth: 0,
            type_code: None,
            message: message.into(),
        }
    }

    pub fn at_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_type(mut self, type_code: TypeCode) -> Self {
        self.type_code = Some(type_code);
        self
    }
}

impl fmt::Display for DiagnosticRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] @{} depth={}", self.kind, self.byte_offset, self.depth)?;
        if let Some(ty) = self.type_code {
            write!(f, " type={}", ty)?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Append-only collector for one walk
#[derive(Debug, Clone)]
pub struct DiagnosticSink {
    records: Vec<DiagnosticRecord>,
    capacity: usize,
    suppressed: usize,
}

impl DiagnosticSink {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Vec::new(),
            capacity,
            suppressed: 0,
        }
    }

    /// Record a finding at depth 0 with no type attached
    pub fn record(&mut self, kind: DiagnosticKind, offset: usize, message: impl Into<String>) {
        self.push(DiagnosticRecord::new(kind, offset, message));
    }

    pub fn push(&mut self, record: DiagnosticRecord) {
        match record.kind.severity() {
            Severity::Note => tracing::debug!("{}", record),
            Severity::Warning | Severity::Error => tracing::warn!("{}", record),
        }
        if self.records.len() < self.capacity {
            self.records.push(record);
        } else {
            self.suppressed += 1;
        }
    }

    pub fn records(&self) -> &[DiagnosticRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Findings dropped because the sink was full
    pub fn suppressed(&self) -> usize {
        self.suppressed
    }

    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.records.iter().filter(|r| r.kind == kind).count()
    }

    pub fn into_records(self) -> Vec<DiagnosticRecord> {
        self.records
    }
}

impl Default for DiagnosticSink {
    fn default() -> Self {
        Self::new(usize::MAX)
    }
}
