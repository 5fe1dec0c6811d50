use thiserror::Error;

/// Errors raised by the walking engine itself.
///
/// All of these are local to the record or container where they occur.
/// The walker turns them into diagnostics; only a `Truncated` on the very
/// first top-level header is surfaced to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalkError {
    /// Fewer bytes available than the next read needs
    #[error("Truncated at offset {offset}: need {needed} bytes, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// Declared length is smaller than the header, or uses an unsupported sentinel
    #[error("Malformed length at offset {offset}: declared={declared}, header_size={header_size}")]
    MalformedLength {
        offset: usize,
        declared: u64,
        header_size: usize,
    },

    /// Header bytes are present but violate the format (bad magic, reserved version)
    #[error("Malformed header at offset {offset}: {reason}")]
    MalformedHeader { offset: usize, reason: String },

    /// Declared length exceeds the configured ceiling or the host address space
    #[error("Record at offset {offset} too large: declared={declared}, ceiling={ceiling}")]
    SizeTooLarge {
        offset: usize,
        declared: u64,
        ceiling: u64,
    },
}

impl WalkError {
    /// Byte offset (absolute within the top-level buffer) the error refers to
    pub fn offset(&self) -> usize {
        match self {
            WalkError::Truncated { offset, .. }
            | WalkError::MalformedLength { offset, .. }
            | WalkError::MalformedHeader { offset, .. }
            | WalkError::SizeTooLarge { offset, .. } => *offset,
        }
    }
}

/// Failure reported by a leaf handler while interpreting a record body.
///
/// Never affects cursor advancement in the enclosing container.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LeafError {
    /// A read inside the body ran past the record
    #[error("{0}")]
    Cursor(#[from] WalkError),

    /// An embedded length disagrees with what the record holds
    #[error("Embedded length mismatch for {field}: declared {declared}, available {available}")]
    LengthMismatch {
        field: &'static str,
        declared: usize,
        available: usize,
    },

    /// Semantic violation of the record's layout
    #[error("Invalid record body: {0}")]
    Invalid(String),
}

/// Application-level error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML encode error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Walk failed: {0}")]
    Walk(#[from] WalkError),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_walk_error_offset() {
        let err = WalkError::SizeTooLarge {
            offset: 24,
            declared: u64::MAX,
            ceiling: 100,
        };
        assert_eq!(err.offset(), 24);
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn test_leaf_error_from_walk_error() {
        let err: LeafError = WalkError::Truncated {
            offset: 3,
            needed: 4,
            available: 1,
        }
        .into();
        assert!(matches!(err, LeafError::Cursor(WalkError::Truncated { .. })));
        assert!(err.to_string().contains("need 4 bytes"));
    }
}
