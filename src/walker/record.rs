//! Decoded records produced by the walker

use std::ops::Range;

use serde::Serialize;

use crate::header::{RecordHeader, TypeCode};
use crate::registry::Field;

/// How the walker treated a record's body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// Children follow in the walk
    Container,
    /// Leaf handler succeeded
    Leaf,
    /// Leaf handler failed; fields hold whatever it decoded first
    Failed,
    /// Container left unparsed (depth guard, or prefix did not fit)
    Opaque,
    /// Registered as skip
    Skipped,
    /// No handler registered
    Unknown,
}

/// One decoded record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record<'buf> {
    pub header: RecordHeader,
    /// Absolute offset of the first header byte
    pub offset: usize,
    pub depth: u32,
    pub kind: RecordKind,
    /// Type of the enclosing container
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<TypeCode>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<Field>,
    /// Body bytes (header and padding excluded)
    #[serde(skip)]
    pub body: &'buf [u8],
}

impl<'buf> Record<'buf> {
    pub fn type_code(&self) -> TypeCode {
        self.header.type_code
    }

    /// Total record length as declared by its header
    pub fn len(&self) -> usize {
        self.header.declared_length as usize
    }

    pub fn is_empty(&self) -> bool {
        self.header.declared_length == 0
    }

    /// Byte range of the whole record in the top-level buffer
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.len()
    }

    /// Byte range of the body in the top-level buffer
    pub fn body_range(&self) -> Range<usize> {
        let start = self.offset + self.header.header_size;
        start..start + self.body.len()
    }

    pub fn field(&self, name: &str) -> Option<&crate::registry::FieldValue> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.value)
    }
}
