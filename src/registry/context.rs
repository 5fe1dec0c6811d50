//! Ancestor information handed to leaf handlers

use crate::header::{RecordHeader, TypeCode};

/// Where the record being handled sits in the tree.
///
/// Replaces threading a raw "parent type" integer through every handler:
/// the walker builds one of these per record from its frame stack.
#[derive(Debug, Clone, Copy)]
pub struct ParseContext<'a> {
    /// Header of the record being handled
    pub header: RecordHeader,
    /// Absolute offset of the record start
    pub offset: usize,
    /// Nesting depth (top-level records are depth 0)
    pub depth: u32,
    /// Types of the enclosing containers, outermost first
    pub ancestors: &'a [TypeCode],
    /// Fixed message header in front of the records (STUN, ECP), or empty
    pub preamble: &'a [u8],
}

impl<'a> ParseContext<'a> {
    pub fn type_code(&self) -> TypeCode {
        self.header.type_code
    }

    /// Type of the directly enclosing container
    pub fn parent(&self) -> Option<TypeCode> {
        self.ancestors.last().copied()
    }

    pub fn has_ancestor(&self, code: TypeCode) -> bool {
        self.ancestors.contains(&code)
    }
}
