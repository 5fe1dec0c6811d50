//! Handler registry: record type code -> what to do with the body.
//!
//! Built once per format adapter before any walk, then only read. Unknown
//! types resolve to [`Capability::Skip`], so they are never fatal.
//!
//! # Example
//!
//! ```
//! use record_walker::cursor::{ByteCursor, Endian};
//! use record_walker::error::LeafError;
//! use record_walker::header::TypeCode;
//! use record_walker::registry::{Capability, FieldSink, HandlerRegistry, ParseContext};
//!
//! fn version(
//!     body: &mut ByteCursor<'_>,
//!     _ctx: &ParseContext<'_>,
//!     fields: &mut FieldSink,
//! ) -> Result<(), LeafError> {
//!     let at = body.offset();
//!     fields.add("version", at, body.read_u8()?);
//!     Ok(())
//! }
//!
//! let registry = HandlerRegistry::new()
//!     .container(TypeCode::fourcc(b"moov"))
//!     .leaf(TypeCode::fourcc(b"mvhd"), version);
//!
//! assert!(matches!(registry.lookup(TypeCode::fourcc(b"moov")), Capability::Container { .. }));
//! assert!(matches!(registry.lookup(TypeCode::fourcc(b"zzzz")), Capability::Skip));
//! ```

mod context;
mod fields;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub use context::ParseContext;
pub use fields::{Field, FieldSink, FieldValue};

use crate::cursor::ByteCursor;
use crate::error::LeafError;
use crate::header::TypeCode;

/// Interprets the body of one leaf record.
///
/// `body` is scoped to the record body; reading past it fails. How far the
/// handler reads has no effect on where the next sibling starts.
pub trait LeafHandler: Send + Sync {
    fn parse(
        &self,
        body: &mut ByteCursor<'_>,
        ctx: &ParseContext<'_>,
        fields: &mut FieldSink,
    ) -> Result<(), LeafError>;
}

impl<F> LeafHandler for F
where
    F: Fn(&mut ByteCursor<'_>, &ParseContext<'_>, &mut FieldSink) -> Result<(), LeafError>
        + Send
        + Sync,
{
    fn parse(
        &self,
        body: &mut ByteCursor<'_>,
        ctx: &ParseContext<'_>,
        fields: &mut FieldSink,
    ) -> Result<(), LeafError> {
        self(body, ctx, fields)
    }
}

/// What the walker does with a record of a given type
#[derive(Clone)]
pub enum Capability {
    /// Body is interpreted by a handler
    Leaf(Arc<dyn LeafHandler>),
    /// Body holds sibling records, starting `prefix` bytes into the body
    /// (e.g. the version/flags word of an ISOBMFF full box)
    Container { prefix: usize },
    /// Body is consumed without interpretation
    Skip,
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Leaf(_) => f.write_str("Leaf"),
            Capability::Container { prefix } => write!(f, "Container {{ prefix: {} }}", prefix),
            Capability::Skip => f.write_str("Skip"),
        }
    }
}

static SKIP: Capability = Capability::Skip;

/// Mapping from type code to capability
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<TypeCode, Capability>,
}

impl HandlerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability, replacing any earlier one for the same code
    pub fn register(&mut self, type_code: TypeCode, capability: Capability) {
        if self.handlers.insert(type_code, capability).is_some() {
            tracing::debug!("Replaced handler for type {}", type_code);
        }
    }

    /// Register a leaf handler function
    pub fn leaf<F>(mut self, type_code: TypeCode, handler: F) -> Self
    where
        F: Fn(&mut ByteCursor<'_>, &ParseContext<'_>, &mut FieldSink) -> Result<(), LeafError>
            + Send
            + Sync
            + 'static,
    {
        self.register(type_code, Capability::Leaf(Arc::new(handler)));
        self
    }

    /// Register a leaf handler implemented as a type
    pub fn leaf_handler(mut self, type_code: TypeCode, handler: Arc<dyn LeafHandler>) -> Self {
        self.register(type_code, Capability::Leaf(handler));
        self
    }

    /// Register a container whose children start right after the header
    pub fn container(self, type_code: TypeCode) -> Self {
        self.container_with_prefix(type_code, 0)
    }

    /// Register a container whose children start `prefix` bytes into the body
    pub fn container_with_prefix(mut self, type_code: TypeCode, prefix: usize) -> Self {
        self.register(type_code, Capability::Container { prefix });
        self
    }

    /// Register a type as known but uninterpreted (no `UnknownType` note)
    pub fn skip(mut self, type_code: TypeCode) -> Self {
        self.register(type_code, Capability::Skip);
        self
    }

    /// Capability for `type_code`; `Skip` when unregistered
    pub fn lookup(&self, type_code: TypeCode) -> &Capability {
        self.handlers.get(&type_code).unwrap_or(&SKIP)
    }

    pub fn is_registered(&self, type_code: TypeCode) -> bool {
        self.handlers.contains_key(&type_code)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Registered type codes, sorted
    pub fn type_codes(&self) -> Vec<TypeCode> {
        let mut codes: Vec<_> = self.handlers.keys().copied().collect();
        codes.sort();
        codes
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("types", &self.type_codes())
            .finish()
    }
}
