//! Concrete record formats.
//!
//! Each adapter bundles a header decoder, a default handler registry and a
//! cheap sniffing check. [`Format`] is the serializable selector used by the
//! config file and the CLI.

pub mod ecp;
pub mod isobmff;
pub mod p3;
pub mod stun;
pub mod tlv;
pub mod xot;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::WalkerConfig;
use crate::cursor::ByteCursor;
use crate::diagnostics::DiagnosticRecord;
use crate::error::{Error, WalkError};
use crate::header::HeaderDecoder;
use crate::registry::HandlerRegistry;
use crate::walker::{RecordWalker, WalkOutput};

pub use ecp::Ecp;
pub use isobmff::IsoBmff;
pub use p3::P3;
pub use stun::Stun;
pub use tlv::{TlvFormat, TlvLayout};
pub use xot::Xot;

/// A record format the walker can be pointed at
pub trait FormatAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    fn decoder(&self) -> &dyn HeaderDecoder;

    fn registry(&self) -> &HandlerRegistry;

    /// Whether `buf` plausibly starts with this format
    fn probe(&self, buf: &[u8]) -> bool;

    /// Span holding the records, for formats with a fixed preamble.
    ///
    /// `Err` only when the preamble itself does not fit; a preamble that
    /// fits but is wrong comes back as a diagnostic on the span.
    fn record_span<'a>(&self, buf: &'a [u8]) -> Result<RecordSpan<'a>, WalkError> {
        Ok(RecordSpan::whole(buf))
    }

    fn walk<'a>(&self, buf: &'a [u8], config: &WalkerConfig) -> Result<WalkOutput<'a>, WalkError> {
        let span = self.record_span(buf)?;
        let mut walker = RecordWalker::over(span.cursor, self.decoder(), self.registry(), config)
            .with_preamble(span.preamble);
        if let Some(diagnostic) = span.diagnostic {
            walker = walker.with_diagnostic(diagnostic);
        }
        walker.finish()
    }
}

/// Records area of a message, split from its fixed header
#[derive(Debug, Clone)]
pub struct RecordSpan<'a> {
    pub cursor: ByteCursor<'a>,
    /// Header bytes before `cursor`, handed to leaf handlers
    pub preamble: &'a [u8],
    /// Problem found in the preamble
    pub diagnostic: Option<DiagnosticRecord>,
}

impl<'a> RecordSpan<'a> {
    /// The whole buffer, no preamble
    pub fn whole(buf: &'a [u8]) -> Self {
        Self {
            cursor: ByteCursor::new(buf),
            preamble: &[],
            diagnostic: None,
        }
    }

    pub fn with_diagnostic(mut self, diagnostic: DiagnosticRecord) -> Self {
        self.diagnostic = Some(diagnostic);
        self
    }
}

/// Settings for a configured TLV format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlvSettings {
    #[serde(flatten)]
    pub layout: TlvLayout,
    /// Type codes whose values hold nested records
    #[serde(default)]
    pub containers: Vec<u32>,
}

/// Format selector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Format {
    Isobmff,
    Stun,
    Ecp,
    P3,
    Xot,
    Tlv(TlvSettings),
}

impl Format {
    /// Formats tried by [`Format::detect`], most distinctive first
    const SNIFF_ORDER: [Format; 5] = [
        Format::Isobmff,
        Format::Stun,
        Format::P3,
        Format::Xot,
        Format::Ecp,
    ];

    pub fn adapter(&self) -> Result<Box<dyn FormatAdapter>, Error> {
        Ok(match self {
            Format::Isobmff => Box::new(IsoBmff::new()),
            Format::Stun => Box::new(Stun::new()),
            Format::Ecp => Box::new(Ecp::new()),
            Format::P3 => Box::new(P3::new()),
            Format::Xot => Box::new(Xot::new()),
            Format::Tlv(tlv) => {
                tlv.layout.validate()?;
                Box::new(TlvFormat::new(tlv.layout, &tlv.containers))
            }
        })
    }

    /// Pick the first built-in format whose probe accepts `buf`
    pub fn detect(buf: &[u8]) -> Option<Format> {
        let found = Self::SNIFF_ORDER
            .iter()
            .find(|format| {
                format
                    .adapter()
                    .map(|adapter| adapter.probe(buf))
                    .unwrap_or(false)
            })
            .cloned();
        tracing::debug!("Format sniffing picked {:?}", found);
        found
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Format::Isobmff => "isobmff",
            Format::Stun => "stun",
            Format::Ecp => "ecp",
            Format::P3 => "p3",
            Format::Xot => "xot",
            Format::Tlv(_) => "tlv",
        };
        f.write_str(name)
    }
}

impl FromStr for Format {
    type Err = Error;

    /// `tlv` selects 1-byte type / 1-byte length with no containers
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "isobmff" | "mp4" | "bmff" => Ok(Format::Isobmff),
            "stun" => Ok(Format::Stun),
            "ecp" | "vdp" => Ok(Format::Ecp),
            "p3" | "aol" => Ok(Format::P3),
            "xot" => Ok(Format::Xot),
            "tlv" => Ok(Format::Tlv(TlvSettings {
                layout: TlvLayout::TYPE8_LEN8,
                containers: Vec::new(),
            })),
            other => Err(Error::Config(format!("unknown format: {}", other))),
        }
    }
}
