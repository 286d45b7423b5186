//! Source locations attached to IR values for diagnostics and debug info.

use core::fmt;

/// A location in the original managed bytecode stream: the method's
/// metadata token plus a byte offset into its instruction stream.
///
/// `SourceLoc::default()` is the "unknown" location, used for IR created
/// by passes (constant folding, inlining) that have no single originating
/// bytecode offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SourceLoc {
    bits: u32,
}

const UNKNOWN: u32 = u32::MAX;

impl SourceLoc {
    /// Build a location from a raw bytecode offset.
    pub fn new(offset: u32) -> Self {
        debug_assert!(offset != UNKNOWN, "offset collides with the unknown sentinel");
        Self { bits: offset }
    }

    /// The location used when no bytecode offset applies.
    pub fn unknown() -> Self {
        Self { bits: UNKNOWN }
    }

    /// Is this the unknown location?
    pub fn is_unknown(self) -> bool {
        self.bits == UNKNOWN
    }

    /// The raw bytecode offset, if known.
    pub fn offset(self) -> Option<u32> {
        if self.is_unknown() {
            None
        } else {
            Some(self.bits)
        }
    }
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.offset() {
            Some(off) => write!(f, "+{:#06x}", off),
            None => write!(f, "<unknown>"),
        }
    }
}
