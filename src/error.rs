//! Crate-wide error type.
//!
//! Every failure while parsing or producing a container surfaces as a
//! [`DsStoreError`].  Format and range errors are always fatal to the
//! current `load`/`save`; nothing is partially applied.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DsStoreError {
    /// Structural violation at a known byte offset of the container.
    #[error("Malformed container at offset {offset:#x}: {reason}")]
    Format { offset: u64, reason: String },

    #[error("Bad magic: expected {expected:#010x}, found {found:#010x}")]
    BadMagic { expected: u32, found: u32 },

    #[error("Unsupported version: expected 1, found {found:#010x}")]
    BadVersion { found: u32 },

    /// A resolved block address or read fell outside the file.
    #[error("Range {offset:#x}+{len} exceeds limit {limit:#x}")]
    Range { offset: u64, len: u64, limit: u64 },

    /// The record set does not fit in the single leaf block the writer emits.
    #[error("Records need {needed} bytes but the leaf block holds {capacity}")]
    CapacityExceeded { needed: usize, capacity: usize },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl DsStoreError {
    pub(crate) fn format(offset: u64, reason: impl Into<String>) -> Self {
        DsStoreError::Format { offset, reason: reason.into() }
    }

    /// True for every error that means "this file is not a valid container".
    /// Range errors count: callers treat an out-of-bounds address as corruption.
    pub fn is_format(&self) -> bool {
        matches!(
            self,
            DsStoreError::Format { .. }
                | DsStoreError::BadMagic { .. }
                | DsStoreError::BadVersion { .. }
                | DsStoreError::Range { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, DsStoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_counts_as_format() {
        let e = DsStoreError::Range { offset: 0x40, len: 8, limit: 0x20 };
        assert!(e.is_format());
        assert!(!DsStoreError::Io(io::Error::new(io::ErrorKind::Other, "x")).is_format());
    }

    #[test]
    fn magic_message_carries_both_values() {
        let msg = DsStoreError::BadMagic { expected: 0x42756431, found: 0xdeadbeef }.to_string();
        assert!(msg.contains("0x42756431"));
        assert!(msg.contains("0xdeadbeef"));
    }
}
