// This module defines the error types for the offload pass using the thiserror crate.
// OffloadError is the pass-level enum. Its internal-consistency variants cover duplicate
// placeholder reservation or resolution, lookups of unknown placeholders, duplicate sections
// in the compiled device object, placeholders left unresolved after the section scan, offsets
// that do not fit the 32-bit call-site encoding, and placeholders that survive backpatching.
// Each carries the offending symbol. The remaining variants wrap failures of the external
// collaborators: the device image compiler and the object reader. is_internal() separates
// compiler-bug conditions from external failures. OffloadResult<T> is the convenience alias.

//! Error types for the offload pass.
//!
//! Using thiserror for more idiomatic error handling.

use crate::device::DeviceCompileError;
use thiserror::Error;

/// Main error type for the offload pass.
#[derive(Error, Debug)]
pub enum OffloadError {
    #[error("Placeholder {symbol} reserved more than once")]
    DuplicatePlaceholder {
        symbol: String,
    },

    #[error("Placeholder {symbol} resolved more than once")]
    DuplicateResolution {
        symbol: String,
    },

    #[error("No placeholder named {symbol}")]
    UnknownPlaceholder {
        symbol: String,
    },

    #[error("Found duplicate section {section}")]
    DuplicateSection {
        section: String,
    },

    #[error("Offset {offset:#x} to function {symbol} is not a 32 bit address")]
    OffsetOutOfRange {
        symbol: String,
        offset: u64,
    },

    #[error("Did not find compiled function {symbol}")]
    UnresolvedPlaceholder {
        symbol: String,
    },

    #[error("Placeholder {symbol} still referenced after backpatching")]
    PlaceholderRemains {
        symbol: String,
    },

    #[error("Device code compilation failed: {0}")]
    DeviceCompile(#[from] DeviceCompileError),

    #[error("Failed to open device object: {0}")]
    ObjectRead(#[from] object::Error),
}

impl OffloadError {
    /// Whether this error indicates a bug in the pass rather than a failure
    /// reported by one of its collaborators.
    pub fn is_internal(&self) -> bool {
        !matches!(self, OffloadError::DeviceCompile(_) | OffloadError::ObjectRead(_))
    }

    /// Symbol the diagnostic is about, if any.
    pub fn symbol(&self) -> Option<&str> {
        match self {
            OffloadError::DuplicatePlaceholder { symbol }
            | OffloadError::DuplicateResolution { symbol }
            | OffloadError::UnknownPlaceholder { symbol }
            | OffloadError::OffsetOutOfRange { symbol, .. }
            | OffloadError::UnresolvedPlaceholder { symbol }
            | OffloadError::PlaceholderRemains { symbol } => Some(symbol),
            OffloadError::DuplicateSection { section } => Some(section),
            OffloadError::DeviceCompile(_) | OffloadError::ObjectRead(_) => None,
        }
    }
}

/// Result type alias for offload operations.
pub type OffloadResult<T> = Result<T, OffloadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy() {
        let internal = OffloadError::UnresolvedPlaceholder { symbol: ".text.offload_f_argv".into() };
        assert!(internal.is_internal());
        assert_eq!(internal.symbol(), Some(".text.offload_f_argv"));
        assert_eq!(internal.to_string(), "Did not find compiled function .text.offload_f_argv");

        let external = OffloadError::from(DeviceCompileError::UnsupportedTarget { target: "hexagon-32-remote".into() });
        assert!(!external.is_internal());
        assert_eq!(external.symbol(), None);
    }
}
