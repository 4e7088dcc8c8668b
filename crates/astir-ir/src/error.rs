//! `spec.md` §7 error kinds, structured as one `thiserror` enum with
//! struct-style variants carrying the offending id or location rather than
//! a formatted string.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::id::{DebugEntryId, TypeEntryId};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TranslateError {
    #[error("invalid parameter: {reason}")]
    InvalidParameter { reason: String },

    #[error("internal invariant violated: {reason}")]
    InvalidState { reason: String },

    #[error("not a constant expression at {location:?}")]
    NotConstant { location: SourceLocation },

    #[error("unsupported: {feature}")]
    NotSupported { feature: String },

    #[error("analysis error at {location:?}: {reason}")]
    AnalysisError {
        location: SourceLocation,
        reason: String,
    },

    #[error("memory allocation failure")]
    MemoryAllocationFailure,

    #[error("object allocation failure")]
    ObjectAllocationFailure,

    /// Bit-field allocator signal, not a user-facing error; recovered
    /// internally by the allocator loop.
    #[error("bit-field storage unit exhausted")]
    OutOfSpace,

    #[error("not found: {what}")]
    NotFound { what: String },

    /// Iterator-end signal, not an error; surfaced through the same enum so
    /// callers that thread `Result<_, TranslateError>` do not need a second
    /// error type for internal cursors.
    #[error("iterator end")]
    IteratorEnd,

    #[error("type entry {id} not found")]
    TypeEntryNotFound { id: TypeEntryId },

    #[error("debug entry {id} not found")]
    DebugEntryNotFound { id: DebugEntryId },
}

impl TranslateError {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, TranslateError::OutOfSpace | TranslateError::NotFound { .. } | TranslateError::IteratorEnd)
    }

    pub fn invalid_parameter(reason: impl Into<String>) -> Self {
        TranslateError::InvalidParameter {
            reason: reason.into(),
        }
    }

    pub fn invalid_state(reason: impl Into<String>) -> Self {
        TranslateError::InvalidState {
            reason: reason.into(),
        }
    }

    pub fn analysis_error(location: SourceLocation, reason: impl Into<String>) -> Self {
        TranslateError::AnalysisError {
            location,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TranslateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_space_is_recoverable() {
        assert!(TranslateError::OutOfSpace.is_recoverable());
        assert!(!TranslateError::MemoryAllocationFailure.is_recoverable());
    }

    #[test]
    fn not_found_is_recoverable() {
        let err = TranslateError::NotFound {
            what: "debug entry".into(),
        };
        assert!(err.is_recoverable());
    }

    #[test]
    fn display_includes_location() {
        let err = TranslateError::NotConstant {
            location: SourceLocation { line: 3, column: 9 },
        };
        let message = err.to_string();
        assert!(message.contains("not a constant expression"));
    }
}
