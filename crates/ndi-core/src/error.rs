//! Core error types for ndi-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering the
//! failure modes of the document model, the query builder, and the cache.

use thiserror::Error;

/// Core errors produced by the ndi-core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A named dependency slot does not exist on the document.
    #[error("dependency not found: '{name}'")]
    DependencyNotFound { name: String },

    /// A file name is not part of the document's file manifest.
    #[error("file not in manifest: '{name}'")]
    FileNotInManifest { name: String },

    /// A caller-supplied argument was malformed.
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// A string is not a well-formed document id token.
    #[error("invalid document id: '{value}'")]
    InvalidId { value: String },

    /// A cache insertion could not be satisfied within the memory budget.
    #[error("cache capacity exceeded: requested {requested} bytes, {available} available ({reason})")]
    CapacityExceeded {
        requested: u64,
        available: u64,
        reason: String,
    },
}

impl CoreError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        CoreError::InvalidArgument {
            reason: reason.into(),
        }
    }
}
