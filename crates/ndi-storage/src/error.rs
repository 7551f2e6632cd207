//! Storage error types for ndi-storage.
//!
//! [`StorageError`] covers every failure mode of the backends: document
//! model errors bubbling up from ndi-core, serialization, SQLite and
//! migration failures, filesystem I/O, and the contract-level conditions
//! (`NotFound`, `Conflict`, `Unsupported`) shared by all backends.

use std::path::PathBuf;

use ndi_core::CoreError;
use thiserror::Error;

/// Errors produced by storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A document-model error (bad id, missing dependency, full cache).
    #[error(transparent)]
    Core(#[from] CoreError),

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The SQLite engine reported an error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Applying schema migrations failed.
    #[error("migration error: {0}")]
    Migration(String),

    /// A filesystem operation failed.
    #[error("i/o error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A document or binary file does not exist.
    #[error("not found: {what}")]
    NotFound { what: String },

    /// A document with this id already exists and `update` was not requested.
    #[error("document {id} already exists")]
    Conflict { id: String },

    /// The backend does not implement this operation.
    #[error("{backend} backend does not support {operation}")]
    Unsupported {
        backend: &'static str,
        operation: &'static str,
    },

    /// No backend could be opened or created at the path.
    #[error("no database backend available at {}: {}", path.display(), attempts.join("; "))]
    BackendUnavailable { path: PathBuf, attempts: Vec<String> },

    /// Copying a file into the database failed after the document metadata
    /// was written.
    #[error("failed to ingest {} into {}: {reason}", origin.display(), destination.display())]
    Ingest {
        origin: PathBuf,
        destination: PathBuf,
        reason: String,
    },
}

impl StorageError {
    /// Wraps an I/O error with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        StorageError::NotFound { what: what.into() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}
