//! The [`Database`] trait defining the storage contract for documents.
//!
//! All four backends implement this trait with identical observable
//! semantics: the same documents come back from `read` and `search`, `remove`
//! is idempotent and releases ingested binaries, and `add` without `update`
//! refuses to overwrite. Backends differ only in physical layout, binary
//! support, and how `search` narrows its candidates.
//!
//! The trait is synchronous and not internally locked; callers sharing one
//! instance must serialize access themselves.

use std::path::PathBuf;

use ndi_core::{Document, DocumentId, Query};

use crate::binary::BinaryDoc;
use crate::error::StorageError;
use crate::registry::BackendKind;

/// The storage contract for NDI documents.
pub trait Database {
    /// Which backend this is.
    fn kind(&self) -> BackendKind;

    /// The session reference this database was opened with.
    fn session_reference(&self) -> &str;

    // -------------------------------------------------------------------
    // Documents
    // -------------------------------------------------------------------

    /// Stores `doc`.
    ///
    /// Fails with [`StorageError::Conflict`] if a document with the same id
    /// exists and `update` is false. Backends that ingest binaries rewrite the
    /// ingested locations in `doc` before storing it.
    fn add(&mut self, doc: &mut Document, update: bool) -> Result<(), StorageError>;

    /// Reads a document, or `None` if absent.
    fn read(&self, id: &DocumentId) -> Result<Option<Document>, StorageError>;

    /// Removes a document and its ingested binaries. Removing an absent id is
    /// a no-op.
    fn remove(&mut self, id: &DocumentId) -> Result<(), StorageError>;

    /// Every stored document id.
    fn all_doc_ids(&self) -> Result<Vec<DocumentId>, StorageError>;

    /// Every stored document for which `query.matches` is true, in no
    /// particular order.
    fn search(&self, query: &Query) -> Result<Vec<Document>, StorageError>;

    // -------------------------------------------------------------------
    // Binary files
    // -------------------------------------------------------------------

    /// Opens ingested file `filename` of document `id`.
    ///
    /// Fails with [`StorageError::NotFound`] if the file was never ingested
    /// or has been removed.
    fn open_binary(&self, id: &DocumentId, filename: &str) -> Result<BinaryDoc, StorageError>;

    /// Whether the ingested file exists, and where it is (or would be).
    fn exists_binary(&self, id: &DocumentId, filename: &str) -> Result<(bool, PathBuf), StorageError>;

    /// Closes a handle returned by [`open_binary`](Database::open_binary).
    fn close_binary(&self, handle: BinaryDoc) -> Result<(), StorageError> {
        drop(handle);
        Ok(())
    }

    // -------------------------------------------------------------------
    // Convenience
    // -------------------------------------------------------------------

    /// Adds each document in turn, stopping at the first failure.
    fn add_many(&mut self, docs: &mut [Document], update: bool) -> Result<(), StorageError> {
        for doc in docs.iter_mut() {
            self.add(doc, update)?;
        }
        Ok(())
    }

    fn remove_many(&mut self, ids: &[DocumentId]) -> Result<(), StorageError> {
        for id in ids {
            self.remove(id)?;
        }
        Ok(())
    }

    /// Reads a document that must exist.
    fn read_required(&self, id: &DocumentId) -> Result<Document, StorageError> {
        self.read(id)?
            .ok_or_else(|| StorageError::not_found(format!("document {}", id)))
    }

    /// Removes every document. Does nothing unless `confirm` is true.
    fn clear(&mut self, confirm: bool) -> Result<usize, StorageError> {
        if !confirm {
            return Ok(0);
        }
        let ids = self.all_doc_ids()?;
        self.remove_many(&ids)?;
        Ok(ids.len())
    }
}
