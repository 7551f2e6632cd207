//! Indexed backend with binary file lifecycle.
//!
//! Same document layout as [`IndexedDatabase`], plus an ingested-files
//! directory:
//!
//! ```text
//! ndi_database/dumbjsondb/...
//! ndi_database/files/<id>/<file name>
//! ```
//!
//! On `add` the ingestion plan is computed first, the document metadata is
//! written, and only then are files copied. A copy failure after the
//! metadata write surfaces as [`StorageError::Ingest`]; the stored document
//! is not rolled back. `remove` deletes the document's ingested files.

use std::path::{Path, PathBuf};

use ndi_core::{Document, DocumentId, Query};

use crate::binary::BinaryDoc;
use crate::docfile::ensure_dir;
use crate::error::StorageError;
use crate::indexed::IndexedDatabase;
use crate::ingest::{expel, ingested_path, IngestPlan};
use crate::registry::BackendKind;
use crate::traits::Database;
use crate::{DATABASE_DIR, FILES_DIR};

/// Indexed backend that ingests binaries.
#[derive(Debug)]
pub struct IndexedFilesDatabase {
    documents: IndexedDatabase,
    files_dir: PathBuf,
}

impl IndexedFilesDatabase {
    /// Opens the database under `path`, creating the layout if needed.
    pub fn open(path: &Path, session_reference: &str) -> Result<Self, StorageError> {
        let documents = IndexedDatabase::open(path, session_reference)?;
        let files_dir = path.join(DATABASE_DIR).join(FILES_DIR);
        ensure_dir(&files_dir)?;
        Ok(IndexedFilesDatabase {
            documents,
            files_dir,
        })
    }

    /// True if an indexed layout with an ingested-files directory exists
    /// under `path`.
    pub fn detect(path: &Path) -> bool {
        IndexedDatabase::has_layout(path) && path.join(DATABASE_DIR).join(FILES_DIR).is_dir()
    }

    pub fn path(&self) -> &Path {
        self.documents.path()
    }

    /// Directory that holds ingested binaries.
    pub fn file_directory(&self) -> &Path {
        &self.files_dir
    }
}

impl Database for IndexedFilesDatabase {
    fn kind(&self) -> BackendKind {
        BackendKind::IndexedFiles
    }

    fn session_reference(&self) -> &str {
        self.documents.session_reference()
    }

    fn add(&mut self, doc: &mut Document, update: bool) -> Result<(), StorageError> {
        let id = doc.id();
        if !update && self.documents.contains(&id) {
            return Err(StorageError::Conflict { id: id.to_string() });
        }
        let plan = IngestPlan::prepare(doc, &self.files_dir)?;
        self.documents.add(doc, true)?;
        plan.execute()?;
        Ok(())
    }

    fn read(&self, id: &DocumentId) -> Result<Option<Document>, StorageError> {
        self.documents.read(id)
    }

    fn remove(&mut self, id: &DocumentId) -> Result<(), StorageError> {
        self.documents.remove(id)?;
        expel(&self.files_dir, id)
    }

    fn all_doc_ids(&self) -> Result<Vec<DocumentId>, StorageError> {
        self.documents.all_doc_ids()
    }

    fn search(&self, query: &Query) -> Result<Vec<Document>, StorageError> {
        self.documents.search(query)
    }

    fn open_binary(&self, id: &DocumentId, filename: &str) -> Result<BinaryDoc, StorageError> {
        BinaryDoc::open(&ingested_path(&self.files_dir, id, filename)?, *id, filename)
    }

    fn exists_binary(&self, id: &DocumentId, filename: &str) -> Result<(bool, PathBuf), StorageError> {
        let path = ingested_path(&self.files_dir, id, filename)?;
        Ok((path.is_file(), path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndi_core::FileOptions;
    use std::fs;

    #[test]
    fn detection_distinguishes_from_simple_indexed() {
        let plain = tempfile::tempdir().unwrap();
        IndexedDatabase::open(plain.path(), "").unwrap();
        assert!(IndexedDatabase::detect(plain.path()));
        assert!(!IndexedFilesDatabase::detect(plain.path()));

        let with_files = tempfile::tempdir().unwrap();
        IndexedFilesDatabase::open(with_files.path(), "").unwrap();
        assert!(IndexedFilesDatabase::detect(with_files.path()));
        assert!(!IndexedDatabase::detect(with_files.path()));
    }

    #[test]
    fn metadata_is_written_even_if_copy_fails() {
        let dir = tempfile::tempdir().unwrap();
        let src = tempfile::tempdir().unwrap();
        let mut db = IndexedFilesDatabase::open(dir.path(), "").unwrap();

        // A directory source exists but cannot be copied as a file.
        let source = src.path().join("subdir");
        fs::create_dir(&source).unwrap();
        let mut doc = Document::new("base");
        doc.add_file("data", source.to_str().unwrap(), FileOptions::ingest(true, false))
            .unwrap();

        let err = db.add(&mut doc, false).unwrap_err();
        assert!(matches!(err, StorageError::Ingest { .. }));
        assert!(db.read(&doc.id()).unwrap().is_some());
        assert!(source.exists());
    }
}
