//! Directory backend: one JSON file per document, no index.
//!
//! Layout under the session path:
//!
//! ```text
//! ndi_database/
//!   documents/<id>.json
//!   binary/<id>/<file name>
//! ```
//!
//! Enumeration and search scan the documents directory.

use std::path::{Path, PathBuf};

use ndi_core::{Document, DocumentId, Query};

use crate::binary::BinaryDoc;
use crate::docfile::{document_path, ensure_dir, load_all, read_document, remove_file_if_exists, scan_ids, write_document};
use crate::error::StorageError;
use crate::ingest::{expel, ingested_path, IngestPlan};
use crate::registry::BackendKind;
use crate::traits::Database;
use crate::DATABASE_DIR;

const DOCUMENTS_DIR: &str = "documents";
const BINARY_DIR: &str = "binary";

/// File-per-document backend.
#[derive(Debug)]
pub struct DirectoryDatabase {
    path: PathBuf,
    documents_dir: PathBuf,
    binary_dir: PathBuf,
    session_reference: String,
}

impl DirectoryDatabase {
    /// Opens the database under `path`, creating the layout if needed.
    pub fn open(path: &Path, session_reference: &str) -> Result<Self, StorageError> {
        let root = path.join(DATABASE_DIR);
        let documents_dir = root.join(DOCUMENTS_DIR);
        let binary_dir = root.join(BINARY_DIR);
        ensure_dir(&documents_dir)?;
        ensure_dir(&binary_dir)?;
        Ok(DirectoryDatabase {
            path: path.to_path_buf(),
            documents_dir,
            binary_dir,
            session_reference: session_reference.to_string(),
        })
    }

    /// True if a directory-backend layout exists under `path`.
    pub fn detect(path: &Path) -> bool {
        path.join(DATABASE_DIR).join(DOCUMENTS_DIR).is_dir()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory that holds ingested binaries.
    pub fn file_directory(&self) -> &Path {
        &self.binary_dir
    }
}

impl Database for DirectoryDatabase {
    fn kind(&self) -> BackendKind {
        BackendKind::Directory
    }

    fn session_reference(&self) -> &str {
        &self.session_reference
    }

    fn add(&mut self, doc: &mut Document, update: bool) -> Result<(), StorageError> {
        let id = doc.id();
        if !update && document_path(&self.documents_dir, &id).exists() {
            return Err(StorageError::Conflict { id: id.to_string() });
        }
        let plan = IngestPlan::prepare(doc, &self.binary_dir)?;
        write_document(&self.documents_dir, doc)?;
        plan.execute()?;
        Ok(())
    }

    fn read(&self, id: &DocumentId) -> Result<Option<Document>, StorageError> {
        read_document(&document_path(&self.documents_dir, id))
    }

    fn remove(&mut self, id: &DocumentId) -> Result<(), StorageError> {
        remove_file_if_exists(&document_path(&self.documents_dir, id))?;
        expel(&self.binary_dir, id)
    }

    fn all_doc_ids(&self) -> Result<Vec<DocumentId>, StorageError> {
        scan_ids(&self.documents_dir)
    }

    fn search(&self, query: &Query) -> Result<Vec<Document>, StorageError> {
        let ids = scan_ids(&self.documents_dir)?;
        Ok(load_all(&self.documents_dir, &ids)
            .into_iter()
            .filter(|doc| query.matches(doc))
            .collect())
    }

    fn open_binary(&self, id: &DocumentId, filename: &str) -> Result<BinaryDoc, StorageError> {
        BinaryDoc::open(&ingested_path(&self.binary_dir, id, filename)?, *id, filename)
    }

    fn exists_binary(&self, id: &DocumentId, filename: &str) -> Result<(bool, PathBuf), StorageError> {
        let path = ingested_path(&self.binary_dir, id, filename)?;
        Ok((path.is_file(), path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_layout_and_detects() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!DirectoryDatabase::detect(dir.path()));
        let db = DirectoryDatabase::open(dir.path(), "s1").unwrap();
        assert!(DirectoryDatabase::detect(dir.path()));
        assert!(db.file_directory().is_dir());
        assert_eq!(db.session_reference(), "s1");
        assert_eq!(db.kind(), BackendKind::Directory);
    }

    #[test]
    fn documents_are_plain_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = DirectoryDatabase::open(dir.path(), "").unwrap();
        let mut doc = Document::new("subject");
        db.add(&mut doc, false).unwrap();
        let expected = dir
            .path()
            .join(DATABASE_DIR)
            .join(DOCUMENTS_DIR)
            .join(format!("{}.json", doc.id()));
        assert!(expected.is_file());
    }
}
