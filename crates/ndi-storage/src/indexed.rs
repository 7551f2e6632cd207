//! Simple indexed backend: one JSON file per document plus an id index.
//!
//! Layout under the session path:
//!
//! ```text
//! ndi_database/dumbjsondb/
//!   index.json          sorted list of document ids
//!   documents/<id>.json
//! ```
//!
//! The index is rebuilt from a directory scan whenever it is missing or
//! cannot be parsed. This backend stores no binaries.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use ndi_core::{Document, DocumentId, Query};
use tracing::warn;

use crate::binary::BinaryDoc;
use crate::docfile::{
    document_path, ensure_dir, load_all, read_document, remove_file_if_exists, scan_ids,
    write_document, write_json_atomic,
};
use crate::error::StorageError;
use crate::registry::BackendKind;
use crate::traits::Database;
use crate::{DATABASE_DIR, FILES_DIR};

const INDEXED_DIR: &str = "dumbjsondb";
const DOCUMENTS_DIR: &str = "documents";
const INDEX_FILE: &str = "index.json";

/// Indexed file-per-document backend without binary support.
#[derive(Debug)]
pub struct IndexedDatabase {
    path: PathBuf,
    documents_dir: PathBuf,
    index_path: PathBuf,
    session_reference: String,
}

impl IndexedDatabase {
    /// Opens the database under `path`, creating the layout if needed.
    pub fn open(path: &Path, session_reference: &str) -> Result<Self, StorageError> {
        let root = Self::root(path);
        let documents_dir = root.join(DOCUMENTS_DIR);
        ensure_dir(&documents_dir)?;
        let db = IndexedDatabase {
            path: path.to_path_buf(),
            documents_dir,
            index_path: root.join(INDEX_FILE),
            session_reference: session_reference.to_string(),
        };
        if !db.index_path.exists() {
            db.rebuild_index()?;
        }
        Ok(db)
    }

    pub(crate) fn root(path: &Path) -> PathBuf {
        path.join(DATABASE_DIR).join(INDEXED_DIR)
    }

    pub(crate) fn has_layout(path: &Path) -> bool {
        Self::root(path).join(DOCUMENTS_DIR).is_dir()
    }

    /// True if an indexed layout without an ingested-files directory exists
    /// under `path`.
    pub fn detect(path: &Path) -> bool {
        Self::has_layout(path) && !path.join(DATABASE_DIR).join(FILES_DIR).is_dir()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True if document `id` has a stored file.
    pub fn contains(&self, id: &DocumentId) -> bool {
        document_path(&self.documents_dir, id).exists()
    }

    // -----------------------------------------------------------------------
    // Index maintenance
    // -----------------------------------------------------------------------

    /// Reads the index, rebuilding it if it is missing or unparsable.
    fn load_index(&self) -> Result<Vec<DocumentId>, StorageError> {
        let text = match fs::read_to_string(&self.index_path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(path = %self.index_path.display(), "index missing, rebuilding");
                return self.rebuild_index();
            }
            Err(e) => return Err(StorageError::io(&self.index_path, e)),
        };
        match serde_json::from_str::<Vec<String>>(&text) {
            Ok(tokens) => Ok(tokens
                .iter()
                .filter_map(|t| DocumentId::parse(t).ok())
                .collect()),
            Err(e) => {
                warn!(path = %self.index_path.display(), error = %e, "index unreadable, rebuilding");
                self.rebuild_index()
            }
        }
    }

    fn save_index(&self, ids: &mut Vec<DocumentId>) -> Result<(), StorageError> {
        ids.sort();
        ids.dedup();
        let tokens: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        write_json_atomic(&self.index_path, &tokens)
    }

    fn rebuild_index(&self) -> Result<Vec<DocumentId>, StorageError> {
        let mut ids = scan_ids(&self.documents_dir)?;
        self.save_index(&mut ids)?;
        Ok(ids)
    }

    fn index_insert(&self, id: DocumentId) -> Result<(), StorageError> {
        let mut ids = self.load_index()?;
        if !ids.contains(&id) {
            ids.push(id);
            self.save_index(&mut ids)?;
        }
        Ok(())
    }

    fn index_remove(&self, id: &DocumentId) -> Result<(), StorageError> {
        let mut ids = self.load_index()?;
        let before = ids.len();
        ids.retain(|i| i != id);
        if ids.len() != before {
            self.save_index(&mut ids)?;
        }
        Ok(())
    }
}

impl Database for IndexedDatabase {
    fn kind(&self) -> BackendKind {
        BackendKind::Indexed
    }

    fn session_reference(&self) -> &str {
        &self.session_reference
    }

    fn add(&mut self, doc: &mut Document, update: bool) -> Result<(), StorageError> {
        let id = doc.id();
        if !update && self.contains(&id) {
            return Err(StorageError::Conflict { id: id.to_string() });
        }
        doc.check_file_names()?;
        write_document(&self.documents_dir, doc)?;
        self.index_insert(id)
    }

    fn read(&self, id: &DocumentId) -> Result<Option<Document>, StorageError> {
        read_document(&document_path(&self.documents_dir, id))
    }

    fn remove(&mut self, id: &DocumentId) -> Result<(), StorageError> {
        remove_file_if_exists(&document_path(&self.documents_dir, id))?;
        self.index_remove(id)
    }

    fn all_doc_ids(&self) -> Result<Vec<DocumentId>, StorageError> {
        self.load_index()
    }

    fn search(&self, query: &Query) -> Result<Vec<Document>, StorageError> {
        let ids = self.load_index()?;
        Ok(load_all(&self.documents_dir, &ids)
            .into_iter()
            .filter(|doc| query.matches(doc))
            .collect())
    }

    fn open_binary(&self, _id: &DocumentId, _filename: &str) -> Result<BinaryDoc, StorageError> {
        Err(StorageError::Unsupported {
            backend: "indexed",
            operation: "open_binary",
        })
    }

    fn exists_binary(&self, _id: &DocumentId, _filename: &str) -> Result<(bool, PathBuf), StorageError> {
        Ok((false, PathBuf::new()))
    }
}
