//! One-JSON-file-per-document helpers shared by the file-based backends.
//!
//! Documents are stored pretty-printed as `<dir>/<id>.json`. Writes go
//! through a temporary file in the same directory followed by a rename, so
//! a crash never leaves a half-written document behind.

use std::fs;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};

use ndi_core::{Document, DocumentId};
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::warn;

use crate::error::StorageError;

/// Creates `dir` and its parents if missing.
pub fn ensure_dir(dir: &Path) -> Result<(), StorageError> {
    fs::create_dir_all(dir).map_err(|e| StorageError::io(dir, e))
}

/// Path of the JSON file holding document `id`.
pub fn document_path(dir: &Path, id: &DocumentId) -> PathBuf {
    dir.join(format!("{}.json", id))
}

/// Writes `value` as pretty JSON to `path` via a sibling temporary file.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StorageError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| StorageError::io(dir, e))?;
    serde_json::to_writer_pretty(&mut tmp, value)?;
    tmp.write_all(b"\n").map_err(|e| StorageError::io(path, e))?;
    tmp.persist(path).map_err(|e| StorageError::io(path, e.error))?;
    Ok(())
}

/// Atomically writes `doc` to `<dir>/<id>.json`.
pub fn write_document(dir: &Path, doc: &Document) -> Result<PathBuf, StorageError> {
    let path = document_path(dir, &doc.id());
    write_json_atomic(&path, doc)?;
    Ok(path)
}

/// Reads the document stored at `path`, or `None` if there is no such file.
pub fn read_document(path: &Path) -> Result<Option<Document>, StorageError> {
    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StorageError::io(path, e)),
    };
    let doc = serde_json::from_reader(BufReader::new(file))?;
    Ok(Some(doc))
}

/// Deletes a file, treating "already gone" as success.
pub fn remove_file_if_exists(path: &Path) -> Result<(), StorageError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StorageError::io(path, e)),
    }
}

/// Deletes a directory tree, treating "already gone" as success.
pub fn remove_dir_if_exists(path: &Path) -> Result<(), StorageError> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StorageError::io(path, e)),
    }
}

/// Ids of every `<id>.json` file in `dir`, sorted. Files whose stem is not
/// a valid id are ignored.
pub fn scan_ids(dir: &Path) -> Result<Vec<DocumentId>, StorageError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StorageError::io(dir, e)),
    };
    let mut ids = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| StorageError::io(dir, e))?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        if let Some(id) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| DocumentId::parse(s).ok())
        {
            ids.push(id);
        }
    }
    ids.sort();
    Ok(ids)
}

/// Loads every listed document, skipping files that are missing or fail to
/// parse.
pub fn load_all(dir: &Path, ids: &[DocumentId]) -> Vec<Document> {
    let mut docs = Vec::with_capacity(ids.len());
    for id in ids {
        let path = document_path(dir, id);
        match read_document(&path) {
            Ok(Some(doc)) => docs.push(doc),
            Ok(None) => warn!(path = %path.display(), "indexed document file is missing"),
            Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable document file"),
        }
    }
    docs
}
