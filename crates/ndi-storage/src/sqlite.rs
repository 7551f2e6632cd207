//! SQLite implementation of [`Database`].
//!
//! [`SqliteDatabase`] keeps every document as a JSON TEXT row in
//! `ndi_database/did-sqlite.sqlite`, with indexed `session_id` and
//! `doc_type` columns, a `document_classes` table holding each document's
//! resolved isa set, and a `binary_files` table tracking ingested files
//! under `ndi_database/files/<id>/`. Both side tables cascade on document
//! deletion.
//!
//! `search` narrows candidates with indexed lookups for the query shapes it
//! recognizes (exact `base.id`, `base.session_id` or
//! `document_class.class_name`, `isa`, and AND/OR combinations of those) and
//! then evaluates [`Query::matches`] on every candidate, so results are
//! always identical to [`SqliteDatabase::full_scan`].

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, warn};

use ndi_core::query::Predicate;
use ndi_core::{check_file_name, Document, DocumentId, Operator, Query};

use crate::binary::BinaryDoc;
use crate::docfile::ensure_dir;
use crate::error::StorageError;
use crate::ingest::{expel, ingested_path, IngestPlan};
use crate::registry::BackendKind;
use crate::traits::Database;
use crate::{DATABASE_DIR, FILES_DIR};

/// File name of the SQLite database inside `ndi_database/`.
pub const SQLITE_FILE: &str = "did-sqlite.sqlite";

/// Candidate set produced by the search planner.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Candidates {
    /// No narrowing possible: scan every row.
    All,
    /// Only these ids can match.
    Ids(BTreeSet<String>),
}

/// SQLite-backed implementation of [`Database`].
///
/// Every write is wrapped in a transaction. The database uses WAL mode and
/// enforces foreign keys.
pub struct SqliteDatabase {
    conn: Connection,
    /// Session directory; `None` for an in-memory catalog.
    path: Option<PathBuf>,
    files_dir: PathBuf,
    session_reference: String,
}

impl SqliteDatabase {
    /// Opens (or creates) the database under `path`.
    pub fn open(path: &Path, session_reference: &str) -> Result<Self, StorageError> {
        let root = path.join(DATABASE_DIR);
        let files_dir = root.join(FILES_DIR);
        ensure_dir(&files_dir)?;
        let conn = crate::schema::open_catalog(&root.join(SQLITE_FILE))?;
        Ok(SqliteDatabase {
            conn,
            path: Some(path.to_path_buf()),
            files_dir,
            session_reference: session_reference.to_string(),
        })
    }

    /// Opens an in-memory catalog whose ingested files live under
    /// `files_dir`. Such a database has no session directory.
    pub fn in_memory(files_dir: &Path, session_reference: &str) -> Result<Self, StorageError> {
        ensure_dir(files_dir)?;
        let conn = crate::schema::open_catalog_in_memory()?;
        Ok(SqliteDatabase {
            conn,
            path: None,
            files_dir: files_dir.to_path_buf(),
            session_reference: session_reference.to_string(),
        })
    }

    /// True if a SQLite database file exists under `path`.
    pub fn detect(path: &Path) -> bool {
        path.join(DATABASE_DIR).join(SQLITE_FILE).is_file()
    }

    /// Session directory holding `ndi_database/`, if the catalog is on disk.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Directory that holds ingested binaries.
    pub fn file_directory(&self) -> &Path {
        &self.files_dir
    }

    /// Closes the connection, reporting any error from SQLite.
    pub fn close(self) -> Result<(), StorageError> {
        self.conn.close().map_err(|(_, e)| StorageError::Sqlite(e))
    }

    /// Search without any index narrowing: loads every row and evaluates
    /// the query in process.
    pub fn full_scan(&self, query: &Query) -> Result<Vec<Document>, StorageError> {
        self.load(&Candidates::All, query)
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    fn exists(&self, id: &str) -> Result<bool, StorageError> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM documents WHERE id = ?1)",
            params![id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Writes the document row and its isa set in one transaction.
    fn write_document(&mut self, doc: &Document) -> Result<(), StorageError> {
        let id = doc.id().to_string();
        let properties = serde_json::to_string(doc)?;
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO documents (id, session_id, doc_type, datestamp, properties)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                 session_id = excluded.session_id,
                 doc_type = excluded.doc_type,
                 datestamp = excluded.datestamp,
                 properties = excluded.properties",
            params![id, doc.session_id(), doc.class_name(), doc.datestamp(), properties],
        )?;
        tx.execute("DELETE FROM document_classes WHERE doc_id = ?1", params![id])?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO document_classes (doc_id, class_name) VALUES (?1, ?2)",
            )?;
            for class in doc.isa_set() {
                stmt.execute(params![id, class])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Re-registers every ingested file of `doc` present on disk.
    fn register_binaries(&mut self, doc: &Document) -> Result<(), StorageError> {
        let doc_id = doc.id();
        let id = doc_id.to_string();
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM binary_files WHERE doc_id = ?1", params![id])?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO binary_files (doc_id, filename, file_path, file_size)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for name in doc.current_file_list() {
                let path = ingested_path(&self.files_dir, &doc_id, name)?;
                let Ok(meta) = fs::metadata(&path) else {
                    continue;
                };
                if meta.is_file() {
                    stmt.execute(params![
                        id,
                        name,
                        path.to_string_lossy().into_owned(),
                        meta.len() as i64
                    ])?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn ids_where(&self, sql: &str, value: &str) -> Result<BTreeSet<String>, StorageError> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let ids = stmt
            .query_map(params![value], |row| row.get::<_, String>(0))?
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(ids)
    }

    /// Computes a superset of the ids that can match `query`.
    fn plan(&self, query: &Query) -> Result<Candidates, StorageError> {
        match query {
            Query::Leaf(p) => self.plan_leaf(p),
            Query::And(children) => {
                let mut narrowed: Option<BTreeSet<String>> = None;
                for child in children {
                    if let Candidates::Ids(ids) = self.plan(child)? {
                        narrowed = Some(match narrowed {
                            None => ids,
                            Some(acc) => acc.intersection(&ids).cloned().collect(),
                        });
                    }
                }
                Ok(narrowed.map_or(Candidates::All, Candidates::Ids))
            }
            Query::Or(children) => {
                let mut union = BTreeSet::new();
                for child in children {
                    match self.plan(child)? {
                        Candidates::All => return Ok(Candidates::All),
                        Candidates::Ids(ids) => union.extend(ids),
                    }
                }
                Ok(Candidates::Ids(union))
            }
        }
    }

    fn plan_leaf(&self, p: &Predicate) -> Result<Candidates, StorageError> {
        let Some(operand) = p.param1.as_str() else {
            return Ok(Candidates::All);
        };
        match (p.operation, p.field.as_str()) {
            (Operator::ExactString, "base.id") => {
                Ok(Candidates::Ids(BTreeSet::from([operand.to_string()])))
            }
            (Operator::ExactString, "base.session_id") => self
                .ids_where("SELECT id FROM documents WHERE session_id = ?1", operand)
                .map(Candidates::Ids),
            (Operator::ExactString, "document_class.class_name") => self
                .ids_where("SELECT id FROM documents WHERE doc_type = ?1", operand)
                .map(Candidates::Ids),
            (Operator::Isa, _) => self
                .ids_where(
                    "SELECT doc_id FROM document_classes WHERE class_name = ?1",
                    operand,
                )
                .map(Candidates::Ids),
            _ => Ok(Candidates::All),
        }
    }

    /// Loads candidate rows and keeps those matching `query`.
    fn load(&self, candidates: &Candidates, query: &Query) -> Result<Vec<Document>, StorageError> {
        let mut docs = Vec::new();
        match candidates {
            Candidates::All => {
                let mut stmt = self
                    .conn
                    .prepare_cached("SELECT properties FROM documents ORDER BY id")?;
                let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
                for row in rows {
                    let doc: Document = serde_json::from_str(&row?)?;
                    if query.matches(&doc) {
                        docs.push(doc);
                    }
                }
            }
            Candidates::Ids(ids) => {
                let mut stmt = self
                    .conn
                    .prepare_cached("SELECT properties FROM documents WHERE id = ?1")?;
                for id in ids {
                    let properties: Option<String> =
                        stmt.query_row(params![id], |row| row.get(0)).optional()?;
                    if let Some(properties) = properties {
                        let doc: Document = serde_json::from_str(&properties)?;
                        if query.matches(&doc) {
                            docs.push(doc);
                        }
                    }
                }
            }
        }
        Ok(docs)
    }
}

impl std::fmt::Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDatabase")
            .field("path", &self.path)
            .field("files_dir", &self.files_dir)
            .field("session_reference", &self.session_reference)
            .finish_non_exhaustive()
    }
}

impl Database for SqliteDatabase {
    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    fn session_reference(&self) -> &str {
        &self.session_reference
    }

    fn add(&mut self, doc: &mut Document, update: bool) -> Result<(), StorageError> {
        let id = doc.id().to_string();
        if !update && self.exists(&id)? {
            return Err(StorageError::Conflict { id });
        }
        let plan = IngestPlan::prepare(doc, &self.files_dir)?;
        self.write_document(doc)?;
        let result = plan.execute();
        // Record whatever made it to disk, even if a later copy failed.
        self.register_binaries(doc)?;
        result.map(|_| ())
    }

    fn read(&self, id: &DocumentId) -> Result<Option<Document>, StorageError> {
        let properties: Option<String> = self
            .conn
            .query_row(
                "SELECT properties FROM documents WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        match properties {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    fn remove(&mut self, id: &DocumentId) -> Result<(), StorageError> {
        let key = id.to_string();
        let paths: Vec<String> = {
            let mut stmt = self
                .conn
                .prepare_cached("SELECT file_path FROM binary_files WHERE doc_id = ?1")?;
            let rows = stmt.query_map(params![key], |row| row.get(0))?;
            rows.collect::<Result<_, _>>()?
        };
        for path in &paths {
            if !Path::new(path).starts_with(&self.files_dir) {
                warn!(path = %path, "recorded binary lies outside the database, not deleting");
                continue;
            }
            if let Err(e) = fs::remove_file(path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path, error = %e, "could not delete ingested file");
                }
            }
        }

        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM documents WHERE id = ?1", params![key])?;
        tx.commit()?;
        expel(&self.files_dir, id)
    }

    fn all_doc_ids(&self) -> Result<Vec<DocumentId>, StorageError> {
        let mut stmt = self.conn.prepare_cached("SELECT id FROM documents ORDER BY id")?;
        let tokens = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        let mut ids = Vec::with_capacity(tokens.len());
        for token in tokens {
            match DocumentId::parse(&token) {
                Ok(id) => ids.push(id),
                Err(_) => warn!(id = %token, "skipping row with malformed id"),
            }
        }
        Ok(ids)
    }

    fn search(&self, query: &Query) -> Result<Vec<Document>, StorageError> {
        let candidates = self.plan(query)?;
        match &candidates {
            Candidates::All => debug!("sqlite search: full scan"),
            Candidates::Ids(ids) => debug!(candidates = ids.len(), "sqlite search: indexed"),
        }
        self.load(&candidates, query)
    }

    fn open_binary(&self, id: &DocumentId, filename: &str) -> Result<BinaryDoc, StorageError> {
        check_file_name(filename)?;
        let path: Option<String> = self
            .conn
            .query_row(
                "SELECT file_path FROM binary_files WHERE doc_id = ?1 AND filename = ?2",
                params![id.to_string(), filename],
                |row| row.get(0),
            )
            .optional()?;
        match path {
            Some(path) => BinaryDoc::open(Path::new(&path), *id, filename),
            None => Err(StorageError::not_found(format!(
                "binary file '{}' of document {}",
                filename, id
            ))),
        }
    }

    fn exists_binary(&self, id: &DocumentId, filename: &str) -> Result<(bool, PathBuf), StorageError> {
        check_file_name(filename)?;
        let path: Option<String> = self
            .conn
            .query_row(
                "SELECT file_path FROM binary_files WHERE doc_id = ?1 AND filename = ?2",
                params![id.to_string(), filename],
                |row| row.get(0),
            )
            .optional()?;
        match path {
            Some(path) => {
                let path = PathBuf::from(path);
                Ok((path.is_file(), path))
            }
            None => Ok((false, ingested_path(&self.files_dir, id, filename)?)),
        }
    }
}
