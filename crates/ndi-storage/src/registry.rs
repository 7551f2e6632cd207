//! Backend registry: detect an existing database layout or create one.
//!
//! Kinds are tried in a configured priority order (SQLite, indexed with
//! files, directory by default). [`open_database`] first opens the first
//! kind whose layout already exists under the path; if none exists it
//! creates the first kind that opens successfully.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use ndi_core::CoreError;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::DatabaseConfig;
use crate::directory::DirectoryDatabase;
use crate::error::StorageError;
use crate::indexed::IndexedDatabase;
use crate::indexed_files::IndexedFilesDatabase;
use crate::sqlite::SqliteDatabase;
use crate::traits::Database;

/// The available storage backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    Sqlite,
    IndexedFiles,
    Indexed,
    Directory,
}

impl BackendKind {
    pub const ALL: [BackendKind; 4] = [
        BackendKind::Sqlite,
        BackendKind::IndexedFiles,
        BackendKind::Indexed,
        BackendKind::Directory,
    ];

    /// The default priority order.
    pub fn default_order() -> Vec<BackendKind> {
        vec![
            BackendKind::Sqlite,
            BackendKind::IndexedFiles,
            BackendKind::Directory,
        ]
    }

    pub fn name(self) -> &'static str {
        match self {
            BackendKind::Sqlite => "sqlite",
            BackendKind::IndexedFiles => "indexed-files",
            BackendKind::Indexed => "indexed",
            BackendKind::Directory => "directory",
        }
    }

    /// True if this kind's layout exists under `path`.
    pub fn detect(self, path: &Path) -> bool {
        match self {
            BackendKind::Sqlite => SqliteDatabase::detect(path),
            BackendKind::IndexedFiles => IndexedFilesDatabase::detect(path),
            BackendKind::Indexed => IndexedDatabase::detect(path),
            BackendKind::Directory => DirectoryDatabase::detect(path),
        }
    }

    /// Opens (creating if needed) a database of this kind under `path`.
    pub fn open(self, path: &Path, session_reference: &str) -> Result<Box<dyn Database>, StorageError> {
        Ok(match self {
            BackendKind::Sqlite => Box::new(SqliteDatabase::open(path, session_reference)?),
            BackendKind::IndexedFiles => {
                Box::new(IndexedFilesDatabase::open(path, session_reference)?)
            }
            BackendKind::Indexed => Box::new(IndexedDatabase::open(path, session_reference)?),
            BackendKind::Directory => Box::new(DirectoryDatabase::open(path, session_reference)?),
        })
    }

    /// Parses a comma-separated list such as `sqlite,directory`.
    pub fn parse_list(list: &str) -> Result<Vec<BackendKind>, StorageError> {
        let kinds = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(BackendKind::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        if kinds.is_empty() {
            return Err(CoreError::InvalidArgument {
                reason: "backend list is empty".to_string(),
            }
            .into());
        }
        Ok(kinds)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BackendKind::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                CoreError::InvalidArgument {
                    reason: format!(
                        "unknown backend '{}' (expected sqlite, indexed-files, indexed or directory)",
                        s
                    ),
                }
                .into()
            })
    }
}

/// Opens the database described by `config`.
///
/// Existing layouts win over creation; within each phase kinds are tried in
/// `config.backend_order`. If nothing can be opened the error lists every
/// attempt.
pub fn open_database(config: &DatabaseConfig) -> Result<Box<dyn Database>, StorageError> {
    let path = config.path.as_path();
    let mut attempts = Vec::new();

    for kind in &config.backend_order {
        if !kind.detect(path) {
            continue;
        }
        debug!(backend = %kind, path = %path.display(), "opening existing database");
        match kind.open(path, &config.session_reference) {
            Ok(db) => return Ok(db),
            Err(e) => {
                warn!(backend = %kind, error = %e, "existing database failed to open");
                attempts.push(format!("{} (existing): {}", kind, e));
            }
        }
    }

    for kind in &config.backend_order {
        debug!(backend = %kind, path = %path.display(), "creating database");
        match kind.open(path, &config.session_reference) {
            Ok(db) => return Ok(db),
            Err(e) => attempts.push(format!("{}: {}", kind, e)),
        }
    }

    Err(StorageError::BackendUnavailable {
        path: path.to_path_buf(),
        attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndi_core::Document;

    #[test]
    fn parse_names_and_lists() {
        assert_eq!("SQLite".parse::<BackendKind>().unwrap(), BackendKind::Sqlite);
        assert_eq!(
            BackendKind::parse_list(" indexed-files , directory ").unwrap(),
            vec![BackendKind::IndexedFiles, BackendKind::Directory]
        );
        assert!(BackendKind::parse_list("sqlite,mongo").is_err());
        assert!(BackendKind::parse_list(" , ").is_err());
        for kind in BackendKind::ALL {
            assert_eq!(kind.to_string().parse::<BackendKind>().unwrap(), kind);
        }
    }

    #[test]
    fn creates_first_kind_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig::new(dir.path());
        let db = open_database(&config).unwrap();
        assert_eq!(db.kind(), BackendKind::Sqlite);
    }

    #[test]
    fn prefers_existing_layout() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut db = DirectoryDatabase::open(dir.path(), "").unwrap();
            db.add(&mut Document::new("base"), false).unwrap();
        }
        let config = DatabaseConfig::new(dir.path());
        let db = open_database(&config).unwrap();
        assert_eq!(db.kind(), BackendKind::Directory);
        assert_eq!(db.all_doc_ids().unwrap().len(), 1);
    }

    #[test]
    fn respects_configured_order() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig::new(dir.path())
            .with_backend_order(vec![BackendKind::Indexed, BackendKind::Sqlite]);
        let db = open_database(&config).unwrap();
        assert_eq!(db.kind(), BackendKind::Indexed);
        assert!(BackendKind::Indexed.detect(dir.path()));
    }

    #[test]
    fn unusable_path_reports_every_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let config = DatabaseConfig::new(&blocker);
        match open_database(&config) {
            Err(StorageError::BackendUnavailable { attempts, .. }) => assert_eq!(attempts.len(), 3),
            other => panic!("expected BackendUnavailable, got {:?}", other.map(|db| db.kind())),
        }
    }
}
