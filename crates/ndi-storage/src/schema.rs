//! Catalog schema for the SQLite backend.
//!
//! The catalog holds three tables: `documents` (one JSON payload per id with
//! the session and class columns pulled out for indexing),
//! `document_classes` (the resolved isa set of each document) and
//! `binary_files` (ingested files). Both side tables cascade on document
//! deletion. The schema version lives in `user_version` and is advanced by
//! `rusqlite_migration`.

use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;
use rusqlite_migration::{Migrations, M};
use tracing::debug;

use crate::error::StorageError;

/// How long a writer waits on another process holding the catalog lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

fn catalog_migrations() -> Migrations<'static> {
    Migrations::new(vec![M::up(include_str!("migrations/001_initial_schema.sql"))])
}

/// Opens the catalog file at `path`, creating it and bringing its schema up
/// to date as needed.
pub fn open_catalog(path: &Path) -> Result<Connection, StorageError> {
    let mut conn = Connection::open(path)?;
    prepare_catalog(&mut conn)?;
    debug!(path = %path.display(), version = schema_version(&conn)?, "catalog opened");
    Ok(conn)
}

/// A throwaway catalog with the same schema.
pub fn open_catalog_in_memory() -> Result<Connection, StorageError> {
    let mut conn = Connection::open_in_memory()?;
    prepare_catalog(&mut conn)?;
    Ok(conn)
}

/// Schema version recorded in the catalog.
pub fn schema_version(conn: &Connection) -> Result<u32, StorageError> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

fn prepare_catalog(conn: &mut Connection) -> Result<(), StorageError> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    // document_classes and binary_files rows go away with their document.
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(BUSY_TIMEOUT)?;

    catalog_migrations()
        .to_latest(conn)
        .map_err(|e| StorageError::Migration(e.to_string()))
}
