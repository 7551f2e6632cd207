//! Storage backends for NDI documents.
//!
//! Provides the [`Database`] trait defining the storage contract, four
//! backends implementing it, a registry that picks a backend for a session
//! directory, and dependency-graph utilities built on top of the trait.
//!
//! # Backends
//!
//! - [`DirectoryDatabase`]: one JSON file per document, binaries per id
//! - [`IndexedDatabase`]: JSON files plus a sorted id index, no binaries
//! - [`IndexedFilesDatabase`]: indexed layout with binary ingestion
//! - [`SqliteDatabase`]: SQLite store with accelerated `isa` and id search
//!
//! # Modules
//!
//! - [`error`]: StorageError enum with all failure modes
//! - [`traits`]: Database trait definition
//! - [`registry`]: BackendKind and `open_database`
//! - [`config`]: DatabaseConfig read from the environment
//! - [`ingest`]: binary ingestion plans
//! - [`graph`]: dependents, antecedents, adjacency
//! - [`schema`]: SQLite migrations

pub mod binary;
pub mod config;
pub mod directory;
pub mod docfile;
pub mod error;
pub mod graph;
pub mod indexed;
pub mod indexed_files;
pub mod ingest;
pub mod registry;
pub mod schema;
pub mod sqlite;
pub mod traits;

/// Directory under the session path that holds every backend's data.
pub const DATABASE_DIR: &str = "ndi_database";

/// Ingested binaries live under `ndi_database/files/<id>/`.
pub(crate) const FILES_DIR: &str = "files";

// Re-export key types for ergonomic use.
pub use binary::BinaryDoc;
pub use config::DatabaseConfig;
pub use directory::DirectoryDatabase;
pub use error::StorageError;
pub use graph::{
    build_adjacency, fetch_by_ids, find_antecedents, find_dependents, find_missing_dependencies,
    DependencyGraph, MissingDependency,
};
pub use indexed::IndexedDatabase;
pub use indexed_files::IndexedFilesDatabase;
pub use registry::{open_database, BackendKind};
pub use sqlite::SqliteDatabase;
pub use traits::Database;
