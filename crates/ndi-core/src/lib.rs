//! Document model for the NDI metadata store.
//!
//! - [`document`]: the `Document` record, dependencies, file manifest
//! - [`query`]: search predicates and their reference evaluator
//! - [`cache`]: memory-bounded cache with priority eviction
//! - [`hierarchy`]: document class hierarchy used by `isa`

pub mod cache;
pub mod document;
pub mod error;
pub mod hierarchy;
pub mod id;
pub mod properties;
pub mod query;

// Re-export commonly used types
pub use cache::{Cache, CacheConfig, CacheEntry, CachePayload, ReplacementPolicy};
pub use document::{check_file_name, Dependency, Document, FileInfo, FileLocation, FileManifest, FileOptions, LocationType};
pub use error::CoreError;
pub use hierarchy::ClassHierarchy;
pub use id::DocumentId;
pub use query::{Operator, Predicate, Query, ANY_DEPENDENCY};
