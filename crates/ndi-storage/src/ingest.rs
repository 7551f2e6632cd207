//! Binary file ingestion.
//!
//! A document's file manifest may name local files with `ingest = true`.
//! Backends that support binaries copy those files into
//! `<files_root>/<document id>/<file name>` and rewrite the manifest so the
//! stored document points at the copy.
//!
//! Ingestion happens in two steps. [`IngestPlan::prepare`] computes the copy
//! and delete lists and rewrites the document's locations; the backend then
//! persists the document metadata and only afterwards calls
//! [`IngestPlan::execute`]. The sequence is not atomic: a failed copy leaves
//! the metadata written and is reported as [`StorageError::Ingest`] with no
//! rollback.

use std::fs;
use std::path::{Path, PathBuf};

use ndi_core::{check_file_name, Document, DocumentId, LocationType};
use tracing::{debug, warn};

use crate::docfile::{ensure_dir, remove_dir_if_exists};
use crate::error::StorageError;

/// One planned copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCopy {
    pub name: String,
    pub source: PathBuf,
    pub destination: PathBuf,
}

/// Files to copy into the database and originals to delete afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestPlan {
    pub copies: Vec<FileCopy>,
    pub delete_originals: Vec<PathBuf>,
}

/// Directory that holds the ingested files of document `id`.
pub fn document_files_dir(files_root: &Path, id: &DocumentId) -> PathBuf {
    files_root.join(id.to_string())
}

/// Where file `name` of document `id` lives once ingested.
///
/// Fails with an invalid-argument error when `name` is not a plain file
/// name, so the result always stays inside the document's directory.
pub fn ingested_path(files_root: &Path, id: &DocumentId, name: &str) -> Result<PathBuf, StorageError> {
    check_file_name(name)?;
    Ok(document_files_dir(files_root, id).join(name))
}

impl IngestPlan {
    /// Plans ingestion of every ingestible local file of `doc` and rewrites
    /// those locations to their destinations under `files_root`.
    ///
    /// Locations that already point at their destination (a document being
    /// re-added) produce no copy and no deletion. A manifest with a name
    /// that is not a plain file name is rejected before anything changes.
    pub fn prepare(doc: &mut Document, files_root: &Path) -> Result<IngestPlan, StorageError> {
        doc.check_file_names()?;
        let id = doc.id();
        let dir = document_files_dir(files_root, &id);
        let mut plan = IngestPlan::default();
        doc.relocate_ingested_files(|name, location| {
            if location.location_type != LocationType::File {
                return None;
            }
            let destination = dir.join(name);
            let source = PathBuf::from(&location.location);
            if source != destination {
                if !plan.copies.iter().any(|c| c.destination == destination) {
                    plan.copies.push(FileCopy {
                        name: name.to_string(),
                        source: source.clone(),
                        destination: destination.clone(),
                    });
                }
                if location.delete_original {
                    plan.delete_originals.push(source);
                }
            }
            Some(destination.to_string_lossy().into_owned())
        });
        Ok(plan)
    }

    pub fn is_empty(&self) -> bool {
        self.copies.is_empty() && self.delete_originals.is_empty()
    }

    /// Copies every planned file, then deletes originals.
    ///
    /// A missing source is skipped with a warning. A copy that fails stops
    /// ingestion with [`StorageError::Ingest`]; originals are only deleted
    /// once every copy succeeded, and a failed deletion is only logged.
    /// Returns the copies that were made.
    pub fn execute(&self) -> Result<Vec<FileCopy>, StorageError> {
        let mut copied = Vec::with_capacity(self.copies.len());
        for copy in &self.copies {
            if !copy.source.exists() {
                warn!(source = %copy.source.display(), "ingest source not found, skipping");
                continue;
            }
            if let Some(parent) = copy.destination.parent() {
                ensure_dir(parent)?;
            }
            fs::copy(&copy.source, &copy.destination).map_err(|e| StorageError::Ingest {
                origin: copy.source.clone(),
                destination: copy.destination.clone(),
                reason: e.to_string(),
            })?;
            debug!(
                source = %copy.source.display(),
                destination = %copy.destination.display(),
                "ingested file"
            );
            copied.push(copy.clone());
        }

        for original in &self.delete_originals {
            let was_copied = copied.iter().any(|c| &c.source == original);
            if !was_copied {
                continue;
            }
            if let Err(e) = fs::remove_file(original) {
                warn!(path = %original.display(), error = %e, "could not delete original file");
            }
        }
        Ok(copied)
    }
}

/// Deletes every ingested file of document `id`.
pub fn expel(files_root: &Path, id: &DocumentId) -> Result<(), StorageError> {
    remove_dir_if_exists(&document_files_dir(files_root, id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndi_core::FileOptions;

    #[test]
    fn prepare_rewrites_ingestible_locations() {
        let root = tempfile::tempdir().unwrap();
        let mut doc = Document::new("base");
        doc.add_file("raw.bin", "/src/raw.bin", FileOptions::default()).unwrap();
        doc.add_file("keep.bin", "/src/keep.bin", FileOptions::ingest(true, false)).unwrap();
        doc.add_file("web", "https://example.org/w", FileOptions::ingest(true, false)).unwrap();

        let plan = IngestPlan::prepare(&mut doc, root.path()).unwrap();
        assert_eq!(plan.copies.len(), 2);
        assert_eq!(plan.delete_originals, vec![PathBuf::from("/src/raw.bin")]);

        let expected = ingested_path(root.path(), &doc.id(), "raw.bin").unwrap();
        let manifest = doc.files().unwrap();
        assert_eq!(
            manifest.info("raw.bin").unwrap().locations[0].location,
            expected.to_string_lossy()
        );
        assert_eq!(manifest.info("web").unwrap().locations[0].location, "https://example.org/w");
    }

    #[test]
    fn execute_copies_and_deletes_originals() {
        let src = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let original = src.path().join("data.bin");
        fs::write(&original, b"payload").unwrap();

        let mut doc = Document::new("base");
        doc.add_file("data.bin", original.to_str().unwrap(), FileOptions::default())
            .unwrap();
        let plan = IngestPlan::prepare(&mut doc, root.path()).unwrap();
        let copied = plan.execute().unwrap();

        assert_eq!(copied.len(), 1);
        let dest = ingested_path(root.path(), &doc.id(), "data.bin").unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"payload");
        assert!(!original.exists());
    }

    #[test]
    fn missing_source_is_skipped() {
        let root = tempfile::tempdir().unwrap();
        let mut doc = Document::new("base");
        doc.add_file("ghost", "/definitely/not/here.bin", FileOptions::default())
            .unwrap();
        let plan = IngestPlan::prepare(&mut doc, root.path()).unwrap();
        assert!(plan.execute().unwrap().is_empty());
    }

    #[test]
    fn readding_ingested_document_plans_nothing() {
        let src = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let original = src.path().join("a.bin");
        fs::write(&original, b"a").unwrap();

        let mut doc = Document::new("base");
        doc.add_file("a.bin", original.to_str().unwrap(), FileOptions::default())
            .unwrap();
        IngestPlan::prepare(&mut doc, root.path()).unwrap().execute().unwrap();

        let again = IngestPlan::prepare(&mut doc, root.path()).unwrap();
        assert!(again.is_empty());
    }

    #[test]
    fn prepare_rejects_escaping_names_from_raw_json() {
        let root = tempfile::tempdir().unwrap();
        let mut value = Document::new("base").to_value();
        value["files"] = serde_json::json!({
            "file_list": ["/tmp/victim"],
            "file_info": [{"name": "/tmp/victim", "locations": [{
                "uid": "u", "location": "/src/payload", "location_type": "file",
                "ingest": true, "delete_original": false
            }]}]
        });
        let mut doc = Document::from_json(&value.to_string()).unwrap();
        let err = IngestPlan::prepare(&mut doc, root.path()).unwrap_err();
        assert!(matches!(
            err,
            StorageError::Core(ndi_core::CoreError::InvalidArgument { .. })
        ));
        let location = &doc.files().unwrap().file_info[0].locations[0].location;
        assert_eq!(location, "/src/payload");
    }

    #[test]
    fn ingested_path_stays_inside_the_document_directory() {
        let root = tempfile::tempdir().unwrap();
        let id = DocumentId::new();
        assert!(ingested_path(root.path(), &id, "../other/f").is_err());
        assert!(ingested_path(root.path(), &id, "/abs").is_err());
        let ok = ingested_path(root.path(), &id, "f.bin").unwrap();
        assert_eq!(ok.parent().unwrap(), document_files_dir(root.path(), &id));
    }

    #[test]
    fn expel_removes_document_directory() {
        let root = tempfile::tempdir().unwrap();
        let id = DocumentId::new();
        let path = ingested_path(root.path(), &id, "f").unwrap();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"x").unwrap();
        expel(root.path(), &id).unwrap();
        assert!(!path.exists());
        expel(root.path(), &id).unwrap();
    }
}
