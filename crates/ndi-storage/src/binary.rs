//! Read handle for an ingested binary file.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use ndi_core::DocumentId;

use crate::error::StorageError;

/// An open binary file belonging to a document.
///
/// Closing is dropping; [`Database::close_binary`](crate::traits::Database::close_binary)
/// exists for callers that want an explicit close point.
#[derive(Debug)]
pub struct BinaryDoc {
    file: File,
    path: PathBuf,
    document_id: DocumentId,
    filename: String,
}

impl BinaryDoc {
    /// Opens `path` for reading. A missing file is `NotFound`.
    pub fn open(path: &Path, document_id: DocumentId, filename: &str) -> Result<Self, StorageError> {
        let file = File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StorageError::not_found(format!(
                "binary file '{}' of document {}",
                filename, document_id
            )),
            _ => StorageError::io(path, e),
        })?;
        Ok(BinaryDoc {
            file,
            path: path.to_path_buf(),
            document_id,
            filename: filename.to_string(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn document_id(&self) -> DocumentId {
        self.document_id
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Reads the remainder of the file.
    pub fn read_all(&mut self) -> Result<Vec<u8>, StorageError> {
        let mut buf = Vec::new();
        self.file
            .read_to_end(&mut buf)
            .map_err(|e| StorageError::io(&self.path, e))?;
        Ok(buf)
    }
}

impl Read for BinaryDoc {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Seek for BinaryDoc {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}
