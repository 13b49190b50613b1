//! On-disk persistence of a document.

use super::model::Document;
use crate::error::{ProtspaceError, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::info;

/// A document file on disk.
///
/// Writes go to a temporary file in the same directory which then replaces
/// the destination, so readers never observe a partial document.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    path: PathBuf,
}

impl DocumentStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the document, or `None` if the file does not exist.
    pub fn load(&self) -> Result<Option<Document>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let document = serde_json::from_reader(BufReader::new(file))?;
        Ok(Some(document))
    }

    /// Load a document that must already exist.
    pub fn load_existing(&self) -> Result<Document> {
        self.load()?.ok_or_else(|| {
            ProtspaceError::InvalidDocument(format!(
                "no document at {}",
                self.path.display()
            ))
        })
    }

    /// Atomically replace the file with `document`.
    pub fn save(&self, document: &Document) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer_pretty(&mut writer, document)?;
            writeln!(writer)?;
            writer.flush()?;
        }
        tmp.persist(&self.path).map_err(|e| ProtspaceError::Io(e.error))?;

        info!(
            path = %self.path.display(),
            projections = document.projections.len(),
            proteins = document.protein_data.len(),
            "Saved document"
        );
        Ok(())
    }
}
