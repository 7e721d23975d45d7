//! Failure record persistence: one JSON file per undelivered action.
//!
//! Each record is stored as `{failure_id}.json` inside the configured base
//! directory.
//!
//! File format:
//! ```json
//! {
//!     "version": 1,
//!     "failure": { ... FailureRecord ... }
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{FederationError, Result};
use crate::push::{FailureId, FailureRecord, FailureStore};

const FAILURE_FILE_VERSION: u32 = 1;

/// Wrapper written to disk for each record.
#[derive(Debug, Serialize, Deserialize)]
struct FailureFile {
    version: u32,
    failure: FailureRecord,
}

/// Filesystem-backed failure store.
///
/// Safe for single-process use; concurrent writers in different processes
/// are not coordinated.
pub struct FileFailureStore {
    base_dir: PathBuf,
}

impl FileFailureStore {
    /// Open a store rooted at `base_dir`, creating the directory if needed.
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn failure_path(&self, id: &FailureId) -> PathBuf {
        self.base_dir.join(format!("{}.json", id.0))
    }
}

impl FailureStore for FileFailureStore {
    fn save(&self, record: &FailureRecord) -> Result<()> {
        let file = FailureFile {
            version: FAILURE_FILE_VERSION,
            failure: record.clone(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| FederationError::SerializationError(e.to_string()))?;
        std::fs::write(self.failure_path(&record.id), json.as_bytes())?;
        Ok(())
    }

    fn load(&self, id: &FailureId) -> Result<FailureRecord> {
        let path = self.failure_path(id);
        if !path.exists() {
            return Err(FederationError::NotFound(format!(
                "failure record not found: {id}"
            )));
        }
        let bytes = std::fs::read(&path)?;
        let file: FailureFile = serde_json::from_slice(&bytes).map_err(|e| {
            FederationError::InvalidFileFormat(format!(
                "failed to parse failure file {}: {e}",
                path.display()
            ))
        })?;
        if file.version != FAILURE_FILE_VERSION {
            return Err(FederationError::InvalidFileFormat(format!(
                "unsupported failure file version {} in {}",
                file.version,
                path.display()
            )));
        }
        Ok(file.failure)
    }

    /// Ids in sorted order.
    fn list(&self) -> Result<Vec<FailureId>> {
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.base_dir)? {
            let name = entry?.file_name();
            if let Some(stem) = name.to_string_lossy().strip_suffix(".json") {
                ids.push(FailureId(stem.to_string()));
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn delete(&self, id: &FailureId) -> Result<()> {
        match std::fs::remove_file(self.failure_path(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FederationError::Io(e)),
        }
    }
}
