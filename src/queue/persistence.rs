//! JSON snapshot of the pending download queue
//!
//! The snapshot file is a pretty-printed JSON array of URL strings. Saves go
//! through a temporary file and a rename so a crash mid-write leaves the
//! previous snapshot intact.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while reading or writing a queue snapshot
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid queue snapshot: {0}")]
    Json(#[from] serde_json::Error),
}

/// Reads and writes the queue snapshot at a fixed path
#[derive(Debug, Clone)]
pub struct QueueStore {
    path: PathBuf,
}

impl QueueStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the saved URLs in their saved order
    ///
    /// A missing file is an empty snapshot, not an error.
    pub fn load(&self) -> Result<Vec<String>, PersistError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(PersistError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        Ok(serde_json::from_str(&content)?)
    }

    /// Overwrites the snapshot with `urls`
    pub fn save(&self, urls: &[String]) -> Result<(), PersistError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source: std::io::Error| PersistError::Io { path, source }
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err(parent))?;
        }

        let encoded = serde_json::to_string_pretty(urls)?;
        let tmp_path = self.path.with_extension("tmp");
        std::fs::write(&tmp_path, encoded).map_err(io_err(&tmp_path))?;
        std::fs::rename(&tmp_path, &self.path).map_err(io_err(&self.path))?;

        tracing::debug!("Saved {} queued URLs to {}", urls.len(), self.path.display());
        Ok(())
    }

    /// Deletes the snapshot file if it exists
    pub fn clear(&self) -> Result<(), PersistError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(PersistError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }
}
