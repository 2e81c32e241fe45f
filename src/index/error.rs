//! Error types for the index store.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors that make the index unusable for the whole run.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Reading, writing, or renaming the index file failed.
    #[error("index I/O error at {path}: {source}")]
    Io {
        /// File involved in the failed operation.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The in-memory index could not be serialized.
    #[error("failed to serialize index: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Another process holds the index lock.
    #[error("index {path} is locked by another running process")]
    Locked {
        /// Index file whose lock is held.
        path: PathBuf,
    },
}

impl IndexError {
    /// Creates an IO error for `path`.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Creates a lock contention error for `path`.
    pub fn locked(path: impl AsRef<Path>) -> Self {
        Self::Locked {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locked_display_names_index() {
        let msg = IndexError::locked("/data/2025/index.json").to_string();
        assert!(msg.contains("/data/2025/index.json"), "{msg}");
        assert!(msg.contains("locked"), "{msg}");
    }

    #[test]
    fn test_io_display_includes_cause() {
        let err = IndexError::io(
            "/data/index.json.tmp",
            std::io::Error::new(std::io::ErrorKind::StorageFull, "no space left"),
        );
        assert!(err.to_string().contains("no space left"));
    }
}
