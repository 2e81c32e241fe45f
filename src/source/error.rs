//! Error types for link source scanning.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while reading markdown link sources.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The input root does not exist or is not a directory.
    #[error("input root {path} is not a readable directory\n  Suggestion: pass the academic-year folder that contains the markdown listings")]
    InvalidRoot {
        /// The path that was given.
        path: PathBuf,
    },

    /// A directory or markdown file could not be read.
    #[error("IO error reading {path}: {source}")]
    Io {
        /// The path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl SourceError {
    /// Creates an invalid root error.
    pub fn invalid_root(path: impl Into<PathBuf>) -> Self {
        Self::InvalidRoot { path: path.into() }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
