//! Errors raised while comparing trees.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while diffing the build area against the mirror.
#[derive(Debug, Error)]
pub enum DiffError {
    /// Permission denied for a path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The build directory walk failed.
    #[error("Cannot walk {path}: {message}")]
    Walk { path: PathBuf, message: String },
}

impl DiffError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            _ => Self::Io { path, source },
        }
    }
}
