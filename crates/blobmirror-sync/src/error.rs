//! Mirror sync errors. All of them abort the run.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while pushing the build area to its destination.
#[derive(Debug, Error)]
pub enum SyncError {
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

    /// The external transfer program could not be started.
    #[error("Cannot run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The external transfer program reported failure.
    #[error("{program} failed with {status}")]
    Failed { program: String, status: String },
}

impl SyncError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            _ => Self::Io { path, source },
        }
    }
}
