//! Fatal build errors.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort a build. The build area is left as it is.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A blob file could not be created.
    #[error("Cannot create blob {path}: {source}")]
    CreateBlob {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing into a blob failed (disk full, I/O error).
    #[error("Failed writing blob {path}: {source}")]
    WriteBlob {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Every candidate name for a blob is already taken.
    #[error("No free blob name for {base:?} in {dir}")]
    NameSpaceExhausted { dir: PathBuf, base: String },

    /// A directory being explored could not be listed.
    #[error("Cannot list directory {path}: {source}")]
    ListDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Permission denied while preparing the build area.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Generic I/O error while preparing the build area.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BuildError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            _ => Self::Io { path, source },
        }
    }
}
