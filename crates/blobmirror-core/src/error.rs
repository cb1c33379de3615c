//! Error and warning types shared by the build pipeline.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading or validating a backup configuration.
///
/// All of these are reported before anything on disk is touched.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid YAML for the expected layout.
    #[error("Bad config! cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A required key was not provided.
    #[error("Bad config! missing required setting `{key}`")]
    Missing { key: &'static str },

    /// One of the root/build/sync directories is not absolute.
    #[error("Bad config! {name} must be absolute (got {path})")]
    NotAbsolute { name: &'static str, path: PathBuf },

    /// The source root does not exist or is not a directory.
    #[error("Bad config! root dir is not an existing directory: {path}")]
    RootNotADirectory { path: PathBuf },

    /// An ignore entry was given as an absolute path.
    #[error("Bad config: to-ignore nodes must be relative ({path} is not)")]
    IgnoreNotRelative { path: PathBuf },

    /// An ignore entry points to nothing.
    #[error("Bad config: to-ignore node does not exist: {path}")]
    IgnoreMissing { path: PathBuf },

    /// A group level key was given as an absolute path.
    #[error("Bad config: group level nodes must be relative ({path} is not)")]
    GroupNotRelative { path: PathBuf },

    /// A group level key points to nothing.
    #[error("Bad config: group level node does not exist: {path}")]
    GroupMissing { path: PathBuf },

    /// A group level key points to a file.
    #[error("Bad config: group level nodes must be directories ({path} is not)")]
    GroupNotADirectory { path: PathBuf },

    /// A group level key has more than one path segment.
    #[error("Bad config: group level can be defined for base dirs only, got {path}")]
    GroupNotTopLevel { path: PathBuf },

    /// A group level value is not an integer.
    #[error("Bad config: group level must be a number (got {value:?} in path {path})")]
    GroupNotANumber { path: PathBuf, value: String },

    /// A group level value is zero or negative.
    #[error("Bad config: group level must be positive (got {value} in path {path})")]
    GroupNotPositive { path: PathBuf, value: i64 },

    /// The build or sync dir would be archived into itself.
    #[error("The {name} dir is under root dir and not under something ignored: {path}")]
    UnsafeNesting { name: &'static str, path: PathBuf },

    /// Programmatic builder validation failed.
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

impl ConfigError {
    /// Create a read error with path context.
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }
}

/// Kind of soft skip recorded while archiving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipKind {
    /// The file could not be opened for reading.
    Unreadable,
    /// A directory inside an archived subtree could not be listed.
    UnreadableDirectory,
    /// The file metadata could not be read.
    MetadataError,
    /// The file type has no tar representation (sockets).
    Unsupported,
}

/// Non-fatal problem met while archiving: the entry is absent from its blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkipWarning {
    /// Path that was skipped.
    pub path: PathBuf,
    /// Human-readable message.
    pub message: String,
    /// Kind of skip.
    pub kind: SkipKind,
}

impl SkipWarning {
    /// Create a new skip warning.
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>, kind: SkipKind) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            kind,
        }
    }

    /// Create an unreadable-file warning.
    pub fn unreadable(path: impl Into<PathBuf>, error: &std::io::Error) -> Self {
        let path = path.into();
        Self {
            message: format!("skipped unreadable file {}: {error}", path.display()),
            path,
            kind: SkipKind::Unreadable,
        }
    }

    /// Create an unreadable-directory warning.
    pub fn unreadable_dir(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::new(path, message, SkipKind::UnreadableDirectory)
    }
}
