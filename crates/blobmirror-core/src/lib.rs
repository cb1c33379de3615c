//! Core types for blobmirror.
//!
//! This crate holds what every stage of the pipeline shares: the validated
//! configuration, the ignore set and group level budgets that drive the
//! partitioner, the name sanitizer, and the manifest a build produces.

mod config;
mod error;
mod manifest;
mod node;
mod sanitize;

pub use config::{
    BackupConfig, BackupConfigBuilder, MirrorKind, RawConfig, DEFAULT_DETAIL_THRESHOLD, MB,
};
pub use error::{ConfigError, SkipKind, SkipWarning};
pub use manifest::{BlobKind, BlobRecord, BuildManifest};
pub use node::{GroupLevels, IgnoreSet, Placement};
pub use sanitize::{encode_char, sanitize, FORBIDDEN_CHARS};
