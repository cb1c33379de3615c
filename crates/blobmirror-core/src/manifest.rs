//! Record of what a partition run produced.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::SkipWarning;

/// Which archive entry point produced a blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlobKind {
    /// A whole leaf directory subtree.
    Tree,
    /// The loose files of one directory level.
    Loose,
}

/// A single archive written into the build area.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobRecord {
    /// Absolute path of the blob file.
    pub path: PathBuf,
    /// Root-relative source directory (the level directory for loose blobs).
    pub source: PathBuf,
    /// Which entry point produced it.
    pub kind: BlobKind,
    /// Number of entries stored.
    pub entries: u64,
    /// Number of entries skipped as unreadable.
    pub skipped: u64,
}

impl BlobRecord {
    /// File name of the blob inside its build directory.
    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }
}

/// Everything produced while partitioning one source tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildManifest {
    /// Blobs in creation order.
    pub blobs: Vec<BlobRecord>,
    /// Build subdirectories created for grouped directories.
    pub groups: Vec<PathBuf>,
    /// Soft skips met while archiving.
    pub warnings: Vec<SkipWarning>,
}

impl BuildManifest {
    /// Create an empty manifest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a produced blob.
    pub fn record_blob(&mut self, blob: BlobRecord) {
        self.blobs.push(blob);
    }

    /// Record a created group directory.
    pub fn record_group(&mut self, dir: PathBuf) {
        self.groups.push(dir);
    }

    /// Record a soft skip.
    pub fn record_skip(&mut self, warning: SkipWarning) {
        self.warnings.push(warning);
    }

    /// Number of blobs written.
    pub fn blob_count(&self) -> usize {
        self.blobs.len()
    }

    /// Number of archive entries across all blobs.
    pub fn total_entries(&self) -> u64 {
        self.blobs.iter().map(|b| b.entries).sum()
    }

    /// Check if anything was skipped.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Find the blob produced for a root-relative source directory.
    pub fn blob_for(&self, source: &Path, kind: BlobKind) -> Option<&BlobRecord> {
        self.blobs
            .iter()
            .find(|b| b.kind == kind && b.source == source)
    }
}
