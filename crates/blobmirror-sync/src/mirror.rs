//! The mirror seam: how a finished build area reaches its destination.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use blobmirror_core::MirrorKind;

use crate::local::LocalMirror;
use crate::rsync::RsyncMirror;
use crate::SyncError;

/// Something that makes `destination` an exact copy of `build_dir`.
///
/// After a successful sync the destination holds exactly the build area
/// contents; entries missing from the build area are deleted. On failure
/// whatever was already transferred stays there.
pub trait Mirror {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Mirror `build_dir` into `destination`.
    fn sync(&self, build_dir: &Path, destination: &Path) -> Result<SyncOutcome, SyncError>;
}

/// Counters for a sync whose work is visible in-process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    /// Files written to the destination.
    pub copied: usize,
    /// Files already up to date.
    pub unchanged: usize,
    /// Destination entries deleted.
    pub removed: usize,
}

/// Result of a finished sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncOutcome {
    /// Where the build area went.
    pub destination: PathBuf,
    /// Transfer counters, when the mirror can tell.
    pub stats: Option<SyncStats>,
}

impl SyncOutcome {
    /// Get a human-readable summary.
    pub fn summary(&self) -> String {
        match self.stats {
            Some(stats) => format!(
                "Synced to {}: {} copied, {} unchanged, {} removed",
                self.destination.display(),
                stats.copied,
                stats.unchanged,
                stats.removed
            ),
            None => format!("Synced to {}", self.destination.display()),
        }
    }
}

/// Build the mirror selected in the configuration.
pub fn mirror_for(kind: MirrorKind) -> Box<dyn Mirror> {
    match kind {
        MirrorKind::Rsync => Box::new(RsyncMirror::new()),
        MirrorKind::Local => Box::new(LocalMirror::new()),
    }
}
