//! Mirror through an external `rsync`.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::mirror::{Mirror, SyncOutcome};
use crate::SyncError;

/// Flags: keep times and permissions, recurse, delete extraneous entries,
/// update in place.
const RSYNC_FLAGS: [&str; 5] = ["-t", "-p", "-r", "--delete", "--inplace"];

/// Runs `rsync` once over the whole build area.
#[derive(Debug, Clone)]
pub struct RsyncMirror {
    program: PathBuf,
}

impl RsyncMirror {
    /// Use the `rsync` found in `PATH`.
    pub fn new() -> Self {
        Self::with_program("rsync")
    }

    /// Use a specific executable.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// The command that mirrors `build_dir` into `destination`.
    ///
    /// The trailing slash on the source makes rsync copy the contents of the
    /// build area rather than the directory itself.
    pub fn command(&self, build_dir: &Path, destination: &Path) -> Command {
        let mut source = OsString::from(build_dir.as_os_str());
        source.push("/");

        let mut cmd = Command::new(&self.program);
        cmd.args(RSYNC_FLAGS).arg(source).arg(destination);
        cmd
    }

    fn program_name(&self) -> String {
        self.program.display().to_string()
    }
}

impl Default for RsyncMirror {
    fn default() -> Self {
        Self::new()
    }
}

impl Mirror for RsyncMirror {
    fn name(&self) -> &'static str {
        "rsync"
    }

    fn sync(&self, build_dir: &Path, destination: &Path) -> Result<SyncOutcome, SyncError> {
        fs::create_dir_all(destination).map_err(|e| SyncError::io(destination, e))?;

        let mut cmd = self.command(build_dir, destination);
        debug!("Running external {:?}", cmd);
        let status = cmd.status().map_err(|source| SyncError::Spawn {
            program: self.program_name(),
            source,
        })?;
        if !status.success() {
            return Err(SyncError::Failed {
                program: self.program_name(),
                status: status.to_string(),
            });
        }

        Ok(SyncOutcome {
            destination: destination.to_path_buf(),
            stats: None,
        })
    }
}
