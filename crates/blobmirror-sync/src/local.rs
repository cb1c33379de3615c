//! In-process mirror for destinations on a mounted filesystem.

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::fs::{self, Metadata};
use std::path::Path;

use filetime::FileTime;
use tracing::debug;

use crate::mirror::{Mirror, SyncOutcome, SyncStats};
use crate::SyncError;

/// Recursive copy with delete, keeping modification times and permissions.
///
/// A file is considered up to date when size and modification time match,
/// the same quick check rsync uses.
#[derive(Debug, Clone, Default)]
pub struct LocalMirror;

impl LocalMirror {
    pub fn new() -> Self {
        Self
    }

    fn mirror_dir(&self, source: &Path, dest: &Path, stats: &mut SyncStats) -> Result<(), SyncError> {
        fs::create_dir_all(dest).map_err(|e| SyncError::io(dest, e))?;

        let mut keep: BTreeSet<OsString> = BTreeSet::new();
        for entry in sorted_entries(source)? {
            let name = entry.file_name();
            let from = entry.path();
            let to = dest.join(&name);
            keep.insert(name);

            let meta = fs::symlink_metadata(&from).map_err(|e| SyncError::io(&from, e))?;
            if meta.is_dir() {
                if is_non_dir(&to) {
                    remove(&to)?;
                    stats.removed += 1;
                }
                self.mirror_dir(&from, &to, stats)?;
                copy_attributes(&meta, &to)?;
            } else if up_to_date(&meta, &to) {
                stats.unchanged += 1;
            } else {
                if fs::symlink_metadata(&to).is_ok_and(|m| !m.is_file()) {
                    remove(&to)?;
                    stats.removed += 1;
                }
                debug!("=== copying {} -> {}", from.display(), to.display());
                fs::copy(&from, &to).map_err(|e| SyncError::io(&to, e))?;
                copy_attributes(&meta, &to)?;
                stats.copied += 1;
            }
        }

        for entry in sorted_entries(dest)? {
            if !keep.contains(&entry.file_name()) {
                let path = entry.path();
                debug!("=== deleting {}", path.display());
                remove(&path)?;
                stats.removed += 1;
            }
        }
        Ok(())
    }
}

impl Mirror for LocalMirror {
    fn name(&self) -> &'static str {
        "local"
    }

    fn sync(&self, build_dir: &Path, destination: &Path) -> Result<SyncOutcome, SyncError> {
        let mut stats = SyncStats::default();
        self.mirror_dir(build_dir, destination, &mut stats)?;
        Ok(SyncOutcome {
            destination: destination.to_path_buf(),
            stats: Some(stats),
        })
    }
}

fn sorted_entries(dir: &Path) -> Result<Vec<fs::DirEntry>, SyncError> {
    let mut entries = fs::read_dir(dir)
        .map_err(|e| SyncError::io(dir, e))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| SyncError::io(dir, e))?;
    entries.sort_by_key(|e| e.file_name());
    Ok(entries)
}

fn is_non_dir(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok_and(|m| !m.is_dir())
}

fn up_to_date(source: &Metadata, dest: &Path) -> bool {
    match fs::symlink_metadata(dest) {
        Ok(existing) => {
            existing.is_file()
                && existing.len() == source.len()
                && FileTime::from_last_modification_time(&existing)
                    == FileTime::from_last_modification_time(source)
        }
        Err(_) => false,
    }
}

fn copy_attributes(source: &Metadata, dest: &Path) -> Result<(), SyncError> {
    fs::set_permissions(dest, source.permissions()).map_err(|e| SyncError::io(dest, e))?;
    let mtime = FileTime::from_last_modification_time(source);
    filetime::set_file_mtime(dest, mtime).map_err(|e| SyncError::io(dest, e))
}

fn remove(path: &Path) -> Result<(), SyncError> {
    let meta = fs::symlink_metadata(path).map_err(|e| SyncError::io(path, e))?;
    if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
    .map_err(|e| SyncError::io(path, e))
}
