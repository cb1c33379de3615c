//! Collision-free blob names inside a build directory.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::BuildError;

/// Extension of every blob.
pub const BLOB_EXTENSION: &str = "tar.bz2";

/// Base name of the blob holding a level's loose files.
pub const PACKED_FILES_BASE: &str = "_packed_files";

/// Highest numeric suffix tried before giving up.
pub const MAX_SUFFIX: u32 = 100_000;

/// File name for `base` with an optional numeric suffix (0 means none).
pub fn blob_file_name(base: &str, suffix: u32) -> String {
    if suffix == 0 {
        format!("{base}.{BLOB_EXTENSION}")
    } else {
        format!("{base}-{suffix}.{BLOB_EXTENSION}")
    }
}

/// First free path among `base.tar.bz2`, `base-1.tar.bz2`, `base-2.tar.bz2`...
///
/// Only safe with a single writer in `dir`.
pub fn free_blob_path(dir: &Path, base: &str) -> Result<PathBuf, BuildError> {
    for suffix in 0..=MAX_SUFFIX {
        let candidate = dir.join(blob_file_name(base, suffix));
        match fs::symlink_metadata(&candidate) {
            Ok(_) => continue,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(candidate),
            Err(e) => return Err(BuildError::io(&candidate, e)),
        }
    }
    Err(BuildError::NameSpaceExhausted {
        dir: dir.to_path_buf(),
        base: base.to_string(),
    })
}
