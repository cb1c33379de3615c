//! Blob building engine for blobmirror.
//!
//! This crate turns a source tree into a build area full of compressed tar
//! blobs.
//!
//! # Overview
//!
//! - **Partitioning** walks the tree top-down. Directories listed in the
//!   group levels are explored child by child, anything else is archived
//!   whole.
//! - **Archiving** writes `.tar.bz2` blobs whose entry names are relative to
//!   the source root. Unreadable inputs are skipped, never fatal.
//! - **Naming** sanitizes blob names and resolves clashes with `-1`, `-2`...
//!   suffixes.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use blobmirror_build::{explore, prepare_build_area};
//! use blobmirror_core::{GroupLevels, IgnoreSet};
//!
//! let build = Path::new("/tmp/build");
//! prepare_build_area(build).unwrap();
//!
//! let levels: GroupLevels = [("projects", 1)].into_iter().collect();
//! let manifest = explore(Path::new("/data"), build, &levels, &IgnoreSet::new()).unwrap();
//! println!("{} blobs", manifest.blob_count());
//! ```

mod archive;
mod error;
mod naming;
mod partition;

pub use archive::{build_tree_archive, pack_loose_files, ArchiveOutput, ArchiveWriter};
pub use error::BuildError;
pub use naming::{blob_file_name, free_blob_path, BLOB_EXTENSION, MAX_SUFFIX, PACKED_FILES_BASE};
pub use partition::{explore, prepare_build_area, Partitioner};

// Re-export core types for convenience
pub use blobmirror_core::{
    BlobKind, BlobRecord, BuildManifest, GroupLevels, IgnoreSet, SkipKind, SkipWarning,
};
