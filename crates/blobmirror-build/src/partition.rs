//! Tree partitioner: decides, directory by directory, what becomes a blob.
//!
//! Children of an explored directory are visited in byte-wise name order,
//! which keeps collision suffixes stable between runs. Grouped directories
//! get a sanitized subdirectory in the build area and are explored in turn;
//! other directories become one blob each; plain files at a level share a
//! single `_packed_files` blob.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use blobmirror_core::{sanitize, BuildManifest, GroupLevels, IgnoreSet, Placement};

use crate::archive::{build_tree_archive, pack_loose_files, ArchiveOutput};
use crate::BuildError;

/// Walks a source root and fills a build directory with blobs.
pub struct Partitioner<'a> {
    root: &'a Path,
    ignore: &'a IgnoreSet,
}

impl<'a> Partitioner<'a> {
    /// Create a partitioner for an absolute source root.
    pub fn new(root: &'a Path, ignore: &'a IgnoreSet) -> Self {
        Self { root, ignore }
    }

    /// Partition the whole root into `build_dir`, which must exist.
    pub fn run(&self, build_dir: &Path, levels: &GroupLevels) -> Result<BuildManifest, BuildError> {
        let mut manifest = BuildManifest::new();
        self.explore(Path::new(""), build_dir, levels.clone(), 0, &mut manifest)?;
        Ok(manifest)
    }

    /// Explore one directory, given relative to the root.
    ///
    /// `levels` is owned by this call frame; children get their own
    /// descended copy.
    fn explore(
        &self,
        relative: &Path,
        build_dir: &Path,
        levels: GroupLevels,
        depth: usize,
        manifest: &mut BuildManifest,
    ) -> Result<(), BuildError> {
        let indent = " ".repeat(4 * depth);
        let dir = self.root.join(relative);
        info!("{indent}Exploring {} (levels={:?})", dir.display(), levels);

        let mut loose_files = Vec::new();
        for child in self.list_children(&dir)? {
            let child_relative = relative.join(&child.name);
            match Placement::of(child.is_dir, &child_relative, &levels) {
                Placement::Loose => loose_files.push(child_relative),
                Placement::Grouped => {
                    debug!("{indent}    going down on {}", child.path.display());
                    let build_sub = build_dir.join(sanitize(&child.name.to_string_lossy()));
                    if build_sub.is_dir() {
                        // two grouped names sanitized alike share one subdirectory
                        warn!(
                            "{indent}    reusing {} for {}",
                            build_sub.display(),
                            child.path.display()
                        );
                    }
                    fs::create_dir_all(&build_sub).map_err(|e| BuildError::io(&build_sub, e))?;
                    manifest.record_group(build_sub.clone());

                    let sub_levels = levels.descend(&child_relative);
                    self.explore(&child_relative, &build_sub, sub_levels, depth + 1, manifest)?;
                }
                Placement::Leaf => {
                    info!(
                        "{indent}    building tree for {} in {}",
                        child_relative.display(),
                        dir.display()
                    );
                    let output =
                        build_tree_archive(self.root, build_dir, &child_relative, self.ignore)?;
                    record(manifest, output);
                }
            }
        }

        info!(
            "{indent}    packing {} files in {}",
            loose_files.len(),
            dir.display()
        );
        if let Some(output) = pack_loose_files(self.root, build_dir, &loose_files)? {
            record(manifest, output);
        }
        info!("{indent}    --- done");
        Ok(())
    }

    /// Non-ignored children of `dir`, sorted by name.
    fn list_children(&self, dir: &Path) -> Result<Vec<Child>, BuildError> {
        let list_err = |source| BuildError::ListDir {
            path: dir.to_path_buf(),
            source,
        };

        let mut children = Vec::new();
        for entry in fs::read_dir(dir).map_err(list_err)? {
            let entry = entry.map_err(list_err)?;
            let path = entry.path();
            if self.ignore.contains(&path) {
                debug!("=== ignoring {:?}", path);
                continue;
            }
            // file_type does not follow symlinks: a linked directory is loose
            let is_dir = entry.file_type().map_err(list_err)?.is_dir();
            children.push(Child {
                name: entry.file_name().into(),
                path,
                is_dir,
            });
        }
        children.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(children)
    }
}

/// One surviving entry of a directory listing.
struct Child {
    name: PathBuf,
    path: PathBuf,
    is_dir: bool,
}

fn record(manifest: &mut BuildManifest, output: ArchiveOutput) {
    for warning in output.warnings {
        manifest.record_skip(warning);
    }
    manifest.record_blob(output.blob);
}

/// Partition `root` into `build_dir` following `levels`, leaving out `ignore`.
pub fn explore(
    root: &Path,
    build_dir: &Path,
    levels: &GroupLevels,
    ignore: &IgnoreSet,
) -> Result<BuildManifest, BuildError> {
    Partitioner::new(root, ignore).run(build_dir, levels)
}

/// Destroy any previous build area and recreate it empty.
pub fn prepare_build_area(build_dir: &Path) -> Result<(), BuildError> {
    if fs::symlink_metadata(build_dir).is_ok() {
        debug!("Removing old build dir {}", build_dir.display());
        fs::remove_dir_all(build_dir).map_err(|e| BuildError::io(build_dir, e))?;
    }
    fs::create_dir_all(build_dir).map_err(|e| BuildError::io(build_dir, e))
}
