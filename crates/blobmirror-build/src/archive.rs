//! Archive builder: bzip2-compressed tar blobs.
//!
//! Entry names are always relative to the source root, so a blob can be
//! extracted on its own and put files back where they came from, whatever
//! the blob itself is called.

use std::fs::{self, File, Metadata, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bzip2::write::BzEncoder;
use bzip2::Compression;
use jwalk::{Parallelism, WalkDir};
use tar::{EntryType, Header, HeaderMode};
use tracing::debug;

use blobmirror_core::{sanitize, BlobKind, BlobRecord, IgnoreSet, SkipKind, SkipWarning};

use crate::naming::{free_blob_path, PACKED_FILES_BASE};
use crate::BuildError;

/// A finished blob plus the entries it had to leave out.
#[derive(Debug, Clone)]
pub struct ArchiveOutput {
    /// The blob written.
    pub blob: BlobRecord,
    /// Soft skips met while filling it.
    pub warnings: Vec<SkipWarning>,
}

/// Streaming writer for one blob.
pub struct ArchiveWriter {
    path: PathBuf,
    builder: tar::Builder<BzEncoder<File>>,
    entries: u64,
    warnings: Vec<SkipWarning>,
}

impl ArchiveWriter {
    /// Create the blob file. Fails if the path already exists.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, BuildError> {
        let path = path.into();
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|source| BuildError::CreateBlob {
                path: path.clone(),
                source,
            })?;

        let mut builder = tar::Builder::new(BzEncoder::new(file, Compression::default()));
        builder.follow_symlinks(false);

        Ok(Self {
            path,
            builder,
            entries: 0,
            warnings: Vec::new(),
        })
    }

    /// Add `source` under entry name `name`.
    ///
    /// Problems with the input itself (vanished, unreadable, a socket) are
    /// recorded as skips; only failures writing the blob are returned as
    /// errors.
    pub fn append(&mut self, source: &Path, name: &Path) -> Result<(), BuildError> {
        let metadata = match fs::symlink_metadata(source) {
            Ok(m) => m,
            Err(err) => {
                debug!("=== skipped file without metadata {:?}: {}", source, err);
                self.skip(source, err.to_string(), SkipKind::MetadataError);
                return Ok(());
            }
        };

        let written = if metadata.is_file() {
            let mut file = match File::open(source) {
                Ok(f) => f,
                Err(err) => {
                    debug!("=== skipped unreadable file {:?}", source);
                    self.warnings.push(SkipWarning::unreadable(source, &err));
                    return Ok(());
                }
            };
            self.builder.append_file(name, &mut file)
        } else if metadata.file_type().is_symlink() {
            let target = match fs::read_link(source) {
                Ok(t) => t,
                Err(err) => {
                    debug!("=== skipped unreadable link {:?}", source);
                    self.warnings.push(SkipWarning::unreadable(source, &err));
                    return Ok(());
                }
            };
            let mut header = Header::new_gnu();
            header.set_metadata_in_mode(&metadata, HeaderMode::Complete);
            header.set_size(0);
            self.builder.append_link(&mut header, name, target)
        } else if let Some(mut header) = special_header(&metadata) {
            self.builder.append_data(&mut header, name, io::empty())
        } else {
            debug!("=== skipped unsupported file type {:?}", source);
            self.skip(
                source,
                format!("skipped {}: file type cannot be archived", source.display()),
                SkipKind::Unsupported,
            );
            return Ok(());
        };

        written.map_err(|source| BuildError::WriteBlob {
            path: self.path.clone(),
            source,
        })?;
        self.entries += 1;
        Ok(())
    }

    fn skip(&mut self, source: &Path, message: String, kind: SkipKind) {
        self.warnings.push(SkipWarning::new(source, message, kind));
    }

    /// Terminate the tar stream and flush the compressor.
    pub fn finish(self, source: PathBuf, kind: BlobKind) -> Result<ArchiveOutput, BuildError> {
        let write_err = |source| BuildError::WriteBlob {
            path: self.path.clone(),
            source,
        };
        let encoder = self.builder.into_inner().map_err(write_err)?;
        encoder.finish().map_err(write_err)?;

        let skipped = self.warnings.len() as u64;
        Ok(ArchiveOutput {
            blob: BlobRecord {
                path: self.path,
                source,
                kind,
                entries: self.entries,
                skipped,
            },
            warnings: self.warnings,
        })
    }
}

/// Header for a fifo or device node, stored without data.
///
/// Sockets and anything else unknown get `None`.
#[cfg(unix)]
fn special_header(metadata: &Metadata) -> Option<Header> {
    use std::os::unix::fs::{FileTypeExt, MetadataExt};

    let file_type = metadata.file_type();
    let entry_type = if file_type.is_fifo() {
        EntryType::Fifo
    } else if file_type.is_char_device() {
        EntryType::Char
    } else if file_type.is_block_device() {
        EntryType::Block
    } else {
        return None;
    };

    let mut header = Header::new_gnu();
    header.set_metadata_in_mode(metadata, HeaderMode::Complete);
    header.set_entry_type(entry_type);
    header.set_size(0);
    if entry_type != EntryType::Fifo {
        let dev = metadata.rdev();
        let major = ((dev >> 32) & 0xffff_f000) | ((dev >> 8) & 0x0000_0fff);
        let minor = ((dev >> 12) & 0xffff_ff00) | (dev & 0x0000_00ff);
        header.set_device_major(major as u32).ok()?;
        header.set_device_minor(minor as u32).ok()?;
    }
    Some(header)
}

#[cfg(not(unix))]
fn special_header(_metadata: &Metadata) -> Option<Header> {
    None
}

/// Archive the whole subtree `root/relative_dir` into one blob in `build_dir`.
///
/// The blob is named after the last segment of `relative_dir`, sanitized.
/// Ignored directories are pruned before descent; ignored or unreadable
/// files are left out.
pub fn build_tree_archive(
    root: &Path,
    build_dir: &Path,
    relative_dir: &Path,
    ignore: &IgnoreSet,
) -> Result<ArchiveOutput, BuildError> {
    let name = relative_dir
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_else(|| relative_dir.to_string_lossy());
    let blob_path = free_blob_path(build_dir, &sanitize(&name))?;
    let mut writer = ArchiveWriter::create(&blob_path)?;

    let pruned = Arc::new(ignore.clone());
    let walker = WalkDir::new(root.join(relative_dir))
        .parallelism(Parallelism::Serial)
        .skip_hidden(false)
        .follow_links(false)
        .sort(true)
        .process_read_dir(move |_depth, _path, _state, children| {
            children.retain(|entry| match entry {
                Ok(e) => {
                    let path = e.path();
                    if pruned.contains(&path) {
                        debug!("=== ignoring {:?}", path);
                        false
                    } else {
                        true
                    }
                }
                Err(_) => true,
            });
        });

    for entry_result in walker {
        let entry = match entry_result {
            Ok(e) => e,
            Err(err) => {
                let path = err.path().map(Path::to_path_buf).unwrap_or_default();
                debug!("=== skipped unreadable directory {:?}: {}", path, err);
                writer
                    .warnings
                    .push(SkipWarning::unreadable_dir(path, err.to_string()));
                continue;
            }
        };
        if entry.file_type().is_dir() {
            continue;
        }

        let path = entry.path();
        let entry_name = match path.strip_prefix(root) {
            Ok(rel) => rel.to_path_buf(),
            Err(_) => continue,
        };
        writer.append(&path, &entry_name)?;
    }

    writer.finish(relative_dir.to_path_buf(), BlobKind::Tree)
}

/// Pack sibling files, given relative to `root`, into one `_packed_files` blob.
///
/// Returns `None` without touching `build_dir` when there is nothing to pack.
pub fn pack_loose_files(
    root: &Path,
    build_dir: &Path,
    files: &[PathBuf],
) -> Result<Option<ArchiveOutput>, BuildError> {
    let Some(first) = files.first() else {
        return Ok(None);
    };
    let level = first.parent().map(Path::to_path_buf).unwrap_or_default();

    let blob_path = free_blob_path(build_dir, PACKED_FILES_BASE)?;
    let mut writer = ArchiveWriter::create(&blob_path)?;
    for relative in files {
        writer.append(&root.join(relative), relative)?;
    }
    writer.finish(level, BlobKind::Loose).map(Some)
}
