//! Change detection between a fresh build area and the previous mirror.
//!
//! Each blob in the build area is matched with the file at the same relative
//! path under the mirror:
//! 1. nothing there: `new`
//! 2. same length and same bytes: `equal`
//! 3. anything else: `changed`
//!
//! Only content counts. Timestamps and permissions are ignored, since every
//! rebuild rewrites all blobs.

use std::fs::{self, File};
use std::io::{self, ErrorKind, Read};
use std::path::{Path, PathBuf};

use derive_builder::Builder;
use jwalk::{Parallelism, WalkDir};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter};
use tracing::debug;

use blobmirror_core::DEFAULT_DETAIL_THRESHOLD;

use crate::DiffError;

/// Default read size for content comparison.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Smallest read size accepted.
pub const MIN_CHUNK_SIZE: usize = 32 * 1024;

/// Configuration for diff reporting.
#[derive(Debug, Clone, Builder)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct DiffConfig {
    /// Bytes read from each file per comparison step.
    #[builder(default = "DEFAULT_CHUNK_SIZE")]
    pub chunk_size: usize,

    /// Non-equal blobs at least this big are listed in the summary.
    #[builder(default = "DEFAULT_DETAIL_THRESHOLD")]
    pub detail_threshold: u64,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            detail_threshold: DEFAULT_DETAIL_THRESHOLD,
        }
    }
}

impl DiffConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        match self.chunk_size {
            Some(size) if size < MIN_CHUNK_SIZE => Err(format!(
                "chunk size must be at least {MIN_CHUNK_SIZE} bytes (got {size})"
            )),
            _ => Ok(()),
        }
    }
}

impl DiffConfig {
    /// Create a new config builder.
    pub fn builder() -> DiffConfigBuilder {
        DiffConfigBuilder::default()
    }
}

/// How a blob relates to its previously mirrored copy.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BlobStatus {
    /// No mirrored copy exists.
    New,
    /// The mirrored copy has different content.
    Changed,
    /// The mirrored copy is byte-for-byte identical.
    Equal,
}

/// Classification of one built blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobDiff {
    /// Path relative to the build directory.
    pub path: PathBuf,
    /// Size of the freshly built blob.
    pub size: u64,
    /// Comparison outcome.
    pub status: BlobStatus,
}

/// Results of comparing a build area with the mirror.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiffReport {
    /// Every blob, in walk order.
    pub entries: Vec<BlobDiff>,
    /// Sum of all blob sizes.
    pub total_size: u64,
    /// Blobs without a mirrored copy.
    pub new: usize,
    /// Blobs whose content changed.
    pub changed: usize,
    /// Blobs identical to their mirrored copy.
    pub equal: usize,
}

impl DiffReport {
    /// Add one classified blob.
    pub fn record(&mut self, diff: BlobDiff) {
        self.total_size += diff.size;
        match diff.status {
            BlobStatus::New => self.new += 1,
            BlobStatus::Changed => self.changed += 1,
            BlobStatus::Equal => self.equal += 1,
        }
        self.entries.push(diff);
    }

    /// Total number of blobs compared.
    pub fn blob_count(&self) -> usize {
        self.entries.len()
    }

    /// Number of blobs with the given status.
    pub fn count(&self, status: BlobStatus) -> usize {
        match status {
            BlobStatus::New => self.new,
            BlobStatus::Changed => self.changed,
            BlobStatus::Equal => self.equal,
        }
    }

    /// Check if the mirror would change at all.
    pub fn has_changes(&self) -> bool {
        self.new + self.changed > 0
    }

    /// Non-equal blobs of at least `threshold` bytes, in walk order.
    pub fn details(&self, threshold: u64) -> impl Iterator<Item = &BlobDiff> {
        self.entries
            .iter()
            .filter(move |d| d.size >= threshold && d.status != BlobStatus::Equal)
    }

    /// Condense the report for presentation.
    pub fn summary(&self, threshold: u64) -> RunSummary {
        RunSummary {
            blobs: self.blob_count(),
            total_size: self.total_size,
            new: self.new,
            changed: self.changed,
            equal: self.equal,
            detail_threshold: threshold,
            details: self.details(threshold).cloned().collect(),
        }
    }
}

/// Run statistics meant for logs and humans, not for machine parsing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Number of blobs built.
    pub blobs: usize,
    /// Total size of the build area.
    pub total_size: u64,
    /// Blobs new since the last run.
    pub new: usize,
    /// Blobs changed since the last run.
    pub changed: usize,
    /// Blobs unchanged since the last run.
    pub equal: usize,
    /// Threshold used for `details`.
    pub detail_threshold: u64,
    /// Big non-equal blobs.
    pub details: Vec<BlobDiff>,
}

/// Compares a build area with the mirror it will replace.
pub struct DiffReporter {
    config: DiffConfig,
}

impl DiffReporter {
    /// Create a reporter with default config.
    pub fn new() -> Self {
        Self {
            config: DiffConfig::default(),
        }
    }

    /// Create a reporter with custom config.
    pub fn with_config(config: DiffConfig) -> Self {
        Self { config }
    }

    /// The config in use.
    pub fn config(&self) -> &DiffConfig {
        &self.config
    }

    /// Classify every file under `build_dir` against `mirror_dir`.
    ///
    /// Neither tree is modified. A missing mirror directory makes every blob
    /// `new`.
    pub fn compare(&self, build_dir: &Path, mirror_dir: &Path) -> Result<DiffReport, DiffError> {
        let mut report = DiffReport::default();

        let walker = WalkDir::new(build_dir)
            .parallelism(Parallelism::Serial)
            .skip_hidden(false)
            .follow_links(false)
            .sort(true);

        for entry_result in walker {
            let entry = entry_result.map_err(|err| {
                let path = err.path().map(Path::to_path_buf).unwrap_or_default();
                DiffError::Walk {
                    path,
                    message: err.to_string(),
                }
            })?;
            if entry.file_type().is_dir() {
                continue;
            }

            let build_path = entry.path();
            let Ok(relative) = build_path.strip_prefix(build_dir) else {
                continue;
            };
            let relative = relative.to_path_buf();
            let mirror_path = mirror_dir.join(&relative);

            let size = fs::symlink_metadata(&build_path)
                .map_err(|e| DiffError::io(&build_path, e))?
                .len();
            let status = self.classify(&build_path, &mirror_path)?;
            debug!("=== {} {} ({} bytes)", status, relative.display(), size);

            report.record(BlobDiff {
                path: relative,
                size,
                status,
            });
        }

        Ok(report)
    }

    /// Classify a single built file against its mirrored counterpart.
    pub fn classify(&self, build_path: &Path, mirror_path: &Path) -> Result<BlobStatus, DiffError> {
        let mirror_meta = match fs::metadata(mirror_path) {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BlobStatus::New),
            Err(e) => return Err(DiffError::io(mirror_path, e)),
        };
        if !mirror_meta.is_file() {
            return Ok(BlobStatus::Changed);
        }

        let equal = compare_content(build_path, mirror_path, self.config.chunk_size)?;
        Ok(if equal {
            BlobStatus::Equal
        } else {
            BlobStatus::Changed
        })
    }
}

impl Default for DiffReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Tell if two files hold the same bytes, reading `chunk_size` at a time.
pub fn compare_content(a: &Path, b: &Path, chunk_size: usize) -> Result<bool, DiffError> {
    let mut file_a = File::open(a).map_err(|e| DiffError::io(a, e))?;
    let mut file_b = File::open(b).map_err(|e| DiffError::io(b, e))?;

    let len_a = file_a.metadata().map_err(|e| DiffError::io(a, e))?.len();
    let len_b = file_b.metadata().map_err(|e| DiffError::io(b, e))?.len();
    if len_a != len_b {
        return Ok(false);
    }

    let mut buf_a = vec![0u8; chunk_size];
    let mut buf_b = vec![0u8; chunk_size];
    loop {
        let read_a = fill(&mut file_a, &mut buf_a).map_err(|e| DiffError::io(a, e))?;
        let read_b = fill(&mut file_b, &mut buf_b).map_err(|e| DiffError::io(b, e))?;
        if buf_a[..read_a] != buf_b[..read_b] {
            return Ok(false);
        }
        if read_a == 0 {
            return Ok(true);
        }
    }
}

/// Read until `buf` is full or the reader is exhausted.
fn fill(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
