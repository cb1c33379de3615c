//! Change reporting for blobmirror.
//!
//! After a build, every blob is compared byte for byte with the copy that
//! the previous run left in the mirror, and classified as `new`, `changed`
//! or `equal`:
//!
//! ```rust,ignore
//! use blobmirror_analyze::DiffReporter;
//!
//! let report = DiffReporter::new().compare(build_dir, mirror_dir)?;
//! println!("{} new, {} changed", report.new, report.changed);
//!
//! for blob in report.details(1024 * 1024) {
//!     println!("{:>10}  {:<7}  {}", blob.size, blob.status, blob.path.display());
//! }
//! ```

mod diff;
mod error;

pub use diff::{
    compare_content, BlobDiff, BlobStatus, DiffConfig, DiffConfigBuilder, DiffReport,
    DiffReporter, RunSummary, DEFAULT_CHUNK_SIZE, MIN_CHUNK_SIZE,
};
pub use error::DiffError;
