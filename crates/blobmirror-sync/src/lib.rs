//! Mirror sync for blobmirror.
//!
//! Makes the sync directory an exact copy of the build area, either by
//! handing the work to `rsync` or by copying in-process.

mod error;
mod local;
mod mirror;
mod rsync;

pub use error::SyncError;
pub use local::LocalMirror;
pub use mirror::{mirror_for, Mirror, SyncOutcome, SyncStats};
pub use rsync::RsyncMirror;
