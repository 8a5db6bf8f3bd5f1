//! Events emitted while updating a manifest (rendered by `output`)

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Why an entry was left out of the manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Device, socket, FIFO or similar
    NotRegularFile,
    DanglingSymlink,
    SymlinkLoop,
    /// Listed by the directory walk but gone before it could be opened
    Vanished,
    ModifiedBeforeEpoch,
    NonUtf8Name,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SkipReason::NotRegularFile => "not a regular file",
            SkipReason::DanglingSymlink => "dangling symbolic link",
            SkipReason::SymlinkLoop => "symbolic link loop",
            SkipReason::Vanished => "vanished during scan",
            SkipReason::ModifiedBeforeEpoch => "modified before 1970",
            SkipReason::NonUtf8Name => "name is not valid UTF-8",
        };
        f.write_str(text)
    }
}

/// Progress of one update run, in the order things happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    /// No manifest existed yet; starting from an empty one.
    ManifestMissing { path: PathBuf },

    /// Stored timestamp matched; nothing hashed.
    Unchanged { path: String },

    /// New file hashed and recorded.
    Added { path: String },

    /// Known file whose timestamp changed; rehashed.
    Modified { path: String },

    /// Modified too recently to trust; left for the next run.
    TooFresh { path: String },

    /// Older than the ignore threshold; not hashed.
    Ignored { path: String },

    /// Entry not tracked at all.
    Skipped { path: String, reason: SkipReason },

    /// Scan finished without adding or modifying anything.
    NothingChanged,

    /// Record of a file not seen this run was dropped.
    Removed { path: String },

    /// Record older than the ignore threshold was dropped.
    Expired { path: String },

    /// Remove-missing mode found nothing to remove.
    NothingMissing,

    /// Expiry found nothing to expire.
    NothingExpired,
}
