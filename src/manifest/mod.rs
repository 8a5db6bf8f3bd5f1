//! Manifest of content hashes for a directory tree
//!
//! A manifest maps each tracked path to the hash of its contents and the
//! modification time observed when that hash was taken. It is persisted in a
//! compact NUL-delimited format (see [`codec`]) and published atomically
//! (see [`store`]).

pub mod codec;
pub mod store;

pub use codec::{decode, encode, FormatError};
pub use store::{prune, read_manifest, ManifestStore, PruneStats};

use crate::hash::ContentHash;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const NANOS_PER_SEC: u32 = 1_000_000_000;

/// File modification time as seconds and nanoseconds since the Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub struct Timestamp {
    pub secs: u64,
    pub nanos: u32,
}

impl Timestamp {
    /// Returns `None` if `nanos` is not below one second
    pub fn new(secs: u64, nanos: u32) -> Option<Self> {
        (nanos < NANOS_PER_SEC).then_some(Self { secs, nanos })
    }

    /// Returns `None` for times before the epoch
    pub fn from_system_time(time: SystemTime) -> Option<Self> {
        let since_epoch = time.duration_since(UNIX_EPOCH).ok()?;
        Some(Self {
            secs: since_epoch.as_secs(),
            nanos: since_epoch.subsec_nanos(),
        })
    }

    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now()).unwrap_or_default()
    }

    pub fn as_duration(&self) -> Duration {
        Duration::new(self.secs, self.nanos)
    }

    /// How long before `self` the time `earlier` lies
    ///
    /// Zero when `earlier` is not in fact earlier (a timestamp from the future).
    pub fn age_of(&self, earlier: Timestamp) -> Duration {
        self.as_duration().saturating_sub(earlier.as_duration())
    }

    /// Whole seconds between `earlier` and `self`, ignoring the nanoseconds
    pub fn whole_secs_since(&self, earlier: Timestamp) -> u64 {
        self.secs.saturating_sub(earlier.secs)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.secs, self.nanos)
    }
}

/// Stored state of one tracked file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    pub content_hash: ContentHash,
    pub modified: Timestamp,
}

impl FileRecord {
    pub fn new(content_hash: ContentHash, modified: Timestamp) -> Self {
        Self {
            content_hash,
            modified,
        }
    }
}

/// Mapping from tracked path to its record
///
/// Ordered by path so that encoding is deterministic; order carries no meaning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    records: BTreeMap<String, FileRecord>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&FileRecord> {
        self.records.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.records.contains_key(path)
    }

    /// Insert or replace a record, returning the previous one
    pub fn insert(&mut self, path: impl Into<String>, record: FileRecord) -> Option<FileRecord> {
        self.records.insert(path.into(), record)
    }

    pub fn remove(&mut self, path: &str) -> Option<FileRecord> {
        self.records.remove(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FileRecord)> {
        self.records.iter().map(|(path, record)| (path.as_str(), record))
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    /// Keep only the records for which `keep` returns true
    pub fn retain(&mut self, mut keep: impl FnMut(&str, &FileRecord) -> bool) {
        self.records.retain(|path, record| keep(path, record));
    }
}

impl FromIterator<(String, FileRecord)> for Manifest {
    fn from_iter<I: IntoIterator<Item = (String, FileRecord)>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}
