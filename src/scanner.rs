//! Incremental reconciliation of a manifest against the directory tree
//!
//! For every regular file the scanner decides, in this order:
//! 1. stored timestamp equals the current one: unchanged, touch it
//! 2. modified within the freshness window: leave it for the next run
//! 3. older than the ignore threshold: don't hash, let prune decide
//! 4. otherwise hash it and add or replace its record
//!
//! The previous manifest is consumed and a [`Reconciliation`] produced from
//! it; which records were confirmed this run is tracked there, not on the
//! records themselves.

use crate::config::ScanConfig;
use crate::hash;
use crate::manifest::{self, FileRecord, Manifest, PruneStats, Timestamp};
use crate::scan_events::{ScanEvent, SkipReason};
use crate::walk::{EntryKind, TreeWalk};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::fs::File;
use std::io::ErrorKind;
use std::path::{Component, Path};

/// Counts for one update run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    pub unchanged: usize,
    pub added: usize,
    pub modified: usize,
    pub too_fresh: usize,
    pub ignored: usize,
    pub skipped: usize,
    pub removed: usize,
    pub expired: usize,
}

/// Result of reconciling a manifest with the tree
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    pub manifest: Manifest,
    /// Paths confirmed present (matched or rehashed) during this pass
    pub touched: HashSet<String>,
    pub stats: ScanStats,
}

impl Reconciliation {
    /// Whether the scan added or replaced any record
    pub fn scan_changed(&self) -> bool {
        self.stats.added > 0 || self.stats.modified > 0
    }

    /// Whether anything about the manifest changed, including pruning
    pub fn changed(&self) -> bool {
        self.scan_changed() || self.stats.removed > 0 || self.stats.expired > 0
    }

    pub fn is_touched(&self, path: &str) -> bool {
        self.touched.contains(path)
    }

    /// Drop missing and expired records according to `config`
    pub fn prune<F: FnMut(ScanEvent)>(&mut self, config: &ScanConfig, on_event: F) -> PruneStats {
        let pruned = manifest::prune(&mut self.manifest, &self.touched, config, on_event);
        self.stats.removed += pruned.removed;
        self.stats.expired += pruned.expired;
        pruned
    }
}

/// Walks `config.root` and reconciles what it finds with a manifest
pub struct TreeScanner<'a, F> {
    config: &'a ScanConfig,
    on_event: F,
    /// Read buffer shared by every file hashed in this scan
    buffer: Vec<u8>,
}

impl<'a, F: FnMut(ScanEvent)> TreeScanner<'a, F> {
    pub fn new(config: &'a ScanConfig, on_event: F) -> Self {
        Self {
            config,
            on_event,
            buffer: Vec::new(),
        }
    }

    /// Reconcile `previous` with the current state of the tree
    pub fn reconcile(&mut self, previous: Manifest) -> Result<Reconciliation> {
        let mut pass = Reconciliation {
            manifest: previous,
            ..Reconciliation::default()
        };

        let walk = TreeWalk::new(&self.config.root, self.config.excluded_paths());
        for entry in walk {
            let entry = entry?;
            match entry.kind {
                EntryKind::Directory => {}
                EntryKind::RegularFile => match record_key(&self.config.root, &entry.path) {
                    Some(key) => self.visit_file(&mut pass, &entry.path, key)?,
                    None => {
                        let path = display_key(&self.config.root, &entry.path);
                        self.skip(&mut pass, path, SkipReason::NonUtf8Name);
                    }
                },
                EntryKind::Skipped(reason) => {
                    let path = display_key(&self.config.root, &entry.path);
                    self.skip(&mut pass, path, reason);
                }
            }
        }

        if !pass.scan_changed() {
            self.emit(ScanEvent::NothingChanged);
        }

        Ok(pass)
    }

    fn visit_file(&mut self, pass: &mut Reconciliation, path: &Path, key: String) -> Result<()> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.skip(pass, key, SkipReason::Vanished);
                return Ok(());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to open {}", path.display()))
            }
        };

        let metadata = file
            .metadata()
            .with_context(|| format!("Failed to stat {}", path.display()))?;
        if !metadata.is_file() {
            self.skip(pass, key, SkipReason::NotRegularFile);
            return Ok(());
        }

        let mtime = metadata
            .modified()
            .with_context(|| format!("Failed to get mtime: {}", path.display()))?;
        let Some(modified) = Timestamp::from_system_time(mtime) else {
            self.skip(pass, key, SkipReason::ModifiedBeforeEpoch);
            return Ok(());
        };

        let previous = pass.manifest.get(&key).map(|record| record.modified);
        if previous == Some(modified) {
            pass.touched.insert(key.clone());
            pass.stats.unchanged += 1;
            self.emit(ScanEvent::Unchanged { path: key });
            return Ok(());
        }

        let reference = self.config.reference_time;
        if reference.age_of(modified) < self.config.freshness {
            pass.stats.too_fresh += 1;
            self.emit(ScanEvent::TooFresh { path: key });
            return Ok(());
        }

        if let Some(limit) = self.config.ignore_after_secs {
            if reference.whole_secs_since(modified) > limit {
                pass.stats.ignored += 1;
                self.emit(ScanEvent::Ignored { path: key });
                return Ok(());
            }
        }

        let content_hash = hash::hash_reader_with(&file, &mut self.buffer)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        drop(file);

        pass.manifest
            .insert(key.clone(), FileRecord::new(content_hash, modified));
        pass.touched.insert(key.clone());

        if previous.is_some() {
            pass.stats.modified += 1;
            self.emit(ScanEvent::Modified { path: key });
        } else {
            pass.stats.added += 1;
            self.emit(ScanEvent::Added { path: key });
        }

        Ok(())
    }

    fn skip(&mut self, pass: &mut Reconciliation, path: String, reason: SkipReason) {
        pass.stats.skipped += 1;
        self.emit(ScanEvent::Skipped { path, reason });
    }

    fn emit(&mut self, event: ScanEvent) {
        (self.on_event)(event)
    }
}

/// Reconcile `previous` against `config.root`, reporting through `on_event`
pub fn scan<F: FnMut(ScanEvent)>(
    config: &ScanConfig,
    previous: Manifest,
    on_event: F,
) -> Result<Reconciliation> {
    TreeScanner::new(config, on_event).reconcile(previous)
}

/// Manifest key for a file: `./` followed by its `/`-separated path below `root`
///
/// `None` if any component is not valid UTF-8.
pub fn record_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let mut key = String::from(".");
    for component in relative.components() {
        if let Component::Normal(name) = component {
            key.push('/');
            key.push_str(name.to_str()?);
        }
    }
    Some(key)
}

/// Like [`record_key`], lossily converting names for display
fn display_key(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let mut key = String::from(".");
    for component in relative.components() {
        if let Component::Normal(name) = component {
            key.push('/');
            key.push_str(&name.to_string_lossy());
        }
    }
    key
}
