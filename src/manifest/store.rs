//! Loading, pruning and atomic persistence of manifests
//!
//! A manifest is published by writing it completely to `<path>.tmp`, syncing
//! it to disk and renaming it over `<path>`. Readers therefore see either the
//! old manifest or the new one, and an interrupted run leaves the old one in
//! place.

use super::codec;
use super::Manifest;
use crate::config::{temp_path_for, ScanConfig};
use crate::scan_events::ScanEvent;
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Read and decode a manifest that must exist
pub fn read_manifest(path: &Path) -> Result<Manifest> {
    let data =
        fs::read(path).with_context(|| format!("Failed to read manifest: {}", path.display()))?;
    codec::decode(&data).with_context(|| format!("Malformed manifest: {}", path.display()))
}

/// A manifest file and its temporary sibling
#[derive(Debug, Clone)]
pub struct ManifestStore {
    path: PathBuf,
    temp_path: PathBuf,
}

impl ManifestStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let temp_path = temp_path_for(&path);
        Self { path, temp_path }
    }

    pub fn for_config(config: &ScanConfig) -> Self {
        Self {
            path: config.manifest_path.clone(),
            temp_path: config.temp_path.clone(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Load the manifest, or `None` if there is none yet
    pub fn load_existing(&self) -> Result<Option<Manifest>> {
        match fs::read(&self.path) {
            Ok(data) => codec::decode(&data)
                .map(Some)
                .with_context(|| format!("Malformed manifest: {}", self.path.display())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to read manifest: {}", self.path.display()))
            }
        }
    }

    /// Load the manifest, treating a missing file as an empty manifest
    pub fn load(&self) -> Result<Manifest> {
        Ok(self.load_existing()?.unwrap_or_default())
    }

    /// Write the temporary file and rename it into place
    pub fn persist(&self, manifest: &Manifest) -> Result<()> {
        self.write_temp(manifest)?;
        self.publish()
    }

    /// Write `manifest` to the temporary file, fully synced and closed
    ///
    /// The canonical manifest is not touched until [`publish`](Self::publish).
    pub fn write_temp(&self, manifest: &Manifest) -> Result<()> {
        let temp = self.temp_path.display();
        let file =
            File::create(&self.temp_path).with_context(|| format!("Failed to create {}", temp))?;

        let mut writer = BufWriter::new(file);
        codec::encode(manifest, &mut writer).with_context(|| format!("Failed to write {}", temp))?;
        writer
            .flush()
            .with_context(|| format!("Failed to write {}", temp))?;

        let file = writer
            .into_inner()
            .map_err(|e| e.into_error())
            .with_context(|| format!("Failed to write {}", temp))?;
        file.sync_all()
            .with_context(|| format!("Failed to sync {}", temp))?;

        Ok(())
    }

    /// Atomically replace the canonical manifest with the temporary file
    pub fn publish(&self) -> Result<()> {
        fs::rename(&self.temp_path, &self.path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                self.temp_path.display(),
                self.path.display()
            )
        })
    }
}

/// Records dropped by [`prune`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PruneStats {
    pub removed: usize,
    pub expired: usize,
}

impl PruneStats {
    pub fn changed(&self) -> bool {
        self.removed > 0 || self.expired > 0
    }
}

/// Drop untouched records (remove-missing mode) and expired records
///
/// Expiry applies to touched records too: a file that still exists but was
/// last modified before the threshold loses its record.
pub fn prune<F: FnMut(ScanEvent)>(
    manifest: &mut Manifest,
    touched: &HashSet<String>,
    config: &ScanConfig,
    mut on_event: F,
) -> PruneStats {
    let mut stats = PruneStats::default();
    let reference = config.reference_time;

    manifest.retain(|path, record| {
        if config.remove_missing && !touched.contains(path) {
            stats.removed += 1;
            on_event(ScanEvent::Removed {
                path: path.to_string(),
            });
            return false;
        }

        if let Some(limit) = config.ignore_after_secs {
            if reference.whole_secs_since(record.modified) > limit {
                stats.expired += 1;
                on_event(ScanEvent::Expired {
                    path: path.to_string(),
                });
                return false;
            }
        }

        true
    });

    if config.remove_missing && stats.removed == 0 {
        on_event(ScanEvent::NothingMissing);
    }
    if config.ignore_after_secs.is_some() && stats.expired == 0 {
        on_event(ScanEvent::NothingExpired);
    }

    stats
}
