//! One complete manifest update: load, scan, prune, persist

use crate::config::ScanConfig;
use crate::manifest::ManifestStore;
use crate::scan_events::ScanEvent;
use crate::scanner::{self, ScanStats};
use anyhow::Result;

/// What an update run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// A manifest existed before this run
    pub existed: bool,
    /// The manifest was rewritten
    pub written: bool,
    pub stats: ScanStats,
}

/// Bring the manifest for `config.root` up to date
///
/// The manifest file is only rewritten when a record was added, modified or
/// pruned; otherwise it is left exactly as it was, timestamp included.
pub fn update_manifest<F: FnMut(ScanEvent)>(config: &ScanConfig, mut on_event: F) -> Result<UpdateOutcome> {
    let store = ManifestStore::for_config(config);

    let (previous, existed) = match store.load_existing()? {
        Some(manifest) => (manifest, true),
        None => {
            on_event(ScanEvent::ManifestMissing {
                path: store.path().to_path_buf(),
            });
            (Default::default(), false)
        }
    };

    let mut pass = scanner::scan(config, previous, &mut on_event)?;
    if config.remove_missing || config.ignore_after_secs.is_some() {
        pass.prune(config, &mut on_event);
    }

    let written = pass.changed();
    if written {
        store.persist(&pass.manifest)?;
    }

    Ok(UpdateOutcome {
        existed,
        written,
        stats: pass.stats,
    })
}
