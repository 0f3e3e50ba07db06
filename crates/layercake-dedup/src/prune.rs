//! Removal of incomplete manifests so the models get re-hashed.

use layercake_core::{ManifestKey, ManifestStore, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::analyzer::FileFailure;
use crate::integrity::{IncompleteReason, IntegrityFilter};

/// A manifest selected for removal.
#[derive(Debug, Clone, Serialize)]
pub struct PrunedManifest {
    /// `account/model`
    pub key: String,
    /// Why it was incomplete
    pub reason: IncompleteReason,
}

/// Outcome of a prune pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PruneReport {
    /// Manifests examined
    pub scanned: usize,
    /// Manifests removed (or that would be, on a dry run)
    pub removed: Vec<PrunedManifest>,
    /// Manifests that could not be read; never removed
    pub unreadable: Vec<FileFailure>,
    /// Nothing was deleted
    pub dry_run: bool,
}

/// Delete every manifest the filter judges incomplete.
///
/// Unreadable manifests are reported and left in place.
pub fn prune_incomplete<F>(
    store: &ManifestStore,
    filter: &IntegrityFilter,
    dry_run: bool,
    mut on_item: F,
) -> Result<PruneReport>
where
    F: FnMut(&ManifestKey),
{
    let mut report = PruneReport {
        dry_run,
        ..Default::default()
    };

    for (key, loaded) in store.load_all()? {
        on_item(&key);
        report.scanned += 1;
        let manifest = match loaded {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!(key = %key, error = %e, "Leaving unreadable manifest in place");
                report.unreadable.push(FileFailure {
                    path: key.to_string(),
                    error: e.to_string(),
                });
                continue;
            }
        };

        if let Some(reason) = filter.check(&manifest) {
            if !dry_run {
                store.remove(&key)?;
            }
            info!(key = %key, %reason, dry_run, "Pruned incomplete manifest");
            report.removed.push(PrunedManifest {
                key: key.to_string(),
                reason,
            });
        }
    }

    Ok(report)
}
