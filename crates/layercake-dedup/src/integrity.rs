//! Manifest completeness checks.
//!
//! Schema v2 manifests carry an explicit `complete` flag written by the
//! hasher. Legacy manifests have no flag; they count as complete unless the
//! policy asks for the old proxy of a compression estimate on the first entry.

use layercake_core::FileManifest;
use serde::{Deserialize, Serialize};

/// How legacy (pre-v2) manifests are judged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityPolicy {
    /// Treat a legacy manifest as incomplete when its first entry (by name)
    /// has no compressed-size estimate.
    pub legacy_requires_estimate: bool,
}

impl IntegrityPolicy {
    /// Set `legacy_requires_estimate`.
    #[must_use]
    pub fn with_legacy_requires_estimate(mut self, required: bool) -> Self {
        self.legacy_requires_estimate = required;
        self
    }
}

/// Why a manifest was judged incomplete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IncompleteReason {
    /// No tensor entries
    Empty,
    /// v2 manifest whose `complete` flag is false
    NotMarkedComplete,
    /// Legacy manifest whose first entry lacks `compressed_size`
    MissingEstimate,
}

impl std::fmt::Display for IncompleteReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Empty => "no tensors",
            Self::NotMarkedComplete => "not marked complete",
            Self::MissingEstimate => "legacy manifest without compressed_size",
        };
        f.write_str(s)
    }
}

/// Pure completeness predicate over manifests.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntegrityFilter {
    policy: IntegrityPolicy,
}

impl IntegrityFilter {
    /// Create a filter with the given policy.
    #[must_use]
    pub fn new(policy: IntegrityPolicy) -> Self {
        Self { policy }
    }

    /// The active policy.
    #[must_use]
    pub fn policy(&self) -> IntegrityPolicy {
        self.policy
    }

    /// `None` if the manifest is complete, otherwise the first reason it is not.
    #[must_use]
    pub fn check(&self, manifest: &FileManifest) -> Option<IncompleteReason> {
        if manifest.is_empty() {
            return Some(IncompleteReason::Empty);
        }
        if manifest.schema_version >= 2 {
            return (!manifest.complete).then_some(IncompleteReason::NotMarkedComplete);
        }
        if self.policy.legacy_requires_estimate {
            let has_estimate = manifest
                .first_entry()
                .is_some_and(|(_, record)| record.compressed_byte_count.is_some());
            if !has_estimate {
                return Some(IncompleteReason::MissingEstimate);
            }
        }
        None
    }

    /// Whether the manifest may be analyzed.
    #[must_use]
    pub fn is_complete(&self, manifest: &FileManifest) -> bool {
        self.check(manifest).is_none()
    }
}
