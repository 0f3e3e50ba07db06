//! Order-sensitive duplicate-byte accounting.
//!
//! The first occurrence of a digest is the canonical copy and is never
//! counted as a duplicate, so results depend on the order manifests are fed
//! in. Store-driven runs use `(account, model)` byte-wise order.

use std::collections::HashSet;

use layercake_core::FileManifest;
use serde::Serialize;

/// Totals of a savings pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SavingsReport {
    /// Bytes across every tensor entry
    pub total_bytes: u64,
    /// Bytes of entries whose digest had already been seen
    pub saved_bytes: u64,
    /// Tensor entries seen
    pub total_tensors: u64,
    /// Entries whose digest had already been seen
    pub duplicate_tensors: u64,
    /// `saved_bytes / total_bytes * 100`, 0 for an empty corpus
    pub percent_saved: f64,
}

/// Running accumulator; the caller decides whether a digest was seen.
#[derive(Debug, Clone, Default)]
pub struct GlobalSavings {
    total_bytes: u64,
    saved_bytes: u64,
    total_tensors: u64,
    duplicate_tensors: u64,
}

impl GlobalSavings {
    /// Create an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for one tensor entry.
    ///
    /// Byte totals saturate at `u64::MAX`; sizes come from manifests on disk
    /// and are not trusted to fit.
    pub fn record(&mut self, byte_count: u64, seen_before: bool) {
        self.total_bytes = self.total_bytes.saturating_add(byte_count);
        self.total_tensors += 1;
        if seen_before {
            self.saved_bytes = self.saved_bytes.saturating_add(byte_count);
            self.duplicate_tensors += 1;
        }
    }

    /// Current totals.
    #[must_use]
    pub fn report(&self) -> SavingsReport {
        SavingsReport {
            total_bytes: self.total_bytes,
            saved_bytes: self.saved_bytes,
            total_tensors: self.total_tensors,
            duplicate_tensors: self.duplicate_tensors,
            percent_saved: percent(self.saved_bytes, self.total_bytes),
        }
    }
}

/// `part / whole * 100`, 0 when `whole` is 0.
#[must_use]
pub fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// One-shot savings over manifests in the order given.
///
/// Within a manifest entries are visited in tensor-name order.
pub fn global_savings<'a, I>(manifests: I) -> SavingsReport
where
    I: IntoIterator<Item = &'a FileManifest>,
{
    let mut seen: HashSet<&str> = HashSet::new();
    let mut savings = GlobalSavings::new();
    for manifest in manifests {
        for record in manifest.tensors.values() {
            let seen_before = !seen.insert(record.digest.as_str());
            savings.record(record.byte_count, seen_before);
        }
    }
    savings.report()
}
