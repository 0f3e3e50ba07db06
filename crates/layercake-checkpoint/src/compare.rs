//! Tensor-level comparison of two containers.

use std::collections::BTreeSet;
use std::path::Path;

use layercake_core::{FileManifest, Result};
use serde::Serialize;

use crate::hasher::TensorHasher;

/// How one tensor name relates across the two sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TensorMatch {
    /// Same digest on both sides
    Identical,
    /// Present on both sides with different content
    Different,
    /// Only in the left container
    OnlyLeft,
    /// Only in the right container
    OnlyRight,
}

/// One row of a comparison.
#[derive(Debug, Clone, Serialize)]
pub struct TensorComparison {
    /// Tensor name
    pub name: String,
    /// Relationship across sides
    pub status: TensorMatch,
    /// Bytes on the left side, if present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left_bytes: Option<u64>,
    /// Bytes on the right side, if present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right_bytes: Option<u64>,
}

/// Result of comparing two manifests name by name.
#[derive(Debug, Clone, Serialize)]
pub struct ComparisonReport {
    /// Left source
    pub left: String,
    /// Right source
    pub right: String,
    /// Per-name rows, sorted by name
    pub tensors: Vec<TensorComparison>,
    /// Names with identical content
    pub identical: usize,
    /// Names with differing content
    pub different: usize,
    /// Names only on the left
    pub only_left: usize,
    /// Names only on the right
    pub only_right: usize,
    /// Bytes of left tensors that are identical on the right
    pub identical_bytes: u64,
}

impl ComparisonReport {
    /// True when both sides hold the same names with the same content.
    #[must_use]
    pub fn is_identical(&self) -> bool {
        self.different == 0 && self.only_left == 0 && self.only_right == 0
    }
}

/// Compare two manifests by tensor name.
#[must_use]
pub fn compare_manifests(left: &FileManifest, right: &FileManifest) -> ComparisonReport {
    let names: BTreeSet<&String> = left.tensors.keys().chain(right.tensors.keys()).collect();

    let mut report = ComparisonReport {
        left: left.source_path.clone(),
        right: right.source_path.clone(),
        tensors: Vec::with_capacity(names.len()),
        identical: 0,
        different: 0,
        only_left: 0,
        only_right: 0,
        identical_bytes: 0,
    };

    for name in names {
        let l = left.tensors.get(name);
        let r = right.tensors.get(name);
        let status = match (l, r) {
            (Some(a), Some(b)) if a.digest == b.digest => {
                report.identical += 1;
                report.identical_bytes = report.identical_bytes.saturating_add(a.byte_count);
                TensorMatch::Identical
            }
            (Some(_), Some(_)) => {
                report.different += 1;
                TensorMatch::Different
            }
            (Some(_), None) => {
                report.only_left += 1;
                TensorMatch::OnlyLeft
            }
            (None, Some(_)) => {
                report.only_right += 1;
                TensorMatch::OnlyRight
            }
            (None, None) => continue,
        };
        report.tensors.push(TensorComparison {
            name: name.clone(),
            status,
            left_bytes: l.map(|t| t.byte_count),
            right_bytes: r.map(|t| t.byte_count),
        });
    }

    report
}

/// Hash two container files and compare them.
pub fn compare_containers<A: AsRef<Path>, B: AsRef<Path>>(
    hasher: &TensorHasher,
    left: A,
    right: B,
) -> Result<ComparisonReport> {
    let left = hasher.hash_file(left)?;
    let right = hasher.hash_file(right)?;
    Ok(compare_manifests(&left, &right))
}
