//! Pairwise file similarity over digest sets.
//!
//! `similarity(A, B) = |A ∩ B| / max(|A|, |B|)`, computed on the set of
//! distinct digests per file. The measure is symmetric, 1.0 for a file with
//! itself and 0.0 for disjoint files.
//!
//! Every unordered pair is compared, which is O(n²) in the number of files.
//! `max_pairs` caps the work: pairs are enumerated row by row in ingest order
//! (`(0,1), (0,2), .., (1,2), ..`) and enumeration stops at the cap.

use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeSet, BinaryHeap};

use layercake_core::FileManifest;
use rayon::prelude::*;
use serde::Serialize;
use tracing::warn;

use crate::index::{CorpusIndex, DigestId};

/// Distinct digests of one file, as sorted ids.
#[derive(Debug, Clone)]
pub struct DigestSet {
    label: String,
    ids: Vec<DigestId>,
}

impl DigestSet {
    /// Build from ids in any order; duplicates collapse.
    #[must_use]
    pub fn new(label: impl Into<String>, mut ids: Vec<DigestId>) -> Self {
        ids.sort_unstable();
        ids.dedup();
        Self {
            label: label.into(),
            ids,
        }
    }

    /// File label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Sorted distinct ids.
    #[must_use]
    pub fn ids(&self) -> &[DigestId] {
        &self.ids
    }

    /// Number of distinct digests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// True if the file had no digests.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Merge-intersect two sorted id slices, calling `on_shared` for each common id.
pub fn intersect<F: FnMut(DigestId)>(a: &[DigestId], b: &[DigestId], mut on_shared: F) -> usize {
    let (mut i, mut j, mut shared) = (0, 0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
            Ordering::Equal => {
                on_shared(a[i]);
                shared += 1;
                i += 1;
                j += 1;
            }
        }
    }
    shared
}

fn ratio(shared: usize, a: usize, b: usize) -> f64 {
    let denom = a.max(b);
    if denom == 0 {
        0.0
    } else {
        shared as f64 / denom as f64
    }
}

/// Similarity of two sorted, deduplicated id sets.
#[must_use]
pub fn similarity(a: &[DigestId], b: &[DigestId]) -> f64 {
    ratio(intersect(a, b, |_| {}), a.len(), b.len())
}

/// Similarity of two manifests, computed directly on digest strings.
#[must_use]
pub fn manifest_similarity(a: &FileManifest, b: &FileManifest) -> f64 {
    let left: BTreeSet<&str> = a.digests().collect();
    let right: BTreeSet<&str> = b.digests().collect();
    ratio(left.intersection(&right).count(), left.len(), right.len())
}

/// A reported file pair. `left` sorts before `right`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarPair {
    /// First file
    pub left: String,
    /// Second file
    pub right: String,
    /// Distinct digests in `left`
    pub left_digests: usize,
    /// Distinct digests in `right`
    pub right_digests: usize,
    /// Digests in both
    pub shared_digests: usize,
    /// Bytes of one copy of each shared digest
    pub shared_bytes: u64,
    /// Shared fraction in `[0, 1]`
    pub similarity: f64,
}

/// Outcome of the pairwise pass.
#[derive(Debug, Clone, Serialize)]
pub struct SimilarityReport {
    /// Files compared
    pub files: usize,
    /// Unordered pairs that exist
    pub pairs_total: u64,
    /// Pairs actually compared
    pub pairs_compared: u64,
    /// True when `max_pairs` stopped enumeration early
    pub truncated: bool,
    /// Threshold used for the counts below
    pub threshold: f64,
    /// Compared pairs at or above the threshold
    pub pairs_over_threshold: u64,
    /// Files with at least one partner at or above the threshold
    pub files_over_threshold: usize,
    /// Most similar pairs, best first
    pub top_pairs: Vec<SimilarPair>,
}

struct Candidate<'a> {
    similarity: f64,
    left: &'a str,
    right: &'a str,
    li: usize,
    ri: usize,
    shared: usize,
}

// Greater is better: higher similarity, then smaller labels.
impl Ord for Candidate<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.similarity
            .total_cmp(&other.similarity)
            .then_with(|| other.left.cmp(self.left))
            .then_with(|| other.right.cmp(self.right))
    }
}

impl PartialOrd for Candidate<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Candidate<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate<'_> {}

#[derive(Default)]
struct PairStats<'a> {
    compared: u64,
    over: u64,
    flagged: Vec<usize>,
    top: BinaryHeap<Reverse<Candidate<'a>>>,
}

impl<'a> PairStats<'a> {
    fn offer(&mut self, candidate: Candidate<'a>, keep: usize) {
        if keep == 0 {
            return;
        }
        self.top.push(Reverse(candidate));
        if self.top.len() > keep {
            self.top.pop();
        }
    }

    fn merge(mut self, other: Self, keep: usize) -> Self {
        self.compared += other.compared;
        self.over += other.over;
        self.flagged.extend(other.flagged);
        for Reverse(candidate) in other.top {
            self.offer(candidate, keep);
        }
        self
    }
}

/// Index of the first pair of row `i` in row-major enumeration of `n` files.
fn row_offset(i: u64, n: u64) -> u64 {
    i * n - i * (i + 1) / 2
}

/// Compare every pair of files, up to `max_pairs`.
pub fn pairwise(
    sets: &[DigestSet],
    index: &CorpusIndex,
    max_pairs: Option<usize>,
    threshold: f64,
    top_pairs: usize,
) -> SimilarityReport {
    let n = sets.len() as u64;
    let pairs_total = n * n.saturating_sub(1) / 2;
    let cap = max_pairs.map_or(pairs_total, |m| (m as u64).min(pairs_total));

    let stats = (0..sets.len())
        .into_par_iter()
        .fold(PairStats::default, |mut stats, i| {
            let offset = row_offset(i as u64, n);
            if offset >= cap {
                return stats;
            }
            let row_len = (cap - offset).min(n - i as u64 - 1) as usize;
            let a = &sets[i];
            for j in (i + 1)..(i + 1 + row_len) {
                let b = &sets[j];
                let shared = intersect(&a.ids, &b.ids, |_| {});
                let sim = ratio(shared, a.len(), b.len());
                stats.compared += 1;
                if sim >= threshold {
                    stats.over += 1;
                    stats.flagged.push(i);
                    stats.flagged.push(j);
                }
                let (li, ri) = if a.label <= b.label { (i, j) } else { (j, i) };
                stats.offer(
                    Candidate {
                        similarity: sim,
                        left: &sets[li].label,
                        right: &sets[ri].label,
                        li,
                        ri,
                        shared,
                    },
                    top_pairs,
                );
            }
            stats
        })
        .reduce(PairStats::default, |a, b| a.merge(b, top_pairs));

    let truncated = stats.compared < pairs_total;
    if truncated {
        warn!(
            compared = stats.compared,
            total = pairs_total,
            "Pairwise similarity truncated by max_pairs"
        );
    }

    let mut over_flags = vec![false; sets.len()];
    for i in stats.flagged {
        over_flags[i] = true;
    }

    let top_pairs = stats
        .top
        .into_sorted_vec()
        .into_iter()
        .map(|Reverse(c)| {
            let (left, right) = (&sets[c.li], &sets[c.ri]);
            let mut shared_bytes = 0u64;
            intersect(&left.ids, &right.ids, |id| {
                shared_bytes = shared_bytes.saturating_add(index.byte_size(id));
            });
            SimilarPair {
                left: left.label.clone(),
                right: right.label.clone(),
                left_digests: left.len(),
                right_digests: right.len(),
                shared_digests: c.shared,
                shared_bytes,
                similarity: c.similarity,
            }
        })
        .collect();

    SimilarityReport {
        files: sets.len(),
        pairs_total,
        pairs_compared: stats.compared,
        truncated,
        threshold,
        pairs_over_threshold: stats.over,
        files_over_threshold: over_flags.iter().filter(|&&f| f).count(),
        top_pairs,
    }
}
