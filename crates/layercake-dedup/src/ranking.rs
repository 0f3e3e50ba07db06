//! Most frequent digests across the corpus.

use std::cmp::Ordering;

use serde::Serialize;

use crate::index::{CorpusIndex, DigestId};
use crate::savings::percent;

/// One ranked digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HotDigest {
    /// Digest text
    pub digest: String,
    /// Non-empty occurrences across the corpus
    pub occurrences: u64,
    /// Size of one copy
    pub byte_count: u64,
    /// `byte_count * occurrences`
    pub total_bytes: u64,
}

/// Ranking plus aggregates over every tracked digest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankingReport {
    /// Top digests, best first
    pub top: Vec<HotDigest>,
    /// Distinct non-empty digests
    pub tracked_digests: usize,
    /// Bytes spanned by every occurrence of a tracked digest
    pub total_bytes: u64,
    /// Bytes removed by keeping one copy of each digest
    pub savings_bytes: u64,
    /// `savings_bytes / total_bytes * 100`
    pub percent_saved: f64,
}

/// Count descending, then size descending, then digest ascending.
fn rank_order(index: &CorpusIndex, a: DigestId, b: DigestId) -> Ordering {
    index
        .occurrences(b)
        .cmp(&index.occurrences(a))
        .then_with(|| index.byte_size(b).cmp(&index.byte_size(a)))
        .then_with(|| index.digest(a).cmp(index.digest(b)))
}

/// Rank tracked digests and keep the top `k`.
///
/// Zero-byte tensors are never tracked, so they never rank. Byte aggregates
/// saturate instead of overflowing.
#[must_use]
pub fn rank_digests(index: &CorpusIndex, k: usize) -> RankingReport {
    let mut ids: Vec<DigestId> = index.tracked().collect();

    let mut total_bytes = 0u64;
    let mut savings_bytes = 0u64;
    for &id in &ids {
        let size = index.byte_size(id);
        let count = index.occurrences(id);
        total_bytes = total_bytes.saturating_add(size.saturating_mul(count));
        savings_bytes = savings_bytes.saturating_add(size.saturating_mul(count - 1));
    }

    let tracked_digests = ids.len();
    if k < ids.len() {
        if k > 0 {
            ids.select_nth_unstable_by(k - 1, |&a, &b| rank_order(index, a, b));
        }
        ids.truncate(k);
    }
    ids.sort_unstable_by(|&a, &b| rank_order(index, a, b));

    let top = ids
        .into_iter()
        .map(|id| {
            let byte_count = index.byte_size(id);
            let occurrences = index.occurrences(id);
            HotDigest {
                digest: index.digest(id).to_string(),
                occurrences,
                byte_count,
                total_bytes: byte_count.saturating_mul(occurrences),
            }
        })
        .collect();

    RankingReport {
        top,
        tracked_digests,
        total_bytes,
        savings_bytes,
        percent_saved: percent(savings_bytes, total_bytes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_of(observations: &[(&str, u64)]) -> CorpusIndex {
        let mut index = CorpusIndex::new();
        for (digest, size) in observations {
            index.observe(digest, *size);
        }
        index
    }

    #[test]
    fn test_rank_order_and_aggregates() {
        let index = index_of(&[
            ("c", 10),
            ("a", 100),
            ("b", 100),
            ("a", 100),
            ("c", 10),
            ("c", 10),
            ("b", 100),
            ("d", 500),
        ]);
        let report = rank_digests(&index, 10);

        let order: Vec<&str> = report.top.iter().map(|h| h.digest.as_str()).collect();
        // c has the most hits; a and b tie on count and size, so digest order.
        assert_eq!(order, vec!["c", "a", "b", "d"]);
        assert_eq!(report.top[0].occurrences, 3);
        assert_eq!(report.top[0].total_bytes, 30);

        assert_eq!(report.tracked_digests, 4);
        assert_eq!(report.total_bytes, 30 + 200 + 200 + 500);
        assert_eq!(report.savings_bytes, 20 + 100 + 100);
        let expected = 220.0 / 930.0 * 100.0;
        assert!((report.percent_saved - expected).abs() < 1e-9);
    }

    #[test]
    fn test_size_breaks_count_ties() {
        let index = index_of(&[("small", 1), ("big", 9)]);
        let report = rank_digests(&index, 2);
        assert_eq!(report.top[0].digest, "big");
        assert_eq!(report.top[1].digest, "small");
    }

    #[test]
    fn test_top_k_truncates() {
        let index = index_of(&[("a", 1), ("a", 1), ("b", 1), ("c", 1), ("c", 1), ("c", 1)]);
        let report = rank_digests(&index, 1);
        assert_eq!(report.top.len(), 1);
        assert_eq!(report.top[0].digest, "c");
        assert_eq!(report.tracked_digests, 3);

        let none = rank_digests(&index, 0);
        assert!(none.top.is_empty());
        assert_eq!(none.savings_bytes, 3);
    }

    #[test]
    fn test_only_zero_byte_tensors_rank_nothing() {
        let index = index_of(&[("e3b0", 0), ("e3b0", 0), ("e3b0", 0)]);
        let report = rank_digests(&index, 10);
        assert!(report.top.is_empty());
        assert_eq!(report.tracked_digests, 0);
        assert_eq!(report.total_bytes, 0);
        assert_eq!(report.percent_saved, 0.0);
    }

    #[test]
    fn test_ranking_is_order_invariant() {
        let observations = [("x", 4), ("y", 4), ("x", 4), ("z", 8), ("y", 4), ("w", 4)];
        let forward = rank_digests(&index_of(&observations), 3);

        let mut reversed = observations;
        reversed.reverse();
        let backward = rank_digests(&index_of(&reversed), 3);

        assert_eq!(forward, backward);
    }

    #[test]
    fn test_huge_sizes_saturate() {
        let index = index_of(&[("big", u64::MAX), ("big", u64::MAX), ("small", 2)]);
        let report = rank_digests(&index, 1);

        assert_eq!(report.top[0].digest, "big");
        assert_eq!(report.top[0].total_bytes, u64::MAX);
        assert_eq!(report.total_bytes, u64::MAX);
        assert_eq!(report.savings_bytes, u64::MAX);
    }
}
