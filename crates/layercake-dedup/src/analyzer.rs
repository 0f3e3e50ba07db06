//! Streaming corpus analysis.
//!
//! [`DedupAnalyzer`] is a single-owner fold over manifests: each one is
//! checked for completeness, folded into the savings, ranking and similarity
//! state, and can then be dropped. [`DedupAnalyzer::finish`] produces the
//! report.

use std::collections::BTreeMap;
use std::fmt::Display;

use layercake_core::{FileManifest, ManifestKey, ManifestStore, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::index::CorpusIndex;
use crate::integrity::{IncompleteReason, IntegrityFilter, IntegrityPolicy};
use crate::ranking::{rank_digests, RankingReport};
use crate::savings::{GlobalSavings, SavingsReport};
use crate::similarity::{pairwise, DigestSet, SimilarityReport};

/// Digest algorithm assumed for manifests that do not name one.
const LEGACY_ALGORITHM: &str = "sha256";

/// Configuration for an analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Digests to report in the ranking.
    pub top_k: usize,
    /// Run the pairwise similarity pass.
    pub similarity: bool,
    /// Stop pair enumeration after this many pairs.
    pub max_pairs: Option<usize>,
    /// Similarity counted as "over threshold" (0.0 to 1.0).
    pub similarity_threshold: f64,
    /// Most similar pairs to report.
    pub top_pairs: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            top_k: 10,
            similarity: true,
            max_pairs: None,
            similarity_threshold: 0.7,
            top_pairs: 20,
        }
    }
}

impl AnalysisConfig {
    /// Set the ranking size.
    #[must_use]
    pub fn with_top_k(mut self, k: usize) -> Self {
        self.top_k = k;
        self
    }

    /// Enable or disable the similarity pass.
    #[must_use]
    pub fn with_similarity(mut self, enabled: bool) -> Self {
        self.similarity = enabled;
        self
    }

    /// Cap the number of compared pairs.
    #[must_use]
    pub fn with_max_pairs(mut self, max_pairs: Option<usize>) -> Self {
        self.max_pairs = max_pairs;
        self
    }

    /// Set the similarity threshold.
    #[must_use]
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    /// Set how many top pairs to report.
    #[must_use]
    pub fn with_top_pairs(mut self, n: usize) -> Self {
        self.top_pairs = n;
        self
    }
}

/// A manifest that could not be loaded.
#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    /// Manifest identifier
    pub path: String,
    /// Error message
    pub error: String,
}

/// A manifest excluded by the integrity filter.
#[derive(Debug, Clone, Serialize)]
pub struct IncompleteFile {
    /// Manifest identifier
    pub path: String,
    /// Why it was excluded
    pub reason: IncompleteReason,
}

/// Result of an analysis run.
#[derive(Debug, Clone, Serialize)]
pub struct CorpusReport {
    /// Manifests offered to the analyzer, in any state
    pub files_seen: usize,
    /// Manifests that went into the numbers below
    pub files_processed: usize,
    /// Manifests excluded as incomplete
    pub files_incomplete: usize,
    /// Manifests that failed to load
    pub files_failed: usize,
    /// Excluded manifests
    pub incomplete: Vec<IncompleteFile>,
    /// Load failures
    pub failures: Vec<FileFailure>,
    /// Processed manifests per digest algorithm
    pub hash_algorithms: BTreeMap<String, usize>,
    /// Distinct digests across processed manifests
    pub distinct_digests: usize,
    /// Order-sensitive savings
    pub savings: SavingsReport,
    /// Hot-digest ranking
    pub ranking: RankingReport,
    /// Pairwise similarity, if enabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<SimilarityReport>,
}

/// Single-owner streaming reducer over manifests.
pub struct DedupAnalyzer {
    config: AnalysisConfig,
    filter: IntegrityFilter,
    index: CorpusIndex,
    savings: GlobalSavings,
    sets: Vec<DigestSet>,
    processed: usize,
    incomplete: Vec<IncompleteFile>,
    failures: Vec<FileFailure>,
    algorithms: BTreeMap<String, usize>,
}

impl DedupAnalyzer {
    /// Create an analyzer.
    #[must_use]
    pub fn new(config: AnalysisConfig, policy: IntegrityPolicy) -> Self {
        Self {
            config,
            filter: IntegrityFilter::new(policy),
            index: CorpusIndex::new(),
            savings: GlobalSavings::new(),
            sets: Vec::new(),
            processed: 0,
            incomplete: Vec::new(),
            failures: Vec::new(),
            algorithms: BTreeMap::new(),
        }
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Fold a manifest in, labelled by its `source_path`.
    ///
    /// Returns `false` if the integrity filter excluded it.
    pub fn ingest(&mut self, manifest: &FileManifest) -> bool {
        self.ingest_as(&manifest.source_path, manifest)
    }

    /// Fold a manifest in under an explicit label.
    ///
    /// Savings are order-sensitive: feed manifests in a fixed order.
    pub fn ingest_as(&mut self, label: &str, manifest: &FileManifest) -> bool {
        if let Some(reason) = self.filter.check(manifest) {
            debug!(file = label, %reason, "Excluding incomplete manifest");
            self.incomplete.push(IncompleteFile {
                path: label.to_string(),
                reason,
            });
            return false;
        }

        let algorithm = manifest
            .hash_algorithm
            .as_deref()
            .unwrap_or(LEGACY_ALGORITHM);
        *self.algorithms.entry(algorithm.to_string()).or_insert(0) += 1;

        let mut ids = Vec::with_capacity(if self.config.similarity {
            manifest.len()
        } else {
            0
        });
        for record in manifest.tensors.values() {
            let (id, seen) = self.index.observe(&record.digest, record.byte_count);
            self.savings.record(record.byte_count, seen);
            if self.config.similarity {
                ids.push(id);
            }
        }
        if self.config.similarity {
            self.sets.push(DigestSet::new(label, ids));
        }

        self.processed += 1;
        true
    }

    /// Record a manifest that could not be loaded.
    pub fn record_failure(&mut self, path: impl Into<String>, error: impl Display) {
        self.failures.push(FileFailure {
            path: path.into(),
            error: error.to_string(),
        });
    }

    /// Manifests folded in so far.
    #[must_use]
    pub fn files_processed(&self) -> usize {
        self.processed
    }

    /// Run the corpus-wide passes and build the report.
    #[must_use]
    pub fn finish(self) -> CorpusReport {
        if self.algorithms.len() > 1 {
            let names: Vec<&String> = self.algorithms.keys().collect();
            warn!(
                algorithms = ?names,
                "Manifests use different digest algorithms; their digests never match"
            );
        }

        let ranking = rank_digests(&self.index, self.config.top_k);
        let similarity = self.config.similarity.then(|| {
            if self.sets.len() > 1 {
                info!(files = self.sets.len(), "Computing pairwise similarity");
            }
            pairwise(
                &self.sets,
                &self.index,
                self.config.max_pairs,
                self.config.similarity_threshold,
                self.config.top_pairs,
            )
        });

        CorpusReport {
            files_seen: self.processed + self.incomplete.len() + self.failures.len(),
            files_processed: self.processed,
            files_incomplete: self.incomplete.len(),
            files_failed: self.failures.len(),
            incomplete: self.incomplete,
            failures: self.failures,
            hash_algorithms: self.algorithms,
            distinct_digests: self.index.len(),
            savings: self.savings.report(),
            ranking,
            similarity,
        }
    }
}

/// Analyze every manifest in a store, in `(account, model)` order.
///
/// Unreadable manifests are recorded in the report; only a failure to list
/// the store itself is returned as an error. `on_item` is called once per
/// discovered manifest.
pub fn analyze_store<F>(
    store: &ManifestStore,
    config: AnalysisConfig,
    policy: IntegrityPolicy,
    mut on_item: F,
) -> Result<CorpusReport>
where
    F: FnMut(&ManifestKey),
{
    let mut analyzer = DedupAnalyzer::new(config, policy);
    for (key, loaded) in store.load_all()? {
        on_item(&key);
        let label = key.to_string();
        match loaded {
            Ok(manifest) => {
                analyzer.ingest_as(&label, &manifest);
            }
            Err(e) => {
                warn!(file = %label, error = %e, "Skipping unreadable manifest");
                analyzer.record_failure(label, e);
            }
        }
    }
    Ok(analyzer.finish())
}
