//! # layercake-dedup
//!
//! Cross-corpus deduplication analysis over tensor hash manifests.
//!
//! Given the manifests written by `layercake-hash`, measures how much storage
//! content-addressed deduplication would save:
//! 1. **Global savings** - bytes whose digest was already seen, in a fixed
//!    traversal order
//! 2. **Pairwise similarity** - shared-digest fraction for every file pair
//! 3. **Hot digests** - the most repeated tensors and what they cost
//!
//! ## Quick Start
//!
//! ```rust
//! use layercake_core::{FileManifest, TensorRecord};
//! use layercake_dedup::{AnalysisConfig, DedupAnalyzer, IntegrityPolicy};
//!
//! let mut a = FileManifest::new("acme/base");
//! a.insert("embed", TensorRecord::new("d1", 1024));
//! a.insert("head", TensorRecord::new("d2", 64));
//! a.mark_complete();
//!
//! let mut b = FileManifest::new("acme/finetune");
//! b.insert("embed", TensorRecord::new("d1", 1024));
//! b.insert("head", TensorRecord::new("d3", 64));
//! b.mark_complete();
//!
//! let mut analyzer = DedupAnalyzer::new(AnalysisConfig::default(), IntegrityPolicy::default());
//! analyzer.ingest(&a);
//! analyzer.ingest(&b);
//! let report = analyzer.finish();
//!
//! assert_eq!(report.savings.saved_bytes, 1024);
//! assert_eq!(report.similarity.unwrap().top_pairs[0].similarity, 0.5);
//! ```
//!
//! The analysis never modifies model files; [`prune`] only removes manifests.

pub mod analyzer;
pub mod index;
pub mod integrity;
pub mod prune;
pub mod ranking;
pub mod savings;
pub mod similarity;

// Re-export main types
pub use analyzer::{
    analyze_store, AnalysisConfig, CorpusReport, DedupAnalyzer, FileFailure, IncompleteFile,
};
pub use index::{CorpusIndex, DigestId};
pub use integrity::{IncompleteReason, IntegrityFilter, IntegrityPolicy};
pub use prune::{prune_incomplete, PruneReport, PrunedManifest};
pub use ranking::{rank_digests, HotDigest, RankingReport};
pub use savings::{global_savings, percent, GlobalSavings, SavingsReport};
pub use similarity::{
    manifest_similarity, pairwise, similarity, DigestSet, SimilarPair, SimilarityReport,
};
