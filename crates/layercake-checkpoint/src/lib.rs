//! # layercake-checkpoint
//!
//! Content hashing for safetensors checkpoints.
//!
//! Reads the container header, streams each tensor's byte range once and
//! records a digest (plus an optional compressed-size estimate) per tensor.
//! Whole download trees are hashed in parallel, one manifest per model.
//!
//! ## Quick Start
//!
//! ```rust
//! use layercake_checkpoint::{ContainerReader, ContainerWriter, HashConfig, TensorHasher};
//! use std::io::Cursor;
//!
//! let mut writer = ContainerWriter::new();
//! writer.add_tensor("w", "F32", vec![2], vec![1, 2, 3, 4, 5, 6, 7, 8]);
//! let bytes = writer.to_bytes().unwrap();
//!
//! let mut reader = ContainerReader::from_reader(Cursor::new(bytes), "example").unwrap();
//! let hasher = TensorHasher::new(&HashConfig::default());
//! let manifest = hasher.hash_container(&mut reader).unwrap();
//!
//! assert_eq!(manifest.len(), 1);
//! assert_eq!(manifest.tensors["w"].byte_count, 8);
//! assert!(manifest.complete);
//! ```
//!
//! ## Modules
//!
//! - [`formats`] - Safetensors container reader and writer
//! - [`hasher`] - Per-tensor digests and compression estimates
//! - [`corpus`] - Model discovery and parallel corpus hashing
//! - [`compare`] - Tensor-level comparison of two containers

pub mod compare;
pub mod corpus;
pub mod formats;
pub mod hasher;

// Re-export main types
pub use compare::{
    compare_containers, compare_manifests, ComparisonReport, TensorComparison, TensorMatch,
};
pub use corpus::{
    discover_models, hash_corpus, list_containers, FailedModel, HashRunSummary, ModelDir,
    ModelOutcome,
};
pub use formats::{is_container, ContainerReader, ContainerWriter, TensorSpan};
pub use hasher::{HashConfig, TensorHasher};
