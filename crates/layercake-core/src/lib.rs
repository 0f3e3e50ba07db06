//! # layercake-core
//!
//! Shared infrastructure for the layercake tensor deduplication tools.
//!
//! Provides:
//! - Error types ([`LayercakeError`])
//! - Content digests (SHA-256, BLAKE3)
//! - Compressed-size estimators (deflate, zstd, lz4)
//! - The manifest data model and its on-disk store

pub mod compression;
pub mod error;
pub mod hashing;
pub mod manifest;
pub mod store;

pub use compression::{
    Compressor, DeflateCompressor, EstimatorKind, Lz4Compressor, ZstdCompressor,
};
pub use error::{LayercakeError, Result};
pub use hashing::{
    Blake3Hasher, DigestAlgorithm, HashFunction, HashingReader, Sha256Hasher, StreamingHash,
};
pub use manifest::{FileManifest, ManifestKey, TensorRecord, MANIFEST_FILE_NAME, SCHEMA_VERSION};
pub use store::{ManifestIter, ManifestStore};
