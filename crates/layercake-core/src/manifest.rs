//! Per-container hash manifests.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Schema version written by this crate.
///
/// Version 1 manifests predate the explicit `complete` flag and the
/// `schema_version` field itself.
pub const SCHEMA_VERSION: u32 = 2;

/// File name of a manifest inside its `account/model` directory.
pub const MANIFEST_FILE_NAME: &str = "hashes.json";

fn legacy_schema() -> u32 {
    1
}

/// Digest and size of one named tensor.
///
/// The tensor name is the key under which the record is stored in
/// [`FileManifest::tensors`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorRecord {
    /// Hex-encoded content digest
    #[serde(rename = "hash")]
    pub digest: String,
    /// Payload length in bytes (`end - start`)
    pub byte_count: u64,
    /// Compressed size estimate, when one was computed
    #[serde(
        rename = "compressed_size",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub compressed_byte_count: Option<u64>,
}

impl TensorRecord {
    /// Create a record without a compression estimate.
    #[must_use]
    pub fn new(digest: impl Into<String>, byte_count: u64) -> Self {
        Self {
            digest: digest.into(),
            byte_count,
            compressed_byte_count: None,
        }
    }

    /// Attach a compression estimate.
    #[must_use]
    pub fn with_compressed(mut self, compressed: u64) -> Self {
        self.compressed_byte_count = Some(compressed);
        self
    }
}

/// Tensor name -> record mapping for one container (or one model whose shards
/// were merged).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileManifest {
    /// Manifest schema version
    #[serde(default = "legacy_schema")]
    pub schema_version: u32,
    /// Identifier of the source (container path or `account/model`)
    #[serde(rename = "file_path", default)]
    pub source_path: String,
    /// Container files merged into this manifest
    #[serde(rename = "file_paths", default, skip_serializing_if = "Vec::is_empty")]
    pub shards: Vec<String>,
    /// Digest algorithm that produced the `hash` fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_algorithm: Option<String>,
    /// Set once every tensor of every shard was hashed
    #[serde(default)]
    pub complete: bool,
    /// Records keyed by tensor name
    pub tensors: BTreeMap<String, TensorRecord>,
}

impl FileManifest {
    /// Create an empty, not yet complete manifest.
    #[must_use]
    pub fn new(source_path: impl Into<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            source_path: source_path.into(),
            shards: Vec::new(),
            hash_algorithm: None,
            complete: false,
            tensors: BTreeMap::new(),
        }
    }

    /// Record the digest algorithm.
    #[must_use]
    pub fn with_algorithm(mut self, algorithm: impl Into<String>) -> Self {
        self.hash_algorithm = Some(algorithm.into());
        self
    }

    /// Add a tensor, returning the record it replaced (if any).
    pub fn insert(&mut self, name: impl Into<String>, record: TensorRecord) -> Option<TensorRecord> {
        self.tensors.insert(name.into(), record)
    }

    /// Flag the manifest as fully hashed.
    pub fn mark_complete(&mut self) {
        self.complete = true;
    }

    /// Number of tensors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    /// True if no tensors were recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Sum of `byte_count` over all tensors.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.tensors
            .values()
            .fold(0u64, |acc, r| acc.saturating_add(r.byte_count))
    }

    /// The first entry in iteration order (smallest tensor name).
    #[must_use]
    pub fn first_entry(&self) -> Option<(&str, &TensorRecord)> {
        self.tensors.iter().next().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterate over all digests, including repeats.
    pub fn digests(&self) -> impl Iterator<Item = &str> {
        self.tensors.values().map(|r| r.digest.as_str())
    }

    /// Merge per-shard manifests into a single one named `source_path`.
    ///
    /// Shards are taken in the order given; when two shards declare the same
    /// tensor name the earlier one wins. Returns the merged manifest and the
    /// names that collided. The result is not marked complete.
    #[must_use]
    pub fn merge(source_path: impl Into<String>, parts: Vec<FileManifest>) -> (Self, Vec<String>) {
        let mut merged = Self::new(source_path);
        let mut collisions = Vec::new();

        for part in parts {
            if merged.hash_algorithm.is_none() {
                merged.hash_algorithm = part.hash_algorithm.clone();
            }
            if part.shards.is_empty() {
                merged.shards.push(part.source_path);
            } else {
                merged.shards.extend(part.shards);
            }
            for (name, record) in part.tensors {
                if merged.tensors.contains_key(&name) {
                    collisions.push(name);
                } else {
                    merged.tensors.insert(name, record);
                }
            }
        }

        (merged, collisions)
    }
}

/// Location of a manifest within a results tree: `<account>/<model>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ManifestKey {
    /// Hub account (owner)
    pub account: String,
    /// Model repository name
    pub model: String,
}

impl ManifestKey {
    /// Create a new key.
    #[must_use]
    pub fn new(account: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            model: model.into(),
        }
    }

    /// Path of the manifest relative to the results root.
    #[must_use]
    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(&self.account)
            .join(&self.model)
            .join(MANIFEST_FILE_NAME)
    }
}

impl fmt::Display for ManifestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.account, self.model)
    }
}
