//! Per-tensor content hashing.
//!
//! Each tensor's byte range is streamed once: the bytes feed the digest and,
//! when enabled, a compressed-size estimator in the same pass. Memory use is
//! bounded by the codec buffers, not by tensor size.

use std::io::{Read, Seek};
use std::path::Path;

use layercake_core::{
    Compressor, DigestAlgorithm, EstimatorKind, FileManifest, HashFunction, HashingReader,
    LayercakeError, Result, TensorRecord,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::formats::{ContainerReader, TensorSpan};

/// Configuration for hashing runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashConfig {
    /// Digest algorithm.
    pub algorithm: DigestAlgorithm,
    /// Compressed-size estimator, `None` to skip the estimate.
    pub estimate: Option<EstimatorKind>,
    /// Estimator compression level.
    pub level: i32,
    /// Worker threads for corpus runs (0 = one per core).
    pub threads: usize,
    /// Re-hash models that already have a manifest.
    pub overwrite: bool,
}

impl Default for HashConfig {
    fn default() -> Self {
        Self {
            algorithm: DigestAlgorithm::Sha256,
            estimate: Some(EstimatorKind::Deflate),
            level: 6,
            threads: 0,
            overwrite: false,
        }
    }
}

impl HashConfig {
    /// Digest only, no compression estimate.
    #[must_use]
    pub fn digest_only() -> Self {
        Self {
            estimate: None,
            ..Default::default()
        }
    }

    /// Set the digest algorithm.
    #[must_use]
    pub fn with_algorithm(mut self, algorithm: DigestAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Set (or clear) the compression estimator.
    #[must_use]
    pub fn with_estimate(mut self, estimate: Option<EstimatorKind>) -> Self {
        self.estimate = estimate;
        self
    }

    /// Set the estimator level.
    #[must_use]
    pub fn with_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    /// Set the worker count.
    #[must_use]
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Re-hash models whose manifest already exists.
    #[must_use]
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }
}

/// Computes manifests for containers.
///
/// `TensorHasher` holds no per-file state and is `Sync`; one instance can be
/// shared by every worker of a corpus run.
pub struct TensorHasher {
    hash: Box<dyn HashFunction>,
    estimator: Option<Box<dyn Compressor>>,
}

impl TensorHasher {
    /// Create a hasher from `config`.
    #[must_use]
    pub fn new(config: &HashConfig) -> Self {
        Self {
            hash: config.algorithm.hasher(),
            estimator: config.estimate.map(|kind| kind.compressor(config.level)),
        }
    }

    /// Name of the digest algorithm in use.
    #[must_use]
    pub fn algorithm(&self) -> &'static str {
        self.hash.name()
    }

    /// Whether compression estimates are computed.
    #[must_use]
    pub fn estimates_compression(&self) -> bool {
        self.estimator.is_some()
    }

    /// Hex digest of an in-memory buffer.
    #[must_use]
    pub fn digest(&self, data: &[u8]) -> String {
        self.hash.hash_hex(data)
    }

    /// Hash a single tensor of `reader`.
    ///
    /// Zero-length tensors are hashed like any other (the digest of empty
    /// input).
    pub fn hash_tensor<R: Read + Seek>(
        &self,
        reader: &mut ContainerReader<R>,
        span: &TensorSpan,
    ) -> Result<TensorRecord> {
        let payload_len = reader.payload_len();
        let range = reader.span_reader(span)?;
        let mut tee = HashingReader::new(range, self.hash.streaming());

        let compressed = match &self.estimator {
            Some(estimator) => Some(estimator.compressed_len(&mut tee)?),
            None => None,
        };
        tee.drain()?;

        // The header promised more bytes than the file delivered.
        if tee.bytes_read() != span.byte_count() {
            return Err(LayercakeError::Range {
                tensor: span.name.clone(),
                start: span.start,
                end: span.end,
                payload_len,
            });
        }

        let record = TensorRecord::new(tee.finalize_hex(), span.byte_count());
        Ok(match compressed {
            Some(size) => record.with_compressed(size),
            None => record,
        })
    }

    /// Hash every tensor of an open container.
    ///
    /// Any tensor failure fails the whole container; partial manifests are
    /// never returned.
    pub fn hash_container<R: Read + Seek>(
        &self,
        reader: &mut ContainerReader<R>,
    ) -> Result<FileManifest> {
        let spans: Vec<TensorSpan> = reader.tensors().cloned().collect();
        let mut manifest = FileManifest::new(reader.label()).with_algorithm(self.algorithm());

        for span in &spans {
            let record = self.hash_tensor(reader, span)?;
            manifest.insert(span.name.clone(), record);
        }
        manifest.mark_complete();

        debug!(
            source = %manifest.source_path,
            tensors = manifest.len(),
            bytes = manifest.total_bytes(),
            "Hashed container"
        );
        Ok(manifest)
    }

    /// Open and hash a container file.
    pub fn hash_file<P: AsRef<Path>>(&self, path: P) -> Result<FileManifest> {
        let mut reader = ContainerReader::open(path)?;
        self.hash_container(&mut reader)
    }
}
