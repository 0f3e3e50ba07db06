//! Content digests for tensor payloads.
//!
//! Every digest is 256 bits wide and rendered as lowercase hex, so two tensors
//! with equal digests are treated as byte-identical regardless of which
//! container they came from.

use std::io::{self, Read};

use serde::{Deserialize, Serialize};
use sha2::Digest;

/// Incremental hash state fed one chunk at a time.
pub trait StreamingHash: Send {
    /// Absorb more input.
    fn update(&mut self, data: &[u8]);

    /// Consume the state and return the raw digest.
    fn finalize(self: Box<Self>) -> Vec<u8>;
}

/// Trait for hash functions.
pub trait HashFunction: Send + Sync {
    /// Short identifier recorded in manifests.
    fn name(&self) -> &'static str;

    /// Fresh incremental state.
    fn streaming(&self) -> Box<dyn StreamingHash>;

    /// Hash data and return raw bytes.
    fn hash(&self, data: &[u8]) -> Vec<u8> {
        let mut state = self.streaming();
        state.update(data);
        state.finalize()
    }

    /// Hash data and return hex string.
    fn hash_hex(&self, data: &[u8]) -> String {
        hex::encode(self.hash(data))
    }
}

/// SHA-256 hasher. Default, and what version 1 manifests were written with.
pub struct Sha256Hasher;

impl Sha256Hasher {
    /// Create a new SHA-256 hasher.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for Sha256Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamingHash for sha2::Sha256 {
    fn update(&mut self, data: &[u8]) {
        Digest::update(self, data);
    }

    fn finalize(self: Box<Self>) -> Vec<u8> {
        Digest::finalize(*self).to_vec()
    }
}

impl HashFunction for Sha256Hasher {
    fn name(&self) -> &'static str {
        "sha256"
    }

    fn streaming(&self) -> Box<dyn StreamingHash> {
        Box::new(sha2::Sha256::new())
    }
}

/// Blake3 hasher - cryptographically secure, still fast.
pub struct Blake3Hasher;

impl Blake3Hasher {
    /// Create a new Blake3 hasher.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for Blake3Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamingHash for blake3::Hasher {
    fn update(&mut self, data: &[u8]) {
        blake3::Hasher::update(self, data);
    }

    fn finalize(self: Box<Self>) -> Vec<u8> {
        blake3::Hasher::finalize(&self).as_bytes().to_vec()
    }
}

impl HashFunction for Blake3Hasher {
    fn name(&self) -> &'static str {
        "blake3"
    }

    fn streaming(&self) -> Box<dyn StreamingHash> {
        Box::new(blake3::Hasher::new())
    }
}

/// Selectable digest algorithm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    /// SHA-256
    #[default]
    Sha256,
    /// BLAKE3
    Blake3,
}

impl DigestAlgorithm {
    /// Instantiate the hash function.
    #[must_use]
    pub fn hasher(self) -> Box<dyn HashFunction> {
        match self {
            Self::Sha256 => Box::new(Sha256Hasher::new()),
            Self::Blake3 => Box::new(Blake3Hasher::new()),
        }
    }

    /// Name as stored in manifests.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Blake3 => "blake3",
        }
    }
}

/// Reader adapter that hashes every byte passing through it.
///
/// Lets the digest and a compression estimate share a single pass over a
/// tensor's byte range.
pub struct HashingReader<R> {
    inner: R,
    state: Box<dyn StreamingHash>,
    bytes_read: u64,
}

impl<R: Read> HashingReader<R> {
    /// Wrap `inner`, feeding everything read into `state`.
    pub fn new(inner: R, state: Box<dyn StreamingHash>) -> Self {
        Self {
            inner,
            state,
            bytes_read: 0,
        }
    }

    /// Number of bytes that have passed through so far.
    #[must_use]
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Drain whatever is left of the inner reader.
    pub fn drain(&mut self) -> io::Result<u64> {
        io::copy(self, &mut io::sink())
    }

    /// Finish hashing and return the hex digest.
    #[must_use]
    pub fn finalize_hex(self) -> String {
        hex::encode(self.state.finalize())
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.state.update(&buf[..n]);
        self.bytes_read += n as u64;
        Ok(n)
    }
}
