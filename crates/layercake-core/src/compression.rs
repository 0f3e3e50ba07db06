//! Compression abstractions.
//!
//! Layercake only uses compression as a secondary metric: how small would a
//! tensor get under a cheap general-purpose codec. `compressed_len` streams
//! the input so estimates never hold a whole tensor in memory.

use std::io::{self, Read};

use serde::{Deserialize, Serialize};

use crate::error::{LayercakeError, Result};

/// Input is fed to block codecs in pieces of this size.
const BLOCK_SIZE: usize = 1 << 20;

/// Trait for compression algorithms.
pub trait Compressor: Send + Sync {
    /// Short identifier for logs and reports.
    fn name(&self) -> &'static str;

    /// Size the input would have once compressed, without keeping the output.
    fn compressed_len(&self, reader: &mut dyn Read) -> Result<u64>;
}

/// Deflate (zlib-class) compressor. The default estimator.
pub struct DeflateCompressor {
    level: u32,
}

impl DeflateCompressor {
    /// Create a new Deflate compressor with default level (6).
    #[must_use]
    pub fn new() -> Self {
        Self::with_level(6)
    }

    /// Create a new Deflate compressor with specified level (0-9).
    #[must_use]
    pub fn with_level(level: u32) -> Self {
        Self {
            level: level.min(9),
        }
    }
}

impl Default for DeflateCompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Compressor for DeflateCompressor {
    fn name(&self) -> &'static str {
        "deflate"
    }

    fn compressed_len(&self, reader: &mut dyn Read) -> Result<u64> {
        let mut encoder =
            flate2::read::DeflateEncoder::new(reader, flate2::Compression::new(self.level));
        io::copy(&mut encoder, &mut io::sink()).map_err(|e| LayercakeError::Compression(e.to_string()))
    }
}

/// Zstd compressor with configurable level.
pub struct ZstdCompressor {
    level: i32,
}

impl ZstdCompressor {
    /// Create a new Zstd compressor with default level (3).
    #[must_use]
    pub fn new() -> Self {
        Self::with_level(3)
    }

    /// Create a new Zstd compressor with specified level.
    ///
    /// Level ranges from -7 (fastest) to 22 (best compression).
    #[must_use]
    pub fn with_level(level: i32) -> Self {
        Self { level }
    }
}

impl Default for ZstdCompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Compressor for ZstdCompressor {
    fn name(&self) -> &'static str {
        "zstd"
    }

    fn compressed_len(&self, reader: &mut dyn Read) -> Result<u64> {
        let mut encoder = zstd::stream::read::Encoder::new(reader, self.level)
            .map_err(|e| LayercakeError::Compression(e.to_string()))?;
        io::copy(&mut encoder, &mut io::sink()).map_err(|e| LayercakeError::Compression(e.to_string()))
    }
}

/// LZ4 compressor for maximum speed.
pub struct Lz4Compressor;

impl Lz4Compressor {
    /// Create a new LZ4 compressor.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for Lz4Compressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Compressor for Lz4Compressor {
    fn name(&self) -> &'static str {
        "lz4"
    }

    // Block-wise: each 1 MiB block is compressed independently.
    fn compressed_len(&self, reader: &mut dyn Read) -> Result<u64> {
        let mut block = vec![0u8; BLOCK_SIZE];
        let mut total = 0u64;
        loop {
            let filled = fill_block(reader, &mut block)?;
            if filled == 0 {
                break;
            }
            total += lz4_flex::compress_prepend_size(&block[..filled]).len() as u64;
            if filled < block.len() {
                break;
            }
        }
        Ok(total)
    }
}

/// Read until `buf` is full or the reader is exhausted.
fn fill_block(reader: &mut dyn Read, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(LayercakeError::Io(e)),
        }
    }
    Ok(filled)
}

/// Codec used for the optional compressed-size estimate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimatorKind {
    /// Deflate via flate2
    #[default]
    Deflate,
    /// Zstd
    Zstd,
    /// LZ4 block format
    Lz4,
}

impl EstimatorKind {
    /// Level used when none is given.
    #[must_use]
    pub const fn default_level(self) -> i32 {
        match self {
            Self::Deflate => 6,
            Self::Zstd => 3,
            Self::Lz4 => 0,
        }
    }

    /// Instantiate the compressor. `level` is clamped to what the codec accepts
    /// and ignored by LZ4.
    #[must_use]
    pub fn compressor(self, level: i32) -> Box<dyn Compressor> {
        match self {
            Self::Deflate => Box::new(DeflateCompressor::with_level(level.clamp(0, 9) as u32)),
            Self::Zstd => Box::new(ZstdCompressor::with_level(level.clamp(-7, 22))),
            Self::Lz4 => Box::new(Lz4Compressor::new()),
        }
    }
}
