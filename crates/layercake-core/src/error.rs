//! Error types for layercake.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for layercake operations.
pub type Result<T> = std::result::Result<T, LayercakeError>;

/// Errors that can occur in layercake operations.
#[derive(Error, Debug)]
pub enum LayercakeError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Container header could not be read or parsed
    #[error("Malformed header in {path}: {reason}")]
    MalformedHeader {
        /// Container the header belongs to
        path: String,
        /// What was wrong with it
        reason: String,
    },

    /// Declared tensor offsets fall outside the payload
    #[error("Tensor '{tensor}' range [{start}, {end}) exceeds payload of {payload_len} bytes")]
    Range {
        /// Tensor name
        tensor: String,
        /// Declared start offset (payload relative)
        start: u64,
        /// Declared end offset (payload relative)
        end: u64,
        /// Actual payload length
        payload_len: u64,
    },

    /// Manifest could not be written
    #[error("Failed to write {path}: {source}")]
    Write {
        /// Destination path
        path: PathBuf,
        /// Underlying filesystem error
        #[source]
        source: std::io::Error,
    },

    /// Manifest could not be parsed
    #[error("Failed to parse {path}: {reason}")]
    Parse {
        /// Manifest path
        path: PathBuf,
        /// Parser message
        reason: String,
    },

    /// Compression error
    #[error("Compression error: {0}")]
    Compression(String),

    /// Invalid data format
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Key not found
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl LayercakeError {
    /// Build a [`LayercakeError::MalformedHeader`].
    pub fn malformed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedHeader {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
