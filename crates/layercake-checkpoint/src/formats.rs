//! Safetensors container reader and writer.
//!
//! Container format:
//! - 8 bytes: header size `H` (little-endian u64)
//! - `H` bytes: JSON object, tensor name -> `{dtype, shape, data_offsets}`,
//!   plus an optional `__metadata__` entry
//! - Remaining: payload; offsets are relative to its first byte
//!
//! Opening a container parses only the header. Payload bytes are read on
//! demand, one range at a time.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Take, Write};
use std::path::Path;

use layercake_core::{LayercakeError, Result};

/// Header key that carries free-form metadata instead of a tensor.
pub const METADATA_KEY: &str = "__metadata__";

/// Headers larger than this are rejected before allocating.
pub const MAX_HEADER_LEN: u64 = 100_000_000;

const LENGTH_PREFIX: u64 = 8;

/// Byte range of one tensor as declared by the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorSpan {
    /// Tensor name
    pub name: String,
    /// Declared dtype, kept verbatim
    pub dtype: Option<String>,
    /// Declared shape
    pub shape: Vec<u64>,
    /// Start offset within the payload
    pub start: u64,
    /// End offset within the payload (exclusive)
    pub end: u64,
}

impl TensorSpan {
    /// Payload bytes covered by this span.
    #[must_use]
    pub fn byte_count(&self) -> u64 {
        self.end - self.start
    }
}

/// Reader for safetensors containers.
pub struct ContainerReader<R> {
    source: R,
    label: String,
    header_len: u64,
    payload_len: u64,
    spans: Vec<TensorSpan>,
}

impl ContainerReader<BufReader<File>> {
    /// Open a container file and parse its header.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file), path.display().to_string())
    }
}

impl<R: Read + Seek> ContainerReader<R> {
    /// Parse the header of a container held by `source`.
    ///
    /// `label` names the source in error messages and manifests.
    pub fn from_reader(mut source: R, label: impl Into<String>) -> Result<Self> {
        let label = label.into();
        let total_len = source.seek(SeekFrom::End(0))?;
        source.seek(SeekFrom::Start(0))?;

        if total_len < LENGTH_PREFIX {
            return Err(LayercakeError::malformed(
                &label,
                format!("{} bytes is too short for the length prefix", total_len),
            ));
        }

        let mut prefix = [0u8; 8];
        source.read_exact(&mut prefix)?;
        let header_len = u64::from_le_bytes(prefix);

        if header_len > total_len - LENGTH_PREFIX {
            return Err(LayercakeError::malformed(
                &label,
                format!(
                    "declared header length {} exceeds the {} bytes available",
                    header_len,
                    total_len - LENGTH_PREFIX
                ),
            ));
        }
        if header_len > MAX_HEADER_LEN {
            return Err(LayercakeError::malformed(
                &label,
                format!("header length {} exceeds limit {}", header_len, MAX_HEADER_LEN),
            ));
        }

        let mut header_buf = vec![0u8; header_len as usize];
        source.read_exact(&mut header_buf)?;

        let spans = Self::parse_header(&label, &header_buf)?;

        Ok(Self {
            source,
            label,
            header_len,
            payload_len: total_len - LENGTH_PREFIX - header_len,
            spans,
        })
    }

    /// Parse the JSON header into tensor spans, skipping `__metadata__`.
    fn parse_header(label: &str, header: &[u8]) -> Result<Vec<TensorSpan>> {
        let json: serde_json::Value = serde_json::from_slice(header)
            .map_err(|e| LayercakeError::malformed(label, format!("invalid JSON header: {}", e)))?;

        let serde_json::Value::Object(map) = json else {
            return Err(LayercakeError::malformed(label, "header is not a JSON object"));
        };

        map.iter()
            .filter(|(name, _)| name.as_str() != METADATA_KEY)
            .map(|(name, value)| Self::parse_span(name, value).map_err(|r| LayercakeError::malformed(label, r)))
            .collect()
    }

    /// Parse one header entry. Errors are returned as a reason string.
    fn parse_span(name: &str, value: &serde_json::Value) -> std::result::Result<TensorSpan, String> {
        let obj = value
            .as_object()
            .ok_or_else(|| format!("expected object for tensor '{}'", name))?;

        let offsets = obj
            .get("data_offsets")
            .and_then(|v| v.as_array())
            .ok_or_else(|| format!("missing data_offsets for '{}'", name))?;

        if offsets.len() != 2 {
            return Err(format!(
                "data_offsets for '{}' has {} elements, expected 2",
                name,
                offsets.len()
            ));
        }

        let start = offsets[0]
            .as_u64()
            .ok_or_else(|| format!("invalid start offset for '{}'", name))?;
        let end = offsets[1]
            .as_u64()
            .ok_or_else(|| format!("invalid end offset for '{}'", name))?;

        if end < start {
            return Err(format!(
                "end offset {} precedes start offset {} for '{}'",
                end, start, name
            ));
        }

        let dtype = obj.get("dtype").and_then(|v| v.as_str()).map(str::to_string);
        let shape = obj
            .get("shape")
            .and_then(|v| v.as_array())
            .map(|dims| dims.iter().filter_map(|d| d.as_u64()).collect())
            .unwrap_or_default();

        Ok(TensorSpan {
            name: name.to_string(),
            dtype,
            shape,
            start,
            end,
        })
    }

    /// Name of the source (usually its path).
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Length of the JSON header in bytes.
    #[must_use]
    pub fn header_len(&self) -> u64 {
        self.header_len
    }

    /// Length of the payload region in bytes.
    #[must_use]
    pub fn payload_len(&self) -> u64 {
        self.payload_len
    }

    /// Absolute file offset of the payload region.
    #[must_use]
    pub fn payload_offset(&self) -> u64 {
        LENGTH_PREFIX + self.header_len
    }

    /// Number of tensors (excluding `__metadata__`).
    #[must_use]
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    /// True if the header declares no tensors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Declared tensors. Iterating does not touch payload bytes.
    pub fn tensors(&self) -> impl Iterator<Item = &TensorSpan> {
        self.spans.iter()
    }

    /// Look up a tensor by name.
    #[must_use]
    pub fn tensor(&self, name: &str) -> Option<&TensorSpan> {
        self.spans.iter().find(|s| s.name == name)
    }

    /// Streaming reader over one tensor's bytes.
    pub fn span_reader(&mut self, span: &TensorSpan) -> Result<Take<&mut R>> {
        self.range_reader(&span.name, span.start, span.end)
    }

    /// Read payload bytes `[start, end)` into memory.
    pub fn read_range(&mut self, start: u64, end: u64) -> Result<Vec<u8>> {
        let mut range = self.range_reader("<range>", start, end)?;
        let mut data = Vec::with_capacity((end - start) as usize);
        range.read_to_end(&mut data)?;
        if (data.len() as u64) < end - start {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "payload shorter than declared").into());
        }
        Ok(data)
    }

    /// Read a whole tensor by name.
    pub fn read_tensor(&mut self, name: &str) -> Result<Vec<u8>> {
        let span = self
            .tensor(name)
            .cloned()
            .ok_or_else(|| LayercakeError::NotFound(name.to_string()))?;
        self.read_range(span.start, span.end)
    }

    fn range_reader(&mut self, tensor: &str, start: u64, end: u64) -> Result<Take<&mut R>> {
        if end < start || end > self.payload_len {
            return Err(LayercakeError::Range {
                tensor: tensor.to_string(),
                start,
                end,
                payload_len: self.payload_len,
            });
        }
        self.source
            .seek(SeekFrom::Start(self.payload_offset() + start))?;
        Ok(self.source.by_ref().take(end - start))
    }
}

/// Check if a path looks like a safetensors container (by extension).
pub fn is_container(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "safetensors")
}

struct PendingTensor {
    name: String,
    dtype: String,
    shape: Vec<u64>,
    data: Vec<u8>,
}

/// Builds safetensors containers. Tensors are laid out back to back in the
/// order they were added.
#[derive(Default)]
pub struct ContainerWriter {
    tensors: Vec<PendingTensor>,
    metadata: BTreeMap<String, String>,
}

impl ContainerWriter {
    /// Create an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a `__metadata__` entry.
    pub fn add_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
    }

    /// Add a tensor.
    pub fn add_tensor(
        &mut self,
        name: impl Into<String>,
        dtype: impl Into<String>,
        shape: Vec<u64>,
        data: Vec<u8>,
    ) {
        self.tensors.push(PendingTensor {
            name: name.into(),
            dtype: dtype.into(),
            shape,
            data,
        });
    }

    /// Number of tensors added.
    #[must_use]
    pub fn tensor_count(&self) -> usize {
        self.tensors.len()
    }

    /// Serialized JSON header.
    pub fn header_json(&self) -> Result<String> {
        let mut header = serde_json::Map::new();
        if !self.metadata.is_empty() {
            header.insert(METADATA_KEY.to_string(), serde_json::json!(self.metadata));
        }

        let mut offset = 0u64;
        for tensor in &self.tensors {
            let end = offset + tensor.data.len() as u64;
            header.insert(
                tensor.name.clone(),
                serde_json::json!({
                    "dtype": tensor.dtype,
                    "shape": tensor.shape,
                    "data_offsets": [offset, end],
                }),
            );
            offset = end;
        }

        serde_json::to_string(&header)
            .map_err(|e| LayercakeError::InvalidFormat(format!("Failed to serialize header: {}", e)))
    }

    /// Write the container to `writer`.
    pub fn write<W: Write>(&self, writer: W) -> Result<()> {
        let header = self.header_json()?;
        let mut writer = BufWriter::new(writer);
        writer.write_all(&(header.len() as u64).to_le_bytes())?;
        writer.write_all(header.as_bytes())?;
        for tensor in &self.tensors {
            writer.write_all(&tensor.data)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Write the container to a file.
    pub fn write_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.write(File::create(path.as_ref())?)
    }

    /// Write the container into a byte vector.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write(&mut out)?;
        Ok(out)
    }
}
