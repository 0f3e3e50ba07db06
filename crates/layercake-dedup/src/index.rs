//! Corpus-wide digest table.
//!
//! Every distinct digest is interned once to a dense `u32` id. Per-id vectors
//! hold the first-seen byte size and the occurrence count used for ranking.

use std::collections::HashMap;
use std::sync::Arc;

/// Dense id assigned to a digest on first sight.
pub type DigestId = u32;

/// Transient index built by one analysis run.
#[derive(Debug, Default)]
pub struct CorpusIndex {
    ids: HashMap<Arc<str>, DigestId>,
    digests: Vec<Arc<str>>,
    byte_sizes: Vec<u64>,
    occurrences: Vec<u64>,
}

impl CorpusIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one tensor occurrence.
    ///
    /// Returns the digest's id and whether it had been seen before. The first
    /// non-zero byte size wins, so a digest first listed as empty still ranks
    /// by its real size. Zero-byte tensors are interned but not counted as
    /// occurrences.
    pub fn observe(&mut self, digest: &str, byte_count: u64) -> (DigestId, bool) {
        let (id, seen) = match self.ids.get(digest) {
            Some(&id) => (id, true),
            None => {
                let id = self.digests.len() as DigestId;
                let key: Arc<str> = Arc::from(digest);
                self.ids.insert(Arc::clone(&key), id);
                self.digests.push(key);
                self.byte_sizes.push(byte_count);
                self.occurrences.push(0);
                (id, false)
            }
        };
        if byte_count > 0 {
            let slot = id as usize;
            if self.byte_sizes[slot] == 0 {
                self.byte_sizes[slot] = byte_count;
            }
            self.occurrences[slot] += 1;
        }
        (id, seen)
    }

    /// Number of distinct digests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.digests.len()
    }

    /// True if nothing was observed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }

    /// Id of a digest, if observed.
    #[must_use]
    pub fn id(&self, digest: &str) -> Option<DigestId> {
        self.ids.get(digest).copied()
    }

    /// Digest text for an id.
    #[must_use]
    pub fn digest(&self, id: DigestId) -> &str {
        &self.digests[id as usize]
    }

    /// First-seen byte size for an id.
    #[must_use]
    pub fn byte_size(&self, id: DigestId) -> u64 {
        self.byte_sizes[id as usize]
    }

    /// Non-empty occurrences of an id across the corpus.
    #[must_use]
    pub fn occurrences(&self, id: DigestId) -> u64 {
        self.occurrences[id as usize]
    }

    /// Ids with at least one counted occurrence.
    pub fn tracked(&self) -> impl Iterator<Item = DigestId> + '_ {
        self.occurrences
            .iter()
            .enumerate()
            .filter(|(_, count)| **count > 0)
            .map(|(id, _)| id as DigestId)
    }
}
