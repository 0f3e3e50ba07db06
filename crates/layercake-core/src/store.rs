//! On-disk manifest store.
//!
//! Layout: `<root>/<account>/<model>/hashes.json`, one manifest per model.
//! Writes go through a temp file and a rename so a crashed or interrupted run
//! never leaves a truncated manifest behind.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{LayercakeError, Result};
use crate::manifest::{FileManifest, ManifestKey, MANIFEST_FILE_NAME};

/// Manifest store rooted at a results directory.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    root: PathBuf,
}

impl ManifestStore {
    /// Create a store handle. Nothing is touched on disk until the first write.
    #[must_use]
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Results root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the manifest for `key` lives.
    #[must_use]
    pub fn path_for(&self, key: &ManifestKey) -> PathBuf {
        self.root.join(key.relative_path())
    }

    /// Check if a manifest for `key` exists.
    #[must_use]
    pub fn exists(&self, key: &ManifestKey) -> bool {
        self.path_for(key).is_file()
    }

    /// Persist `manifest` under `key`, replacing any previous one atomically.
    pub fn save(&self, key: &ManifestKey, manifest: &FileManifest) -> Result<PathBuf> {
        let path = self.path_for(key);
        let write_err = |source| LayercakeError::Write {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }

        let json = serde_json::to_vec_pretty(manifest)
            .map_err(|e| LayercakeError::InvalidFormat(format!("Failed to serialize manifest: {}", e)))?;

        let temp_path = path.with_extension("json.tmp");
        let written = File::create(&temp_path).and_then(|mut file| {
            file.write_all(&json)?;
            file.sync_all()
        });
        if let Err(e) = written.and_then(|()| fs::rename(&temp_path, &path)) {
            let _ = fs::remove_file(&temp_path);
            return Err(write_err(e));
        }

        debug!(path = %path.display(), tensors = manifest.len(), "Wrote manifest");
        Ok(path)
    }

    /// Load the manifest stored at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<FileManifest> {
        let path = path.as_ref();
        let data = fs::read(path)?;
        serde_json::from_slice(&data).map_err(|e| LayercakeError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Load the manifest for `key`.
    ///
    /// Manifests written without a `file_path` get `account/model` as their
    /// source identifier.
    pub fn load_key(&self, key: &ManifestKey) -> Result<FileManifest> {
        let path = self.path_for(key);
        if !path.is_file() {
            return Err(LayercakeError::NotFound(key.to_string()));
        }
        let mut manifest = Self::load(&path)?;
        if manifest.source_path.is_empty() {
            manifest.source_path = key.to_string();
        }
        Ok(manifest)
    }

    /// Discover every stored manifest, sorted by account then model.
    pub fn keys(&self) -> Result<Vec<ManifestKey>> {
        let mut keys = Vec::new();
        for account in sorted_subdirs(&self.root)? {
            let account_dir = self.root.join(&account);
            let models = match sorted_subdirs(&account_dir) {
                Ok(models) => models,
                Err(e) => {
                    warn!(dir = %account_dir.display(), error = %e, "Skipping unreadable account directory");
                    continue;
                }
            };
            for model in models {
                if account_dir.join(&model).join(MANIFEST_FILE_NAME).is_file() {
                    keys.push(ManifestKey::new(account.clone(), model));
                }
            }
        }
        Ok(keys)
    }

    /// Lazily load every manifest in traversal order.
    ///
    /// Discovery happens up front; each manifest is read only when the
    /// iterator reaches it. Per-file failures are yielded, not raised, so one
    /// corrupt manifest never ends the sequence. Calling this again restarts
    /// from the beginning.
    pub fn load_all(&self) -> Result<ManifestIter<'_>> {
        Ok(ManifestIter {
            store: self,
            keys: self.keys()?.into_iter(),
        })
    }

    /// Delete the manifest for `key`, then remove the model and account
    /// directories if that left them empty.
    ///
    /// Returns `false` if there was nothing to delete.
    pub fn remove(&self, key: &ManifestKey) -> Result<bool> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(LayercakeError::Io(e)),
        }

        let model_dir = self.root.join(&key.account).join(&key.model);
        if fs::remove_dir(&model_dir).is_ok() {
            let _ = fs::remove_dir(self.root.join(&key.account));
        }

        debug!(key = %key, "Removed manifest");
        Ok(true)
    }
}

/// Iterator returned by [`ManifestStore::load_all`].
pub struct ManifestIter<'a> {
    store: &'a ManifestStore,
    keys: std::vec::IntoIter<ManifestKey>,
}

impl Iterator for ManifestIter<'_> {
    type Item = (ManifestKey, Result<FileManifest>);

    fn next(&mut self) -> Option<Self::Item> {
        let key = self.keys.next()?;
        let manifest = self.store.load_key(&key);
        Some((key, manifest))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.keys.size_hint()
    }
}

impl ExactSizeIterator for ManifestIter<'_> {}

/// Names of the directories directly under `dir`, byte-wise sorted.
///
/// Entries whose names are not valid UTF-8 are skipped with a warning.
pub fn sorted_subdirs(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        // Follows symlinks; model directories are often links into a cache.
        if !entry.path().is_dir() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => names.push(name),
            Err(raw) => warn!(name = ?raw, "Skipping non UTF-8 directory name"),
        }
    }
    names.sort();
    Ok(names)
}
