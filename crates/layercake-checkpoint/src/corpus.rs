//! Corpus-wide hashing.
//!
//! A models tree is laid out as `<root>/<account>/<model>/*.safetensors`.
//! Each model becomes one manifest: its shards are hashed in sorted order and
//! merged. Models run in parallel on a rayon pool; every worker writes only
//! its own model's manifest path, so writes never contend.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use layercake_core::store::sorted_subdirs;
use layercake_core::{FileManifest, LayercakeError, ManifestKey, ManifestStore, Result};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::formats::is_container;
use crate::hasher::{HashConfig, TensorHasher};

/// A downloaded model and its container shards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDir {
    /// Where the manifest will be stored
    pub key: ManifestKey,
    /// Model directory
    pub dir: PathBuf,
    /// Container files, sorted by name
    pub shards: Vec<PathBuf>,
}

/// Container files directly inside `dir`, sorted by name.
pub fn list_containers(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_container(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Walk a two-level `account/model` tree and list every model that has at
/// least one container.
///
/// Only an unreadable `root` is an error. Account or model directories that
/// cannot be listed are logged and skipped so the rest of the corpus still
/// gets hashed.
pub fn discover_models(root: &Path) -> Result<Vec<ModelDir>> {
    let mut models = Vec::new();
    for account in sorted_subdirs(root)? {
        let account_dir = root.join(&account);
        let model_names = match sorted_subdirs(&account_dir) {
            Ok(names) => names,
            Err(e) => {
                warn!(dir = %account_dir.display(), error = %e, "Skipping unreadable account directory");
                continue;
            }
        };
        for model in model_names {
            let dir = account_dir.join(&model);
            let shards = match list_containers(&dir) {
                Ok(shards) => shards,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Skipping unreadable model directory");
                    continue;
                }
            };
            if shards.is_empty() {
                debug!(dir = %dir.display(), "No containers, skipping");
                continue;
            }
            models.push(ModelDir {
                key: ManifestKey::new(account.clone(), model),
                dir,
                shards,
            });
        }
    }
    Ok(models)
}

impl TensorHasher {
    /// Hash every shard of a model and merge the results.
    ///
    /// A failure in any shard fails the model; nothing partial is returned.
    pub fn hash_model(&self, model: &ModelDir) -> Result<FileManifest> {
        if model.shards.is_empty() {
            return Err(LayercakeError::NotFound(format!(
                "no containers in {}",
                model.dir.display()
            )));
        }

        let mut parts = Vec::with_capacity(model.shards.len());
        for shard in &model.shards {
            let mut part = self.hash_file(shard)?;
            part.source_path = shard
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| shard.display().to_string());
            parts.push(part);
        }

        let (mut manifest, collisions) = FileManifest::merge(model.key.to_string(), parts);
        if !collisions.is_empty() {
            warn!(
                model = %model.key,
                count = collisions.len(),
                first = %collisions[0],
                "Tensor names repeated across shards; keeping the first occurrence"
            );
        }
        manifest.mark_complete();
        Ok(manifest)
    }
}

/// What happened to one model during a corpus run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelOutcome {
    /// Manifest written
    Hashed {
        /// Model key
        key: ManifestKey,
        /// Tensors in the manifest
        tensors: usize,
        /// Payload bytes hashed
        bytes: u64,
    },
    /// Manifest already existed and overwrite was off
    Skipped {
        /// Model key
        key: ManifestKey,
    },
    /// Hashing or writing failed; no manifest was written
    Failed {
        /// Model key
        key: ManifestKey,
        /// Error message
        error: String,
    },
}

impl ModelOutcome {
    /// Key of the model this outcome refers to.
    #[must_use]
    pub fn key(&self) -> &ManifestKey {
        match self {
            Self::Hashed { key, .. } | Self::Skipped { key } | Self::Failed { key, .. } => key,
        }
    }
}

/// A model that could not be hashed.
#[derive(Debug, Clone, Serialize)]
pub struct FailedModel {
    /// `account/model`
    pub model: String,
    /// Error message
    pub error: String,
}

/// Totals for a corpus run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HashRunSummary {
    /// Models discovered
    pub models: usize,
    /// Manifests written
    pub hashed: usize,
    /// Models skipped because a manifest existed
    pub skipped: usize,
    /// Models that failed
    pub failed: Vec<FailedModel>,
    /// Tensors hashed
    pub tensors: usize,
    /// Payload bytes hashed
    pub bytes: u64,
    /// Wall time
    pub elapsed_secs: f64,
}

impl HashRunSummary {
    /// Throughput in MiB per second.
    #[must_use]
    pub fn throughput_mib_s(&self) -> f64 {
        if self.elapsed_secs > 0.0 {
            self.bytes as f64 / self.elapsed_secs / (1024.0 * 1024.0)
        } else {
            0.0
        }
    }
}

fn process_model(
    hasher: &TensorHasher,
    store: &ManifestStore,
    model: &ModelDir,
    overwrite: bool,
) -> ModelOutcome {
    if !overwrite && store.exists(&model.key) {
        debug!(model = %model.key, "Manifest exists, skipping");
        return ModelOutcome::Skipped {
            key: model.key.clone(),
        };
    }

    let result = hasher
        .hash_model(model)
        .and_then(|manifest| store.save(&model.key, &manifest).map(|_| manifest));

    match result {
        Ok(manifest) => ModelOutcome::Hashed {
            key: model.key.clone(),
            tensors: manifest.len(),
            bytes: manifest.total_bytes(),
        },
        Err(e) => {
            warn!(model = %model.key, error = %e, "Failed to hash model");
            ModelOutcome::Failed {
                key: model.key.clone(),
                error: e.to_string(),
            }
        }
    }
}

/// Hash every model and store one manifest per model.
///
/// Per-model failures are collected in the summary; they never stop the run.
/// `on_outcome` is called from worker threads as each model finishes.
pub fn hash_corpus<F>(
    models: &[ModelDir],
    store: &ManifestStore,
    config: &HashConfig,
    on_outcome: F,
) -> Result<HashRunSummary>
where
    F: Fn(&ModelOutcome) + Sync,
{
    let start = Instant::now();
    let hasher = TensorHasher::new(config);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.threads)
        .build()
        .map_err(|e| LayercakeError::Config(format!("Failed to build thread pool: {}", e)))?;

    info!(
        models = models.len(),
        threads = pool.current_num_threads(),
        algorithm = hasher.algorithm(),
        "Hashing corpus"
    );

    let outcomes: Vec<ModelOutcome> = pool.install(|| {
        models
            .par_iter()
            .map(|model| {
                let outcome = process_model(&hasher, store, model, config.overwrite);
                on_outcome(&outcome);
                outcome
            })
            .collect()
    });

    let mut summary = HashRunSummary {
        models: models.len(),
        ..Default::default()
    };
    for outcome in outcomes {
        match outcome {
            ModelOutcome::Hashed { tensors, bytes, .. } => {
                summary.hashed += 1;
                summary.tensors += tensors;
                summary.bytes += bytes;
            }
            ModelOutcome::Skipped { .. } => summary.skipped += 1,
            ModelOutcome::Failed { key, error } => summary.failed.push(FailedModel {
                model: key.to_string(),
                error,
            }),
        }
    }
    summary.elapsed_secs = start.elapsed().as_secs_f64();

    info!(
        hashed = summary.hashed,
        skipped = summary.skipped,
        failed = summary.failed.len(),
        "Corpus hashing finished"
    );
    Ok(summary)
}
