//! Integration tests for layercake-dedup.
//!
//! Hash real containers, store the manifests, then analyze the store.

use layercake_checkpoint::{discover_models, hash_corpus, ContainerWriter, HashConfig};
use layercake_core::{FileManifest, ManifestKey, ManifestStore, TensorRecord};
use layercake_dedup::{
    analyze_store, manifest_similarity, AnalysisConfig, DedupAnalyzer, IntegrityPolicy,
};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write_model(root: &Path, account: &str, model: &str, tensors: &[(&str, Vec<u8>)]) {
    let dir = root.join(account).join(model);
    fs::create_dir_all(&dir).unwrap();
    let mut writer = ContainerWriter::new();
    for (name, data) in tensors {
        writer.add_tensor(*name, "U8", vec![data.len() as u64], data.clone());
    }
    writer.write_file(dir.join("model.safetensors")).unwrap();
}

fn hash_tree(models: &Path, results: &Path) -> ManifestStore {
    let store = ManifestStore::new(results);
    let discovered = discover_models(models).unwrap();
    let summary = hash_corpus(&discovered, &store, &HashConfig::default(), |_| {}).unwrap();
    assert!(summary.failed.is_empty());
    store
}

#[test]
fn test_identical_models_pipeline() {
    let models = TempDir::new().unwrap();
    let results = TempDir::new().unwrap();
    let n = 4;
    for i in 0..n {
        write_model(
            models.path(),
            "acme",
            &format!("copy-{}", i),
            &[("w", vec![42u8; 256])],
        );
    }
    let store = hash_tree(models.path(), results.path());

    let report = analyze_store(&store, AnalysisConfig::default(), IntegrityPolicy::default(), |_| {})
        .unwrap();

    assert_eq!(report.files_processed, n);
    let expected = 100.0 * (n - 1) as f64 / n as f64;
    assert!((report.savings.percent_saved - expected).abs() < 1e-9);

    let sim = report.similarity.unwrap();
    assert_eq!(sim.pairs_total, 6);
    assert_eq!(sim.pairs_over_threshold, 6);
    assert!(sim.top_pairs.iter().all(|p| p.similarity == 1.0));

    assert_eq!(report.ranking.top[0].occurrences, n as u64);
    assert_eq!(report.ranking.savings_bytes, 256 * (n as u64 - 1));
}

#[test]
fn test_shared_and_empty_tensors() {
    let models = TempDir::new().unwrap();
    let results = TempDir::new().unwrap();
    write_model(
        models.path(),
        "acme",
        "base",
        &[("embed", vec![1; 512]), ("head", vec![2; 64]), ("bias", vec![])],
    );
    write_model(
        models.path(),
        "beta",
        "tuned",
        &[("embed", vec![1; 512]), ("head", vec![3; 64]), ("bias", vec![])],
    );
    let store = hash_tree(models.path(), results.path());

    let report = analyze_store(&store, AnalysisConfig::default(), IntegrityPolicy::default(), |_| {})
        .unwrap();

    // embed and the empty bias repeat; only embed carries bytes.
    assert_eq!(report.savings.duplicate_tensors, 2);
    assert_eq!(report.savings.saved_bytes, 512);
    assert!(report.ranking.top.iter().all(|h| h.byte_count > 0));
    assert_eq!(report.ranking.top[0].occurrences, 2);
    assert_eq!(report.ranking.top[0].byte_count, 512);

    let sim = report.similarity.unwrap();
    let pair = &sim.top_pairs[0];
    assert_eq!(pair.left, "acme/base");
    assert_eq!(pair.right, "beta/tuned");
    // {embed, bias} shared out of three distinct digests each.
    assert!((pair.similarity - 2.0 / 3.0).abs() < 1e-12);
    assert_eq!(pair.shared_bytes, 512);

    let a = store.load_key(&ManifestKey::new("acme", "base")).unwrap();
    let b = store.load_key(&ManifestKey::new("beta", "tuned")).unwrap();
    assert_eq!(manifest_similarity(&a, &b), pair.similarity);
}

#[test]
fn test_legacy_manifests_alongside_v2() {
    let results = TempDir::new().unwrap();
    let store = ManifestStore::new(results.path());

    // Legacy manifests: no schema_version, no complete flag.
    let legacy_dir = results.path().join("old/model");
    fs::create_dir_all(&legacy_dir).unwrap();
    fs::write(
        legacy_dir.join("hashes.json"),
        r#"{"file_path": "old/model", "tensors": {"w": {"hash": "X", "byte_count": 10}}}"#,
    )
    .unwrap();

    let mut current = FileManifest::new("new/model").with_algorithm("sha256");
    current.insert("w", TensorRecord::new("X", 10).with_compressed(3));
    current.mark_complete();
    store.save(&ManifestKey::new("new", "model"), &current).unwrap();

    let lenient = analyze_store(&store, AnalysisConfig::default(), IntegrityPolicy::default(), |_| {})
        .unwrap();
    assert_eq!(lenient.files_processed, 2);
    assert_eq!(lenient.savings.saved_bytes, 10);

    let strict = analyze_store(
        &store,
        AnalysisConfig::default(),
        IntegrityPolicy::default().with_legacy_requires_estimate(true),
        |_| {},
    )
    .unwrap();
    assert_eq!(strict.files_processed, 1);
    assert_eq!(strict.files_incomplete, 1);
    assert_eq!(strict.incomplete[0].path, "old/model");
    assert_eq!(strict.savings.saved_bytes, 0);
}

#[test]
fn test_similarity_and_ranking_ignore_ingest_order() {
    let manifests: Vec<FileManifest> = (0..6)
        .map(|i| {
            let mut m = FileManifest::new(format!("acct/model-{}", i));
            m.insert("shared", TensorRecord::new("S", 100));
            m.insert("group", TensorRecord::new(format!("G{}", i % 2), 50));
            m.insert("own", TensorRecord::new(format!("O{}", i), 10));
            m.mark_complete();
            m
        })
        .collect();

    let run = |order: &[usize]| {
        let mut analyzer = DedupAnalyzer::new(AnalysisConfig::default(), IntegrityPolicy::default());
        for &i in order {
            analyzer.ingest(&manifests[i]);
        }
        analyzer.finish()
    };

    let forward = run(&[0, 1, 2, 3, 4, 5]);
    let shuffled = run(&[3, 0, 5, 1, 4, 2]);

    assert_eq!(forward.ranking, shuffled.ranking);
    let (f, s) = (forward.similarity.unwrap(), shuffled.similarity.unwrap());
    assert_eq!(f.top_pairs, s.top_pairs);
    assert_eq!(f.pairs_over_threshold, s.pairs_over_threshold);
    // Totals do not depend on order even though attribution does.
    assert_eq!(forward.savings.saved_bytes, shuffled.savings.saved_bytes);
}

#[test]
fn test_oversized_byte_counts_do_not_overflow() {
    let results = TempDir::new().unwrap();
    let store = ManifestStore::new(results.path());

    for model in ["first", "second"] {
        let dir = results.path().join("huge").join(model);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("hashes.json"),
            r#"{"file_path": "huge", "tensors": {"X": {"hash": "X", "byte_count": 18446744073709551615}}}"#,
        )
        .unwrap();
    }

    let report = analyze_store(&store, AnalysisConfig::default(), IntegrityPolicy::default(), |_| {})
        .unwrap();
    assert_eq!(report.files_processed, 2);
    assert_eq!(report.savings.total_bytes, u64::MAX);
    assert_eq!(report.savings.saved_bytes, u64::MAX);
    assert_eq!(report.ranking.top[0].occurrences, 2);
    assert_eq!(report.ranking.top[0].total_bytes, u64::MAX);
    let similarity = report.similarity.unwrap();
    assert_eq!(similarity.top_pairs[0].shared_bytes, u64::MAX);
}
