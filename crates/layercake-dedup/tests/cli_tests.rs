//! CLI integration tests for layercake-dedup.

use assert_cmd::Command;
use layercake_core::{FileManifest, ManifestKey, ManifestStore, TensorRecord};
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Get a Command for the layercake-dedup binary.
#[allow(deprecated)]
fn cmd() -> Command {
    Command::cargo_bin("layercake-dedup").unwrap()
}

fn save(store: &ManifestStore, account: &str, model: &str, entries: &[(&str, &str, u64)]) {
    let key = ManifestKey::new(account, model);
    let mut manifest = FileManifest::new(key.to_string()).with_algorithm("sha256");
    for (name, digest, bytes) in entries {
        manifest.insert(*name, TensorRecord::new(*digest, *bytes).with_compressed(bytes / 2));
    }
    manifest.mark_complete();
    store.save(&key, &manifest).unwrap();
}

/// Two models sharing one tensor, plus an empty manifest.
fn sample_results() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let store = ManifestStore::new(tmp.path());
    save(&store, "acme", "base", &[("a", "X", 1024), ("b", "Y", 1024)]);
    save(&store, "acme", "tuned", &[("a", "X", 1024), ("b", "Z", 1024)]);
    save(&store, "other", "empty", &[]);
    tmp
}

// ============================================================================
// Help and Version Tests
// ============================================================================

#[test]
fn test_help() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Tensor deduplication analysis over hash manifests",
        ));
}

#[test]
fn test_version() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("layercake-dedup"));
}

#[test]
fn test_analyze_help() {
    cmd()
        .args(["analyze", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--max-pairs"))
        .stdout(predicate::str::contains("--no-similarity"));
}

// ============================================================================
// Analyze Tests
// ============================================================================

#[test]
fn test_analyze_json() {
    let results = sample_results();
    let output = cmd()
        .args(["analyze", results.path().to_str().unwrap(), "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["files_processed"], 2);
    assert_eq!(json["files_incomplete"], 1);
    assert_eq!(json["files_failed"], 0);
    assert_eq!(json["savings"]["duplicate_tensors"], 1);
    assert_eq!(json["savings"]["saved_bytes"], 1024);
    assert_eq!(json["savings"]["percent_saved"], 25.0);
    assert_eq!(json["similarity"]["top_pairs"][0]["similarity"], 0.5);
    assert_eq!(json["ranking"]["top"][0]["digest"], "X");
}

#[test]
fn test_analyze_human_output() {
    let results = sample_results();
    cmd()
        .args(["analyze", results.path().to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Processed:  2"))
        .stdout(predicate::str::contains("Incomplete: 1"))
        .stdout(predicate::str::contains("25.00%"))
        .stdout(predicate::str::contains("acme/base and acme/tuned"));
}

#[test]
fn test_analyze_no_similarity() {
    let results = sample_results();
    let output = cmd()
        .args([
            "analyze",
            results.path().to_str().unwrap(),
            "--no-similarity",
            "--json",
        ])
        .output()
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(json.get("similarity").is_none());
}

#[test]
fn test_analyze_reports_unreadable_manifest() {
    let results = sample_results();
    let broken = results.path().join("acme/broken");
    fs::create_dir_all(&broken).unwrap();
    fs::write(broken.join("hashes.json"), b"not json").unwrap();

    let output = cmd()
        .args(["analyze", results.path().to_str().unwrap(), "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["files_failed"], 1);
    assert_eq!(json["failures"][0]["path"], "acme/broken");
    assert_eq!(json["files_processed"], 2);
}

#[test]
fn test_analyze_missing_dir_fails() {
    cmd()
        .args(["analyze", "/nonexistent/results"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn test_analyze_rejects_bad_threshold() {
    let results = sample_results();
    cmd()
        .args([
            "analyze",
            results.path().to_str().unwrap(),
            "--threshold",
            "1.5",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("threshold"));
}

// ============================================================================
// Prune and Completions Tests
// ============================================================================

#[test]
fn test_prune_dry_run_then_real() {
    let results = sample_results();
    let dir = results.path().to_str().unwrap();

    cmd()
        .args(["prune", dir, "--dry-run"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Would remove other/empty"));
    assert!(results.path().join("other/empty/hashes.json").exists());

    let output = cmd().args(["prune", dir, "--json"]).output().unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["removed"][0]["key"], "other/empty");
    assert_eq!(json["removed"][0]["reason"], "empty");
    assert!(!results.path().join("other").exists());
}

#[test]
fn test_completions_zsh() {
    cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("layercake-dedup"));
}
