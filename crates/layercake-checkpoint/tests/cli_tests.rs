//! CLI integration tests for layercake-hash.

use assert_cmd::Command;
use layercake_checkpoint::ContainerWriter;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const ONE_TO_EIGHT_SHA256: &str =
    "66840dda154e8a113c31dd0ad32f7f3a366a80e8136979d8f5a101d3d29d6f72";

/// Get a Command for the layercake-hash binary.
#[allow(deprecated)]
fn cmd() -> Command {
    Command::cargo_bin("layercake-hash").unwrap()
}

fn write_container(path: &Path, tensors: &[(&str, Vec<u8>)]) {
    let mut writer = ContainerWriter::new();
    writer.add_metadata("format", "pt");
    for (name, data) in tensors {
        writer.add_tensor(*name, "U8", vec![data.len() as u64], data.clone());
    }
    writer.write_file(path).unwrap();
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
            "Per-tensor content hashing for safetensors checkpoints",
        ));
}

#[test]
fn test_version() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("layercake-hash"));
}

#[test]
fn test_corpus_help() {
    cmd()
        .args(["corpus", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--force"))
        .stdout(predicate::str::contains("--estimate"));
}

#[test]
fn test_no_subcommand_fails() {
    cmd().assert().failure();
}

// ============================================================================
// File and Info Tests
// ============================================================================

#[test]
fn test_file_json_digest() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("model.safetensors");
    write_container(&input, &[("w", (1u8..=8).collect::<Vec<u8>>())]);

    let output = cmd()
        .args(["file", input.to_str().unwrap(), "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let w = &json["manifest"]["tensors"]["w"];
    assert_eq!(w["hash"], ONE_TO_EIGHT_SHA256);
    assert_eq!(w["byte_count"], 8);
    assert!(w["compressed_size"].is_u64());
    assert_eq!(json["manifest"]["complete"], true);
}

#[test]
fn test_file_without_estimate() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("model.safetensors");
    write_container(&input, &[("w", (1u8..=8).collect::<Vec<u8>>())]);

    let output = cmd()
        .args(["file", input.to_str().unwrap(), "--estimate", "none", "--json"])
        .output()
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(json["manifest"]["tensors"]["w"].get("compressed_size").is_none());
}

#[test]
fn test_file_human_output() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("model.safetensors");
    write_container(&input, &[("w", (1u8..=8).collect::<Vec<u8>>())]);

    cmd()
        .args(["file", input.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains(ONE_TO_EIGHT_SHA256))
        .stdout(predicate::str::contains("Tensors:   1"));
}

#[test]
fn test_file_malformed_fails() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("broken.safetensors");
    fs::write(&input, [0xff, 0xff, 0xff]).unwrap();

    cmd()
        .args(["file", input.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"))
        .stderr(predicate::str::contains("Malformed header"));
}

#[test]
fn test_file_missing_input_fails() {
    cmd()
        .args(["file", "/nonexistent/model.safetensors"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn test_info_lists_tensors() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("model.safetensors");
    write_container(&input, &[("embed.weight", vec![0; 16]), ("lm_head", vec![1; 4])]);

    cmd()
        .args(["info", input.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Tensors: 2"))
        .stdout(predicate::str::contains("embed.weight"))
        .stdout(predicate::str::contains("lm_head"));
}

#[test]
fn test_info_json() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("model.safetensors");
    write_container(&input, &[("a", vec![0; 16])]);

    let output = cmd()
        .args(["info", input.to_str().unwrap(), "--json"])
        .output()
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["payload_len"], 16);
    assert_eq!(json["tensors"][0]["name"], "a");
    assert_eq!(json["tensors"][0]["end"], 16);
}

// ============================================================================
// Corpus Tests
// ============================================================================

#[test]
fn test_corpus_writes_manifests_and_skips_existing() {
    let models = TempDir::new().unwrap();
    let results = TempDir::new().unwrap();
    for (account, model) in [("acme", "alpha"), ("acme", "beta"), ("other", "gamma")] {
        let dir = models.path().join(account).join(model);
        fs::create_dir_all(&dir).unwrap();
        write_container(&dir.join("model.safetensors"), &[("w", vec![7; 32])]);
    }

    let output = cmd()
        .args([
            "corpus",
            models.path().to_str().unwrap(),
            "-o",
            results.path().to_str().unwrap(),
            "--json",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());
    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["models"], 3);
    assert_eq!(summary["hashed"], 3);
    assert!(results.path().join("acme/alpha/hashes.json").exists());
    assert!(results.path().join("other/gamma/hashes.json").exists());

    cmd()
        .args([
            "corpus",
            models.path().to_str().unwrap(),
            "-o",
            results.path().to_str().unwrap(),
        ])
        .assert()
        .success()
        .stderr(predicate::str::contains("Skipped:    3"));

    let forced = cmd()
        .args([
            "corpus",
            models.path().to_str().unwrap(),
            "-o",
            results.path().to_str().unwrap(),
            "--force",
            "--json",
        ])
        .output()
        .unwrap();
    let summary: serde_json::Value = serde_json::from_slice(&forced.stdout).unwrap();
    assert_eq!(summary["hashed"], 3);
}

#[test]
fn test_corpus_reports_failed_model() {
    let models = TempDir::new().unwrap();
    let results = TempDir::new().unwrap();
    let good = models.path().join("acme/good");
    let bad = models.path().join("acme/bad");
    fs::create_dir_all(&good).unwrap();
    fs::create_dir_all(&bad).unwrap();
    write_container(&good.join("model.safetensors"), &[("w", vec![1; 8])]);
    fs::write(bad.join("model.safetensors"), b"nope").unwrap();

    let output = cmd()
        .args([
            "corpus",
            models.path().to_str().unwrap(),
            "-o",
            results.path().to_str().unwrap(),
            "--json",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());
    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["hashed"], 1);
    assert_eq!(summary["failed"][0]["model"], "acme/bad");
    assert!(!results.path().join("acme/bad/hashes.json").exists());
}

// ============================================================================
// Compare and Completions Tests
// ============================================================================

#[test]
fn test_compare_json() {
    let tmp = TempDir::new().unwrap();
    let a = tmp.path().join("a.safetensors");
    let b = tmp.path().join("b.safetensors");
    write_container(&a, &[("x", vec![1; 8]), ("y", vec![2; 8])]);
    write_container(&b, &[("x", vec![1; 8]), ("z", vec![3; 8])]);

    let output = cmd()
        .args(["compare", a.to_str().unwrap(), b.to_str().unwrap(), "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["identical"], 1);
    assert_eq!(report["only_left"], 1);
    assert_eq!(report["only_right"], 1);
    assert_eq!(report["tensors"][0]["status"], "identical");
}

#[test]
fn test_completions_bash() {
    cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("layercake-hash"));
}
