use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};

fn ventmech() -> Command {
    let mut cmd = Command::cargo_bin("ventmech").unwrap();
    cmd.env_remove("VENTMECH_CLASSIFIER_CMD")
        .env_remove("VENTMECH_RECONSTRUCTOR_CMD");
    cmd
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// Recording with `breaths` synthetic breaths of a linear lung
fn recording_text(breaths: u64) -> String {
    let mut text = String::new();
    for number in 1..=breaths {
        text.push_str(&format!("BS, S:{},\n", number));
        let mut volume = 0.0;
        for i in 0..100 {
            let t = i as f64 * 0.02;
            let q = if i < 40 {
                30.0
            } else {
                -40.0 * (-(t - 0.8) / 0.3).exp()
            };
            volume += q / 60.0 * 0.02;
            let p = 5.0 + 20.0 * volume + 10.0 * q / 60.0;
            text.push_str(&format!("{},{}\n", round1(q), round1(p)));
        }
        text.push_str("BE\n");
    }
    text
}

fn write_recording(dir: &Path, name: &str, breaths: u64) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, recording_text(breaths)).unwrap();
    path
}

fn stdout_json(output: &assert_cmd::assert::Assert) -> serde_json::Value {
    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    serde_json::from_str(&stdout).unwrap()
}

// =============================================================================
// GENERAL
// =============================================================================

#[test]
fn test_no_args_shows_help() {
    ventmech()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn test_version_flag() {
    ventmech()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("ventmech"));
}

#[test]
fn test_help_flag() {
    ventmech()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("asynchrony"));
}

// =============================================================================
// INFO SUBCOMMAND
// =============================================================================

#[test]
fn test_info_subcommand() {
    ventmech()
        .arg("info")
        .assert()
        .success()
        .stdout(predicate::str::contains("Classifier: not configured"));
}

#[test]
fn test_info_json_reads_env() {
    let output = ventmech()
        .env("VENTMECH_CLASSIFIER_CMD", "serve-classifier")
        .args(["info", "--json"])
        .assert()
        .success();

    let parsed = stdout_json(&output);
    assert_eq!(parsed["classifier_cmd"], "serve-classifier");
    assert!(parsed["reconstructor_cmd"].is_null());
    assert_eq!(parsed["model_seed"], 7);
    assert_eq!(parsed["defaults"]["thresholds"]["min_breath_len"], 20);
}

// =============================================================================
// VALIDATE SUBCOMMAND
// =============================================================================

#[test]
fn test_validate_nonexistent_file() {
    ventmech()
        .args(["validate", "--file", "/nonexistent/ward_P1_20210314_08-00-00.txt"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_validate_unsupported_extension() {
    let tmp = tempfile::Builder::new().suffix(".edf").tempfile().unwrap();

    ventmech()
        .args(["validate", "--file", tmp.path().to_str().unwrap()])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Unsupported"));
}

#[test]
fn test_validate_empty_recording() {
    let tmp = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();

    ventmech()
        .args(["validate", "--file", tmp.path().to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("0 breaths"))
        .stderr(predicate::str::contains("no complete breaths"));
}

#[test]
fn test_validate_json_output() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_recording(tmp.path(), "ward_P1_20210314_08-00-00.txt", 3);

    let output = ventmech()
        .args(["validate", "--json", "--file", path.to_str().unwrap()])
        .assert()
        .success();

    let parsed = stdout_json(&output);
    assert_eq!(parsed["exists"], true);
    assert_eq!(parsed["supported"], true);
    assert_eq!(parsed["breath_count"], 3);
    assert_eq!(parsed["counters"]["accepted"], 3);
    assert_eq!(parsed["key"]["patient"], "P1");
    assert_eq!(parsed["key"]["hour"], "08-00-00");
}

// =============================================================================
// ANALYZE SUBCOMMAND
// =============================================================================

#[test]
fn test_analyze_missing_file_arg() {
    ventmech()
        .arg("analyze")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--file"));
}

#[test]
fn test_analyze_nonexistent_file() {
    ventmech()
        .args(["analyze", "--file", "/nonexistent/ward_P1_20210314_08-00-00.txt"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_analyze_without_models() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_recording(tmp.path(), "ward_P1_20210314_08-00-00.txt", 2);

    let output = ventmech()
        .args(["analyze", "--quiet", "--file", path.to_str().unwrap()])
        .assert()
        .success();

    let parsed = stdout_json(&output);
    assert_eq!(parsed["breaths"].as_array().unwrap().len(), 2);
    assert_eq!(parsed["breaths"][0]["label"], "Unclassified");
    assert!(parsed["breaths"][0]["magnitude"].is_null());
    assert_eq!(parsed["debug"]["counters"]["accepted"], 2);
    assert_eq!(parsed["summary"]["stats"]["tidal_volume"]["q50"], 380.0);
    assert!(parsed["summary"]["asynchrony_index"].is_null());
    // trace is omitted unless requested
    assert!(parsed["trace"]["pressure"].as_array().unwrap().is_empty());
}

#[test]
fn test_analyze_writes_output_file() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_recording(tmp.path(), "ward_P1_20210314_08-00-00.txt", 1);
    let out = tmp.path().join("results").join("analysis.json");

    ventmech()
        .args(["analyze", "--include-trace", "--compact"])
        .args(["--file", path.to_str().unwrap()])
        .args(["-o", out.to_str().unwrap()])
        .assert()
        .success()
        .stderr(predicate::str::contains("Results written to"));

    let parsed: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out).unwrap()).unwrap();
    assert_eq!(parsed["trace"]["pressure"].as_array().unwrap().len(), 100);
    assert_eq!(parsed["key"]["date"], "20210314");
}

#[test]
fn test_analyze_invalid_config() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_recording(tmp.path(), "ward_P1_20210314_08-00-00.txt", 1);
    let config = tmp.path().join("config.json");
    std::fs::write(&config, "{ \"reconstruction_len\": 1 }").unwrap();

    ventmech()
        .args(["analyze", "--file", path.to_str().unwrap()])
        .args(["--config", config.to_str().unwrap()])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("reconstruction_len"));
}

#[cfg(unix)]
#[test]
fn test_analyze_with_model_commands() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_recording(tmp.path(), "ward_P1_20210314_08-00-00.txt", 2);

    let output = ventmech()
        .env("VENTMECH_CLASSIFIER_CMD", "while read line; do echo 1; done")
        .args(["analyze", "--quiet", "--file", path.to_str().unwrap()])
        .args(["--reconstructor-cmd", "while read line; do echo \"$line\"; done"])
        .assert()
        .success();

    let parsed = stdout_json(&output);
    assert_eq!(parsed["breaths"][0]["label"], "Asynchrony");
    assert_eq!(parsed["breaths"][1]["magnitude"], 0.0);
    assert_eq!(parsed["summary"]["asynchrony_index"], 100.0);
}

// =============================================================================
// BATCH SUBCOMMAND
// =============================================================================

#[test]
fn test_batch_requires_input() {
    ventmech()
        .arg("batch")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("must be specified"));
}

#[test]
fn test_batch_dry_run_lists_files() {
    let tmp = tempfile::tempdir().unwrap();
    write_recording(tmp.path(), "ward_P1_20210314_08-00-00.txt", 1);
    write_recording(tmp.path(), "ward_P1_20210314_09-00-00.txt", 1);

    ventmech()
        .args(["batch", "--dry-run", "--dir", tmp.path().to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("08-00-00.txt"))
        .stdout(predicate::str::contains("09-00-00.txt"))
        .stderr(predicate::str::contains("Found 2 file(s)"));
}

#[test]
fn test_batch_builds_daily_summary() {
    let tmp = tempfile::tempdir().unwrap();
    write_recording(tmp.path(), "ward_P1_20210314_09-00-00.txt", 1);
    write_recording(tmp.path(), "ward_P1_20210314_08-00-00.txt", 2);
    let pattern = format!("{}/*.txt", tmp.path().to_str().unwrap());

    let output = ventmech()
        .args(["batch", "--quiet", "--jobs", "2", "--glob", &pattern])
        .assert()
        .success();

    let parsed = stdout_json(&output);
    assert_eq!(parsed["analyses"].as_array().unwrap().len(), 2);
    assert_eq!(parsed["analyses"][0]["key"]["hour"], "08-00-00");
    assert_eq!(parsed["daily"][0]["patient"], "P1");
    assert_eq!(parsed["daily"][0]["overall"]["breath_count"], 3);
    assert_eq!(parsed["daily"][0]["hours"].as_array().unwrap().len(), 2);
}

#[test]
fn test_batch_partial_failure() {
    let tmp = tempfile::tempdir().unwrap();
    let good = write_recording(tmp.path(), "ward_P1_20210314_08-00-00.txt", 1);
    let missing = tmp.path().join("ward_P1_20210314_09-00-00.txt");

    ventmech()
        .args(["batch", "--files", good.to_str().unwrap(), missing.to_str().unwrap()])
        .assert()
        .failure()
        .code(4)
        .stderr(predicate::str::contains("Failed:"));
}

#[test]
fn test_batch_output_dir() {
    let tmp = tempfile::tempdir().unwrap();
    let rec = write_recording(tmp.path(), "ward_P2_20210315_10-00-00.txt", 1);
    let out = tmp.path().join("out");
    let store = tmp.path().join("store");

    ventmech()
        .args(["batch", "--quiet", "--files", rec.to_str().unwrap()])
        .args(["--output-dir", out.to_str().unwrap()])
        .args(["--store", store.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    assert!(out.join("ward_P2_20210315_10-00-00_analysis.json").exists());
    assert!(out.join("P2_20210315_daily.json").exists());
    assert!(store.join("P2_20210315_10-00-00.json").exists());
}
