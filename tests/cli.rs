//! CLI integration tests: feeding JSON batch files through the binary and
//! checking the emitted reports.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

const PASS_THROUGH_BATCH: &str = r#"{
    "methods": [{
        "name": "paramToReturn",
        "params": [{"name": "x", "ty": "int"}],
        "blocks": [{"instrs": [
            {"op": "return", "value": {"place": {"param": "x"}}}
        ]}],
        "edges": []
    }]
}"#;

fn write_batch(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    path
}

#[test]
fn analyze_reports_leak_in_json_format() {
    let dir = tempfile::tempdir().unwrap();
    let batch = write_batch(&dir, "batch.json", PASS_THROUGH_BATCH);

    Command::cargo_bin("leakscope")
        .unwrap()
        .args(["analyze", batch.to_str().unwrap(), "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"kind\": \"leak\""))
        .stdout(predicate::str::contains("paramToReturn"))
        .stdout(predicate::str::contains("<return>"));
}

#[test]
fn analyze_walks_directories_for_batches() {
    let dir = tempfile::tempdir().unwrap();
    write_batch(&dir, "one.json", PASS_THROUGH_BATCH);

    Command::cargo_bin("leakscope")
        .unwrap()
        .args(["analyze", dir.path().to_str().unwrap(), "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("paramToReturn"));
}

#[test]
fn sink_filter_suppresses_external_findings() {
    let dir = tempfile::tempdir().unwrap();
    let batch = write_batch(&dir, "batch.json", PASS_THROUGH_BATCH);

    Command::cargo_bin("leakscope")
        .unwrap()
        .args([
            "analyze",
            batch.to_str().unwrap(),
            "--format",
            "json",
            "--sinks",
            "shared",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"total\": 0"));
}

#[test]
fn malformed_batch_file_fails_with_context() {
    let dir = tempfile::tempdir().unwrap();
    let batch = write_batch(&dir, "bad.json", "{ not json");

    Command::cargo_bin("leakscope")
        .unwrap()
        .args(["analyze", batch.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("parsing batch file"));
}

#[test]
fn policy_command_prints_defaults() {
    Command::cargo_bin("leakscope")
        .unwrap()
        .arg("policy")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"call_policy\": \"conservative\""))
        .stdout(predicate::str::contains("\"sources\": \"all_params\""));
}

#[test]
fn version_command_prints_version() {
    Command::cargo_bin("leakscope")
        .unwrap()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}
