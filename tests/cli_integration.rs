//! End-to-end CLI tests against the built binary

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn lognova() -> Command {
    Command::cargo_bin("lognova").unwrap()
}

fn sample_log(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("app.log");
    let mut content = String::new();
    for i in 0..60 {
        content.push_str(&format!("2025-10-01T12:00:{:02}Z INFO heartbeat seq={i} ok\n", i % 60));
    }
    content.push_str("2025-10-01T12:01:00Z ERROR payment declined code=402\n");
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_rank_surfaces_the_rare_line_first() {
    let dir = TempDir::new().unwrap();
    let log = sample_log(&dir);

    let output = lognova()
        .arg("rank")
        .arg(&log)
        .arg("--top")
        .arg("3")
        .assert()
        .success()
        .stdout(predicate::str::contains("novelty="))
        .stdout(predicate::str::contains("ERROR payment declined code=402"))
        .get_output()
        .stdout
        .clone();

    let first_line = String::from_utf8(output).unwrap().lines().next().unwrap().to_string();
    assert!(
        first_line.contains("payment declined"),
        "rare line should rank first, got: {first_line}"
    );
}

#[test]
fn test_rank_writes_csv_with_header() {
    let dir = TempDir::new().unwrap();
    let log = sample_log(&dir);
    let csv = dir.path().join("report.csv");

    lognova()
        .arg("rank")
        .arg(&log)
        .arg("--out")
        .arg(&csv)
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote"));

    let content = fs::read_to_string(&csv).unwrap();
    assert!(content.starts_with("timestamp,level,novelty,score,token_info,template_info,template,line"));
    assert_eq!(content.lines().count(), 62, "header plus one row per input line");
}

#[test]
fn test_rank_writes_json_array() {
    let dir = TempDir::new().unwrap();
    let log = sample_log(&dir);
    let json = dir.path().join("report.json");

    lognova()
        .arg("rank")
        .arg(&log)
        .arg("--json")
        .arg(&json)
        .assert()
        .success();

    let parsed: serde_json::Value = serde_json::from_str(&fs::read_to_string(&json).unwrap()).unwrap();
    let records = parsed.as_array().unwrap();
    assert_eq!(records.len(), 61);
    let first = &records[0];
    for key in ["novelty", "score", "template", "token_contributors", "line"] {
        assert!(first.get(key).is_some(), "missing key {key}");
    }
}

#[test]
fn test_cluster_groups_templates() {
    let dir = TempDir::new().unwrap();
    let log = sample_log(&dir);

    lognova()
        .arg("cluster")
        .arg(&log)
        .arg("--top")
        .arg("5")
        .assert()
        .success()
        .stdout(predicate::str::contains("<ts> INFO heartbeat seq=<num> ok"))
        .stdout(predicate::str::contains("60"));
}

#[test]
fn test_explain_prints_breakdown() {
    let dir = TempDir::new().unwrap();
    let log = sample_log(&dir);

    lognova()
        .arg("explain")
        .arg(&log)
        .arg("--line")
        .arg("ERROR payment declined code=402")
        .assert()
        .success()
        .stdout(predicate::str::contains("Score:"))
        .stdout(predicate::str::contains("Top tokens by surprisal:"))
        .stdout(predicate::str::contains("Template:"));
}

#[test]
fn test_explain_writes_json() {
    let dir = TempDir::new().unwrap();
    let log = sample_log(&dir);
    let json = dir.path().join("explain.json");

    lognova()
        .arg("explain")
        .arg(&log)
        .arg("--line")
        .arg("ERROR payment declined code=402")
        .arg("--json")
        .arg(&json)
        .assert()
        .success();

    let parsed: serde_json::Value = serde_json::from_str(&fs::read_to_string(&json).unwrap()).unwrap();
    assert!(parsed["novelty"].as_f64().unwrap() > 0.0);
    assert!(parsed["weights"]["w_token"].as_f64().is_some());
    assert!(parsed["token_contributors"].is_array());
}

#[test]
fn test_state_out_then_state_in_roundtrip() {
    let dir = TempDir::new().unwrap();
    let log = sample_log(&dir);
    let state = dir.path().join("state.json");

    lognova()
        .arg("rank")
        .arg(&log)
        .arg("--state-out")
        .arg(&state)
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote state snapshot"));

    let snapshot: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&state).unwrap()).unwrap();
    assert_eq!(snapshot["version"], 3);

    lognova()
        .arg("rank")
        .arg(&log)
        .arg("--state-in")
        .arg(&state)
        .assert()
        .success();
}

#[test]
fn test_missing_state_in_warns_and_continues() {
    let dir = TempDir::new().unwrap();
    let log = sample_log(&dir);

    lognova()
        .arg("rank")
        .arg(&log)
        .arg("--state-in")
        .arg(dir.path().join("missing.json"))
        .assert()
        .success();
}

#[test]
fn test_invalid_decay_fails_with_message() {
    let dir = TempDir::new().unwrap();
    let log = sample_log(&dir);

    lognova()
        .arg("rank")
        .arg(&log)
        .arg("--decay")
        .arg("2.0")
        .assert()
        .failure()
        .stderr(predicate::str::contains("decay"));
}

#[test]
fn test_missing_file_fails() {
    lognova()
        .arg("rank")
        .arg("/definitely/not/here.log")
        .assert()
        .failure();
}

#[test]
fn test_rank_with_bigrams_flag() {
    let dir = TempDir::new().unwrap();
    let log = sample_log(&dir);

    lognova()
        .arg("rank")
        .arg(&log)
        .arg("--with-bigrams")
        .arg("--top")
        .arg("1")
        .assert()
        .success()
        .stdout(predicate::str::contains("payment declined"));
}
