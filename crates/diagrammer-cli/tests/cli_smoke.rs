use assert_cmd::Command;
use predicates::str::contains;
use std::fs;
use tempfile::TempDir;

/// A binary with no provider key and no reachable graphviz.
fn diagrammer(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("diagrammer").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("OPENAI_API_KEY")
        .env_remove("DIAGRAMMER_CONFIG")
        .env_remove("DIAGRAMMER_LLM_PROVIDER")
        .env_remove("DIAGRAMMER_DB")
        .env("DIAGRAMMER_GRAPHVIZ_BIN", dir.path().join("no-such-dot"))
        .env("DIAGRAMMER_LOG", "error")
        .arg("--db")
        .arg(dir.path().join("diagrammer.db"));
    cmd
}

#[test]
fn version_prints_package_version() {
    let dir = TempDir::new().unwrap();
    diagrammer(&dir)
        .arg("version")
        .assert()
        .success()
        .stdout(contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn missing_graphviz_is_reported_as_render_failure() {
    let dir = TempDir::new().unwrap();
    let out = diagrammer(&dir)
        .args(["generate", "login flow with retry"])
        .assert()
        .code(1)
        .get_output()
        .stdout
        .clone();

    let body: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(body["stage"], "rendering");
    assert_eq!(body["kind"], "engine_unavailable");
    assert!(!dir.path().join("diagram.svg").exists());
}

#[test]
fn oversized_prompt_is_rejected() {
    let dir = TempDir::new().unwrap();
    diagrammer(&dir)
        .env("DIAGRAMMER_MAX_PROMPT_CHARS", "10")
        .args(["generate", "this prompt is longer than ten characters"])
        .assert()
        .code(1)
        .stdout(contains("input_too_large"));
}

#[test]
fn unknown_kind_is_a_usage_error() {
    let dir = TempDir::new().unwrap();
    diagrammer(&dir)
        .args(["generate", "anything", "--kind", "sequence"])
        .assert()
        .code(2)
        .stderr(contains("unknown diagram kind"));
}

#[test]
fn strict_config_rejects_unknown_keys() {
    let dir = TempDir::new().unwrap();
    let cfg = dir.path().join("diagrammer.yaml");
    fs::write(&cfg, "version: 1\nllm:\n  provider: openai\n  temprature: 0.2\n").unwrap();

    diagrammer(&dir)
        .arg("--strict")
        .arg("--config")
        .arg(&cfg)
        .arg("version")
        .assert()
        .code(2)
        .stderr(contains("config error"));
}

#[test]
fn preview_rejects_invalid_markup() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("broken.dot");
    fs::write(&input, "digraph { a -> b ").unwrap();

    diagrammer(&dir)
        .arg("preview")
        .arg("--input")
        .arg(&input)
        .assert()
        .code(1)
        .stdout(contains("invalid_markup"));
}

#[test]
fn failures_show_up_in_stats_and_history() {
    let dir = TempDir::new().unwrap();
    diagrammer(&dir)
        .args(["generate", "deploy pipeline"])
        .assert()
        .code(1);

    let out = diagrammer(&dir)
        .args(["stats", "--format", "json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let stats: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(stats["total_requests"], 1);
    assert_eq!(stats["failed"], 1);
    assert_eq!(stats["cached_diagrams"], 0);

    diagrammer(&dir)
        .args(["history", "--limit", "5"])
        .assert()
        .success()
        .stdout(contains("rendering: engine_unavailable"));
}

#[test]
fn evict_on_empty_store_removes_nothing() {
    let dir = TempDir::new().unwrap();
    diagrammer(&dir)
        .args(["evict", "--older-than-days", "1", "--audit"])
        .assert()
        .success()
        .stdout(contains("\"diagrams_removed\": 0"))
        .stdout(contains("\"audit_records_removed\": 0"));
}

#[test]
fn evict_with_huge_age_keeps_audit_log() {
    let dir = TempDir::new().unwrap();
    diagrammer(&dir)
        .args(["generate", "deploy pipeline"])
        .assert()
        .code(1);

    diagrammer(&dir)
        .args(["evict", "--older-than-days", "4000000000", "--audit"])
        .assert()
        .success()
        .stdout(contains("\"diagrams_removed\": 0"))
        .stdout(contains("\"audit_records_removed\": 0"));

    diagrammer(&dir)
        .args(["stats", "--format", "json"])
        .assert()
        .success()
        .stdout(contains("\"failed\": 1"));
}
