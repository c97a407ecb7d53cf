//! End-to-end tests for the `promptlog` binary.
//!
//! stdout is a pipe under test, so every command answers in JSON.

use assert_cmd::Command;
use std::path::{Path, PathBuf};

fn migrations_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")
}

fn promptlog(db: &Path) -> Command {
    let mut cmd = Command::cargo_bin("promptlog").unwrap();
    cmd.env_remove("RUST_LOG")
        .arg("--db")
        .arg(db)
        .arg("--migrations")
        .arg(migrations_dir());
    cmd
}

fn json_stdout(cmd: &mut Command) -> serde_json::Value {
    let output = cmd.output().unwrap();
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn test_migrate_then_status() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("cli.db");

    let report = json_stdout(promptlog(&db).arg("migrate"));
    assert_eq!(report["applied"], serde_json::json!(["001", "002"]));

    let again = json_stdout(promptlog(&db).arg("migrate"));
    assert_eq!(again["applied"], serde_json::json!([]));
    assert_eq!(again["skipped"], serde_json::json!(["001", "002"]));

    let status = json_stdout(promptlog(&db).args(["migrate", "--status"]));
    let scripts = status.as_array().unwrap();
    assert_eq!(scripts.len(), 2);
    assert!(scripts.iter().all(|s| s["applied_at"].is_i64()));
}

#[test]
fn test_health_and_stats() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("nested/stats.db");

    let health = json_stdout(promptlog(&db).arg("health"));
    assert_eq!(health["status"], "ok");

    let stats = json_stdout(promptlog(&db).arg("stats"));
    assert_eq!(stats["conversations"], 0);
    assert_eq!(stats["sqlite"]["journal_mode"], "wal");
    assert_eq!(stats["sqlite"]["foreign_keys"], true);
    assert_eq!(stats["connection_pool"]["max_open_connections"], 1);
}

#[test]
fn test_conversations_list_empty_and_rating_stats() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("list.db");

    let list = json_stdout(promptlog(&db).args(["conversations", "list"]));
    assert_eq!(list["total"], 0);
    assert_eq!(list["per_page"], 20);
    assert_eq!(list["conversations"], serde_json::json!([]));

    let ratings = json_stdout(promptlog(&db).args(["ratings", "stats"]));
    assert_eq!(ratings["total_count"], 0);
    assert!(ratings["average_score"].is_null());
    assert_eq!(ratings["distribution"]["5"], 0);
}

#[test]
fn test_missing_conversation_exits_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("missing.db");

    let output = promptlog(&db)
        .args(["conversations", "show", "42"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(4));
    let stderr = String::from_utf8_lossy(&output.stderr);
    let last = stderr.lines().rev().find(|l| !l.trim().is_empty()).unwrap();
    let err: serde_json::Value = serde_json::from_str(last).unwrap();
    assert_eq!(err["error"]["code"], "CONVERSATION_NOT_FOUND");
}

#[test]
fn test_invalid_paging_exits_with_validation_code() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("paging.db");

    promptlog(&db)
        .args(["conversations", "list", "--per-page", "101"])
        .assert()
        .code(5);
    promptlog(&db)
        .args(["conversations", "delete", "abc"])
        .assert()
        .code(5);
}

#[test]
fn test_missing_migrations_dir_exits_with_migration_code() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = Command::cargo_bin("promptlog").unwrap();
    cmd.env_remove("RUST_LOG")
        .arg("--db")
        .arg(dir.path().join("m.db"))
        .arg("--migrations")
        .arg(dir.path().join("does-not-exist"))
        .arg("migrate")
        .assert()
        .code(3);
}

#[test]
fn test_version_json() {
    let mut cmd = Command::cargo_bin("promptlog").unwrap();
    let version = json_stdout(cmd.arg("version"));
    assert_eq!(version["version"], env!("CARGO_PKG_VERSION"));
    assert!(version["sqlite"].is_string());
}
