use chrono::{TimeZone, Utc};
use parley_core::archive::{ArchiveRecord, ArchiveSink, FileArchiveSink};
use parley_core::session::{Metadata, Session, SessionState, TerminationReason, Turn};
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn write_config(dir: &Path) {
    let config = serde_json::json!({
        "archive": { "destination": dir.join("archives").display().to_string() },
        "logging": { "level": "warn", "dir": dir.join("logs").display().to_string() }
    });
    std::fs::write(dir.join("config.json"), config.to_string()).unwrap();
}

fn parley(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_parley"))
        .arg("--config-dir")
        .arg(dir)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run parley")
}

#[test]
fn test_archives_lists_nothing_in_fresh_dir() {
    let dir = TempDir::new().unwrap();
    write_config(dir.path());

    let output = parley(dir.path(), &["archives"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout.contains("No archived sessions"));
}

#[tokio::test]
async fn test_show_prints_archived_transcript() {
    let dir = TempDir::new().unwrap();
    write_config(dir.path());

    let at = Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap();
    let mut session = Session::new("cli-archived", Metadata::new(), at);
    session.turns.push(Turn::user("Where is the handbook?", at));
    session
        .turns
        .push(Turn::assistant("On the intranet.", vec!["handbook.md".into()], at));
    session.state = SessionState::Ended;
    let record = ArchiveRecord::new(session, TerminationReason::UserEnded, at);

    let sink = FileArchiveSink::new(dir.path().join("archives"));
    sink.write(&record).await.unwrap();

    let output = parley(dir.path(), &["archives"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("cli-archived"));
    assert!(stdout.contains("2 turns"));

    let output = parley(dir.path(), &["show", "cli-archived"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("Human: Where is the handbook?"));
    assert!(stdout.contains("Assistant: On the intranet."));
}

#[test]
fn test_show_unknown_session_fails() {
    let dir = TempDir::new().unwrap();
    write_config(dir.path());

    let output = parley(dir.path(), &["show", "missing"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("No archived session missing"));
}

#[test]
fn test_init_writes_default_config_once() {
    let dir = TempDir::new().unwrap();

    let output = parley(dir.path(), &["init"]);
    assert!(output.status.success());
    assert!(dir.path().join("config.json").exists());

    let output = parley(dir.path(), &["init"]);
    assert!(String::from_utf8_lossy(&output.stdout).contains("already exists"));
}
