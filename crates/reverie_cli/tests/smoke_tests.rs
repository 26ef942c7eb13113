//! CLI smoke tests: verify basic binary behavior.

use std::io::Write;
use std::process::{Command, Stdio};

fn cli_bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_reverie"))
}

#[test]
fn test_help_flag() {
    let output = cli_bin().arg("--help").output().expect("failed to run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage"), "Expected usage info in --help output");
    assert!(stdout.contains("--no-daemon"));
}

#[test]
fn test_version_flag() {
    let output = cli_bin().arg("--version").output().expect("failed to run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("reverie"), "Expected binary name in --version output");
}

/// Boots against mock backends, answers a scripted session from stdin and
/// leaves the database behind.
#[test]
fn test_piped_session_with_mock_backends() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("session.db");

    let mut child = cli_bin()
        .current_dir(dir.path())
        .arg("--config")
        .arg(dir.path().join("missing.toml"))
        .arg("--db")
        .arg(&db)
        .arg("--no-daemon")
        .env("THOUGHT_PROVIDER", "mock")
        .env("CONVERSATION_PROVIDER", "mock")
        .env("RUST_LOG", "warn")
        .env("HOME", dir.path())
        .env("XDG_DATA_HOME", dir.path())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to run");

    child
        .stdin
        .take()
        .unwrap()
        .write_all(b"/status\nhello there\n/thoughts\n/quit\n")
        .unwrap();
    let output = child.wait_with_output().unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout.contains("First activation"));
    assert!(stdout.contains("Thought loop: Stopped"));
    assert!(stdout.contains("reverie> "));
    assert!(db.exists());
}
