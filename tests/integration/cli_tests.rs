//! Integration tests for the CLI binary.
//!
//! Runs the `afed` binary with HOME pointed at a temporary directory.
//!
//! This test is registered as a [[test]] in the agentic-federation-cli crate
//! so that CARGO_BIN_EXE_afed is available.

use std::path::Path;
use std::process::{Command, Output};

/// Get a Command pointing to the `afed` binary with an isolated HOME.
fn afed(home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_afed"));
    cmd.env("HOME", home);
    cmd
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn cli_responds_to_help() {
    let home = tempfile::tempdir().unwrap();
    let output = afed(home.path())
        .arg("--help")
        .output()
        .expect("failed to execute afed --help");

    assert!(
        output.status.success(),
        "afed --help should exit with success, stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let out = stdout(&output);
    assert!(out.contains("Usage"), "unexpected help output: {out}");
    assert!(out.contains("failures"));
}

#[test]
fn cli_exits_with_error_on_unknown_flag() {
    let home = tempfile::tempdir().unwrap();
    let output = afed(home.path())
        .arg("--nonexistent-flag")
        .output()
        .expect("failed to execute afed");
    assert!(!output.status.success());
}

#[test]
fn cli_config_init_then_show() {
    let home = tempfile::tempdir().unwrap();
    let init = afed(home.path()).args(["config", "init"]).output().unwrap();
    assert!(init.status.success());
    assert!(home.path().join(".agentic/federation.json").exists());

    let again = afed(home.path()).args(["config", "init"]).output().unwrap();
    assert!(!again.status.success(), "second init must not overwrite");

    let show = afed(home.path()).args(["config", "show"]).output().unwrap();
    assert!(show.status.success());
    let config: serde_json::Value = serde_json::from_str(&stdout(&show)).unwrap();
    assert_eq!(config["push"]["max_attempts"], 5);
}

#[test]
fn cli_identifier_check() {
    let home = tempfile::tempdir().unwrap();
    let ok = afed(home.path())
        .args(["identifier", "check", "alice@example.org"])
        .output()
        .unwrap();
    assert!(ok.status.success());
    assert!(stdout(&ok).contains("example.org"));

    let bad = afed(home.path())
        .args(["identifier", "check", "Not A Host"])
        .output()
        .unwrap();
    assert!(!bad.status.success());
}

#[test]
fn cli_failures_empty_and_missing() {
    let home = tempfile::tempdir().unwrap();
    let list = afed(home.path()).args(["failures", "list"]).output().unwrap();
    assert!(list.status.success());
    assert!(stdout(&list).contains("No failure records"));

    let show = afed(home.path())
        .args(["failures", "show", "afail_missing"])
        .output()
        .unwrap();
    assert!(!show.status.success());
}
