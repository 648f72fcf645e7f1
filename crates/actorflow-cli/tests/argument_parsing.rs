//! Focused CLI argument parsing tests.
//!
//! Tests that verify command-line argument parsing works correctly without
//! binding any listener.

#![allow(deprecated)] // Command::cargo_bin is deprecated but replacement requires newer assert_cmd

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn actorflow(project: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("actorflow").unwrap();
    cmd.arg("--project")
        .arg(project.path())
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG");
    cmd
}

// ============================================================================
// Commands That Do Not Bind
// ============================================================================

#[test]
fn version_command_succeeds() {
    let temp = TempDir::new().unwrap();
    actorflow(&temp)
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("actorflow-cli"));
}

#[test]
fn version_flag_shows_version() {
    Command::cargo_bin("actorflow")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("actorflow"));
}

#[test]
fn help_flag_shows_usage() {
    Command::cargo_bin("actorflow")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("reactive line pipelines"))
        .stdout(predicate::str::contains("reply"))
        .stdout(predicate::str::contains("join"));
}

#[test]
fn sink_help_lists_bookmark_mode() {
    Command::cargo_bin("actorflow")
        .unwrap()
        .args(["sink", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--bookmarks"));
}

#[test]
fn no_command_fails() {
    Command::cargo_bin("actorflow").unwrap().assert().failure();
}

#[test]
fn unknown_command_fails() {
    Command::cargo_bin("actorflow")
        .unwrap()
        .arg("frobnicate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

// ============================================================================
// Address Validation
// ============================================================================

#[test]
fn sink_rejects_invalid_address() {
    let temp = TempDir::new().unwrap();
    actorflow(&temp)
        .args(["sink", "--address", "not-an-address"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid address"));
}

#[test]
fn reply_rejects_out_of_range_port() {
    let temp = TempDir::new().unwrap();
    actorflow(&temp)
        .args(["reply", "--address", "70000"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid address"));
}

#[test]
fn join_rejects_invalid_port() {
    let temp = TempDir::new().unwrap();
    actorflow(&temp)
        .args(["join", "--ports", "42042", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid address 'nope'"));
}

// ============================================================================
// Config Command
// ============================================================================

#[test]
fn config_shows_defaults_as_text() {
    let temp = TempDir::new().unwrap();
    actorflow(&temp)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("Server"))
        .stdout(predicate::str::contains("0.0.0.0:42042"))
        .stdout(predicate::str::contains("42042, 42043"));
}

#[test]
fn config_reads_project_file() {
    let temp = TempDir::new().unwrap();
    fs::write(
        temp.path().join("actorflow.toml"),
        "[server]\nbind_address = \"127.0.0.1:5000\"\n",
    )
    .unwrap();

    actorflow(&temp)
        .args(["config", "--format", "toml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[server]"))
        .stdout(predicate::str::contains("bind_address = \"127.0.0.1:5000\""));
}

#[test]
fn config_env_overrides_file() {
    let temp = TempDir::new().unwrap();
    actorflow(&temp)
        .env("AFL_PIPELINES__COMMENT_PREFIX", "//")
        .args(["config", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"comment_prefix\": \"//\""));
}

#[test]
fn invalid_project_file_fails() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("actorflow.toml"), "[server\nbroken").unwrap();

    actorflow(&temp)
        .arg("config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load configuration"));
}
