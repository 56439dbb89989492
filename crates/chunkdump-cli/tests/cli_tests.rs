//! CLI integration tests for chunkdump.
//!
//! These tests verify command-line argument parsing, help output,
//! and exit codes for error conditions that need no server.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

/// Get a command for the chunkdump binary.
fn cmd() -> Command {
    Command::cargo_bin("chunkdump").unwrap()
}

fn config_file(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{}", content).unwrap();
    file
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("plan"))
        .stdout(predicate::str::contains("health-check"));
}

#[test]
fn test_plan_subcommand_help() {
    cmd()
        .args(["plan", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--threads"))
        .stdout(predicate::str::contains("--rows"))
        .stdout(predicate::str::contains("--where"))
        .stdout(predicate::str::contains("--consistency"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("chunkdump"));
}

#[test]
fn test_global_flag_defaults() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("[default: config.yaml]"))
        .stdout(predicate::str::contains("--output-json"))
        .stdout(predicate::str::contains("[default: text]"))
        .stdout(predicate::str::contains("[default: info]"))
        .stdout(predicate::str::contains("--shutdown-timeout"))
        .stdout(predicate::str::contains("[default: 60]"));
}

#[test]
fn test_health_check_command_exists() {
    cmd()
        .args(["health-check", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Test the source connection"));
}

#[test]
fn test_no_subcommand_shows_help() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn test_unknown_consistency_is_rejected_by_parser() {
    cmd()
        .args(["plan", "--consistency", "eventual"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown consistency"));
}

// =============================================================================
// Exit Code Tests
// =============================================================================

#[test]
fn test_missing_config_exits_with_code_7() {
    // Missing file is an IO error (code 7), not a config error (code 1)
    cmd()
        .args(["--config", "nonexistent_config_file.yaml", "health-check"])
        .assert()
        .code(7);
}

#[test]
fn test_invalid_yaml_exits_with_code_1() {
    let file = config_file("invalid: yaml: content: [\n");

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(1);
}

#[test]
fn test_empty_config_exits_with_code_1() {
    let file = tempfile::NamedTempFile::new().unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "plan"])
        .assert()
        .code(1);
}

#[test]
fn test_missing_required_fields_exits_with_code_1() {
    let file = config_file("source:\n  host: 127.0.0.1\n");

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "plan"])
        .assert()
        .code(1);
}

#[test]
fn test_invalid_override_exits_with_code_1() {
    let file = config_file("source:\n  host: 127.0.0.1\n  user: root\n");

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "plan", "--threads", "0"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("threads"));
}

#[test]
fn test_short_config_flag() {
    cmd().args(["-c", "some_config.yaml", "--help"]).assert().success();
}
