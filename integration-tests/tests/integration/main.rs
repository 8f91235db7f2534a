// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests
//!
//! These run the `harness-fixture` binary end to end. Each scenario is selected by the first
//! argument, and the harness is configured through the `HARNESS_*` environment variables, the
//! same way a user would.

use camino_tempfile::Utf8TempDir;
use harness_metadata::HarnessExitCode;
use indoc::indoc;
use integration_tests::harness_cli::{HarnessCli, read_log};
use pretty_assertions::assert_eq;

mod isolation;

fn fixture(scenario: &str) -> HarnessCli {
    let mut cli = HarnessCli::new(env!("CARGO_BIN_EXE_harness-fixture"));
    cli.arg(scenario);
    cli
}

#[test]
fn test_passing_run() {
    let dir = Utf8TempDir::new().unwrap();
    let output = fixture("passing").log_dir(dir.path()).output();

    assert_eq!(output.exit_status.code(), Some(HarnessExitCode::OK));
    let stdout = output.stdout_as_str();
    assert!(stdout.contains("Status: PASSED Failed: 0 Passed: 2"), "{output}");

    let text = read_log(dir.path(), "math", "txt").unwrap();
    assert!(text.contains("SuiteStarted   math"), "text log:\n{text}");
    let xml = read_log(dir.path(), "math", "xml").unwrap();
    assert!(xml.starts_with("<?xml"), "xml log:\n{xml}");
}

#[test]
fn test_failures_set_exit_code() {
    let dir = Utf8TempDir::new().unwrap();
    let output = fixture("mixed")
        .log_dir(dir.path())
        .unchecked(true)
        .output();

    assert_eq!(output.failed_count(), Some(1), "{output}");
    let stdout = output.stdout_as_str();
    assert!(stdout.contains("checking the broken adder"), "{output}");
    assert!(stdout.contains("Status: FAILED Failed: 1 Passed: 1"), "{output}");
    assert!(stdout.contains("Status: PASSED Failed: 0 Passed: 1"), "{output}");

    let text = read_log(dir.path(), "math", "txt").unwrap();
    assert!(text.contains("left: 4"), "text log:\n{text}");
    assert!(text.contains("TestFailed"), "text log:\n{text}");
}

#[test]
fn test_abort_executable() {
    let dir = Utf8TempDir::new().unwrap();
    let output = fixture("abort")
        .log_dir(dir.path())
        .unchecked(true)
        .output();

    assert_eq!(output.failed_count(), Some(1), "{output}");
    let stdout = output.stdout_as_str();
    assert!(
        stdout.contains("Status: FAILED-incomplete Failed: 1 Passed: 0 NotExecuted: 1"),
        "{output}"
    );
    assert!(
        stdout.contains("Status: FAILED-incomplete Failed: 0 Passed: 0 NotExecuted: 1"),
        "{output}"
    );
    // The skipped suite never opens its log files.
    assert!(read_log(dir.path(), "second", "txt").is_err());
}

#[test]
fn test_timeout() {
    let dir = Utf8TempDir::new().unwrap();
    let output = fixture("slow")
        .log_dir(dir.path())
        .unchecked(true)
        .output();

    assert_eq!(output.failed_count(), Some(1), "{output}");
    let text = read_log(dir.path(), "slow", "txt").unwrap();
    assert!(text.contains("TestFailed"), "text log:\n{text}");
}

#[test]
fn test_list_from_config_file() {
    let dir = Utf8TempDir::new().unwrap();
    let config = dir.path().join("harness.toml");
    std::fs::write(
        &config,
        indoc! {r#"
            [profile.list]
            run-mode = "list"
        "#},
    )
    .unwrap();

    let output = fixture("mixed")
        .log_dir(dir.path())
        .env("HARNESS_CONFIG", config.as_str())
        .env("HARNESS_PROFILE", "list")
        .output();

    assert_eq!(
        output.stdout_as_str(),
        indoc! {"
            (0) math.add
            (1) math.broken
            (2) strings.concat
        "}
    );
    assert!(read_log(dir.path(), "math", "txt").is_err(), "list mode writes no logs");
}

#[test]
fn test_unknown_profile() {
    let output = fixture("passing")
        .env("HARNESS_PROFILE", "nightly")
        .unchecked(true)
        .output();

    assert_eq!(
        output.exit_status.code(),
        Some(HarnessExitCode::CONFIGURATION_ERROR),
        "{output}"
    );
    assert!(
        output
            .stderr_as_str()
            .contains("profile `nightly` not found"),
        "{output}"
    );
}

#[test]
fn test_invalid_env_override() {
    let output = fixture("passing")
        .env("HARNESS_VERBOSITY", "loud")
        .unchecked(true)
        .output();

    assert_eq!(
        output.exit_status.code(),
        Some(HarnessExitCode::CONFIGURATION_ERROR),
        "{output}"
    );
    assert!(output.stderr_as_str().contains("HARNESS_VERBOSITY"), "{output}");
}
