// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixture;
use camino_tempfile::Utf8TempDir;
use integration_tests::harness_cli::read_log;
use pretty_assertions::assert_eq;

#[test]
fn test_isolated_records_are_relayed() {
    let dir = Utf8TempDir::new().unwrap();
    let output = fixture("mixed")
        .log_dir(dir.path())
        .env("HARNESS_ISOLATE", "1")
        .unchecked(true)
        .output();

    assert_eq!(output.failed_count(), Some(1), "{output}");
    let stdout = output.stdout_as_str();
    assert!(stdout.contains("checking the broken adder"), "{output}");
    assert!(stdout.contains("Status: FAILED Failed: 1 Passed: 1"), "{output}");

    // Only the parent writes log files; the child's assertion reaches them through the listener.
    let text = read_log(dir.path(), "math", "txt").unwrap();
    assert!(text.contains("left: 4"), "text log:\n{text}");
    assert!(text.contains("checking the broken adder"), "text log:\n{text}");
}

#[test]
fn test_isolated_crash_only_fails_one_test() {
    let dir = Utf8TempDir::new().unwrap();
    let output = fixture("crash")
        .log_dir(dir.path())
        .env("HARNESS_ISOLATE", "1")
        .unchecked(true)
        .output();

    assert_eq!(output.failed_count(), Some(1), "{output}");
    assert!(
        output
            .stdout_as_str()
            .contains("Status: FAILED Failed: 1 Passed: 1"),
        "{output}"
    );
    let text = read_log(dir.path(), "unstable", "txt").unwrap();
    assert!(text.contains("unstable.crashes"), "text log:\n{text}");
}

#[test]
fn test_isolated_abort_reaches_the_parent() {
    let dir = Utf8TempDir::new().unwrap();
    let output = fixture("abort")
        .log_dir(dir.path())
        .env("HARNESS_ISOLATE", "1")
        .unchecked(true)
        .output();

    assert_eq!(output.failed_count(), Some(1), "{output}");
    assert!(
        output
            .stdout_as_str()
            .contains("Status: FAILED-incomplete Failed: 0 Passed: 0 NotExecuted: 1"),
        "{output}"
    );
}
