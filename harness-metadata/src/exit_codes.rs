// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for harness executables.
///
/// Unknown/unexpected failures will always result in exit code 1.
pub enum HarnessExitCode {}

impl HarnessExitCode {
    /// No tests failed and the harness exited normally.
    pub const OK: i32 = 0;

    /// A configuration error was detected: a malformed template, a log file that could not be
    /// created, or a listener message that exceeded the mailbox capacity.
    pub const CONFIGURATION_ERROR: i32 = 1;

    /// Base exit code for a run in which one or more tests failed.
    ///
    /// The actual code is `TEST_RUN_FAILED_BASE + min(failed, 99)`, so a run with three failures
    /// exits with 103.
    pub const TEST_RUN_FAILED_BASE: i32 = 100;

    /// The largest number of failures reflected in the exit code.
    pub const MAX_REPORTED_FAILURES: usize = 99;

    /// Returns the exit code for a completed run with `failed` failing tests.
    pub fn for_failed_count(failed: usize) -> i32 {
        if failed == 0 {
            Self::OK
        } else {
            // The clamp keeps this below 256, so the cast cannot truncate.
            Self::TEST_RUN_FAILED_BASE + failed.min(Self::MAX_REPORTED_FAILURES) as i32
        }
    }

    /// Returns the number of failures encoded in `code`, if it is a test-failure exit code.
    pub fn failed_count(code: i32) -> Option<usize> {
        let max = Self::TEST_RUN_FAILED_BASE + Self::MAX_REPORTED_FAILURES as i32;
        if code > Self::TEST_RUN_FAILED_BASE && code <= max {
            Some((code - Self::TEST_RUN_FAILED_BASE) as usize)
        } else {
            None
        }
    }
}
