// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};
use std::fmt;

/// The counts reported for a suite once it has finished.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SuiteStatusSummary {
    /// The suite name.
    pub name: String,

    /// The number of tests that passed.
    pub passed: usize,

    /// The number of tests that failed in any way.
    pub failed: usize,

    /// The number of tests that were declared but did not run.
    pub not_executed: usize,
}

impl SuiteStatusSummary {
    /// Returns the aggregate status of the suite.
    pub fn status(&self) -> SuiteStatus {
        SuiteStatus {
            passed: self.passed > 0 && self.failed == 0,
            incomplete: self.not_executed > 0,
        }
    }
}

/// The aggregate status of a suite: `PASSED` or `FAILED`, with `-incomplete` appended if any test
/// did not run.
///
/// A suite in which no test passed is reported as failed, even if nothing failed either.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SuiteStatus {
    /// True if at least one test passed and none failed.
    pub passed: bool,

    /// True if at least one test did not run.
    pub incomplete: bool,
}

impl fmt::Display for SuiteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.passed { "PASSED" } else { "FAILED" })?;
        if self.incomplete {
            f.write_str("-incomplete")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(1, 1, 0, "FAILED"; "one failure")]
    #[test_case(0, 1, 1, "FAILED-incomplete"; "aborted suite")]
    #[test_case(3, 0, 0, "PASSED"; "all passed")]
    #[test_case(2, 0, 1, "PASSED-incomplete"; "passed but incomplete")]
    #[test_case(0, 0, 0, "FAILED"; "nothing ran")]
    fn status_string(passed: usize, failed: usize, not_executed: usize, expected: &str) {
        let summary = SuiteStatusSummary {
            name: "suite".to_owned(),
            passed,
            failed,
            not_executed,
        };
        assert_eq!(summary.status().to_string(), expected);
    }
}
