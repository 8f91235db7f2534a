// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};
use std::fmt;

/// The status of a single registered test.
///
/// Every entry starts out as [`TestStatus::NotExecuted`] and is assigned exactly one terminal
/// status by the runner.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TestStatus {
    /// The test was declared but has not run (yet).
    #[default]
    NotExecuted,

    /// The test ran but its outcome could not be determined.
    Unknown,

    /// All phases completed without a failed assertion.
    Passed,

    /// At least one assertion failed.
    Failed,

    /// An unclassified error occurred.
    ErrorGeneric,

    /// The startup or body phase panicked unexpectedly.
    ErrorInTest,

    /// The teardown phase panicked or failed an assertion.
    ErrorInTeardown,

    /// A helper thread owned by the test faulted.
    VectoredException,

    /// The startup or body phase exceeded its timeout.
    TimeoutInTest,

    /// The worker thread for the startup or body phase could not be created.
    InitThreadError,

    /// The worker thread for the teardown phase could not be created.
    TeardownThreadError,

    /// The teardown phase exceeded its timeout.
    TimeoutInTeardown,

    /// The test's process terminated without reporting a status.
    FatalPanic,
}

impl TestStatus {
    /// All statuses, in declaration order.
    pub const ALL: &'static [TestStatus] = &[
        TestStatus::NotExecuted,
        TestStatus::Unknown,
        TestStatus::Passed,
        TestStatus::Failed,
        TestStatus::ErrorGeneric,
        TestStatus::ErrorInTest,
        TestStatus::ErrorInTeardown,
        TestStatus::VectoredException,
        TestStatus::TimeoutInTest,
        TestStatus::InitThreadError,
        TestStatus::TeardownThreadError,
        TestStatus::TimeoutInTeardown,
        TestStatus::FatalPanic,
    ];

    /// Returns the severity rank of this status. Larger is worse.
    pub fn severity(self) -> u8 {
        match self {
            TestStatus::NotExecuted | TestStatus::Unknown | TestStatus::Passed => 0,
            TestStatus::Failed => 1,
            TestStatus::ErrorInTeardown => 2,
            TestStatus::ErrorGeneric
            | TestStatus::ErrorInTest
            | TestStatus::InitThreadError
            | TestStatus::TeardownThreadError => 3,
            TestStatus::VectoredException => 4,
            TestStatus::TimeoutInTest | TestStatus::TimeoutInTeardown => 5,
            TestStatus::FatalPanic => 6,
        }
    }

    /// Combines a status recorded earlier with one observed later.
    ///
    /// The more severe status wins. On a tie the earlier status is kept, so the first failure of
    /// a given severity is the one reported.
    #[must_use]
    pub fn merge(self, later: TestStatus) -> TestStatus {
        if later.severity() > self.severity() {
            later
        } else {
            self
        }
    }

    /// Returns true if this status counts as a failure in summaries.
    pub fn is_failure(self) -> bool {
        self.severity() > 0
    }

    /// Returns true if this is a timeout in any phase.
    pub fn is_timeout(self) -> bool {
        matches!(
            self,
            TestStatus::TimeoutInTest | TestStatus::TimeoutInTeardown
        )
    }

    /// Returns the text shown for this status in test-finished records.
    pub fn description(self) -> &'static str {
        match self {
            TestStatus::NotExecuted => "Not executed",
            TestStatus::Unknown => "Unknown",
            TestStatus::Passed => "Passed",
            TestStatus::Failed => "Failed",
            TestStatus::ErrorGeneric => "ERROR (unclassified failure)",
            TestStatus::ErrorInTest => "ERROR (panic in setup or test)",
            TestStatus::ErrorInTeardown => "ERROR (failure in teardown)",
            TestStatus::VectoredException => "ERROR (fault in test-owned thread)",
            TestStatus::TimeoutInTest => "TIMEOUT (in setup or test)",
            TestStatus::InitThreadError => "ERROR (could not create test thread)",
            TestStatus::TeardownThreadError => "ERROR (could not create teardown thread)",
            TestStatus::TimeoutInTeardown => "TIMEOUT (in teardown)",
            TestStatus::FatalPanic => "ERROR (test process died without a status)",
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

#[cfg(feature = "proptest1")]
impl proptest::arbitrary::Arbitrary for TestStatus {
    type Parameters = ();
    type Strategy = proptest::strategy::BoxedStrategy<Self>;

    fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
        use proptest::strategy::Strategy;

        proptest::sample::select(Self::ALL).boxed()
    }
}

/// How far an abort requested inside a test propagates once the test has finished.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Escalation {
    /// Continue with the next test.
    #[default]
    None,

    /// Skip the remaining tests of the current suite.
    AbortSuite,

    /// Stop the whole run after reporting summaries.
    AbortExecutable,
}

impl Escalation {
    /// Returns the wider of two escalations.
    #[must_use]
    pub fn max(self, other: Escalation) -> Escalation {
        match (self, other) {
            (Escalation::AbortExecutable, _) | (_, Escalation::AbortExecutable) => {
                Escalation::AbortExecutable
            }
            (Escalation::AbortSuite, _) | (_, Escalation::AbortSuite) => Escalation::AbortSuite,
            _ => Escalation::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(
        TestStatus::Failed, TestStatus::ErrorInTeardown, TestStatus::ErrorInTeardown;
        "teardown error beats failure"
    )]
    #[test_case(
        TestStatus::ErrorInTest, TestStatus::ErrorInTeardown, TestStatus::ErrorInTest;
        "body error kept"
    )]
    #[test_case(
        TestStatus::TimeoutInTest, TestStatus::ErrorInTeardown, TestStatus::TimeoutInTest;
        "timeout kept"
    )]
    #[test_case(
        TestStatus::Failed, TestStatus::TimeoutInTeardown, TestStatus::TimeoutInTeardown;
        "teardown timeout overrides"
    )]
    #[test_case(
        TestStatus::ErrorInTest, TestStatus::TimeoutInTeardown, TestStatus::TimeoutInTeardown;
        "timeout overrides error"
    )]
    #[test_case(TestStatus::Passed, TestStatus::Failed, TestStatus::Failed; "failure after pass")]
    #[test_case(
        TestStatus::TimeoutInTest, TestStatus::TimeoutInTeardown, TestStatus::TimeoutInTest;
        "first timeout wins"
    )]
    fn merge(earlier: TestStatus, later: TestStatus, expected: TestStatus) {
        assert_eq!(earlier.merge(later), expected);
    }

    #[test]
    fn failure_classification() {
        let failures = TestStatus::ALL
            .iter()
            .filter(|status| status.is_failure())
            .count();
        assert_eq!(failures, 10);
        assert!(!TestStatus::Passed.is_failure());
        assert!(!TestStatus::NotExecuted.is_failure());
    }

    #[test]
    fn serde_names() {
        let json = serde_json::to_string(&TestStatus::TimeoutInTeardown).unwrap();
        assert_eq!(json, "\"timeout-in-teardown\"");
        let status: TestStatus = serde_json::from_str("\"vectored-exception\"").unwrap();
        assert_eq!(status, TestStatus::VectoredException);
    }

    #[test]
    fn escalation_max() {
        assert_eq!(
            Escalation::AbortSuite.max(Escalation::None),
            Escalation::AbortSuite
        );
        assert_eq!(
            Escalation::AbortSuite.max(Escalation::AbortExecutable),
            Escalation::AbortExecutable
        );
        assert_eq!(Escalation::None.max(Escalation::None), Escalation::None);
    }
}
