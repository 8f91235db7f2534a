// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Suites and the tests registered into them.
//!
//! The main structure in this module is [`TestRegistry`].

mod selection;
mod test_case;

pub use selection::*;
pub use test_case::*;

use crate::runner::TestContext;
use debug_ignore::DebugIgnore;
use harness_metadata::TestStatus;
use std::{sync::Arc, time::Duration};
use tracing::debug;

/// A suite-level start-up or tear-down callback.
pub type SuiteCallback = Arc<dyn Fn(&TestContext) + Send + Sync>;

/// Options for [`TestRegistry::add_entry`].
#[derive(Clone, Debug, Default)]
pub struct EntryOptions {
    /// The timeout for each phase of the test. Defaults to the configured timeout.
    pub timeout: Option<Duration>,
    /// Overrides the test's short description.
    pub short_description: Option<String>,
    /// Overrides the test's long description.
    pub long_description: Option<String>,
}

impl EntryOptions {
    /// Sets the timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets both descriptions.
    pub fn descriptions(mut self, short: impl Into<String>, long: impl Into<String>) -> Self {
        self.short_description = Some(short.into());
        self.long_description = Some(long.into());
        self
    }
}

/// One registered test.
#[derive(Debug)]
pub struct TestEntry {
    id: String,
    name: String,
    index: usize,
    timeout: Duration,
    test: DebugIgnore<Arc<dyn TestCase>>,
    short_description: String,
    long_description: String,
    status: TestStatus,
}

impl TestEntry {
    /// The identifier the test was registered with.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The qualified name, `suite.id`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The registration index.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The timeout applied to each phase.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The test object.
    pub fn test(&self) -> Arc<dyn TestCase> {
        Arc::clone(&self.test)
    }

    /// The short description.
    pub fn short_description(&self) -> &str {
        &self.short_description
    }

    /// The long description.
    pub fn long_description(&self) -> &str {
        &self.long_description
    }

    /// The current status.
    pub fn status(&self) -> TestStatus {
        self.status
    }

    pub(crate) fn set_status(&mut self, status: TestStatus) {
        self.status = status;
    }
}

/// An ordered collection of tests. Registration order is execution order.
#[derive(Debug)]
pub struct TestSuite {
    name: String,
    entries: Vec<TestEntry>,
    declared: usize,
    setup: Option<DebugIgnore<SuiteCallback>>,
    teardown: Option<DebugIgnore<SuiteCallback>>,
}

impl TestSuite {
    /// The suite name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The scheduled tests, in execution order.
    pub fn entries(&self) -> &[TestEntry] {
        &self.entries
    }

    pub(crate) fn entries_mut(&mut self) -> &mut [TestEntry] {
        &mut self.entries
    }

    /// The number of tests registered into this suite, including those that were not scheduled.
    pub fn declared_count(&self) -> usize {
        self.declared
    }

    /// Returns the scheduled test with registration index `index`.
    pub fn entry_by_index(&self, index: usize) -> Option<&TestEntry> {
        self.entries.iter().find(|entry| entry.index == index)
    }

    pub(crate) fn setup(&self) -> Option<SuiteCallback> {
        self.setup.as_deref().cloned()
    }

    pub(crate) fn teardown(&self) -> Option<SuiteCallback> {
        self.teardown.as_deref().cloned()
    }

    pub(crate) fn reset_statuses(&mut self) {
        for entry in &mut self.entries {
            entry.status = TestStatus::NotExecuted;
        }
    }
}

/// A handle to a suite in a [`TestRegistry`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SuiteId(usize);

/// Every suite of the process, in creation order.
#[derive(Debug)]
pub struct TestRegistry {
    suites: Vec<TestSuite>,
    selection: RunSelection,
    default_timeout: Duration,
    next_index: usize,
}

impl TestRegistry {
    /// Creates an empty registry.
    pub fn new(selection: RunSelection, default_timeout: Duration) -> Self {
        Self {
            suites: Vec::new(),
            selection,
            default_timeout,
            next_index: 0,
        }
    }

    /// Creates a suite without callbacks.
    pub fn create_suite(&mut self, name: impl Into<String>) -> SuiteId {
        self.create_suite_with(name, None, None)
    }

    /// Creates a suite with optional start-up and tear-down callbacks.
    pub fn create_suite_with(
        &mut self,
        name: impl Into<String>,
        setup: Option<SuiteCallback>,
        teardown: Option<SuiteCallback>,
    ) -> SuiteId {
        let name = name.into();
        debug!(suite = %name, "created suite");
        self.suites.push(TestSuite {
            name,
            entries: Vec::new(),
            declared: 0,
            setup: setup.map(DebugIgnore),
            teardown: teardown.map(DebugIgnore),
        });
        SuiteId(self.suites.len() - 1)
    }

    /// Registers a test and returns its index.
    ///
    /// The index is assigned whether or not the run selection schedules the test.
    pub fn add_entry(
        &mut self,
        suite: SuiteId,
        id: impl Into<String>,
        test: impl TestCase,
        options: EntryOptions,
    ) -> usize {
        let index = self.next_index;
        self.next_index += 1;

        let suite = &mut self.suites[suite.0];
        suite.declared += 1;
        let id = id.into();
        if !self.selection.includes(&suite.name, &id, index) {
            debug!(suite = %suite.name, test = %id, index, "test not selected");
            return index;
        }

        let EntryOptions {
            timeout,
            short_description,
            long_description,
        } = options;
        let short_description =
            short_description.unwrap_or_else(|| test.short_description().to_owned());
        let long_description =
            long_description.unwrap_or_else(|| test.long_description().to_owned());
        let test: Arc<dyn TestCase> = Arc::new(test);
        suite.entries.push(TestEntry {
            name: format!("{}.{}", suite.name, id),
            id,
            index,
            timeout: timeout.unwrap_or(self.default_timeout),
            test: DebugIgnore(test),
            short_description,
            long_description,
            status: TestStatus::NotExecuted,
        });
        index
    }

    /// The suites, in creation order.
    pub fn suites(&self) -> &[TestSuite] {
        &self.suites
    }

    pub(crate) fn suites_mut(&mut self) -> &mut [TestSuite] {
        &mut self.suites
    }

    /// Returns the suite behind a handle.
    pub fn suite(&self, id: SuiteId) -> &TestSuite {
        &self.suites[id.0]
    }

    /// Finds a suite by name.
    pub fn suite_by_name(&self, name: &str) -> Option<&TestSuite> {
        self.suites.iter().find(|suite| suite.name == name)
    }

    /// The total number of tests registered, scheduled or not.
    pub fn declared_count(&self) -> usize {
        self.next_index
    }

    /// The default per-phase timeout.
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn noop(_: &TestContext) {}

    #[test]
    fn entries_start_not_executed() {
        let mut registry = TestRegistry::new(RunSelection::all(), Duration::from_secs(5));
        let suite = registry.create_suite("math");
        registry.add_entry(
            suite,
            "add",
            FnTestCase::new(noop).with_descriptions("adds", "adds two numbers"),
            EntryOptions::default(),
        );
        registry.add_entry(
            suite,
            "sub",
            noop as TestFn,
            EntryOptions::default()
                .timeout(Duration::from_secs(1))
                .descriptions("subtracts", ""),
        );

        let suite = registry.suite(suite);
        assert_eq!(suite.entries().len(), 2);
        let add = &suite.entries()[0];
        assert_eq!(add.name(), "math.add");
        assert_eq!(add.status(), TestStatus::NotExecuted);
        assert_eq!(add.timeout(), Duration::from_secs(5));
        assert_eq!(add.short_description(), "adds");
        assert_eq!(add.long_description(), "adds two numbers");
        let sub = &suite.entries()[1];
        assert_eq!(sub.timeout(), Duration::from_secs(1));
        assert_eq!(sub.short_description(), "subtracts");
    }

    #[test]
    fn unselected_tests_keep_their_index() {
        let selection = RunSelection::all().with_range(IndexRange { start: 1, end: 2 });
        let mut registry = TestRegistry::new(selection, Duration::from_secs(5));
        let first = registry.create_suite("first");
        let second = registry.create_suite("second");
        for (suite, id) in [(first, "a"), (first, "b"), (second, "c"), (second, "d")] {
            registry.add_entry(suite, id, noop as TestFn, EntryOptions::default());
        }

        let indices = |id| {
            registry
                .suite(id)
                .entries()
                .iter()
                .map(|entry| entry.index())
                .collect::<Vec<_>>()
        };
        assert_eq!(indices(first), vec![1]);
        assert_eq!(indices(second), vec![2]);
        assert_eq!(registry.suite(first).declared_count(), 2);
        assert_eq!(registry.declared_count(), 4);
        assert!(registry.suite(second).entry_by_index(2).is_some());
        assert!(registry.suite(second).entry_by_index(3).is_none());
    }

    proptest! {
        #[test]
        fn indices_unique_and_increasing(
            suite_sizes in prop::collection::vec(0usize..6, 1..5),
            range_start in 0usize..10,
            range_len in 0usize..10,
        ) {
            let selection = RunSelection::all().with_range(IndexRange {
                start: range_start,
                end: range_start + range_len,
            });
            let mut registry = TestRegistry::new(selection, Duration::from_secs(1));
            let mut assigned = Vec::new();
            for (n, size) in suite_sizes.iter().enumerate() {
                let suite = registry.create_suite(format!("suite{n}"));
                for i in 0..*size {
                    assigned.push(registry.add_entry(
                        suite,
                        format!("t{i}"),
                        noop as TestFn,
                        EntryOptions::default(),
                    ));
                }
            }

            let expected: Vec<usize> = (0..suite_sizes.iter().sum()).collect();
            prop_assert_eq!(&assigned, &expected);
            for suite in registry.suites() {
                for entry in suite.entries() {
                    prop_assert_eq!(entry.status(), TestStatus::NotExecuted);
                    prop_assert!((range_start..=range_start + range_len).contains(&entry.index()));
                }
            }
        }
    }
}
