// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::runner::TestContext;

/// A registered test.
///
/// The runner calls [`start_up`](Self::start_up), [`test`](Self::test) and
/// [`tear_down`](Self::tear_down) in order, each on its own worker thread and under the test's
/// timeout. A failed start-up skips the body.
pub trait TestCase: Send + Sync + 'static {
    /// Prepares the test. Does nothing by default.
    fn start_up(&self, cx: &TestContext) {
        _ = cx;
    }

    /// The test body.
    fn test(&self, cx: &TestContext);

    /// Cleans up after the test. Runs even if the body failed. Does nothing by default.
    fn tear_down(&self, cx: &TestContext) {
        _ = cx;
    }

    /// A one-line description, shown when the test starts.
    fn short_description(&self) -> &str {
        ""
    }

    /// A longer description, shown in info mode.
    fn long_description(&self) -> &str {
        ""
    }
}

impl<F> TestCase for F
where
    F: Fn(&TestContext) + Send + Sync + 'static,
{
    fn test(&self, cx: &TestContext) {
        self(cx)
    }
}

/// A test phase written as a plain function.
pub type TestFn = fn(&TestContext);

/// A test assembled from independent functions.
#[derive(Clone, Debug)]
pub struct FnTestCase {
    test: TestFn,
    setup: Option<TestFn>,
    teardown: Option<TestFn>,
    short_description: String,
    long_description: String,
}

impl FnTestCase {
    /// Creates a test from its body.
    pub fn new(test: TestFn) -> Self {
        Self {
            test,
            setup: None,
            teardown: None,
            short_description: String::new(),
            long_description: String::new(),
        }
    }

    /// Sets the start-up function.
    pub fn with_setup(mut self, setup: TestFn) -> Self {
        self.setup = Some(setup);
        self
    }

    /// Sets the tear-down function.
    pub fn with_teardown(mut self, teardown: TestFn) -> Self {
        self.teardown = Some(teardown);
        self
    }

    /// Sets the descriptions.
    pub fn with_descriptions(
        mut self,
        short_description: impl Into<String>,
        long_description: impl Into<String>,
    ) -> Self {
        self.short_description = short_description.into();
        self.long_description = long_description.into();
        self
    }
}

impl TestCase for FnTestCase {
    fn start_up(&self, cx: &TestContext) {
        if let Some(setup) = self.setup {
            setup(cx);
        }
    }

    fn test(&self, cx: &TestContext) {
        (self.test)(cx)
    }

    fn tear_down(&self, cx: &TestContext) {
        if let Some(teardown) = self.teardown {
            teardown(cx);
        }
    }

    fn short_description(&self) -> &str {
        &self.short_description
    }

    fn long_description(&self) -> &str {
        &self.long_description
    }
}
