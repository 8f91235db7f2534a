// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    abort_policy::{AbortPolicy, AbortPolicyKind, FailureAction},
    errors::HarnessError,
    logger::{AssertionRecord, Logger},
    verbosity::Verbosity,
};
use harness_metadata::Escalation;
use std::{
    fmt, io,
    panic::{self, AssertUnwindSafe, Location},
    sync::{
        Arc, Mutex, Once, PoisonError,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread::{self, JoinHandle},
};
use tracing::debug;

/// The phase of a test or suite that code is running in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// [`TestCase::start_up`](crate::registry::TestCase::start_up).
    StartUp,
    /// [`TestCase::test`](crate::registry::TestCase::test).
    Test,
    /// [`TestCase::tear_down`](crate::registry::TestCase::tear_down).
    TearDown,
    /// The suite start-up callback.
    SuiteSetup,
    /// The suite tear-down callback.
    SuiteTeardown,
}

impl Phase {
    fn as_str(self) -> &'static str {
        match self {
            Phase::StartUp => "start_up",
            Phase::Test => "test",
            Phase::TearDown => "tear_down",
            Phase::SuiteSetup => "suite_setup",
            Phase::SuiteTeardown => "suite_teardown",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Panic payload used to unwind a phase. Never shown to the user.
#[derive(Debug)]
pub(crate) enum Unwind {
    /// The abort policy asked for the test to stop.
    Abort(FailureAction),
    /// A fatal harness error was recorded in the context.
    Fatal,
}

static INSTALL_PANIC_HOOK: Once = Once::new();

/// Wraps the current panic hook so that [`Unwind`] payloads are not printed.
pub(crate) fn install_panic_hook() {
    INSTALL_PANIC_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if info.payload().downcast_ref::<Unwind>().is_none() {
                previous(info);
            }
        }));
    });
}

#[derive(Debug)]
struct ContextInner {
    logger: Arc<Logger>,
    policy: Arc<AbortPolicy>,
    name: String,
    asserts_failed: AtomicUsize,
    escalation: Mutex<Escalation>,
    fatal: Mutex<Option<HarnessError>>,
    helper_faulted: AtomicBool,
}

/// The handle test code uses to report failures and output.
///
/// A context is shared by every phase of one test. Cloning it is cheap. Each phase also counts
/// its own failed assertions, so a timed-out phase that fails later is not blamed on the next one.
#[derive(Clone, Debug)]
pub struct TestContext {
    inner: Arc<ContextInner>,
    phase: Phase,
    phase_asserts: Arc<AtomicUsize>,
}

impl TestContext {
    pub(crate) fn new(
        logger: Arc<Logger>,
        policy: Arc<AbortPolicy>,
        name: impl Into<String>,
        phase: Phase,
    ) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                logger,
                policy,
                name: name.into(),
                asserts_failed: AtomicUsize::new(0),
                escalation: Mutex::new(Escalation::None),
                fatal: Mutex::new(None),
                helper_faulted: AtomicBool::new(false),
            }),
            phase,
            phase_asserts: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A context for `phase` of the same test, with a fresh per-phase assertion count.
    pub(crate) fn for_phase(&self, phase: Phase) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            phase,
            phase_asserts: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// The qualified name of the test, or the suite name in suite callbacks.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The phase this context was handed to.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Records a failed assertion.
    ///
    /// Depending on the abort policy this may not return: the current phase is unwound instead.
    #[track_caller]
    pub fn fail(&self, message: impl Into<String>) {
        self.record_failure(Location::caller(), message.into());
    }

    /// Records a failed assertion if `condition` is false. Returns `condition`.
    #[track_caller]
    pub fn check(&self, condition: bool, message: impl Into<String>) -> bool {
        if !condition {
            self.record_failure(Location::caller(), message.into());
        }
        condition
    }

    /// Writes a free-form record at `level`.
    pub fn print(&self, level: Verbosity, message: impl AsRef<str>) {
        if let Err(error) = self.inner.logger.print(level, message.as_ref()) {
            self.raise_fatal(error);
        }
    }

    /// Writes a trace record.
    pub fn trace(&self, message: impl AsRef<str>) {
        if let Err(error) = self.inner.logger.trace(message.as_ref()) {
            self.raise_fatal(error);
        }
    }

    /// Changes the abort policy for the rest of the run, or until restored.
    pub fn set_abort_policy(&self, kind: AbortPolicyKind) {
        self.inner.policy.set_policy(kind);
    }

    /// Restores the configured abort policy.
    pub fn restore_abort_policy(&self) {
        self.inner.policy.restore_default();
    }

    /// The number of assertions that failed so far in this test.
    pub fn asserts_failed(&self) -> usize {
        self.inner.asserts_failed.load(Ordering::SeqCst)
    }

    pub(crate) fn phase_asserts_failed(&self) -> usize {
        self.phase_asserts.load(Ordering::SeqCst)
    }

    /// Spawns a helper thread owned by the test.
    ///
    /// If the helper panics the test is reported with a
    /// [`VectoredException`](harness_metadata::TestStatus::VectoredException) status.
    pub fn spawn_helper<F>(&self, name: impl Into<String>, f: F) -> io::Result<JoinHandle<()>>
    where
        F: FnOnce(&TestContext) + Send + 'static,
    {
        let cx = self.clone();
        thread::Builder::new().name(name.into()).spawn(move || {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| f(&cx))) {
                if !matches!(payload.downcast_ref::<Unwind>(), Some(Unwind::Fatal)) {
                    debug!(test = %cx.name(), "helper thread faulted");
                    cx.inner.helper_faulted.store(true, Ordering::SeqCst);
                }
            }
        })
    }

    pub(crate) fn escalation(&self) -> Escalation {
        *self
            .inner
            .escalation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn helper_faulted(&self) -> bool {
        self.inner.helper_faulted.load(Ordering::SeqCst)
    }

    pub(crate) fn take_fatal(&self) -> Option<HarnessError> {
        self.inner
            .fatal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub(crate) fn logger(&self) -> &Arc<Logger> {
        &self.inner.logger
    }

    fn record_failure(&self, location: &Location<'_>, message: String) {
        self.inner.asserts_failed.fetch_add(1, Ordering::SeqCst);
        self.phase_asserts.fetch_add(1, Ordering::SeqCst);
        let record = AssertionRecord {
            file: location.file().to_owned(),
            line: location.line(),
            func: format!("{}::{}", self.inner.name, self.phase),
            thread: thread::current()
                .name()
                .unwrap_or("<unnamed>")
                .to_owned(),
            message,
        };
        if let Err(error) = self.inner.logger.log_assertion_failure(&record) {
            self.raise_fatal(error);
        }

        let action = self.inner.policy.notify_assertion_failed();
        if action.aborts_test() {
            {
                let mut escalation = self
                    .inner
                    .escalation
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                *escalation = escalation.max(action.escalation());
            }
            panic::panic_any(Unwind::Abort(action));
        }
    }

    fn raise_fatal(&self, error: HarnessError) -> ! {
        self.inner
            .fatal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_or_insert(error);
        panic::panic_any(Unwind::Fatal);
    }
}

/// Asserts that a condition holds, recording a failed assertion otherwise.
///
/// Evaluates to the condition. An optional format string replaces the default message.
#[macro_export]
macro_rules! harness_assert {
    ($cx:expr, $cond:expr $(,)?) => {{
        let cond: bool = $cond;
        if !cond {
            $cx.fail(concat!("assertion failed: ", stringify!($cond)));
        }
        cond
    }};
    ($cx:expr, $cond:expr, $($arg:tt)+) => {{
        let cond: bool = $cond;
        if !cond {
            $cx.fail(format!($($arg)+));
        }
        cond
    }};
}

/// Asserts that two expressions are equal, recording a failed assertion otherwise.
///
/// Evaluates to true if they are equal.
#[macro_export]
macro_rules! harness_assert_eq {
    ($cx:expr, $left:expr, $right:expr $(,)?) => {
        match (&$left, &$right) {
            (left, right) => {
                if *left == *right {
                    true
                } else {
                    $cx.fail(format!(
                        "assertion `left == right` failed\n  left: {:?}\n right: {:?}",
                        left, right
                    ));
                    false
                }
            }
        }
    };
}
