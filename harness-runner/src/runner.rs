// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runs a single test through its start-up, body and tear-down phases.
//!
//! Each phase runs on its own worker thread under the test's timeout; the calling thread only
//! waits. A phase that times out is abandoned, not killed. The outcome of every phase is folded
//! into a single [`TestStatus`], where the most severe outcome wins.

mod context;
mod phases;

pub use context::{Phase, TestContext};
pub(crate) use context::install_panic_hook;

use crate::{
    abort_policy::AbortPolicy,
    errors::HarnessError,
    isolation::IsolatedExecutor,
    logger::Logger,
    registry::{SuiteCallback, TestEntry},
    verbosity::Verbosity,
};
use harness_metadata::{Escalation, TestStatus};
use phases::{PhaseOutcome, run_phase};
use serde::Deserialize;
use std::{fmt, sync::Arc, time::Duration};
use tokio::runtime::Handle;
use tracing::debug;

/// What the harness does with the registered tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    /// Run the tests.
    #[default]
    Execute,
    /// Print `(index) suite.test` for every scheduled test.
    List,
    /// Print each scheduled test with its timeout and descriptions.
    Info,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Execute => write!(f, "execute"),
            RunMode::List => write!(f, "list"),
            RunMode::Info => write!(f, "info"),
        }
    }
}

/// The lifecycle of one test execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunnerState {
    /// Nothing has run yet.
    Idle,
    /// The start-up phase is running.
    StartingUp,
    /// The body is running.
    Running,
    /// The tear-down phase is running.
    TearingDown,
    /// A terminal status has been assigned.
    Done,
}

/// The result of running one test.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntryOutcome {
    /// The terminal status.
    pub status: TestStatus,
    /// How far an abort requested by the test propagates.
    pub escalation: Escalation,
    /// The number of failed assertions.
    pub asserts_failed: usize,
}

/// Executes tests and suite callbacks.
#[derive(Debug)]
pub struct TestRunner {
    logger: Arc<Logger>,
    policy: Arc<AbortPolicy>,
    handle: Handle,
    isolation: Option<IsolatedExecutor>,
}

impl TestRunner {
    /// Creates a runner that executes tests in this process.
    pub fn new(logger: Arc<Logger>, policy: Arc<AbortPolicy>, handle: Handle) -> Self {
        install_panic_hook();
        Self {
            logger,
            policy,
            handle,
            isolation: None,
        }
    }

    /// Executes every test in a child process instead.
    pub(crate) fn with_isolation(mut self, executor: IsolatedExecutor) -> Self {
        self.isolation = Some(executor);
        self
    }

    /// Returns true if tests are executed in child processes.
    pub fn is_isolated(&self) -> bool {
        self.isolation.is_some()
    }

    /// Runs one test with its started and finished records, and stores its status.
    ///
    /// An `Err` is a fatal harness error. The entry is marked
    /// [`ErrorGeneric`](TestStatus::ErrorGeneric) in that case.
    pub fn run_entry(
        &self,
        suite: &str,
        entry: &mut TestEntry,
    ) -> Result<EntryOutcome, HarnessError> {
        self.logger
            .report_test_started(entry.index(), entry.name(), entry.short_description())?;

        let result = match &self.isolation {
            Some(executor) => executor.execute(suite, entry),
            None => self.execute_phases(entry),
        };
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(error) => {
                entry.set_status(TestStatus::ErrorGeneric);
                return Err(error);
            }
        };

        entry.set_status(outcome.status);
        self.logger
            .report_test_finished(entry.index(), entry.name(), outcome.status)?;
        Ok(outcome)
    }

    /// Runs the phases of one test in this process, without started or finished records.
    pub fn execute_phases(&self, entry: &TestEntry) -> Result<EntryOutcome, HarnessError> {
        let cx = TestContext::new(
            Arc::clone(&self.logger),
            Arc::clone(&self.policy),
            entry.name(),
            Phase::StartUp,
        );
        let test = entry.test();
        let timeout = entry.timeout();
        let mut state = RunnerState::Idle;

        transition(&cx, &mut state, RunnerState::StartingUp);
        let start_up_cx = cx.for_phase(Phase::StartUp);
        let outcome = {
            let test = Arc::clone(&test);
            run_phase(&self.handle, &start_up_cx, timeout, move |cx| test.start_up(cx))
        };
        let start_up_status = match outcome {
            PhaseOutcome::Completed if start_up_cx.phase_asserts_failed() == 0 => None,
            PhaseOutcome::Completed | PhaseOutcome::Aborted(_) => Some(TestStatus::ErrorInTest),
            PhaseOutcome::Panicked(message) => {
                self.report_panic(&cx, Phase::StartUp, &message)?;
                Some(TestStatus::ErrorInTest)
            }
            PhaseOutcome::TimedOut => Some(TestStatus::TimeoutInTest),
            PhaseOutcome::SpawnFailed(error) => {
                debug!(test = %cx.name(), %error, "failed to spawn start-up thread");
                Some(TestStatus::InitThreadError)
            }
            PhaseOutcome::Fatal => return self.fatal(&cx),
        };
        if let Some(status) = start_up_status {
            transition(&cx, &mut state, RunnerState::Done);
            return Ok(self.finish(&cx, status));
        }

        transition(&cx, &mut state, RunnerState::Running);
        let test_cx = cx.for_phase(Phase::Test);
        let outcome = {
            let test = Arc::clone(&test);
            run_phase(&self.handle, &test_cx, timeout, move |cx| test.test(cx))
        };
        let mut status = match outcome {
            PhaseOutcome::Completed if test_cx.phase_asserts_failed() == 0 => TestStatus::Passed,
            PhaseOutcome::Completed | PhaseOutcome::Aborted(_) => TestStatus::Failed,
            PhaseOutcome::Panicked(message) => {
                self.report_panic(&cx, Phase::Test, &message)?;
                TestStatus::ErrorInTest
            }
            PhaseOutcome::TimedOut => TestStatus::TimeoutInTest,
            PhaseOutcome::SpawnFailed(error) => {
                debug!(test = %cx.name(), %error, "failed to spawn test thread");
                TestStatus::InitThreadError
            }
            PhaseOutcome::Fatal => return self.fatal(&cx),
        };

        transition(&cx, &mut state, RunnerState::TearingDown);
        let tear_down_cx = cx.for_phase(Phase::TearDown);
        let outcome = run_phase(&self.handle, &tear_down_cx, timeout, move |cx| test.tear_down(cx));
        let tear_down_status = match outcome {
            PhaseOutcome::Completed if tear_down_cx.phase_asserts_failed() == 0 => None,
            PhaseOutcome::Completed | PhaseOutcome::Aborted(_) => Some(TestStatus::ErrorInTeardown),
            PhaseOutcome::Panicked(message) => {
                self.report_panic(&cx, Phase::TearDown, &message)?;
                Some(TestStatus::ErrorInTeardown)
            }
            PhaseOutcome::TimedOut => Some(TestStatus::TimeoutInTeardown),
            PhaseOutcome::SpawnFailed(error) => {
                debug!(test = %cx.name(), %error, "failed to spawn tear-down thread");
                Some(TestStatus::TeardownThreadError)
            }
            PhaseOutcome::Fatal => return self.fatal(&cx),
        };
        if let Some(tear_down_status) = tear_down_status {
            status = status.merge(tear_down_status);
        }
        transition(&cx, &mut state, RunnerState::Done);

        Ok(self.finish(&cx, status))
    }

    /// Runs a suite start-up or tear-down callback. Returns true if it succeeded.
    pub fn run_suite_callback(
        &self,
        suite: &str,
        phase: Phase,
        callback: SuiteCallback,
        timeout: Duration,
    ) -> Result<bool, HarnessError> {
        let cx = TestContext::new(
            Arc::clone(&self.logger),
            Arc::clone(&self.policy),
            suite,
            phase,
        );
        let succeeded = match run_phase(&self.handle, &cx, timeout, move |cx| callback(cx)) {
            PhaseOutcome::Completed => cx.phase_asserts_failed() == 0,
            PhaseOutcome::Aborted(_) | PhaseOutcome::TimedOut | PhaseOutcome::SpawnFailed(_) => {
                false
            }
            PhaseOutcome::Panicked(message) => {
                self.report_panic(&cx, phase, &message)?;
                false
            }
            PhaseOutcome::Fatal => match cx.take_fatal() {
                Some(error) => return Err(error),
                None => false,
            },
        };
        if !succeeded {
            self.logger
                .print(Verbosity::Suite, &format!("suite `{suite}`: {phase} failed"))?;
        }
        Ok(succeeded)
    }

    /// Prints the list or info line for one entry. Does nothing in execute mode.
    pub fn describe_entry(&self, mode: RunMode, entry: &TestEntry) {
        if let Some(text) = describe_entry(mode, entry) {
            self.logger.write_console(&text);
        }
    }

    fn finish(&self, cx: &TestContext, mut status: TestStatus) -> EntryOutcome {
        if cx.helper_faulted() {
            status = status.merge(TestStatus::VectoredException);
        }
        EntryOutcome {
            status,
            escalation: cx.escalation(),
            asserts_failed: cx.asserts_failed(),
        }
    }

    fn report_panic(
        &self,
        cx: &TestContext,
        phase: Phase,
        message: &str,
    ) -> Result<(), HarnessError> {
        self.logger.print(
            Verbosity::Suite,
            &format!("{}: {phase} panicked: {message}", cx.name()),
        )
    }

    /// A fatal error skips the remaining phases, including tear-down.
    fn fatal(&self, cx: &TestContext) -> Result<EntryOutcome, HarnessError> {
        match cx.take_fatal() {
            Some(error) => Err(error),
            None => Ok(self.finish(cx, TestStatus::ErrorGeneric)),
        }
    }
}

fn transition(cx: &TestContext, state: &mut RunnerState, next: RunnerState) {
    debug!(test = %cx.name(), from = ?*state, to = ?next, "runner state");
    *state = next;
}

fn describe_entry(mode: RunMode, entry: &TestEntry) -> Option<String> {
    match mode {
        RunMode::Execute => None,
        RunMode::List => Some(format!("({}) {}\n", entry.index(), entry.name())),
        RunMode::Info => {
            let mut text = format!(
                "({}) [timeout: {} sec.] {}: {}\n",
                entry.index(),
                entry.timeout().as_secs(),
                entry.name(),
                entry.short_description(),
            );
            let long = entry.long_description();
            if !long.is_empty() && long != entry.short_description() {
                text.push_str("    ");
                text.push_str(long);
                text.push('\n');
            }
            Some(text)
        }
    }
}
