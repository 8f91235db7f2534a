// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Isolated execution: every test runs in a fresh copy of the current executable.
//!
//! The parent binds a loopback listener per test and starts the child with
//! [`ISOLATED_TEST_ENV`] and [`LISTENER_ADDR_ENV`] set. The child registers the same tests, runs
//! the one it was asked for, and relays its log records and final status back through the
//! [listener bridge](crate::listener::BridgeClient). The parent stays the only writer of the log.

use crate::{
    errors::{HarnessError, IsolationError, MailboxError},
    listener::{BridgeClient, Mailbox, serve_session},
    logger::Logger,
    registry::{TestEntry, TestRegistry},
    runner::{EntryOutcome, Phase, TestRunner},
};
use harness_metadata::{
    Escalation, ISOLATED_TEST_ENV, IsolatedTestId, LISTENER_ADDR_ENV, TestStatus,
};
use std::{
    ffi::OsString,
    net::Ipv4Addr,
    path::PathBuf,
    process::Stdio,
    sync::Arc,
    time::Duration,
};
use tokio::{net::TcpListener, process::Command, runtime::Handle};
use tracing::{debug, warn};

/// How long the parent keeps draining a child's records after the child has exited.
const SESSION_GRACE: Duration = Duration::from_secs(1);

/// The longest a child may run: every phase at its full timeout, plus process overhead.
fn watchdog_timeout(phase_timeout: Duration) -> Duration {
    phase_timeout
        .saturating_mul(3)
        .saturating_add(Duration::from_secs(5))
}

/// Runs tests in child processes. Lives in the parent.
#[derive(Debug)]
pub(crate) struct IsolatedExecutor {
    program: PathBuf,
    args: Vec<OsString>,
    mailbox: Arc<Mailbox>,
    handle: Handle,
}

impl IsolatedExecutor {
    /// Creates an executor that re-runs the current executable with the current arguments.
    pub(crate) fn new(mailbox: Arc<Mailbox>, handle: Handle) -> Result<Self, IsolationError> {
        let program = std::env::current_exe().map_err(IsolationError::CurrentExe)?;
        Ok(Self {
            program,
            args: std::env::args_os().skip(1).collect(),
            mailbox,
            handle,
        })
    }

    pub(crate) fn execute(
        &self,
        suite: &str,
        entry: &TestEntry,
    ) -> Result<EntryOutcome, HarnessError> {
        let id = IsolatedTestId {
            suite: suite.to_owned(),
            index: entry.index(),
        };
        self.handle
            .block_on(self.execute_async(id, watchdog_timeout(entry.timeout())))
    }

    async fn execute_async(
        &self,
        id: IsolatedTestId,
        watchdog: Duration,
    ) -> Result<EntryOutcome, HarnessError> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
            .await
            .map_err(IsolationError::Bind)?;
        let addr = listener.local_addr().map_err(IsolationError::Bind)?;

        // A report left over from an earlier child must not be attributed to this one.
        _ = self.mailbox.take_report();
        let mut session = tokio::spawn(serve_session(listener, Arc::clone(&self.mailbox)));

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .env(ISOLATED_TEST_ENV, id.to_string())
            .env(LISTENER_ADDR_ENV, addr.to_string())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|error| IsolationError::Spawn {
                id: id.to_string(),
                error,
            })?;
        debug!(%id, pid = ?child.id(), %addr, "started isolated test");

        let timed_out = match tokio::time::timeout(watchdog, child.wait()).await {
            Ok(Ok(status)) => {
                debug!(%id, %status, "isolated test exited");
                false
            }
            Ok(Err(error)) => {
                warn!(%id, %error, "failed to wait for isolated test");
                false
            }
            Err(_) => {
                warn!(%id, ?watchdog, "isolated test did not finish in time, killing it");
                if let Err(error) = child.kill().await {
                    warn!(%id, %error, "failed to kill isolated test");
                }
                true
            }
        };

        let result = match tokio::time::timeout(SESSION_GRACE, &mut session).await {
            Ok(Ok(result)) => result,
            Ok(Err(error)) => {
                warn!(%id, %error, "listener session task failed");
                Default::default()
            }
            Err(_) => {
                session.abort();
                Default::default()
            }
        };
        debug!(%id, frames = result.frames, "listener session finished");
        if let Some(error) = result.error {
            if is_fatal(&error) {
                return Err(error.into());
            }
            warn!(%id, %error, "isolated test connection failed");
        }

        let report = self.mailbox.take_report();
        let outcome = match (timed_out, report) {
            (true, report) => EntryOutcome {
                status: TestStatus::TimeoutInTest,
                escalation: Escalation::None,
                asserts_failed: report.map_or(0, |report| report.asserts_failed),
            },
            (false, Some(report)) => EntryOutcome {
                status: report.status,
                escalation: report.escalation,
                asserts_failed: report.asserts_failed,
            },
            (false, None) => EntryOutcome {
                status: TestStatus::FatalPanic,
                escalation: Escalation::None,
                asserts_failed: 0,
            },
        };
        Ok(outcome)
    }
}

/// Errors on the parent's side of the mailbox end the run. A child that hangs up mid-frame only
/// loses its own test.
fn is_fatal(error: &MailboxError) -> bool {
    !matches!(error, MailboxError::Bridge(_) | MailboxError::Disconnected)
}

/// The test this process was started to run, read from the environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IsolatedChild {
    /// The test to run.
    pub id: IsolatedTestId,
    /// The parent's listener address.
    pub addr: String,
}

impl IsolatedChild {
    /// Returns `Some` if this process is an isolated child.
    pub fn from_env() -> Result<Option<Self>, IsolationError> {
        let Ok(id) = std::env::var(ISOLATED_TEST_ENV) else {
            return Ok(None);
        };
        Self::from_vars(&id, std::env::var(LISTENER_ADDR_ENV).ok()).map(Some)
    }

    fn from_vars(id: &str, addr: Option<String>) -> Result<Self, IsolationError> {
        let id = id.parse()?;
        let addr = addr
            .filter(|addr| !addr.is_empty())
            .ok_or_else(|| IsolationError::InvalidAddr {
                addr: String::new(),
            })?;
        Ok(Self { id, addr })
    }

    /// Runs the test and sends its outcome to the parent.
    ///
    /// The suite's start-up and tear-down callbacks run around the test, in this process. If
    /// start-up fails the test is reported as not executed.
    pub(crate) fn run(
        &self,
        runner: &TestRunner,
        registry: &TestRegistry,
        logger: &Logger,
    ) -> Result<(), HarnessError> {
        let not_found = || IsolationError::TestNotFound {
            id: self.id.to_string(),
        };
        let suite = registry
            .suite_by_name(&self.id.suite)
            .ok_or_else(not_found)?;
        let entry = suite.entry_by_index(self.id.index).ok_or_else(not_found)?;

        let client = Arc::new(BridgeClient::connect(&self.addr)?);
        logger.set_relay(client.clone());
        debug!(id = %self.id, "running isolated test");

        let set_up = match suite.setup() {
            Some(setup) => runner.run_suite_callback(
                suite.name(),
                Phase::SuiteSetup,
                setup,
                registry.default_timeout(),
            )?,
            None => true,
        };
        let outcome = if set_up {
            runner.execute_phases(entry)?
        } else {
            EntryOutcome {
                status: TestStatus::NotExecuted,
                escalation: Escalation::None,
                asserts_failed: 0,
            }
        };
        if let Some(teardown) = suite.teardown() {
            runner.run_suite_callback(
                suite.name(),
                Phase::SuiteTeardown,
                teardown,
                registry.default_timeout(),
            )?;
        }

        client.report(&outcome)?;
        Ok(())
    }
}
