// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Suite execution: the entry point of a test executable.
//!
//! [`TestControl`] owns the per-process [`HarnessContext`] and the [`TestRegistry`], and drives
//! every iteration of the run: suite start-up, each scheduled test, suite tear-down and the
//! summaries. It is also where fatal errors end up.

use crate::{
    abort_policy::AbortPolicy,
    config::{HarnessConfigBuilder, RunConfig},
    errors::{HarnessError, IsolationError, RuntimeBuildError},
    format::FormatEngine,
    isolation::{IsolatedChild, IsolatedExecutor},
    listener::{ListenerServer, Mailbox, MailboxSink},
    logger::{Iteration, Logger},
    output::init_tracing,
    registry::TestRegistry,
    runner::{Phase, RunMode, TestRunner},
};
use harness_metadata::{Escalation, HarnessExitCode, SuiteStatusSummary};
use std::{error::Error, sync::Arc, time::Duration};
use swrite::{SWrite, swrite};
use tokio::runtime::{Handle, Runtime};
use tracing::{debug, error};

/// How long dropping the context waits for runtime tasks, such as abandoned listener sessions.
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(250);

/// The per-process state of the harness.
#[derive(Debug)]
pub struct HarnessContext {
    config: RunConfig,
    engine: Arc<FormatEngine>,
    logger: Arc<Logger>,
    policy: Arc<AbortPolicy>,
    handle: Handle,
    runtime: Option<Runtime>,
}

impl HarnessContext {
    /// Compiles the templates and creates the logger, the abort policy and the runtime.
    pub fn new(config: RunConfig) -> Result<Self, HarnessError> {
        let engine = Arc::new(FormatEngine::with_overrides(&config.format_overrides)?);
        let logger = Arc::new(Logger::new(Arc::clone(&engine), config.logger_settings()));
        let policy = Arc::new(AbortPolicy::new(config.abort_policy));
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("harness-runtime-worker")
            .build()
            .map_err(RuntimeBuildError)?;

        Ok(Self {
            config,
            engine,
            logger,
            policy,
            handle: runtime.handle().clone(),
            runtime: Some(runtime),
        })
    }

    /// The resolved configuration.
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// The format engine.
    pub fn engine(&self) -> &Arc<FormatEngine> {
        &self.engine
    }

    /// The logger.
    pub fn logger(&self) -> &Arc<Logger> {
        &self.logger
    }

    /// The abort policy.
    pub fn policy(&self) -> &Arc<AbortPolicy> {
        &self.policy
    }

    /// A handle to the runtime that drives timeouts and isolated children.
    pub fn handle(&self) -> &Handle {
        &self.handle
    }
}

impl Drop for HarnessContext {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);
        }
    }
}

/// The outcome of a complete run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunOutcome {
    /// The number of iterations that ran.
    pub iterations: usize,
    /// One summary per suite per iteration, in run order.
    pub summaries: Vec<SuiteStatusSummary>,
    /// The widest escalation requested during the run.
    pub escalation: Escalation,
}

impl RunOutcome {
    /// The number of failed tests, over every iteration.
    pub fn failed_count(&self) -> usize {
        self.summaries.iter().map(|summary| summary.failed).sum()
    }

    /// The process exit code for this outcome.
    pub fn exit_code(&self) -> i32 {
        HarnessExitCode::for_failed_count(self.failed_count())
    }
}

/// Drives a run. See the [module documentation](self).
#[derive(Debug)]
pub struct TestControl {
    cx: HarnessContext,
    registry: TestRegistry,
    child: Option<IsolatedChild>,
}

impl TestControl {
    /// Creates a controller for a registry built from `config`.
    ///
    /// If this process was started as an isolated child, the console echo is turned off: the
    /// parent echoes the child's records.
    pub fn new(mut config: RunConfig, registry: TestRegistry) -> Result<Self, HarnessError> {
        let child = IsolatedChild::from_env()?;
        if child.is_some() {
            config.disable_console = true;
        }
        Ok(Self {
            cx: HarnessContext::new(config)?,
            registry,
            child,
        })
    }

    /// Resolves the configuration, registers the tests, runs them and exits the process.
    ///
    /// This is the usual `main` of a test executable.
    pub fn main(register: impl FnOnce(&mut TestRegistry)) -> ! {
        let config = match HarnessConfigBuilder::new().build() {
            Ok(config) => config,
            Err(error) => {
                init_tracing(Default::default());
                exit_with_error(&HarnessError::from(error))
            }
        };
        init_tracing(config.color);

        let mut registry = TestRegistry::new(config.selection.clone(), config.timeout);
        register(&mut registry);
        match Self::new(config, registry) {
            Ok(control) => control.run_and_exit(),
            Err(error) => exit_with_error(&error),
        }
    }

    /// The context.
    pub fn context(&self) -> &HarnessContext {
        &self.cx
    }

    /// The registry, with the statuses of the last iteration.
    pub fn registry(&self) -> &TestRegistry {
        &self.registry
    }

    /// Runs and exits with the exit code of the outcome, or 1 on a fatal error.
    pub fn run_and_exit(mut self) -> ! {
        let result = self.run();
        // Shut the listener and the runtime down before exiting.
        drop(self);
        match result {
            Ok(outcome) => std::process::exit(outcome.exit_code()),
            Err(error) => exit_with_error(&error),
        }
    }

    /// Runs every iteration of the configured run.
    ///
    /// Test failures are part of the outcome. An `Err` is a fatal configuration or infrastructure
    /// error; the run stops at the point it occurred.
    pub fn run(&mut self) -> Result<RunOutcome, HarnessError> {
        let runner = TestRunner::new(
            Arc::clone(&self.cx.logger),
            Arc::clone(&self.cx.policy),
            self.cx.handle.clone(),
        );

        if let Some(child) = &self.child {
            child.run(&runner, &self.registry, &self.cx.logger)?;
            return Ok(RunOutcome::default());
        }

        let mode = self.cx.config.run_mode;
        if mode != RunMode::Execute {
            for suite in self.registry.suites() {
                for entry in suite.entries() {
                    runner.describe_entry(mode, entry);
                }
            }
            return Ok(RunOutcome::default());
        }

        // Keeps the listener thread alive for the whole run.
        let mut _server = None;
        let runner = if self.cx.config.isolate {
            let server = ListenerServer::start(
                Mailbox::new(),
                Arc::clone(&self.cx.logger) as Arc<dyn MailboxSink>,
            )
            .map_err(IsolationError::ListenerStart)?;
            let executor =
                IsolatedExecutor::new(Arc::clone(server.mailbox()), self.cx.handle.clone())?;
            _server = Some(server);
            runner.with_isolation(executor)
        } else {
            runner
        };

        let scheduled: usize = self
            .registry
            .suites()
            .iter()
            .map(|suite| suite.entries().len())
            .sum();
        debug!(
            scheduled,
            declared = self.registry.declared_count(),
            "starting test run"
        );

        let total = self.cx.config.iterations.total();
        let mut outcome = RunOutcome::default();
        for current in 1.. {
            if total.is_some_and(|total| current > total) {
                break;
            }
            let (summaries, escalation) =
                self.run_iteration(&runner, Iteration { current, total })?;
            self.cx.logger.flush_run_summaries();

            let iteration_failed = summaries.iter().any(|summary| summary.failed > 0);
            outcome.iterations = current;
            outcome.summaries.extend(summaries);
            outcome.escalation = outcome.escalation.max(escalation);
            if escalation == Escalation::AbortExecutable {
                debug!(iteration = current, "run aborted");
                break;
            }
            if total.is_none() && (iteration_failed || escalation != Escalation::None) {
                debug!(iteration = current, "stopping repeated run after a failing iteration");
                break;
            }
        }
        Ok(outcome)
    }

    fn run_iteration(
        &mut self,
        runner: &TestRunner,
        iteration: Iteration,
    ) -> Result<(Vec<SuiteStatusSummary>, Escalation), HarnessError> {
        let logger = Arc::clone(&self.cx.logger);
        let default_timeout = self.registry.default_timeout();
        let mut summaries = Vec::new();
        let mut escalation = Escalation::None;

        for suite in self.registry.suites_mut() {
            suite.reset_statuses();
            if suite.entries().is_empty() {
                debug!(
                    suite = %suite.name(),
                    declared = suite.declared_count(),
                    "no scheduled tests, skipping suite"
                );
                continue;
            }
            let name = suite.name().to_owned();

            if escalation == Escalation::AbortExecutable {
                let tests = suite
                    .entries()
                    .iter()
                    .map(|entry| (entry.index(), entry.name().to_owned()));
                summaries.push(logger.report_suite_skipped(&name, tests));
                continue;
            }

            logger.report_suite_starting(&name, iteration)?;

            // Isolated children run the suite callbacks around their own test.
            let set_up = match suite.setup() {
                Some(setup) if !runner.is_isolated() => {
                    runner.run_suite_callback(&name, Phase::SuiteSetup, setup, default_timeout)?
                }
                _ => true,
            };

            let mut skip_rest = !set_up;
            for entry in suite.entries_mut() {
                if skip_rest {
                    logger.report_not_executed(entry.index(), entry.name());
                    continue;
                }
                let outcome = runner.run_entry(&name, entry)?;
                if outcome.escalation != Escalation::None {
                    debug!(
                        suite = %name,
                        test = %entry.name(),
                        escalation = ?outcome.escalation,
                        "skipping the rest of the suite",
                    );
                    skip_rest = true;
                    escalation = escalation.max(outcome.escalation);
                }
            }

            if set_up
                && !runner.is_isolated()
                && let Some(teardown) = suite.teardown()
            {
                runner.run_suite_callback(&name, Phase::SuiteTeardown, teardown, default_timeout)?;
            }

            summaries.push(logger.report_suite_finished()?);
        }

        Ok((summaries, escalation))
    }
}

fn exit_with_error(error: &HarnessError) -> ! {
    let mut message = error.to_string();
    let mut next_error = error.source();
    while let Some(err) = next_error {
        swrite!(message, "\nCaused by:\n  {err}");
        next_error = err.source();
    }
    error!("{message}");
    std::process::exit(HarnessExitCode::CONFIGURATION_ERROR)
}
