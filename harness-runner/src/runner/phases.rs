// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::context::{TestContext, Unwind};
use crate::abort_policy::FailureAction;
use std::{
    any::Any,
    io,
    panic::{self, AssertUnwindSafe},
    thread,
    time::Duration,
};
use tokio::{runtime::Handle, sync::oneshot};
use tracing::debug;

/// How a single phase ended.
#[derive(Debug)]
pub(crate) enum PhaseOutcome {
    /// The phase returned.
    Completed,
    /// The abort policy unwound the phase.
    Aborted(FailureAction),
    /// The phase panicked. Holds the panic message.
    Panicked(String),
    /// A fatal harness error was recorded in the context.
    Fatal,
    /// The phase did not finish in time. Its thread is left running.
    TimedOut,
    /// The worker thread could not be created.
    SpawnFailed(io::Error),
}

/// Runs `body` on a fresh worker thread and waits for it for at most `timeout`.
///
/// `cx` must be the context of the phase being run, as returned by
/// [`TestContext::for_phase`]. A phase that times out keeps running detached; whatever it does
/// afterwards is not waited for, and only counts against its own phase.
pub(crate) fn run_phase<F>(
    handle: &Handle,
    cx: &TestContext,
    timeout: Duration,
    body: F,
) -> PhaseOutcome
where
    F: FnOnce(&TestContext) + Send + 'static,
{
    let (sender, receiver) = oneshot::channel();
    let phase = cx.phase();
    let thread_cx = cx.clone();
    let spawned = thread::Builder::new()
        .name(format!("{}::{}", cx.name(), phase))
        .spawn(move || {
            let outcome = match panic::catch_unwind(AssertUnwindSafe(|| body(&thread_cx))) {
                Ok(()) => PhaseOutcome::Completed,
                Err(payload) => classify_panic(payload),
            };
            // The receiver is gone if the phase timed out.
            _ = sender.send(outcome);
        });
    if let Err(error) = spawned {
        return PhaseOutcome::SpawnFailed(error);
    }

    handle.block_on(async move {
        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => {
                PhaseOutcome::Panicked("worker thread exited without a result".to_owned())
            }
            Err(_) => {
                debug!(test = %cx.name(), %phase, ?timeout, "phase timed out");
                PhaseOutcome::TimedOut
            }
        }
    })
}

fn classify_panic(payload: Box<dyn Any + Send>) -> PhaseOutcome {
    match payload.downcast::<Unwind>() {
        Ok(unwind) => match *unwind {
            Unwind::Abort(action) => PhaseOutcome::Aborted(action),
            Unwind::Fatal => PhaseOutcome::Fatal,
        },
        Err(payload) => PhaseOutcome::Panicked(panic_message(&*payload)),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        abort_policy::{AbortPolicy, AbortPolicyKind},
        format::FormatEngine,
        logger::{Logger, LoggerSettings},
        runner::Phase,
        verbosity::LogType,
    };
    use std::sync::{Arc, Barrier};

    fn context(name: &str) -> TestContext {
        let settings = LoggerSettings {
            log_type: LogType::None,
            console: None,
            ..LoggerSettings::default()
        };
        let logger = Logger::new(Arc::new(FormatEngine::new().unwrap()), settings);
        TestContext::new(
            Arc::new(logger),
            Arc::new(AbortPolicy::new(AbortPolicyKind::ContinueTest)),
            name,
            Phase::StartUp,
        )
    }

    #[test]
    fn completed_and_timed_out() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let cx = context("phases.basic");

        let test_cx = cx.for_phase(Phase::Test);
        let outcome = run_phase(runtime.handle(), &test_cx, Duration::from_secs(5), |cx| {
            cx.fail("counted");
        });
        assert!(matches!(outcome, PhaseOutcome::Completed), "{outcome:?}");
        assert_eq!(test_cx.phase_asserts_failed(), 1);

        let tear_down_cx = cx.for_phase(Phase::TearDown);
        let outcome = run_phase(runtime.handle(), &tear_down_cx, Duration::from_millis(50), |_| {
            thread::sleep(Duration::from_secs(2))
        });
        assert!(matches!(outcome, PhaseOutcome::TimedOut), "{outcome:?}");
        assert_eq!(tear_down_cx.phase_asserts_failed(), 0);
        assert_eq!(cx.asserts_failed(), 1);
    }

    #[test]
    fn detached_phase_failures_stay_with_their_phase() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let cx = context("phases.late");
        let next_phase_started = Arc::new(Barrier::new(2));
        let failure_recorded = Arc::new(Barrier::new(2));

        let test_cx = cx.for_phase(Phase::Test);
        let outcome = {
            let next_phase_started = Arc::clone(&next_phase_started);
            let failure_recorded = Arc::clone(&failure_recorded);
            run_phase(runtime.handle(), &test_cx, Duration::from_millis(50), move |cx| {
                next_phase_started.wait();
                cx.fail("after the deadline");
                failure_recorded.wait();
            })
        };
        assert!(matches!(outcome, PhaseOutcome::TimedOut), "{outcome:?}");

        let tear_down_cx = cx.for_phase(Phase::TearDown);
        let outcome = run_phase(runtime.handle(), &tear_down_cx, Duration::from_secs(5), move |_| {
            next_phase_started.wait();
            failure_recorded.wait();
        });
        assert!(matches!(outcome, PhaseOutcome::Completed), "{outcome:?}");
        assert_eq!(tear_down_cx.phase_asserts_failed(), 0);
        assert_eq!(test_cx.phase_asserts_failed(), 1);
        assert_eq!(cx.asserts_failed(), 1);
    }

    #[test]
    fn panics_are_classified() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let cx = context("phases.panics").for_phase(Phase::Test);
        let outcome = run_phase(runtime.handle(), &cx, Duration::from_secs(5), |_| {
            panic!("plain panic")
        });
        assert!(
            matches!(&outcome, PhaseOutcome::Panicked(message) if message == "plain panic"),
            "{outcome:?}"
        );
    }
}
