// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The abort policy: what happens when an assertion fails.
//!
//! The policy is a set of mutually exclusive outcome flags guarded by a single lock. Test code may
//! change it at any time, for example to tolerate failures in one section of a test, and restore
//! the configured default afterwards.

use debug_ignore::DebugIgnore;
use harness_metadata::Escalation;
use serde::Deserialize;
use std::{
    fmt,
    io::{self, BufRead, Write},
    str::FromStr,
    sync::{Mutex, MutexGuard, PoisonError},
};
use tracing::{debug, warn};

/// The policy applied to failed assertions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[cfg_attr(test, derive(test_strategy::Arbitrary))]
pub enum AbortPolicyKind {
    /// Record the failure and keep running the test.
    #[default]
    #[serde(rename = "continue")]
    ContinueTest,

    /// Trap into an attached debugger, then keep running the test.
    #[serde(rename = "debug")]
    TrapDebugger,

    /// Unwind the current test. Its teardown still runs.
    AbortTest,

    /// Unwind the current test and skip the rest of the suite.
    AbortSuite,

    /// Unwind the current test and stop the run after reporting summaries.
    AbortExecutable,

    /// Ask on the terminal what to do.
    AskUser,
}

impl AbortPolicyKind {
    /// All policy kinds.
    pub const ALL: [AbortPolicyKind; 6] = [
        AbortPolicyKind::ContinueTest,
        AbortPolicyKind::TrapDebugger,
        AbortPolicyKind::AbortTest,
        AbortPolicyKind::AbortSuite,
        AbortPolicyKind::AbortExecutable,
        AbortPolicyKind::AskUser,
    ];

    fn as_str(self) -> &'static str {
        match self {
            AbortPolicyKind::ContinueTest => "continue",
            AbortPolicyKind::TrapDebugger => "debug",
            AbortPolicyKind::AbortTest => "abort-test",
            AbortPolicyKind::AbortSuite => "abort-suite",
            AbortPolicyKind::AbortExecutable => "abort-executable",
            AbortPolicyKind::AskUser => "ask-user",
        }
    }
}

impl fmt::Display for AbortPolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AbortPolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| {
                format!(
                    "unrecognized abort policy: {s} (known values: continue, debug, abort-test, \
                     abort-suite, abort-executable, ask-user)"
                )
            })
    }
}

/// A snapshot of the policy flags.
///
/// Exactly one outcome flag is set, except under [`AbortPolicyKind::AskUser`], where none are set
/// until the user answers and `prompt` is set instead.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PolicyFlags {
    /// Keep running the test.
    pub continue_test: bool,
    /// Trap into the debugger, then keep running.
    pub trap_debugger: bool,
    /// Unwind the test.
    pub abort_test: bool,
    /// Unwind the test and skip the rest of the suite.
    pub abort_suite: bool,
    /// Unwind the test and stop the run.
    pub abort_executable: bool,
    /// Ask the user on every failure.
    pub prompt: bool,
}

impl PolicyFlags {
    fn for_kind(kind: AbortPolicyKind) -> Self {
        let mut flags = Self::default();
        match kind {
            AbortPolicyKind::ContinueTest => flags.continue_test = true,
            AbortPolicyKind::TrapDebugger => flags.trap_debugger = true,
            AbortPolicyKind::AbortTest => flags.abort_test = true,
            AbortPolicyKind::AbortSuite => flags.abort_suite = true,
            AbortPolicyKind::AbortExecutable => flags.abort_executable = true,
            AbortPolicyKind::AskUser => flags.prompt = true,
        }
        flags
    }

    /// Returns the number of outcome flags that are set.
    pub fn outcome_count(&self) -> usize {
        [
            self.continue_test,
            self.trap_debugger,
            self.abort_test,
            self.abort_suite,
            self.abort_executable,
        ]
        .into_iter()
        .filter(|flag| *flag)
        .count()
    }

    fn action(&self) -> FailureAction {
        if self.abort_executable {
            FailureAction::AbortExecutable
        } else if self.abort_suite {
            FailureAction::AbortSuite
        } else if self.abort_test {
            FailureAction::AbortTest
        } else {
            FailureAction::Continue
        }
    }
}

/// What the caller of [`AbortPolicy::notify_assertion_failed`] must do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureAction {
    /// Keep running the test.
    Continue,
    /// Unwind the test.
    AbortTest,
    /// Unwind the test and skip the rest of the suite.
    AbortSuite,
    /// Unwind the test and stop the run.
    AbortExecutable,
}

impl FailureAction {
    /// Returns true if the current test must unwind.
    pub fn aborts_test(self) -> bool {
        !matches!(self, FailureAction::Continue)
    }

    /// Returns how far the abort propagates after the test has finished.
    pub fn escalation(self) -> Escalation {
        match self {
            FailureAction::Continue | FailureAction::AbortTest => Escalation::None,
            FailureAction::AbortSuite => Escalation::AbortSuite,
            FailureAction::AbortExecutable => Escalation::AbortExecutable,
        }
    }
}

/// Traps into a debugger.
pub trait DebuggerTrap: Send + Sync {
    /// Traps. Returns once the debugger resumes the process.
    fn trap(&self);
}

/// Raises `SIGTRAP` on Unix. Without an attached debugger this terminates the process.
#[derive(Clone, Copy, Debug, Default)]
pub struct SignalTrap;

impl DebuggerTrap for SignalTrap {
    #[cfg(unix)]
    fn trap(&self) {
        debug!("raising SIGTRAP for the debugger");
        // SAFETY: raise has no preconditions.
        unsafe {
            libc::raise(libc::SIGTRAP);
        }
    }

    #[cfg(not(unix))]
    fn trap(&self) {
        warn!("trapping into a debugger is not supported on this platform, continuing");
    }
}

/// Asks the user how to handle a failed assertion.
pub trait Prompter: Send + Sync {
    /// Returns the user's choice. Never returns [`AbortPolicyKind::AskUser`].
    fn choose(&self) -> AbortPolicyKind;
}

/// Prompts on stderr and reads the answer from stdin.
#[derive(Clone, Copy, Debug, Default)]
pub struct TerminalPrompter;

impl TerminalPrompter {
    fn parse_choice(answer: &str) -> Option<AbortPolicyKind> {
        match answer.trim() {
            "c" => Some(AbortPolicyKind::ContinueTest),
            "d" => Some(AbortPolicyKind::TrapDebugger),
            "t" => Some(AbortPolicyKind::AbortTest),
            "s" => Some(AbortPolicyKind::AbortSuite),
            "e" => Some(AbortPolicyKind::AbortExecutable),
            _ => None,
        }
    }

    fn choose_from(&self, input: &mut impl BufRead, output: &mut impl Write) -> AbortPolicyKind {
        loop {
            // Prompt failures are not worth failing the run over.
            _ = write!(
                output,
                "assertion failed: [c]ontinue, [d]ebug, abort [t]est, abort [s]uite, \
                 abort [e]xecutable? "
            );
            _ = output.flush();

            let mut answer = String::new();
            match input.read_line(&mut answer) {
                Ok(0) | Err(_) => return AbortPolicyKind::ContinueTest,
                Ok(_) => {}
            }
            match Self::parse_choice(&answer) {
                Some(kind) => return kind,
                None => warn!("unrecognized answer `{}`, asking again", answer.trim()),
            }
        }
    }
}

impl Prompter for TerminalPrompter {
    fn choose(&self) -> AbortPolicyKind {
        self.choose_from(&mut io::stdin().lock(), &mut io::stderr())
    }
}

/// The abort policy. See the [module documentation](self).
#[derive(Debug)]
pub struct AbortPolicy {
    default: AbortPolicyKind,
    flags: Mutex<PolicyFlags>,
    debugger: DebugIgnore<Box<dyn DebuggerTrap>>,
    prompter: DebugIgnore<Box<dyn Prompter>>,
}

impl AbortPolicy {
    /// Creates a policy that starts as, and restores to, `default`.
    pub fn new(default: AbortPolicyKind) -> Self {
        Self::with_hooks(default, Box::new(SignalTrap), Box::new(TerminalPrompter))
    }

    /// Creates a policy with custom debugger and prompt hooks.
    pub fn with_hooks(
        default: AbortPolicyKind,
        debugger: Box<dyn DebuggerTrap>,
        prompter: Box<dyn Prompter>,
    ) -> Self {
        Self {
            default,
            flags: Mutex::new(PolicyFlags::for_kind(default)),
            debugger: DebugIgnore(debugger),
            prompter: DebugIgnore(prompter),
        }
    }

    /// Replaces the policy, clearing every other flag.
    pub fn set_policy(&self, kind: AbortPolicyKind) {
        debug!(policy = %kind, "abort policy changed");
        *self.lock() = PolicyFlags::for_kind(kind);
    }

    /// Restores the policy the harness was configured with.
    pub fn restore_default(&self) {
        self.set_policy(self.default);
    }

    /// Returns the policy the harness was configured with.
    pub fn default_policy(&self) -> AbortPolicyKind {
        self.default
    }

    /// Returns a snapshot of the flags.
    pub fn flags(&self) -> PolicyFlags {
        *self.lock()
    }

    /// Decides what happens after a failed assertion.
    ///
    /// Under [`AbortPolicyKind::AskUser`] this blocks on the prompt while holding the policy lock,
    /// so concurrent failures are asked about one at a time. The answer applies to this failure
    /// only; the next failure prompts again.
    pub fn notify_assertion_failed(&self) -> FailureAction {
        let flags = {
            let mut flags = self.lock();
            if flags.prompt {
                let choice = self.prompter.choose();
                *flags = PolicyFlags {
                    prompt: true,
                    ..PolicyFlags::for_kind(choice)
                };
            }
            *flags
        };

        if flags.trap_debugger {
            self.debugger.trap();
        }
        flags.action()
    }

    fn lock(&self) -> MutexGuard<'_, PolicyFlags> {
        self.flags.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        collections::VecDeque,
        io::Cursor,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
    };
    use test_case::test_case;
    use test_strategy::proptest;

    #[derive(Clone, Default)]
    struct CountingTrap(Arc<AtomicUsize>);

    impl DebuggerTrap for CountingTrap {
        fn trap(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct ScriptedPrompter(Mutex<VecDeque<AbortPolicyKind>>);

    impl Prompter for ScriptedPrompter {
        fn choose(&self) -> AbortPolicyKind {
            self.0
                .lock()
                .unwrap()
                .pop_front()
                .expect("prompted more often than scripted")
        }
    }

    fn policy(
        kind: AbortPolicyKind,
        answers: impl IntoIterator<Item = AbortPolicyKind>,
    ) -> (AbortPolicy, Arc<AtomicUsize>) {
        let trap = CountingTrap::default();
        let traps = trap.0.clone();
        let prompter = ScriptedPrompter(Mutex::new(answers.into_iter().collect()));
        (
            AbortPolicy::with_hooks(kind, Box::new(trap), Box::new(prompter)),
            traps,
        )
    }

    #[proptest]
    fn set_policy_is_exclusive(initial: AbortPolicyKind, next: AbortPolicyKind) {
        let (policy, _) = policy(initial, []);
        policy.set_policy(next);
        let flags = policy.flags();
        if next == AbortPolicyKind::AskUser {
            assert_eq!(flags.outcome_count(), 0);
            assert!(flags.prompt);
        } else {
            assert_eq!(flags.outcome_count(), 1);
            assert!(!flags.prompt);
        }
    }

    #[test_case(AbortPolicyKind::ContinueTest, FailureAction::Continue)]
    #[test_case(AbortPolicyKind::TrapDebugger, FailureAction::Continue)]
    #[test_case(AbortPolicyKind::AbortTest, FailureAction::AbortTest)]
    #[test_case(AbortPolicyKind::AbortSuite, FailureAction::AbortSuite)]
    #[test_case(AbortPolicyKind::AbortExecutable, FailureAction::AbortExecutable)]
    fn notify(kind: AbortPolicyKind, expected: FailureAction) {
        let (policy, traps) = policy(kind, []);
        assert_eq!(policy.notify_assertion_failed(), expected);
        let expected_traps = usize::from(kind == AbortPolicyKind::TrapDebugger);
        assert_eq!(traps.load(Ordering::SeqCst), expected_traps);
    }

    #[test]
    fn ask_user_prompts_every_failure() {
        let (policy, traps) = policy(
            AbortPolicyKind::AskUser,
            [
                AbortPolicyKind::ContinueTest,
                AbortPolicyKind::TrapDebugger,
                AbortPolicyKind::AbortSuite,
            ],
        );
        assert_eq!(policy.notify_assertion_failed(), FailureAction::Continue);
        assert_eq!(policy.notify_assertion_failed(), FailureAction::Continue);
        assert_eq!(traps.load(Ordering::SeqCst), 1);
        assert_eq!(policy.notify_assertion_failed(), FailureAction::AbortSuite);

        let flags = policy.flags();
        assert!(flags.prompt);
        assert!(flags.abort_suite);
    }

    #[test]
    fn restore_default() {
        let (policy, _) = policy(AbortPolicyKind::AbortTest, []);
        policy.set_policy(AbortPolicyKind::ContinueTest);
        assert_eq!(policy.notify_assertion_failed(), FailureAction::Continue);
        policy.restore_default();
        assert_eq!(policy.notify_assertion_failed(), FailureAction::AbortTest);
        assert_eq!(policy.default_policy(), AbortPolicyKind::AbortTest);
    }

    #[test]
    fn terminal_prompt_reasks_and_defaults_on_eof() {
        let mut output = Vec::new();
        let mut input = Cursor::new("x\n\ns\n");
        let kind = TerminalPrompter.choose_from(&mut input, &mut output);
        assert_eq!(kind, AbortPolicyKind::AbortSuite);
        let prompt = String::from_utf8(output).unwrap();
        assert_eq!(prompt.matches("assertion failed:").count(), 3);

        let mut input = Cursor::new("");
        let kind = TerminalPrompter.choose_from(&mut input, &mut Vec::new());
        assert_eq!(kind, AbortPolicyKind::ContinueTest);
    }

    #[test]
    fn names_round_trip() {
        for kind in AbortPolicyKind::ALL {
            assert_eq!(kind.to_string().parse::<AbortPolicyKind>(), Ok(kind));
        }
        assert!("abort".parse::<AbortPolicyKind>().is_err());
    }

    #[test]
    fn escalations() {
        assert!(!FailureAction::Continue.aborts_test());
        assert!(FailureAction::AbortTest.aborts_test());
        assert_eq!(FailureAction::AbortTest.escalation(), Escalation::None);
        assert_eq!(
            FailureAction::AbortExecutable.escalation(),
            Escalation::AbortExecutable
        );
    }
}
