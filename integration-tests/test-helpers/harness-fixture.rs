// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A test executable with a few canned scenarios, selected by the first argument.

use harness_runner::{
    abort_policy::AbortPolicyKind,
    control::TestControl,
    harness_assert, harness_assert_eq,
    registry::{EntryOptions, TestRegistry},
    runner::TestContext,
    verbosity::Verbosity,
};
use std::time::Duration;

fn add(cx: &TestContext) {
    harness_assert_eq!(cx, 2 + 2, 4);
}

fn sub(cx: &TestContext) {
    harness_assert_eq!(cx, 5 - 3, 2);
}

fn broken(cx: &TestContext) {
    cx.print(Verbosity::Suite, "checking the broken adder");
    harness_assert_eq!(cx, 2 + 2, 5);
}

fn concat(cx: &TestContext) {
    harness_assert!(cx, ["a", "b"].concat() == "ab");
}

fn aborts_everything(cx: &TestContext) {
    cx.set_abort_policy(AbortPolicyKind::AbortExecutable);
    cx.fail("giving up on the whole run");
}

fn crashes(_cx: &TestContext) {
    std::process::abort();
}

fn sleeps(_cx: &TestContext) {
    std::thread::sleep(Duration::from_secs(3));
}

type TestList<'a> = &'a [(&'a str, fn(&TestContext))];

fn add_suite(registry: &mut TestRegistry, name: &str, tests: TestList<'_>) {
    let suite = registry.create_suite(name);
    for &(id, test) in tests {
        registry.add_entry(suite, id, test, EntryOptions::default());
    }
}

fn register(registry: &mut TestRegistry, scenario: &str) {
    match scenario {
        "passing" => add_suite(registry, "math", &[("add", add), ("sub", sub)]),
        "mixed" => {
            add_suite(registry, "math", &[("add", add), ("broken", broken)]);
            add_suite(registry, "strings", &[("concat", concat)]);
        }
        "abort" => {
            add_suite(registry, "first", &[("aborts", aborts_everything), ("add", add)]);
            add_suite(registry, "second", &[("concat", concat)]);
        }
        "crash" => add_suite(registry, "unstable", &[("crashes", crashes), ("add", add)]),
        "slow" => {
            let suite = registry.create_suite("slow");
            registry.add_entry(
                suite,
                "sleeps",
                sleeps as fn(&TestContext),
                EntryOptions::default().timeout(Duration::from_millis(200)),
            );
        }
        other => panic!("unknown scenario `{other}`"),
    }
}

fn main() {
    let scenario = std::env::args().nth(1).unwrap_or_else(|| "passing".to_owned());
    TestControl::main(|registry| register(registry, &scenario))
}
