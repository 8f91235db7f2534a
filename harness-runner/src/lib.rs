// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Execution and reporting core for a suite-based test harness.
//!
//! A test executable registers its suites and tests in a [`TestRegistry`](registry::TestRegistry)
//! and hands it to [`TestControl`](control::TestControl), which runs every scheduled test through
//! the start-up, body and tear-down phases. Each phase runs under a timeout on its own thread.
//! Results go through the [`Logger`](logger::Logger) to the console, a text log and an XML log,
//! rendered by the [`FormatEngine`](format::FormatEngine).
//!
//! With isolation enabled, every test runs in a fresh copy of the executable and its records are
//! relayed back to the parent over the [listener](listener).
//!
//! ```no_run
//! use harness_runner::{
//!     control::TestControl, harness_assert_eq, registry::EntryOptions, runner::TestContext,
//! };
//!
//! fn addition(cx: &TestContext) {
//!     harness_assert_eq!(cx, 1 + 1, 2);
//! }
//!
//! fn main() {
//!     TestControl::main(|registry| {
//!         let suite = registry.create_suite("math");
//!         registry.add_entry(
//!             suite,
//!             "addition",
//!             addition as fn(&TestContext),
//!             EntryOptions::default(),
//!         );
//!     })
//! }
//! ```

pub mod abort_policy;
pub mod config;
pub mod control;
pub mod errors;
pub mod format;
pub mod isolation;
pub mod listener;
pub mod log_sink;
pub mod logger;
pub mod output;
pub mod registry;
pub mod runner;
mod time;
pub mod verbosity;
