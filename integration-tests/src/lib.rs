// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Helpers for running the `harness-fixture` binary from integration tests.

pub mod harness_cli;
