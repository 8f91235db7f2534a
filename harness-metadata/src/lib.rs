// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Machine-readable types shared between the harness runner, isolated child processes and
//! external tooling.
//!
//! This crate deliberately has a small dependency footprint so that tools which only need to
//! interpret exit codes or listener frames do not have to pull in the full runner.

mod errors;
mod exit_codes;
mod listener;
mod status;
mod summary;

pub use errors::*;
pub use exit_codes::*;
pub use listener::*;
pub use status::*;
pub use summary::*;
