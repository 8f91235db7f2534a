// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The test listener: funnels records from isolated tests into the parent's log.
//!
//! A [`Mailbox`] holds at most one message. Producers post into it and block until a single
//! [`ListenerServer`] thread has written the message to a [`MailboxSink`], normally the parent's
//! [`Logger`](crate::logger::Logger). Isolated child processes reach the mailbox through a
//! loopback [bridge](BridgeClient).

mod bridge;
mod mailbox;

pub use bridge::BridgeClient;
pub(crate) use bridge::serve_session;
pub use mailbox::*;
