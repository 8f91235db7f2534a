// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::{LogFileError, MailboxError},
    logger::LogRelay,
};
use bitflags::bitflags;
use debug_ignore::DebugIgnore;
use harness_metadata::{Escalation, TestStatus};
use std::{
    io, mem,
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    thread::{self, JoinHandle},
};
use tracing::debug;

/// The largest message, in bytes, a client may post.
pub const MAILBOX_CAPACITY: usize = 8192;

bitflags! {
    /// The state of a [`Mailbox`].
    ///
    /// At most one of `TEXT_PENDING` and `XML_PENDING` is set at any time.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct MailboxFlags: u8 {
        /// A server is serving the mailbox.
        const ENABLED = 1 << 0;
        /// The owner asked the server to exit.
        const EXIT = 1 << 1;
        /// The server has exited.
        const DONE = 1 << 2;
        /// A text message is waiting to be written.
        const TEXT_PENDING = 1 << 3;
        /// An XML message is waiting to be written.
        const XML_PENDING = 1 << 4;
        /// The last message has been consumed.
        const MSG_DONE = 1 << 5;
    }
}

/// The destination a listener server writes consumed messages to.
pub trait MailboxSink: Send + Sync {
    /// Writes a text record.
    fn deliver_text(&self, text: &str) -> Result<(), LogFileError>;

    /// Writes an XML record.
    fn deliver_xml(&self, xml: &str) -> Result<(), LogFileError>;
}

/// The final outcome of an isolated test, as posted to the mailbox.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusReport {
    /// The terminal status.
    pub status: TestStatus,
    /// The escalation requested in the child.
    pub escalation: Escalation,
    /// The number of failed assertions in the child.
    pub asserts_failed: usize,
}

#[derive(Debug)]
struct Slot {
    flags: MailboxFlags,
    buffer: String,
    report: Option<StatusReport>,
    sink_error: Option<String>,
}

/// A single-slot rendezvous between message producers and one server thread.
///
/// Clients post one message at a time and block until the server has written it.
#[derive(Debug)]
pub struct Mailbox {
    slot: Mutex<Slot>,
    server_cv: Condvar,
    client_cv: Condvar,
    client_lock: Mutex<()>,
}

impl Mailbox {
    /// Creates a mailbox with no server.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            slot: Mutex::new(Slot {
                flags: MailboxFlags::empty(),
                buffer: String::with_capacity(MAILBOX_CAPACITY),
                report: None,
                sink_error: None,
            }),
            server_cv: Condvar::new(),
            client_cv: Condvar::new(),
            client_lock: Mutex::new(()),
        })
    }

    /// A snapshot of the flags.
    pub fn flags(&self) -> MailboxFlags {
        self.lock().flags
    }

    /// Posts a text message and waits until the server has written it.
    pub fn send_text(&self, text: &str) -> Result<(), MailboxError> {
        self.send(text, MailboxFlags::TEXT_PENDING)
    }

    /// Posts an XML message and waits until the server has written it.
    pub fn send_xml(&self, xml: &str) -> Result<(), MailboxError> {
        self.send(xml, MailboxFlags::XML_PENDING)
    }

    /// Stores the final outcome of the current isolated test, replacing any earlier one.
    pub fn post_report(&self, report: StatusReport) {
        self.lock().report = Some(report);
    }

    /// Takes the stored outcome.
    pub fn take_report(&self) -> Option<StatusReport> {
        self.lock().report.take()
    }

    fn send(&self, message: &str, pending: MailboxFlags) -> Result<(), MailboxError> {
        if message.len() > MAILBOX_CAPACITY {
            return Err(MailboxError::MessageTooLarge {
                len: message.len(),
                capacity: MAILBOX_CAPACITY,
            });
        }

        // Serializes clients, so that at most one message is in flight.
        let _client = self
            .client_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut slot = self.lock();
        if !slot.flags.contains(MailboxFlags::ENABLED) {
            return Err(MailboxError::ShutDown);
        }
        if slot.flags.intersects(pending_flags()) {
            return Err(MailboxError::MessagePending);
        }

        slot.buffer.clear();
        slot.buffer.push_str(message);
        slot.flags.remove(MailboxFlags::MSG_DONE);
        slot.flags.insert(pending);
        self.server_cv.notify_one();

        while !slot.flags.contains(MailboxFlags::MSG_DONE) {
            if slot.flags.contains(MailboxFlags::DONE) {
                return Err(MailboxError::ShutDown);
            }
            slot = self
                .client_cv
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
        slot.flags.remove(MailboxFlags::MSG_DONE);

        match slot.sink_error.take() {
            Some(message) => Err(MailboxError::SinkFailed { message }),
            None => Ok(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn serve(&self, sink: &dyn MailboxSink) {
        let mut slot = self.lock();
        loop {
            while !slot
                .flags
                .intersects(pending_flags() | MailboxFlags::EXIT)
            {
                slot = self
                    .server_cv
                    .wait(slot)
                    .unwrap_or_else(PoisonError::into_inner);
            }

            // Pending messages are drained before honoring an exit request.
            let pending = slot.flags & pending_flags();
            if pending.is_empty() {
                slot.flags.remove(MailboxFlags::ENABLED | MailboxFlags::EXIT);
                slot.flags.insert(MailboxFlags::DONE);
                self.client_cv.notify_all();
                return;
            }

            let message = mem::take(&mut slot.buffer);
            drop(slot);
            let result = if pending == MailboxFlags::TEXT_PENDING {
                sink.deliver_text(&message)
            } else {
                sink.deliver_xml(&message)
            };

            slot = self.lock();
            slot.buffer = message;
            if let Err(error) = result {
                slot.sink_error = Some(error.to_string());
            }
            slot.flags.remove(pending);
            slot.flags.insert(MailboxFlags::MSG_DONE);
            self.client_cv.notify_all();
        }
    }
}

impl LogRelay for Mailbox {
    fn relay_text(&self, text: &str) -> Result<(), MailboxError> {
        self.send_text(text)
    }

    fn relay_xml(&self, xml: &str) -> Result<(), MailboxError> {
        self.send_xml(xml)
    }
}

fn pending_flags() -> MailboxFlags {
    MailboxFlags::TEXT_PENDING | MailboxFlags::XML_PENDING
}

/// The owner of a mailbox server thread.
///
/// Dropping the server shuts the thread down, but only if this value started it.
#[derive(Debug)]
pub struct ListenerServer {
    mailbox: Arc<Mailbox>,
    thread: Option<JoinHandle<()>>,
    _sink: DebugIgnore<Arc<dyn MailboxSink>>,
}

impl ListenerServer {
    /// Enables the mailbox and starts serving it on a new thread.
    pub fn start(mailbox: Arc<Mailbox>, sink: Arc<dyn MailboxSink>) -> io::Result<Self> {
        {
            let mut slot = mailbox.lock();
            slot.flags = MailboxFlags::ENABLED;
            slot.sink_error = None;
        }

        let thread = {
            let mailbox = Arc::clone(&mailbox);
            let sink = Arc::clone(&sink);
            thread::Builder::new()
                .name("harness-listener".to_owned())
                .spawn(move || mailbox.serve(&*sink))
        };
        let thread = match thread {
            Ok(thread) => thread,
            Err(error) => {
                mailbox.lock().flags = MailboxFlags::empty();
                return Err(error);
            }
        };
        debug!("listener server started");

        Ok(Self {
            mailbox,
            thread: Some(thread),
            _sink: DebugIgnore(sink),
        })
    }

    /// The mailbox being served.
    pub fn mailbox(&self) -> &Arc<Mailbox> {
        &self.mailbox
    }

    /// Stops the server thread and waits for it to exit. Idempotent.
    pub fn shutdown(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };

        {
            let mut slot = self.mailbox.lock();
            slot.flags.insert(MailboxFlags::EXIT);
            self.mailbox.server_cv.notify_one();
            while !slot.flags.contains(MailboxFlags::DONE) {
                slot = self
                    .mailbox
                    .client_cv
                    .wait(slot)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        }

        if thread.join().is_err() {
            debug!("listener server thread panicked");
        }
        debug!("listener server stopped");
    }
}

impl Drop for ListenerServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
