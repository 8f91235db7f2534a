// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Both ends of the loopback connection between an isolated child and its parent.
//!
//! The child sends one [`ListenerRequest`] per line and blocks until the parent has answered it,
//! so the parent's mailbox sees the child's records in order and one at a time.

use super::mailbox::{Mailbox, StatusReport};
use crate::{
    errors::{IsolationError, MailboxError},
    logger::LogRelay,
    runner::EntryOutcome,
};
use harness_metadata::{ListenerRequest, ListenerResponse};
use std::{
    io::{BufRead, BufReader, Write},
    net::{SocketAddr, TcpStream},
    sync::{Arc, Mutex, PoisonError},
};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt},
    net::TcpListener,
};
use tracing::{debug, warn};

#[derive(Debug)]
struct BridgeStream {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

/// The child's end of the bridge. Blocking.
#[derive(Debug)]
pub struct BridgeClient {
    stream: Mutex<BridgeStream>,
}

impl BridgeClient {
    /// Connects to the parent's listener at `addr`.
    pub fn connect(addr: &str) -> Result<Self, IsolationError> {
        let socket: SocketAddr = addr.parse().map_err(|_| IsolationError::InvalidAddr {
            addr: addr.to_owned(),
        })?;
        let connect_error = |error| IsolationError::Connect {
            addr: addr.to_owned(),
            error,
        };
        let writer = TcpStream::connect(socket).map_err(connect_error)?;
        let reader = writer.try_clone().map_err(connect_error)?;
        debug!(%addr, "connected to the parent listener");

        Ok(Self {
            stream: Mutex::new(BridgeStream {
                reader: BufReader::new(reader),
                writer,
            }),
        })
    }

    /// Sends a frame and waits for the parent's answer.
    pub fn send(&self, request: &ListenerRequest) -> Result<(), MailboxError> {
        let line = request.to_line().map_err(MailboxError::Frame)?;
        let mut stream = self.stream.lock().unwrap_or_else(PoisonError::into_inner);
        stream
            .writer
            .write_all(line.as_bytes())
            .map_err(MailboxError::Bridge)?;

        let mut response = String::new();
        let read = stream
            .reader
            .read_line(&mut response)
            .map_err(MailboxError::Bridge)?;
        if read == 0 {
            return Err(MailboxError::Disconnected);
        }
        match ListenerResponse::from_line(&response).map_err(MailboxError::Frame)? {
            ListenerResponse::Ack => Ok(()),
            ListenerResponse::Rejected { reason } => Err(MailboxError::Rejected { reason }),
        }
    }

    /// Sends the final outcome of the test.
    pub fn report(&self, outcome: &EntryOutcome) -> Result<(), MailboxError> {
        self.send(&ListenerRequest::Report {
            status: outcome.status,
            escalation: outcome.escalation,
            asserts_failed: outcome.asserts_failed,
        })
    }
}

impl LogRelay for BridgeClient {
    fn relay_text(&self, text: &str) -> Result<(), MailboxError> {
        self.send(&ListenerRequest::Text {
            message: text.to_owned(),
        })
    }

    fn relay_xml(&self, xml: &str) -> Result<(), MailboxError> {
        self.send(&ListenerRequest::Xml {
            message: xml.to_owned(),
        })
    }
}

/// What the parent observed on one bridge connection.
#[derive(Debug, Default)]
pub(crate) struct SessionResult {
    /// The number of frames answered.
    pub(crate) frames: usize,
    /// The first error, if any. Errors are fatal to the run.
    pub(crate) error: Option<MailboxError>,
}

/// Accepts one child connection and forwards its frames into `mailbox` until it disconnects.
pub(crate) async fn serve_session(listener: TcpListener, mailbox: Arc<Mailbox>) -> SessionResult {
    let mut result = SessionResult::default();
    let stream = match listener.accept().await {
        Ok((stream, peer)) => {
            debug!(%peer, "isolated test connected");
            stream
        }
        Err(error) => {
            result.error = Some(MailboxError::Bridge(error));
            return result;
        }
    };

    let (reader, mut writer) = stream.into_split();
    let mut lines = tokio::io::BufReader::new(reader).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(error) => {
                warn!(%error, "reading from the isolated test failed");
                result.error.get_or_insert(MailboxError::Bridge(error));
                break;
            }
        };

        let response = match handle_frame(&mailbox, &line).await {
            Ok(()) => ListenerResponse::Ack,
            Err(error) => {
                let reason = error.to_string();
                result.error.get_or_insert(error);
                ListenerResponse::Rejected { reason }
            }
        };
        result.frames += 1;

        let written = match response.to_line() {
            Ok(line) => writer
                .write_all(line.as_bytes())
                .await
                .map_err(MailboxError::Bridge),
            Err(error) => Err(MailboxError::Frame(error)),
        };
        if let Err(error) = written {
            result.error.get_or_insert(error);
            break;
        }
    }

    result
}

async fn handle_frame(mailbox: &Arc<Mailbox>, line: &str) -> Result<(), MailboxError> {
    let (message, xml) = match ListenerRequest::from_line(line).map_err(MailboxError::Frame)? {
        ListenerRequest::Text { message } => (message, false),
        ListenerRequest::Xml { message } => (message, true),
        ListenerRequest::Report {
            status,
            escalation,
            asserts_failed,
        } => {
            mailbox.post_report(StatusReport {
                status,
                escalation,
                asserts_failed,
            });
            return Ok(());
        }
    };

    // Posting blocks until the listener thread has written the message.
    let mailbox = Arc::clone(mailbox);
    let posted = tokio::task::spawn_blocking(move || {
        if xml {
            mailbox.send_xml(&message)
        } else {
            mailbox.send_text(&message)
        }
    })
    .await;
    match posted {
        Ok(result) => result,
        Err(_) => Err(MailboxError::ShutDown),
    }
}
