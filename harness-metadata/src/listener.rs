// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{Escalation, FrameError, IsolatedTestIdParseError, TestStatus};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Environment variable naming the test an isolated child process should run.
///
/// The value is an [`IsolatedTestId`] in its display form.
pub const ISOLATED_TEST_ENV: &str = "HARNESS_ISOLATED_TEST";

/// Environment variable holding the socket address of the parent's listener bridge.
pub const LISTENER_ADDR_ENV: &str = "HARNESS_LISTENER_ADDR";

/// A frame sent from an isolated child process to the parent's listener.
///
/// Frames are encoded as single lines of JSON. The parent answers every frame with exactly one
/// [`ListenerResponse`] before the child may send the next one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ListenerRequest {
    /// A rendered text record, destined for the console and the text log.
    Text {
        /// The rendered record.
        message: String,
    },

    /// A rendered XML record, destined for the XML log.
    Xml {
        /// The rendered record.
        message: String,
    },

    /// The final outcome of the test. Sent once, last.
    Report {
        /// The terminal status of the test.
        status: TestStatus,

        /// The escalation requested by the abort policy inside the child.
        #[serde(default)]
        escalation: Escalation,

        /// The number of assertion failures observed in the child.
        #[serde(default)]
        asserts_failed: usize,
    },
}

/// The parent's answer to a [`ListenerRequest`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ListenerResponse {
    /// The frame was fully consumed.
    Ack,

    /// The frame was rejected. The child must treat this as fatal.
    Rejected {
        /// A human-readable reason.
        reason: String,
    },
}

macro_rules! impl_frame {
    ($ty:ty) => {
        impl $ty {
            /// Encodes this frame as a single line, including the trailing newline.
            pub fn to_line(&self) -> Result<String, FrameError> {
                let mut line = serde_json::to_string(self).map_err(FrameError::Encode)?;
                line.push('\n');
                Ok(line)
            }

            /// Decodes a frame from a single line. Trailing line terminators are ignored.
            pub fn from_line(line: &str) -> Result<Self, FrameError> {
                let line = line.trim_end_matches(['\r', '\n']);
                if line.is_empty() {
                    return Err(FrameError::Empty);
                }
                serde_json::from_str(line).map_err(FrameError::Decode)
            }
        }
    };
}

impl_frame!(ListenerRequest);
impl_frame!(ListenerResponse);

/// Identifies a single test for an isolated child process: the suite name and the test's
/// registration index.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct IsolatedTestId {
    /// The suite name.
    pub suite: String,

    /// The registration index of the test.
    pub index: usize,
}

impl fmt::Display for IsolatedTestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.suite, self.index)
    }
}

impl FromStr for IsolatedTestId {
    type Err = IsolatedTestIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Suite names may contain dots, the index never does.
        let (suite, index) = s
            .rsplit_once('.')
            .ok_or_else(|| IsolatedTestIdParseError::new(s))?;
        if suite.is_empty() {
            return Err(IsolatedTestIdParseError::new(s));
        }
        let index = index
            .parse()
            .map_err(|_| IsolatedTestIdParseError::new(s))?;
        Ok(Self {
            suite: suite.to_owned(),
            index,
        })
    }
}
