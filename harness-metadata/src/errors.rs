// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{error, fmt};

/// An error that occurs while encoding or decoding a listener frame.
#[derive(Debug)]
pub enum FrameError {
    /// The frame could not be serialized.
    Encode(serde_json::Error),

    /// The line was not a valid frame.
    Decode(serde_json::Error),

    /// The line was empty.
    Empty,
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Encode(_) => write!(f, "encoding listener frame failed"),
            Self::Decode(_) => write!(f, "decoding listener frame failed"),
            Self::Empty => write!(f, "received an empty listener frame"),
        }
    }
}

impl error::Error for FrameError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Encode(err) | Self::Decode(err) => Some(err),
            Self::Empty => None,
        }
    }
}

/// An error that occurs while parsing an [`IsolatedTestId`](crate::IsolatedTestId).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IsolatedTestIdParseError {
    input: String,
}

impl IsolatedTestIdParseError {
    pub(crate) fn new(input: &str) -> Self {
        Self {
            input: input.to_owned(),
        }
    }

    /// Returns the input that failed to parse.
    pub fn input(&self) -> &str {
        &self.input
    }
}

impl fmt::Display for IsolatedTestIdParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "invalid isolated test id `{}` (expected `<suite>.<index>`)",
            self.input
        )
    }
}

impl error::Error for IsolatedTestIdParseError {}
