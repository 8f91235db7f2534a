// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by the harness.
//!
//! User test failures are not errors: they are reported through the logger and recorded as test
//! statuses. The types in this module cover infrastructure and configuration problems, which are
//! fatal to the run.

use crate::{
    format::{MessageKind, OutputFlavor},
    verbosity::Verbosity,
};
use camino::Utf8PathBuf;
use config::ConfigError;
use harness_metadata::{FrameError, IsolatedTestIdParseError};
use itertools::Itertools;
use std::io;
use thiserror::Error;

/// An error that occurred while compiling a log template.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("failed to compile {flavor} template for `{kind}`")]
pub struct FormatCompileError {
    kind: MessageKind,
    flavor: OutputFlavor,
    #[source]
    reason: FormatCompileErrorKind,
}

impl FormatCompileError {
    pub(crate) fn new(
        kind: MessageKind,
        flavor: OutputFlavor,
        reason: FormatCompileErrorKind,
    ) -> Self {
        Self {
            kind,
            flavor,
            reason,
        }
    }

    /// Returns the message kind whose template failed to compile.
    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Returns the reason compilation failed.
    pub fn reason(&self) -> &FormatCompileErrorKind {
        &self.reason
    }
}

/// The reason a log template failed to compile.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FormatCompileErrorKind {
    /// The template referenced a field the message kind does not have.
    #[error("unknown field `{field}` (known fields: {})", .allowed.iter().join(", "))]
    UnknownField {
        /// The field name as written.
        field: String,
        /// The fields allowed for this message kind.
        allowed: Vec<&'static str>,
    },

    /// A `%` opened a field that was never closed.
    #[error("no closing `%` for the field starting at byte {offset}")]
    UnclosedField {
        /// The byte offset of the opening `%`.
        offset: usize,
    },

    /// A level marker was not followed by `:`.
    #[error("expected `:` after the verbosity level at byte {offset}")]
    MissingLevelSeparator {
        /// The byte offset of the marker.
        offset: usize,
    },

    /// A field width was not a number.
    #[error("invalid width `{width}` for field `{field}`")]
    InvalidWidth {
        /// The field name.
        field: String,
        /// The width as written.
        width: String,
    },
}

/// An error that occurred while parsing a log filename template.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("invalid log filename template `{template}`")]
pub struct FilenameTemplateError {
    template: String,
    #[source]
    reason: FilenameTemplateErrorKind,
}

impl FilenameTemplateError {
    pub(crate) fn new(template: impl Into<String>, reason: FilenameTemplateErrorKind) -> Self {
        Self {
            template: template.into(),
            reason,
        }
    }

    /// Returns the reason parsing failed.
    pub fn reason(&self) -> &FilenameTemplateErrorKind {
        &self.reason
    }
}

/// The reason a log filename template failed to parse.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FilenameTemplateErrorKind {
    /// A token was not recognized.
    #[error("unknown token `%{token}%`")]
    UnknownToken {
        /// The token as written, without the surrounding `%`.
        token: String,
    },

    /// A `%` opened a token that was never closed.
    #[error("no closing `%` for token")]
    UnclosedToken,
}

/// An error that occurred while creating or writing a log file.
///
/// Log file errors are always fatal: a run whose evidence cannot be recorded is not trusted.
#[derive(Debug, Error)]
#[error("failed to {action} log file `{path}`")]
pub struct LogFileError {
    path: Utf8PathBuf,
    action: LogFileAction,
    #[source]
    error: io::Error,
}

impl LogFileError {
    pub(crate) fn new(
        path: impl Into<Utf8PathBuf>,
        action: LogFileAction,
        error: io::Error,
    ) -> Self {
        Self {
            path: path.into(),
            action,
            error,
        }
    }

    /// Returns the path of the log file.
    pub fn path(&self) -> &Utf8PathBuf {
        &self.path
    }
}

/// The operation that failed on a log file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFileAction {
    /// Creating the file or its directory.
    Create,
    /// Writing a record.
    Write,
    /// Flushing buffered records.
    Flush,
}

impl std::fmt::Display for LogFileAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFileAction::Create => f.write_str("create"),
            LogFileAction::Write => f.write_str("write to"),
            LogFileAction::Flush => f.write_str("flush"),
        }
    }
}

/// An error that occurred while relaying a message through the test listener.
#[derive(Debug, Error)]
pub enum MailboxError {
    /// The message does not fit into the mailbox.
    #[error("listener message of {len} bytes exceeds the mailbox capacity of {capacity} bytes")]
    MessageTooLarge {
        /// The length of the message.
        len: usize,
        /// The mailbox capacity.
        capacity: usize,
    },

    /// A message was still pending when a new one was posted. This is a bug in the harness.
    #[error("a listener message is already pending (this is a bug)")]
    MessagePending,

    /// The listener has shut down.
    #[error("the test listener has shut down")]
    ShutDown,

    /// The log destination behind the listener failed.
    #[error("the test listener failed to write a message: {message}")]
    SinkFailed {
        /// A description of the failure.
        message: String,
    },

    /// I/O on the cross-process bridge failed.
    #[error("listener bridge I/O failed")]
    Bridge(#[source] io::Error),

    /// A bridge frame could not be encoded or decoded.
    #[error("invalid listener bridge frame")]
    Frame(#[source] FrameError),

    /// The parent rejected a frame.
    #[error("listener rejected message: {reason}")]
    Rejected {
        /// The reason given by the parent.
        reason: String,
    },

    /// The bridge connection closed before a response arrived.
    #[error("listener bridge closed unexpectedly")]
    Disconnected,
}

/// An error which indicates that a profile was requested but not known to the harness.
#[derive(Clone, Debug, Error)]
#[error("profile `{profile}` not found (known profiles: {})", .all_profiles.join(", "))]
pub struct ProfileNotFound {
    profile: String,
    all_profiles: Vec<String>,
}

impl ProfileNotFound {
    pub(crate) fn new(
        profile: impl Into<String>,
        all_profiles: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let mut all_profiles: Vec<_> = all_profiles.into_iter().map(|s| s.into()).collect();
        all_profiles.sort_unstable();
        Self {
            profile: profile.into(),
            all_profiles,
        }
    }
}

/// An error that occurred while parsing the harness configuration.
#[derive(Debug, Error)]
#[error("failed to parse harness config at `{config_file}`")]
pub struct ConfigParseError {
    config_file: String,
    #[source]
    kind: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: Option<&camino::Utf8Path>, kind: ConfigParseErrorKind) -> Self {
        Self {
            config_file: config_file
                .map_or_else(|| "<default config>".to_owned(), |path| path.to_string()),
            kind,
        }
    }

    /// Returns the kind of error.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.kind
    }
}

/// The kind of error that occurred while parsing the configuration.
#[derive(Debug, Error)]
pub enum ConfigParseErrorKind {
    /// An error occurred while building the config.
    #[error(transparent)]
    BuildError(Box<ConfigError>),

    /// An error occurred while deserializing the config.
    #[error(transparent)]
    DeserializeError(Box<serde_path_to_error::Error<ConfigError>>),

    /// The requested profile does not exist.
    #[error(transparent)]
    ProfileNotFound(#[from] ProfileNotFound),

    /// A run-selection value failed to parse.
    #[error(transparent)]
    Selection(#[from] SelectionParseError),

    /// The log filename template failed to parse.
    #[error(transparent)]
    FilenameTemplate(#[from] FilenameTemplateError),

    /// The format override file could not be read.
    #[error("failed to read format file `{path}`")]
    FormatFileRead {
        /// The path to the format file.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The format override file is not valid TOML.
    #[error("failed to parse format file `{path}`")]
    FormatFileParse {
        /// The path to the format file.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        error: toml::de::Error,
    },

    /// The format override file names a message kind that does not exist.
    #[error(
        "unknown message kind `{kind}` in format file `{path}` (known kinds: {})",
        MessageKind::ALL.iter().map(|kind| kind.name()).join(", ")
    )]
    UnknownFormatKind {
        /// The path to the format file.
        path: Utf8PathBuf,
        /// The kind name as written.
        kind: String,
    },

    /// An environment variable override could not be parsed.
    #[error("invalid value `{value}` for environment variable `{var}`: {reason}")]
    EnvOverride {
        /// The environment variable.
        var: &'static str,
        /// The value it held.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// An error that occurred while parsing a run-selection value.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SelectionParseError {
    /// A range was not of the form `N` or `N-M`.
    #[error("invalid test range `{input}` (expected `N` or `N-M`)")]
    InvalidRange {
        /// The input.
        input: String,
    },

    /// A range's start was greater than its end.
    #[error("test range `{start}-{end}` is reversed")]
    ReversedRange {
        /// The start of the range.
        start: usize,
        /// The end of the range.
        end: usize,
    },

    /// A comma-separated list contained an empty item.
    #[error("empty item in list `{input}`")]
    EmptyItem {
        /// The input.
        input: String,
    },
}

/// Error returned while parsing a [`Verbosity`] value from a string.
#[derive(Clone, Debug, Error)]
#[error(
    "unrecognized value for verbosity: {input}\n(known values: {})",
    Verbosity::variants().join(", ")
)]
pub struct VerbosityParseError {
    input: String,
}

impl VerbosityParseError {
    pub(crate) fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

/// Error returned while parsing a [`LogType`](crate::verbosity::LogType) value from a string.
#[derive(Clone, Debug, Error)]
#[error("unrecognized value for log type: {input}\n(known values: none, text, xml, both)")]
pub struct LogTypeParseError {
    input: String,
}

impl LogTypeParseError {
    pub(crate) fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

/// An error that occurred while building the async runtime used to supervise tests.
#[derive(Debug, Error)]
#[error("error creating the harness runtime")]
pub struct RuntimeBuildError(#[source] pub(crate) io::Error);

/// An error that occurred while setting up or running an isolated test.
#[derive(Debug, Error)]
pub enum IsolationError {
    /// The path to the current executable could not be determined.
    #[error("failed to determine the current executable")]
    CurrentExe(#[source] io::Error),

    /// The listener bridge could not be bound.
    #[error("failed to bind the listener bridge")]
    Bind(#[source] io::Error),

    /// The listener thread could not be started.
    #[error("failed to start the test listener")]
    ListenerStart(#[source] io::Error),

    /// The child process for an isolated test could not be started.
    #[error("failed to start isolated test `{id}`")]
    Spawn {
        /// The test identifier.
        id: String,
        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The isolated test named in the environment is not registered.
    #[error("isolated test `{id}` is not registered in this executable")]
    TestNotFound {
        /// The test identifier.
        id: String,
    },

    /// The isolated test identifier could not be parsed.
    #[error(transparent)]
    InvalidId(#[from] IsolatedTestIdParseError),

    /// The listener address in the environment was invalid.
    #[error("invalid listener address `{addr}`")]
    InvalidAddr {
        /// The address as given.
        addr: String,
    },

    /// Connecting to the parent's listener failed.
    #[error("failed to connect to the listener at `{addr}`")]
    Connect {
        /// The address.
        addr: String,
        /// The underlying error.
        #[source]
        error: io::Error,
    },
}

/// A fatal harness error.
///
/// Returned by [`TestControl::run`](crate::control::TestControl::run). Every variant is a
/// configuration or infrastructure problem; none of them is caused by a test failing.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// A log template failed to compile.
    #[error(transparent)]
    FormatCompile(#[from] FormatCompileError),

    /// The log filename template is invalid.
    #[error(transparent)]
    FilenameTemplate(#[from] FilenameTemplateError),

    /// A log file could not be created or written.
    #[error(transparent)]
    LogFile(#[from] LogFileError),

    /// The test listener failed.
    #[error(transparent)]
    Mailbox(#[from] MailboxError),

    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigParseError),

    /// The supervising runtime could not be created.
    #[error(transparent)]
    RuntimeBuild(#[from] RuntimeBuildError),

    /// Isolated execution failed.
    #[error(transparent)]
    Isolation(#[from] IsolationError),
}
