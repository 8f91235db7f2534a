// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Log record formats.
//!
//! Every record the harness writes is one of a fixed set of [message kinds](MessageKind). Each kind
//! has a table of [fields](Field) and one template per [output flavor](OutputFlavor). Templates are
//! compiled once, at startup, by the [`FormatEngine`]; rendering then only substitutes values.
//!
//! # Template language
//!
//! * `%Name%` substitutes the field `Name`. `%Name:14%` or `%Name:l14%` pads the value on the right
//!   to at least 14 characters; `%Name:r2%` pads on the left. Values are never truncated.
//! * `~N:` starts a new entry (a unit of output, usually one physical line) whose verbosity level
//!   is `N`. Text before the first marker forms an entry at level 0.
//! * An unknown field name or an unterminated `%` is a compile error.
//!
//! The XML flavor escapes `<`, `>`, `"`, `'` and `&` in every substituted value except the table
//! fields, which hold records that have already been rendered.

mod engine;
mod filename;
mod templates;

pub use engine::*;
pub use filename::*;

use std::{collections::HashMap, fmt};

/// The character that starts a level marker in a template.
pub const LEVEL_MARKER: char = '~';

/// The kinds of records written to the log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MessageKind {
    /// The suite header. Opens the log.
    Header,
    /// A test is about to run.
    TestStarted,
    /// An assertion failed.
    AssertFailed,
    /// Free-form output from a test.
    Print,
    /// Trace output from a test.
    Trace,
    /// A test finished.
    TestFinished,
    /// The suite result. Closes the log.
    Result,
    /// The table of failed tests inside a result.
    TestTableFailed,
    /// The table of tests that did not run inside a result.
    TestTableNotExecuted,
    /// One row of the failed-tests table.
    TestItemFailed,
    /// One row of the not-executed table.
    TestItemNotExecuted,
    /// The per-suite summary printed at the end of a run.
    Summary,
}

impl MessageKind {
    /// All message kinds.
    pub const ALL: [MessageKind; 12] = [
        MessageKind::Header,
        MessageKind::TestStarted,
        MessageKind::AssertFailed,
        MessageKind::Print,
        MessageKind::Trace,
        MessageKind::TestFinished,
        MessageKind::Result,
        MessageKind::TestTableFailed,
        MessageKind::TestTableNotExecuted,
        MessageKind::TestItemFailed,
        MessageKind::TestItemNotExecuted,
        MessageKind::Summary,
    ];

    /// The name used for this kind in format override files.
    pub fn name(self) -> &'static str {
        match self {
            MessageKind::Header => "header",
            MessageKind::TestStarted => "test-started",
            MessageKind::AssertFailed => "assert-failed",
            MessageKind::Print => "print",
            MessageKind::Trace => "trace",
            MessageKind::TestFinished => "test-finished",
            MessageKind::Result => "result",
            MessageKind::TestTableFailed => "test-table-failed",
            MessageKind::TestTableNotExecuted => "test-table-not-executed",
            MessageKind::TestItemFailed => "test-item-failed",
            MessageKind::TestItemNotExecuted => "test-item-not-executed",
            MessageKind::Summary => "summary",
        }
    }

    /// Looks up a kind by its [name](Self::name).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// The value of the `Class` field for records of this kind.
    pub fn class(self) -> &'static str {
        match self {
            MessageKind::Header => "Header",
            MessageKind::TestStarted => "TestStarted",
            MessageKind::AssertFailed => "AssertFailed",
            MessageKind::Print => "Print",
            MessageKind::Trace => "Trace",
            MessageKind::TestFinished => "TestFinished",
            MessageKind::Result => "Result",
            MessageKind::TestTableFailed => "TestTableFailed",
            MessageKind::TestTableNotExecuted => "TestTableNotExecuted",
            MessageKind::TestItemFailed => "TestItemFailed",
            MessageKind::TestItemNotExecuted => "TestItemNotExecuted",
            MessageKind::Summary => "Summary",
        }
    }

    /// The fields a template for this kind may reference, standard fields first.
    pub fn fields(self) -> &'static [Field] {
        use Field::*;

        match self {
            MessageKind::Header => &[
                Level,
                Class,
                Date,
                Time,
                Section,
                FormatName,
                Version,
                HarnessVersion,
                SuiteName,
                LogFile,
                UserName,
                ComputerName,
                Iteration,
                CmdLine,
            ],
            MessageKind::TestStarted => &[
                Level,
                Class,
                Date,
                Time,
                Section,
                TestIndex,
                TestName,
                TestDescription,
            ],
            MessageKind::AssertFailed => &[
                Level, Class, Date, Time, Section, File, Line, Func, Thread, Message,
            ],
            MessageKind::Print | MessageKind::Trace => {
                &[Level, Class, Date, Time, Section, Message]
            }
            MessageKind::TestFinished => &[
                Level, Class, Date, Time, Section, TestIndex, TestName, TestStatus,
            ],
            MessageKind::Result => &[
                Level,
                Class,
                Date,
                Time,
                Section,
                SuiteName,
                Duration,
                TestTableFailed,
                TestTableNotExecuted,
                SuiteStatus,
                TestsFailedCount,
                TestsPassedCount,
                TestsNotExecutedCount,
            ],
            MessageKind::TestTableFailed => &[Level, Class, Date, Time, Section, TestListFailed],
            MessageKind::TestTableNotExecuted => {
                &[Level, Class, Date, Time, Section, TestListNotExecuted]
            }
            MessageKind::TestItemFailed | MessageKind::TestItemNotExecuted => {
                &[Level, Class, Date, Time, Section, TestName, TestIndex]
            }
            MessageKind::Summary => &[
                Level,
                Class,
                Date,
                Time,
                Section,
                SuiteName,
                TestTableFailed,
                TestTableNotExecuted,
                SuiteStatus,
                TestsFailedCount,
                TestsPassedCount,
                TestsNotExecutedCount,
            ],
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The two renderings of every record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OutputFlavor {
    /// Plain text, used for the console and the text log. Never escaped.
    Text,
    /// XML, used for the XML log. Substituted values are escaped.
    Xml,
}

impl fmt::Display for OutputFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFlavor::Text => f.write_str("text"),
            OutputFlavor::Xml => f.write_str("xml"),
        }
    }
}

/// A substitutable field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Field {
    /// The level of the entry being rendered. Filled in by the engine.
    Level,
    /// The record's class, see [`MessageKind::class`].
    Class,
    /// The local date, `MM/DD/YY`.
    Date,
    /// The local time, `HH:MM:SS.mmm`.
    Time,
    /// The log section: `Header`, `Body` or `Result`.
    Section,
    /// The log format name.
    FormatName,
    /// The log format version.
    Version,
    /// The harness version.
    HarnessVersion,
    /// The suite name.
    SuiteName,
    /// The path of the text log.
    LogFile,
    /// The user running the harness.
    UserName,
    /// The host name.
    ComputerName,
    /// `N of total M` or `N of infinite`.
    Iteration,
    /// The command line of the harness executable.
    CmdLine,
    /// The registration index of a test.
    TestIndex,
    /// The identifier of a test.
    TestName,
    /// The short description of a test.
    TestDescription,
    /// Source file of a failed assertion.
    File,
    /// Source line of a failed assertion.
    Line,
    /// The test phase a failed assertion was raised in.
    Func,
    /// The thread a failed assertion was raised on.
    Thread,
    /// Free-form message text.
    Message,
    /// The status of a finished test.
    TestStatus,
    /// Suite duration in seconds.
    Duration,
    /// Rendered [`MessageKind::TestTableFailed`] record.
    TestTableFailed,
    /// Rendered [`MessageKind::TestTableNotExecuted`] record.
    TestTableNotExecuted,
    /// `PASSED` or `FAILED`, with `-incomplete` appended if any test did not run.
    SuiteStatus,
    /// The number of failed tests.
    TestsFailedCount,
    /// The number of passed tests.
    TestsPassedCount,
    /// The number of tests that did not run.
    TestsNotExecutedCount,
    /// Concatenated [`MessageKind::TestItemFailed`] records.
    TestListFailed,
    /// Concatenated [`MessageKind::TestItemNotExecuted`] records.
    TestListNotExecuted,
}

impl Field {
    const COUNT: usize = 32;

    /// The name used for this field in templates.
    pub fn name(self) -> &'static str {
        match self {
            Field::Level => "Level",
            Field::Class => "Class",
            Field::Date => "Date",
            Field::Time => "Time",
            Field::Section => "Section",
            Field::FormatName => "FormatName",
            Field::Version => "Version",
            Field::HarnessVersion => "HarnessVersion",
            Field::SuiteName => "SuiteName",
            Field::LogFile => "LogFile",
            Field::UserName => "UserName",
            Field::ComputerName => "ComputerName",
            Field::Iteration => "Iteration",
            Field::CmdLine => "CmdLine",
            Field::TestIndex => "TestIndex",
            Field::TestName => "TestName",
            Field::TestDescription => "TestDescription",
            Field::File => "File",
            Field::Line => "Line",
            Field::Func => "Func",
            Field::Thread => "Thread",
            Field::Message => "Message",
            Field::TestStatus => "TestStatus",
            Field::Duration => "Duration",
            Field::TestTableFailed => "TestTableFailed",
            Field::TestTableNotExecuted => "TestTableNotExecuted",
            Field::SuiteStatus => "SuiteStatus",
            Field::TestsFailedCount => "TestsFailedCount",
            Field::TestsPassedCount => "TestsPassedCount",
            Field::TestsNotExecutedCount => "TestsNotExecutedCount",
            Field::TestListFailed => "TestListFailed",
            Field::TestListNotExecuted => "TestListNotExecuted",
        }
    }

    /// Returns true if this field holds already-rendered records.
    pub fn is_table(self) -> bool {
        matches!(
            self,
            Field::TestTableFailed
                | Field::TestTableNotExecuted
                | Field::TestListFailed
                | Field::TestListNotExecuted
        )
    }
}

/// Field values for one record.
///
/// Fields that are never set render as empty strings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldValues {
    values: Vec<String>,
}

impl FieldValues {
    /// Creates an empty set of values.
    pub fn new() -> Self {
        Self {
            values: vec![String::new(); Field::COUNT],
        }
    }

    /// Sets a field, returning `self` for chaining.
    pub fn with(mut self, field: Field, value: impl Into<String>) -> Self {
        self.set(field, value);
        self
    }

    /// Sets a field.
    pub fn set(&mut self, field: Field, value: impl Into<String>) -> &mut Self {
        self.values[field as usize] = value.into();
        self
    }

    /// Returns the value of a field.
    pub fn get(&self, field: Field) -> &str {
        &self.values[field as usize]
    }
}

impl Default for FieldValues {
    fn default() -> Self {
        Self::new()
    }
}

/// Template overrides, replacing the built-in template for some kinds and flavors.
#[derive(Clone, Debug, Default)]
pub struct FormatOverrides {
    templates: HashMap<(MessageKind, OutputFlavor), String>,
}

impl FormatOverrides {
    /// Creates an empty set of overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the template for `kind` in `flavor`.
    pub fn set(&mut self, kind: MessageKind, flavor: OutputFlavor, template: impl Into<String>) {
        self.templates.insert((kind, flavor), template.into());
    }

    /// Returns the override for `kind` in `flavor`, if any.
    pub fn get(&self, kind: MessageKind, flavor: OutputFlavor) -> Option<&str> {
        self.templates.get(&(kind, flavor)).map(|s| s.as_str())
    }

    /// Returns true if no templates are overridden.
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_resolve() {
        for kind in MessageKind::ALL {
            assert_eq!(MessageKind::from_name(kind.name()), Some(kind));
            // Every kind carries the standard fields, in order.
            assert_eq!(
                &kind.fields()[..5],
                &[Field::Level, Field::Class, Field::Date, Field::Time, Field::Section]
            );
        }
        assert_eq!(MessageKind::from_name("TestStarted"), None);
    }

    #[test]
    fn field_count_matches() {
        assert_eq!(Field::TestListNotExecuted as usize + 1, Field::COUNT);
    }
}
