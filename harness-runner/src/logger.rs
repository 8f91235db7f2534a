// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The logger: renders records through the [`FormatEngine`] and routes them to a [`LogSink`].
//!
//! There is one logger per process, shared through an `Arc`. It also keeps the pass, fail and
//! not-executed counters of the current suite, from which the suite result and the end-of-run
//! summaries are produced.
//!
//! In an isolated child process the logger has a [relay](LogRelay) installed: rendered records
//! are forwarded to the parent instead of being written locally, so that the parent remains the
//! only writer of the log files.

use crate::{
    errors::{HarnessError, LogFileError, MailboxError},
    format::{
        Field, FieldValues, FormatEngine, LevelFilter, LogFileTemplate, MessageKind,
        OutputFlavor, SuiteLogPaths,
    },
    listener::MailboxSink,
    log_sink::LogSink,
    output::{Color, ConsoleStyles, ConsoleTarget},
    time::{StopwatchStart, format_date, format_duration_secs, format_time, stopwatch},
    verbosity::{Destinations, LogType, Verbosity},
};
use camino::Utf8PathBuf;
use chrono::Local;
use debug_ignore::DebugIgnore;
use harness_metadata::{SuiteStatusSummary, TestStatus};
use owo_colors::{OwoColorize, Style};
use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tracing::debug;

/// The name of the log format, reported in the header.
pub const LOG_FORMAT_NAME: &str = "HarnessLog";

/// The version of the log format, reported in the header.
pub const LOG_FORMAT_VERSION: &str = "1.0";

/// The position of a suite run within the configured number of iterations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Iteration {
    /// The current iteration, starting at 1.
    pub current: usize,
    /// The total number of iterations, or `None` if the run repeats until stopped.
    pub total: Option<usize>,
}

impl Iteration {
    /// A single-iteration run.
    pub const SINGLE: Iteration = Iteration {
        current: 1,
        total: Some(1),
    };
}

impl fmt::Display for Iteration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.total {
            Some(total) => write!(f, "{} of total {}", self.current, total),
            None => write!(f, "{} of infinite", self.current),
        }
    }
}

/// Where an outgoing record is sent when the logger does not own the log files.
pub trait LogRelay: Send + Sync {
    /// Relays a rendered text record, destined for the console and the text log.
    fn relay_text(&self, text: &str) -> Result<(), MailboxError>;

    /// Relays a rendered XML record.
    fn relay_xml(&self, xml: &str) -> Result<(), MailboxError>;
}

/// The details of a failed assertion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssertionRecord {
    /// The source file of the assertion.
    pub file: String,
    /// The source line of the assertion.
    pub line: u32,
    /// The phase the assertion was raised in, as `suite.test::phase`.
    pub func: String,
    /// The name of the thread the assertion was raised on.
    pub thread: String,
    /// The failure message.
    pub message: String,
}

/// Settings for a [`Logger`], resolved from the run configuration.
#[derive(Clone, Debug)]
pub struct LoggerSettings {
    /// The verbosity threshold applied to every destination.
    pub verbosity: Verbosity,
    /// Which log files are written.
    pub log_type: LogType,
    /// The directory log files are created in.
    pub log_dir: Utf8PathBuf,
    /// The log file name template.
    pub filename_template: LogFileTemplate,
    /// If false, timed-out tests are counted as not executed rather than failed.
    pub fail_on_timeout: bool,
    /// Console coloring.
    pub color: Color,
    /// Console echo, or `None` if disabled.
    pub console: Option<ConsoleTarget>,
    /// The command line reported in the header.
    pub cmd_line: String,
}

impl Default for LoggerSettings {
    fn default() -> Self {
        Self {
            verbosity: Verbosity::Suite,
            log_type: LogType::Both,
            log_dir: Utf8PathBuf::from("."),
            filename_template: LogFileTemplate::default(),
            fail_on_timeout: true,
            color: Color::Never,
            console: Some(ConsoleTarget::Stdout),
            cmd_line: String::new(),
        }
    }
}

/// Records rendered by a relaying logger, sent once the state lock has been released.
struct RelayedRecord {
    relay: Arc<dyn LogRelay>,
    text: String,
    xml: Option<String>,
}

fn send_relayed(relayed: Option<RelayedRecord>) -> Result<(), HarnessError> {
    let Some(RelayedRecord { relay, text, xml }) = relayed else {
        return Ok(());
    };
    if !text.is_empty() {
        relay.relay_text(&text)?;
    }
    if let Some(xml) = xml.filter(|xml| !xml.is_empty()) {
        relay.relay_xml(&xml)?;
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Section {
    Header,
    Body,
    Result,
}

impl Section {
    fn as_str(self) -> &'static str {
        match self {
            Section::Header => "Header",
            Section::Body => "Body",
            Section::Result => "Result",
        }
    }
}

#[derive(Debug)]
struct SuiteState {
    name: String,
    stopwatch: StopwatchStart,
    counters: SuiteCounters,
}

#[derive(Debug, Default)]
struct SuiteCounters {
    passed: usize,
    failed: Vec<(usize, String)>,
    not_executed: Vec<(usize, String)>,
}

impl SuiteCounters {
    fn summary(&self, name: &str) -> SuiteStatusSummary {
        SuiteStatusSummary {
            name: name.to_owned(),
            passed: self.passed,
            failed: self.failed.len(),
            not_executed: self.not_executed.len(),
        }
    }
}

#[derive(Debug)]
struct LoggerState {
    sink: LogSink,
    section: Section,
    suite: Option<SuiteState>,
    asserts_this_test: usize,
    relay: Option<DebugIgnore<Arc<dyn LogRelay>>>,
    summaries: Vec<String>,
}

/// Renders and routes log records. See the [module documentation](self).
#[derive(Debug)]
pub struct Logger {
    engine: Arc<FormatEngine>,
    verbosity: Verbosity,
    log_type: LogType,
    log_dir: Utf8PathBuf,
    filename_template: LogFileTemplate,
    fail_on_timeout: bool,
    cmd_line: String,
    styles: ConsoleStyles,
    state: Mutex<LoggerState>,
}

impl Logger {
    /// Creates a new logger.
    pub fn new(engine: Arc<FormatEngine>, settings: LoggerSettings) -> Self {
        let LoggerSettings {
            verbosity,
            log_type,
            log_dir,
            filename_template,
            fail_on_timeout,
            color,
            console,
            cmd_line,
        } = settings;

        Self {
            engine,
            verbosity,
            log_type,
            log_dir,
            filename_template,
            fail_on_timeout,
            cmd_line,
            styles: ConsoleStyles::new(color),
            state: Mutex::new(LoggerState {
                sink: LogSink::new(console),
                section: Section::Body,
                suite: None,
                asserts_this_test: 0,
                relay: None,
                summaries: Vec::new(),
            }),
        }
    }

    /// Forwards every subsequent record to `relay` instead of writing it locally.
    pub fn set_relay(&self, relay: Arc<dyn LogRelay>) {
        debug!("logger relaying records to the parent listener");
        self.lock().relay = Some(DebugIgnore(relay));
    }

    /// Returns the verbosity threshold.
    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    /// Returns the number of assertion failures logged since the last test started.
    pub fn asserts_failed_this_test(&self) -> usize {
        self.lock().asserts_this_test
    }

    /// Opens the log files for a suite, resets the counters and writes the header.
    pub fn report_suite_starting(
        &self,
        suite: &str,
        iteration: Iteration,
    ) -> Result<SuiteLogPaths, HarnessError> {
        let mut state = self.lock();
        let paths = self
            .filename_template
            .paths(&self.log_dir, suite, &Local::now().naive_local());
        if state.relay.is_none() {
            state.sink.open(&paths, self.log_type)?;
        }
        state.suite = Some(SuiteState {
            name: suite.to_owned(),
            stopwatch: stopwatch(),
            counters: SuiteCounters::default(),
        });

        state.section = Section::Header;
        let values = FieldValues::new()
            .with(Field::FormatName, LOG_FORMAT_NAME)
            .with(Field::Version, LOG_FORMAT_VERSION)
            .with(Field::HarnessVersion, env!("CARGO_PKG_VERSION"))
            .with(Field::SuiteName, suite)
            .with(Field::LogFile, paths.text.as_str())
            .with(
                Field::UserName,
                whoami::username().unwrap_or_else(|_| "unknown".to_owned()),
            )
            .with(
                Field::ComputerName,
                whoami::hostname().unwrap_or_else(|_| "unknown".to_owned()),
            )
            .with(Field::Iteration, iteration.to_string())
            .with(Field::CmdLine, self.cmd_line.as_str());
        let result = self.emit(
            &mut state,
            MessageKind::Header,
            values,
            LevelFilter::threshold(self.verbosity),
            Destinations::all(),
            None,
        );
        state.section = Section::Body;
        drop(state);
        send_relayed(result?)?;

        Ok(paths)
    }

    /// Writes the test-started record and resets the per-test assertion counter.
    pub fn report_test_started(
        &self,
        index: usize,
        name: &str,
        description: &str,
    ) -> Result<(), HarnessError> {
        let mut state = self.lock();
        state.asserts_this_test = 0;
        let values = FieldValues::new()
            .with(Field::TestIndex, index.to_string())
            .with(Field::TestName, name)
            .with(Field::TestDescription, description);
        let relayed = self.emit(
            &mut state,
            MessageKind::TestStarted,
            values,
            LevelFilter::threshold(self.verbosity),
            Destinations::all(),
            None,
        )?;
        drop(state);
        send_relayed(relayed)
    }

    /// Writes an assertion-failed record. These records are never filtered.
    pub fn log_assertion_failure(&self, record: &AssertionRecord) -> Result<(), HarnessError> {
        let mut state = self.lock();
        state.asserts_this_test += 1;
        let values = FieldValues::new()
            .with(Field::File, record.file.as_str())
            .with(Field::Line, record.line.to_string())
            .with(Field::Func, record.func.as_str())
            .with(Field::Thread, record.thread.as_str())
            .with(Field::Message, record.message.as_str());
        let relayed = self.emit(
            &mut state,
            MessageKind::AssertFailed,
            values,
            LevelFilter::threshold(self.verbosity).forced(Verbosity::Suite.level()),
            Destinations::all(),
            None,
        )?;
        drop(state);
        send_relayed(relayed)
    }

    /// Writes a free-form record at `level`.
    pub fn print(&self, level: Verbosity, message: &str) -> Result<(), HarnessError> {
        let mut state = self.lock();
        let relayed = self.emit(
            &mut state,
            MessageKind::Print,
            FieldValues::new().with(Field::Message, message),
            LevelFilter::threshold(self.verbosity).forced(level.level()),
            Destinations::all(),
            None,
        )?;
        drop(state);
        send_relayed(relayed)
    }

    /// Writes a trace record, shown only at trace verbosity unless the template says otherwise.
    pub fn trace(&self, message: &str) -> Result<(), HarnessError> {
        let mut state = self.lock();
        let relayed = self.emit(
            &mut state,
            MessageKind::Trace,
            FieldValues::new().with(Field::Message, message),
            LevelFilter::threshold(self.verbosity),
            Destinations::all(),
            None,
        )?;
        drop(state);
        send_relayed(relayed)
    }

    /// Counts a finished test and writes its test-finished record.
    pub fn report_test_finished(
        &self,
        index: usize,
        name: &str,
        status: TestStatus,
    ) -> Result<(), HarnessError> {
        let mut state = self.lock();
        let style = match status {
            TestStatus::Passed => self.styles.pass,
            TestStatus::NotExecuted => self.styles.skip,
            _ => self.styles.fail,
        };
        if let Some(suite) = &mut state.suite {
            match status {
                TestStatus::Passed => suite.counters.passed += 1,
                TestStatus::NotExecuted => {
                    suite.counters.not_executed.push((index, name.to_owned()))
                }
                status if status.is_timeout() && !self.fail_on_timeout => {
                    suite.counters.not_executed.push((index, name.to_owned()))
                }
                _ => suite.counters.failed.push((index, name.to_owned())),
            }
        }

        let values = FieldValues::new()
            .with(Field::TestIndex, index.to_string())
            .with(Field::TestName, name)
            .with(Field::TestStatus, status.description());
        let relayed = self.emit(
            &mut state,
            MessageKind::TestFinished,
            values,
            LevelFilter::threshold(self.verbosity),
            Destinations::all(),
            Some((Field::TestStatus, style)),
        )?;
        drop(state);
        send_relayed(relayed)
    }

    /// Counts a test that was scheduled but did not run. No record is written for it until the
    /// suite result.
    pub fn report_not_executed(&self, index: usize, name: &str) {
        if let Some(suite) = &mut self.lock().suite {
            suite.counters.not_executed.push((index, name.to_owned()));
        }
    }

    /// Writes the suite result to the log files, queues the console summary and closes the files.
    pub fn report_suite_finished(&self) -> Result<SuiteStatusSummary, HarnessError> {
        let mut state = self.lock();
        let Some(suite) = state.suite.take() else {
            debug!("suite finished without having started");
            return Ok(SuiteStatusSummary::default());
        };
        let summary = suite.counters.summary(&suite.name);
        let duration = format_duration_secs(suite.stopwatch.snapshot().duration);

        state.section = Section::Result;
        let mut values = self.summary_values(&state, MessageKind::Result, &summary);
        values.set(Field::Duration, duration);

        let result = self.write_result(&mut state, &suite.counters, values);
        state.section = Section::Body;
        result?;

        let summary_line = self.render_summary(&state, &suite.counters, &summary);
        state.summaries.push(summary_line);
        state.sink.close()?;

        Ok(summary)
    }

    /// Queues a console summary for a suite that never started, with every test not executed.
    pub fn report_suite_skipped(
        &self,
        suite: &str,
        tests: impl IntoIterator<Item = (usize, String)>,
    ) -> SuiteStatusSummary {
        let mut state = self.lock();
        let counters = SuiteCounters {
            passed: 0,
            failed: Vec::new(),
            not_executed: tests.into_iter().collect(),
        };
        let summary = counters.summary(suite);
        let summary_line = self.render_summary(&state, &counters, &summary);
        state.summaries.push(summary_line);
        summary
    }

    /// Prints the queued suite summaries to the console.
    pub fn flush_run_summaries(&self) {
        let mut state = self.lock();
        let summaries = std::mem::take(&mut state.summaries);
        for summary in summaries {
            state.sink.write_console(&summary);
        }
    }

    /// Writes unformatted text to the console only.
    pub fn write_console(&self, text: &str) {
        self.lock().sink.write_console(text);
    }

    /// Writes a text record relayed from an isolated test to the console and the text log.
    ///
    /// Trailing line terminators are replaced by a single newline.
    pub fn write_relayed_text(&self, text: &str) -> Result<(), LogFileError> {
        let mut state = self.lock();
        let mut line = text.trim_end_matches(['\r', '\n']).to_owned();
        line.push('\n');
        state.sink.write_console(&line);
        state.sink.write_text(&line)
    }

    /// Writes an XML record relayed from an isolated test to the XML log, verbatim.
    pub fn write_relayed_xml(&self, xml: &str) -> Result<(), LogFileError> {
        self.lock().sink.write_xml(xml)
    }

    fn lock(&self) -> MutexGuard<'_, LoggerState> {
        // A panicking test thread must not take the log down with it.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fill_standard(&self, state: &LoggerState, kind: MessageKind, values: &mut FieldValues) {
        let now = Local::now();
        values
            .set(Field::Class, kind.class())
            .set(Field::Date, format_date(&now))
            .set(Field::Time, format_time(&now))
            .set(Field::Section, state.section.as_str());
    }

    fn emit(
        &self,
        state: &mut LoggerState,
        kind: MessageKind,
        mut values: FieldValues,
        filter: LevelFilter,
        destinations: Destinations,
        styled: Option<(Field, Style)>,
    ) -> Result<Option<RelayedRecord>, HarnessError> {
        self.fill_standard(state, kind, &mut values);

        // Relaying blocks on the parent, so the records are only rendered here.
        if let Some(relay) = &state.relay {
            let text = self.engine.render(kind, OutputFlavor::Text, filter, &values);
            let xml = if destinations.contains(Destinations::XML)
                && self.log_type.destinations().contains(Destinations::XML)
            {
                Some(self.engine.render(kind, OutputFlavor::Xml, filter, &values))
            } else {
                None
            };
            return Ok(Some(RelayedRecord {
                relay: Arc::clone(&relay.0),
                text,
                xml,
            }));
        }

        let active = state.sink.active() & destinations;
        if active.intersects(Destinations::CONSOLE | Destinations::TEXT) {
            let text = self.engine.render(kind, OutputFlavor::Text, filter, &values);
            if active.contains(Destinations::CONSOLE) {
                match styled {
                    Some((field, style)) if self.styles.colored => {
                        let mut console_values = values.clone();
                        console_values.set(field, values.get(field).style(style).to_string());
                        let console = self.engine.render(
                            kind,
                            OutputFlavor::Text,
                            filter,
                            &console_values,
                        );
                        state.sink.write_console(&console);
                    }
                    _ => state.sink.write_console(&text),
                }
            }
            if active.contains(Destinations::TEXT) {
                state.sink.write_text(&text)?;
            }
        }
        if active.contains(Destinations::XML) {
            let xml = self.engine.render(kind, OutputFlavor::Xml, filter, &values);
            state.sink.write_xml(&xml)?;
        }
        Ok(None)
    }

    fn summary_values(
        &self,
        state: &LoggerState,
        kind: MessageKind,
        summary: &SuiteStatusSummary,
    ) -> FieldValues {
        let mut values = FieldValues::new()
            .with(Field::SuiteName, summary.name.as_str())
            .with(Field::SuiteStatus, summary.status().to_string())
            .with(Field::TestsFailedCount, summary.failed.to_string())
            .with(Field::TestsPassedCount, summary.passed.to_string())
            .with(Field::TestsNotExecutedCount, summary.not_executed.to_string());
        self.fill_standard(state, kind, &mut values);
        values
    }

    fn render_tables(
        &self,
        state: &LoggerState,
        counters: &SuiteCounters,
        flavor: OutputFlavor,
        values: &mut FieldValues,
    ) {
        let tables = [
            (
                &counters.failed,
                MessageKind::TestItemFailed,
                MessageKind::TestTableFailed,
                Field::TestListFailed,
                Field::TestTableFailed,
            ),
            (
                &counters.not_executed,
                MessageKind::TestItemNotExecuted,
                MessageKind::TestTableNotExecuted,
                Field::TestListNotExecuted,
                Field::TestTableNotExecuted,
            ),
        ];

        for (tests, item_kind, table_kind, list_field, table_field) in tables {
            let mut list = String::new();
            for (index, name) in tests {
                let mut item = FieldValues::new()
                    .with(Field::TestIndex, index.to_string())
                    .with(Field::TestName, name.as_str());
                self.fill_standard(state, item_kind, &mut item);
                list.push_str(&self.engine.render(
                    item_kind,
                    flavor,
                    LevelFilter::unfiltered(),
                    &item,
                ));
            }

            let mut table = FieldValues::new().with(list_field, list);
            self.fill_standard(state, table_kind, &mut table);
            let rendered = self
                .engine
                .render(table_kind, flavor, LevelFilter::unfiltered(), &table);
            values.set(table_field, rendered);
        }
    }

    fn write_result(
        &self,
        state: &mut LoggerState,
        counters: &SuiteCounters,
        values: FieldValues,
    ) -> Result<(), HarnessError> {
        if state.relay.is_some() {
            return Ok(());
        }
        let active = state.sink.active();
        if active.contains(Destinations::TEXT) {
            let mut text_values = values.clone();
            self.render_tables(state, counters, OutputFlavor::Text, &mut text_values);
            let text = self.engine.render(
                MessageKind::Result,
                OutputFlavor::Text,
                LevelFilter::unfiltered(),
                &text_values,
            );
            state.sink.write_text(&text)?;
        }
        if active.contains(Destinations::XML) {
            let mut xml_values = values;
            self.render_tables(state, counters, OutputFlavor::Xml, &mut xml_values);
            let xml = self.engine.render(
                MessageKind::Result,
                OutputFlavor::Xml,
                LevelFilter::unfiltered(),
                &xml_values,
            );
            state.sink.write_xml(&xml)?;
        }
        Ok(())
    }

    fn render_summary(
        &self,
        state: &LoggerState,
        counters: &SuiteCounters,
        summary: &SuiteStatusSummary,
    ) -> String {
        let mut values = self.summary_values(state, MessageKind::Summary, summary);
        self.render_tables(state, counters, OutputFlavor::Text, &mut values);
        if self.styles.colored {
            let status = summary.status();
            let style = match (status.passed, status.incomplete) {
                (true, false) => self.styles.pass,
                (true, true) => self.styles.skip,
                (false, _) => self.styles.fail,
            };
            values.set(
                Field::SuiteStatus,
                status.to_string().style(style).to_string(),
            );
        }
        self.engine.render(
            MessageKind::Summary,
            OutputFlavor::Text,
            LevelFilter::threshold(self.verbosity),
            &values,
        )
    }
}

impl MailboxSink for Logger {
    fn deliver_text(&self, text: &str) -> Result<(), LogFileError> {
        self.write_relayed_text(text)
    }

    fn deliver_xml(&self, xml: &str) -> Result<(), LogFileError> {
        self.write_relayed_xml(xml)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::Utf8TempDir;
    use pretty_assertions::assert_eq;
    use std::sync::OnceLock;

    struct Fixture {
        logger: Logger,
        console: Arc<Mutex<String>>,
        dir: Utf8TempDir,
    }

    impl Fixture {
        fn new(verbosity: Verbosity) -> Self {
            let dir = Utf8TempDir::new().unwrap();
            let (console, buffer) = ConsoleTarget::buffer();
            let settings = LoggerSettings {
                verbosity,
                log_dir: dir.path().to_owned(),
                filename_template: LogFileTemplate::parse("%testsuite%.%ext%").unwrap(),
                console: Some(console),
                ..LoggerSettings::default()
            };
            let logger = Logger::new(Arc::new(FormatEngine::new().unwrap()), settings);
            Self {
                logger,
                console: buffer,
                dir,
            }
        }

        fn console(&self) -> String {
            self.console.lock().unwrap().clone()
        }

        fn read(&self, name: &str) -> String {
            std::fs::read_to_string(self.dir.path().join(name)).unwrap()
        }
    }

    fn run_two_tests(logger: &Logger, second: Option<TestStatus>) -> SuiteStatusSummary {
        logger
            .report_suite_starting("arith", Iteration::SINGLE)
            .unwrap();
        logger.report_test_started(0, "arith.add", "adds").unwrap();
        logger
            .report_test_finished(0, "arith.add", TestStatus::Passed)
            .unwrap();
        match second {
            Some(status) => {
                logger.report_test_started(1, "arith.sub", "subtracts").unwrap();
                logger.report_test_finished(1, "arith.sub", status).unwrap();
            }
            None => logger.report_not_executed(1, "arith.sub"),
        }
        logger.report_suite_finished().unwrap()
    }

    #[test]
    fn summary_counts_and_status() {
        let fixture = Fixture::new(Verbosity::Suite);
        let summary = run_two_tests(&fixture.logger, Some(TestStatus::Failed));
        assert_eq!(
            summary,
            SuiteStatusSummary {
                name: "arith".to_owned(),
                passed: 1,
                failed: 1,
                not_executed: 0,
            }
        );

        let text = fixture.read("arith.txt");
        assert!(
            text.contains("Status: FAILED Failed: 1 Passed: 1 NotExecuted: 0"),
            "result in {text}"
        );
        assert!(text.contains("TestFailed     ( 1) arith.sub"), "table in {text}");

        // The summary is only printed once the run is over.
        assert!(!fixture.console().contains("SuiteSummary"));
        fixture.logger.flush_run_summaries();
        let console = fixture.console();
        assert!(
            console.contains("SuiteSummary   arith          Status: FAILED Failed: 1"),
            "summary in {console}"
        );
    }

    #[test]
    fn incomplete_suite() {
        let fixture = Fixture::new(Verbosity::Test);
        let summary = run_two_tests(&fixture.logger, None);
        assert_eq!(summary.status().to_string(), "PASSED-incomplete");

        let xml = fixture.read("arith.xml");
        assert!(xml.starts_with("<?xml"), "declaration in {xml}");
        assert!(xml.ends_with("</HarnessLog>\n"), "closed in {xml}");
        assert!(xml.contains("<TestNotExecuted>"), "table in {xml}");
        assert!(xml.contains("<SuiteStatus>PASSED-incomplete</SuiteStatus>"));
    }

    #[test]
    fn timeouts_can_count_as_not_executed() {
        let dir = Utf8TempDir::new().unwrap();
        let settings = LoggerSettings {
            log_dir: dir.path().to_owned(),
            log_type: LogType::None,
            fail_on_timeout: false,
            console: None,
            ..LoggerSettings::default()
        };
        let logger = Logger::new(Arc::new(FormatEngine::new().unwrap()), settings);
        let summary = run_two_tests(&logger, Some(TestStatus::TimeoutInTest));
        assert_eq!((summary.failed, summary.not_executed), (0, 1));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn verbosity_filters_every_destination() {
        let fixture = Fixture::new(Verbosity::Suite);
        let logger = &fixture.logger;
        logger
            .report_suite_starting("quiet", Iteration::SINGLE)
            .unwrap();
        logger.report_test_started(0, "quiet.one", "").unwrap();
        logger.print(Verbosity::Medium, "medium detail").unwrap();
        logger.print(Verbosity::Suite, "always shown").unwrap();
        logger.trace("trace detail").unwrap();
        logger
            .log_assertion_failure(&AssertionRecord {
                file: "src/quiet.rs".to_owned(),
                line: 7,
                func: "quiet.one::test".to_owned(),
                thread: "main".to_owned(),
                message: "1 != 2".to_owned(),
            })
            .unwrap();
        assert_eq!(logger.asserts_failed_this_test(), 1);
        logger
            .report_test_finished(0, "quiet.one", TestStatus::Failed)
            .unwrap();
        logger.report_suite_finished().unwrap();

        for output in [fixture.console(), fixture.read("quiet.txt")] {
            assert!(output.contains("always shown"), "print in {output}");
            assert!(output.contains("1 != 2"), "assertion in {output}");
            assert!(!output.contains("medium detail"));
            assert!(!output.contains("trace detail"));
            assert!(!output.contains("TestStarted"));
        }
        let xml = fixture.read("quiet.xml");
        assert!(xml.contains("<Message>1 != 2</Message>"));
        assert!(!xml.contains("medium detail"));
    }

    #[test]
    fn relayed_text_strips_terminators() {
        let fixture = Fixture::new(Verbosity::Suite);
        fixture
            .logger
            .report_suite_starting("relay", Iteration::SINGLE)
            .unwrap();
        fixture
            .logger
            .write_relayed_text("from the child\r\n\n")
            .unwrap();
        fixture.logger.report_suite_finished().unwrap();

        assert_eq!(fixture.console().matches("from the child\n").count(), 1);
        assert!(fixture.read("relay.txt").contains("from the child\n"));
    }

    #[derive(Default)]
    struct CollectingRelay {
        text: Mutex<Vec<String>>,
        xml: Mutex<Vec<String>>,
    }

    impl LogRelay for CollectingRelay {
        fn relay_text(&self, text: &str) -> Result<(), MailboxError> {
            self.text.lock().unwrap().push(text.to_owned());
            Ok(())
        }

        fn relay_xml(&self, xml: &str) -> Result<(), MailboxError> {
            self.xml.lock().unwrap().push(xml.to_owned());
            Ok(())
        }
    }

    #[test]
    fn relay_replaces_local_output() {
        let fixture = Fixture::new(Verbosity::Suite);
        let relay = Arc::new(CollectingRelay::default());
        fixture.logger.set_relay(relay.clone());
        fixture.logger.print(Verbosity::Suite, "hello").unwrap();
        fixture.logger.print(Verbosity::High, "filtered").unwrap();

        let text = relay.text.lock().unwrap();
        assert_eq!(text.len(), 1);
        assert!(text[0].contains("Print          hello"), "{}", text[0]);
        assert_eq!(relay.xml.lock().unwrap().len(), 1);
        assert_eq!(fixture.console(), "");
    }

    /// Reads logger state while relaying, the way a relay that blocks on the parent would.
    struct ReentrantRelay {
        logger: OnceLock<Arc<Logger>>,
        seen: Mutex<Vec<usize>>,
    }

    impl LogRelay for ReentrantRelay {
        fn relay_text(&self, _text: &str) -> Result<(), MailboxError> {
            if let Some(logger) = self.logger.get() {
                self.seen
                    .lock()
                    .unwrap()
                    .push(logger.asserts_failed_this_test());
            }
            Ok(())
        }

        fn relay_xml(&self, _xml: &str) -> Result<(), MailboxError> {
            Ok(())
        }
    }

    #[test]
    fn relay_runs_without_the_state_lock() {
        let settings = LoggerSettings {
            console: None,
            ..LoggerSettings::default()
        };
        let logger = Arc::new(Logger::new(Arc::new(FormatEngine::new().unwrap()), settings));
        let relay = Arc::new(ReentrantRelay {
            logger: OnceLock::new(),
            seen: Mutex::new(Vec::new()),
        });
        relay.logger.set(Arc::clone(&logger)).unwrap();
        logger.set_relay(relay.clone());

        logger
            .log_assertion_failure(&AssertionRecord {
                file: "src/relay.rs".to_owned(),
                line: 3,
                func: "relay.one::test".to_owned(),
                thread: "main".to_owned(),
                message: "relayed".to_owned(),
            })
            .unwrap();
        logger.print(Verbosity::Suite, "after").unwrap();
        assert_eq!(*relay.seen.lock().unwrap(), vec![1, 1]);
    }

    #[test]
    fn skipped_suite_summary() {
        let fixture = Fixture::new(Verbosity::Test);
        let summary = fixture
            .logger
            .report_suite_skipped("later", [(4, "later.a".to_owned())]);
        assert_eq!(summary.not_executed, 1);
        fixture.logger.flush_run_summaries();
        let console = fixture.console();
        assert!(console.contains("TestNotRun     ( 4) later.a"), "{console}");
        assert!(console.contains("Status: FAILED-incomplete"), "{console}");
    }

    #[test]
    fn iteration_display() {
        assert_eq!(Iteration::SINGLE.to_string(), "1 of total 1");
        let infinite = Iteration {
            current: 3,
            total: None,
        };
        assert_eq!(infinite.to_string(), "3 of infinite");
    }
}
