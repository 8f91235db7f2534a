// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Console output and internal diagnostics.

use owo_colors::{OwoColorize, Style, style};
use serde::Deserialize;
use std::{
    fmt,
    io::{self, Write},
    str::FromStr,
    sync::{Arc, Mutex, Once, PoisonError},
    thread,
};
use tracing::{
    Event, Level, Subscriber,
    field::{Field, Visit},
    level_filters::LevelFilter,
};
use tracing_subscriber::{
    Layer,
    filter::Targets,
    fmt::{FmtContext, FormatEvent, FormatFields, format},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
};

/// The environment variable holding the diagnostic log filter.
pub const HARNESS_LOG_ENV: &str = "HARNESS_LOG";

/// Whether to produce colored console output.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[must_use]
pub enum Color {
    /// Color if the stream supports it.
    #[default]
    Auto,
    /// Always color.
    Always,
    /// Never color.
    Never,
}

impl Color {
    /// Returns true if output to `stream` should be colored.
    pub fn should_colorize(self, stream: supports_color::Stream) -> bool {
        match self {
            Color::Auto => supports_color::on_cached(stream).is_some(),
            Color::Always => true,
            Color::Never => false,
        }
    }
}

impl FromStr for Color {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Color::Auto),
            "always" => Ok(Color::Always),
            "never" => Ok(Color::Never),
            other => Err(format!(
                "unrecognized value for color: {other} (known values: auto, always, never)"
            )),
        }
    }
}

static INIT_TRACING: Once = Once::new();

/// Installs the diagnostic subscriber, which writes to stderr.
///
/// The filter is read from `HARNESS_LOG` and defaults to `warn`. Only the first call in a process
/// has any effect.
pub fn init_tracing(color: Color) {
    let styles = if color.should_colorize(supports_color::Stream::Stderr) {
        DiagnosticStyles::colored()
    } else {
        DiagnosticStyles::default()
    };

    INIT_TRACING.call_once(|| {
        let level_str = std::env::var(HARNESS_LOG_ENV).unwrap_or_default();
        let targets = if level_str.is_empty() {
            Targets::new().with_default(LevelFilter::WARN)
        } else {
            level_str.parse().unwrap_or_else(|error| {
                eprintln!("ignoring invalid {HARNESS_LOG_ENV} value `{level_str}`: {error}");
                Targets::new().with_default(LevelFilter::WARN)
            })
        };

        let layer = tracing_subscriber::fmt::layer()
            .event_format(DiagnosticFormatter { styles })
            .with_writer(io::stderr)
            .with_filter(targets);

        // Another subscriber may already be installed, for example by an embedding test binary.
        _ = tracing_subscriber::registry().with(layer).try_init();
    });
}

/// Writes each diagnostic as `level: [thread] message key=value ...`.
///
/// Phase workers are named `suite.test::phase`, which ties a diagnostic to the test and phase
/// that emitted it. Unnamed threads and `main` get no tag.
struct DiagnosticFormatter {
    styles: DiagnosticStyles,
}

impl<S, N> FormatEvent<S, N> for DiagnosticFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let (label, label_style) = self.styles.for_level(*event.metadata().level());
        write!(writer, "{}: ", label.style(label_style))?;
        if let Some(name) = thread::current().name().filter(|name| *name != "main") {
            write!(writer, "[{}] ", name.style(self.styles.thread))?;
        }

        let mut fields = FieldWriter {
            writer: &mut writer,
            result: Ok(()),
        };
        event.record(&mut fields);
        fields.result?;

        writeln!(writer)
    }
}

struct FieldWriter<'a, 'writer> {
    writer: &'a mut format::Writer<'writer>,
    result: fmt::Result,
}

impl FieldWriter<'_, '_> {
    fn write_field(&mut self, field: &Field, value: fmt::Arguments<'_>) {
        if self.result.is_err() {
            return;
        }
        self.result = if field.name() == "message" {
            self.writer.write_fmt(value)
        } else {
            write!(self.writer, " {}={value}", field.name())
        };
    }
}

impl Visit for FieldWriter<'_, '_> {
    // Paths and suite names read better unquoted.
    fn record_str(&mut self, field: &Field, value: &str) {
        self.write_field(field, format_args!("{value}"));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.write_field(field, format_args!("{value:?}"));
    }
}

#[derive(Debug, Default)]
struct DiagnosticStyles {
    error: Style,
    warning: Style,
    info: Style,
    debug: Style,
    trace: Style,
    thread: Style,
}

impl DiagnosticStyles {
    fn colored() -> Self {
        Self {
            error: style().red().bold(),
            warning: style().yellow().bold(),
            info: style().bold(),
            debug: style().bold(),
            trace: style().dimmed(),
            thread: style().cyan(),
        }
    }

    fn for_level(&self, level: Level) -> (&'static str, Style) {
        match level {
            Level::ERROR => ("error", self.error),
            Level::WARN => ("warning", self.warning),
            Level::INFO => ("info", self.info),
            Level::DEBUG => ("debug", self.debug),
            Level::TRACE => ("trace", self.trace),
        }
    }
}

/// Styles for status words echoed to the console.
#[derive(Clone, Debug, Default)]
pub(crate) struct ConsoleStyles {
    pub(crate) colored: bool,
    pub(crate) pass: Style,
    pub(crate) fail: Style,
    pub(crate) skip: Style,
}

impl ConsoleStyles {
    pub(crate) fn new(color: Color) -> Self {
        let mut styles = Self::default();
        if color.should_colorize(supports_color::Stream::Stdout) {
            styles.colored = true;
            styles.pass = style().green().bold();
            styles.fail = style().red().bold();
            styles.skip = style().yellow().bold();
        }
        styles
    }
}

/// Where console echo of log records goes.
#[derive(Clone, Debug, Default)]
pub enum ConsoleTarget {
    /// The process's standard output.
    #[default]
    Stdout,
    /// An in-memory buffer, for capturing console output.
    Buffer(Arc<Mutex<String>>),
}

impl ConsoleTarget {
    /// Creates a buffer target, returning the target and a handle to its contents.
    pub fn buffer() -> (Self, Arc<Mutex<String>>) {
        let buffer = Arc::new(Mutex::new(String::new()));
        (Self::Buffer(buffer.clone()), buffer)
    }

    /// Writes `text` and flushes.
    pub(crate) fn write_str(&self, text: &str) -> io::Result<()> {
        match self {
            Self::Stdout => {
                let mut stdout = io::stdout().lock();
                stdout.write_all(text.as_bytes())?;
                stdout.flush()
            }
            Self::Buffer(buffer) => {
                buffer
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push_str(text);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_parses() {
        assert_eq!("never".parse::<Color>(), Ok(Color::Never));
        assert!("sometimes".parse::<Color>().is_err());
        assert!(Color::Always.should_colorize(supports_color::Stream::Stdout));
        assert!(!Color::Never.should_colorize(supports_color::Stream::Stdout));
    }

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn diagnostics_name_the_phase_thread() {
        let buffer = SharedBuffer::default();
        let layer = tracing_subscriber::fmt::layer()
            .event_format(DiagnosticFormatter {
                styles: DiagnosticStyles::default(),
            })
            .with_writer({
                let buffer = buffer.clone();
                move || buffer.clone()
            });
        let subscriber = tracing_subscriber::registry().with(layer);

        thread::Builder::new()
            .name("math.add::tear_down".to_owned())
            .spawn(move || {
                tracing::subscriber::with_default(subscriber, || {
                    tracing::warn!(path = "logs/math.txt", attempts = 2, "could not flush");
                });
            })
            .unwrap()
            .join()
            .unwrap();

        let output = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        assert_eq!(
            output,
            "warning: [math.add::tear_down] could not flush path=logs/math.txt attempts=2\n"
        );
    }

    #[test]
    fn buffer_target_collects() {
        let (target, buffer) = ConsoleTarget::buffer();
        target.write_str("a\n").unwrap();
        target.write_str("b\n").unwrap();
        assert_eq!(*buffer.lock().unwrap(), "a\nb\n");
    }
}
