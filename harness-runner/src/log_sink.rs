// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Output handles for rendered log records.
//!
//! The sink knows nothing about formatting: it routes already-rendered text to the console and to
//! the current suite's log files.

use crate::{
    errors::{LogFileAction, LogFileError},
    format::SuiteLogPaths,
    output::ConsoleTarget,
    verbosity::{Destinations, LogType},
};
use camino::{Utf8Path, Utf8PathBuf};
use std::{
    fs::File,
    io::{BufWriter, Write},
};
use tracing::{debug, warn};

#[derive(Debug)]
struct LogFile {
    path: Utf8PathBuf,
    writer: BufWriter<File>,
}

impl LogFile {
    fn create(path: &Utf8Path) -> Result<Self, LogFileError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|error| LogFileError::new(parent, LogFileAction::Create, error))?;
        }
        let file = File::create(path)
            .map_err(|error| LogFileError::new(path, LogFileAction::Create, error))?;
        debug!(%path, "opened log file");
        Ok(Self {
            path: path.to_owned(),
            writer: BufWriter::new(file),
        })
    }

    fn write_str(&mut self, text: &str) -> Result<(), LogFileError> {
        self.writer
            .write_all(text.as_bytes())
            .map_err(|error| LogFileError::new(&self.path, LogFileAction::Write, error))?;
        // Records must survive the process dying in the next test.
        self.flush()
    }

    fn flush(&mut self) -> Result<(), LogFileError> {
        self.writer
            .flush()
            .map_err(|error| LogFileError::new(&self.path, LogFileAction::Flush, error))
    }
}

/// The console echo and the open log files of the current suite.
#[derive(Debug)]
pub struct LogSink {
    console: Option<ConsoleTarget>,
    text: Option<LogFile>,
    xml: Option<LogFile>,
}

impl LogSink {
    /// Creates a sink with no open files. `console` is `None` if console echo is disabled.
    pub fn new(console: Option<ConsoleTarget>) -> Self {
        Self {
            console,
            text: None,
            xml: None,
        }
    }

    /// Opens the log files for a suite, closing any that are still open.
    ///
    /// Failing to create a file is fatal to the run.
    pub fn open(&mut self, paths: &SuiteLogPaths, log_type: LogType) -> Result<(), LogFileError> {
        self.close()?;
        let destinations = log_type.destinations();
        if destinations.contains(Destinations::TEXT) {
            self.text = Some(LogFile::create(&paths.text)?);
        }
        if destinations.contains(Destinations::XML) {
            self.xml = Some(LogFile::create(&paths.xml)?);
        }
        Ok(())
    }

    /// Returns the destinations that currently accept output.
    pub fn active(&self) -> Destinations {
        let mut active = Destinations::empty();
        active.set(Destinations::CONSOLE, self.console.is_some());
        active.set(Destinations::TEXT, self.text.is_some());
        active.set(Destinations::XML, self.xml.is_some());
        active
    }

    /// Writes to the console, if console echo is enabled.
    ///
    /// Console failures are not fatal; they are reported as warnings.
    pub fn write_console(&self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(console) = &self.console
            && let Err(error) = console.write_str(text)
        {
            warn!("failed to write to console: {error}");
        }
    }

    /// Writes to the text log, if it is open.
    pub fn write_text(&mut self, text: &str) -> Result<(), LogFileError> {
        match &mut self.text {
            Some(file) if !text.is_empty() => file.write_str(text),
            _ => Ok(()),
        }
    }

    /// Writes to the XML log, if it is open.
    pub fn write_xml(&mut self, text: &str) -> Result<(), LogFileError> {
        match &mut self.xml {
            Some(file) if !text.is_empty() => file.write_str(text),
            _ => Ok(()),
        }
    }

    /// Flushes and closes the log files.
    pub fn close(&mut self) -> Result<(), LogFileError> {
        for file in [self.text.take(), self.xml.take()].into_iter().flatten() {
            let mut file = file;
            file.flush()?;
            debug!(path = %file.path, "closed log file");
        }
        Ok(())
    }
}

impl Drop for LogSink {
    fn drop(&mut self) {
        if let Err(error) = self.close() {
            warn!("{error}");
        }
    }
}
