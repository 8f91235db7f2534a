// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Verbosity levels and output destinations.
//!
//! Verbosity plays the role log levels play in typical loggers: every compiled template line
//! carries a level, and a line is emitted if its level is at or below the configured threshold.

use crate::errors::{LogTypeParseError, VerbosityParseError};
use bitflags::bitflags;
use serde::Deserialize;
use std::{fmt, str::FromStr};

/// The verbosity threshold for a run.
///
/// Levels are incremental: each level includes every level listed above it.
#[derive(Copy, Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd, Deserialize)]
#[cfg_attr(test, derive(test_strategy::Arbitrary))]
#[serde(rename_all = "kebab-case")]
pub enum Verbosity {
    /// Suite headers and summaries only.
    #[default]
    Suite,

    /// Test started and finished records, and everything above.
    Test,

    /// Low-detail free-form output.
    Low,

    /// Medium-detail free-form output.
    Medium,

    /// High-detail free-form output.
    High,

    /// Trace output. Lines at this level are the first to be suppressed.
    Trace,
}

impl Verbosity {
    /// All verbosity levels, least verbose first.
    pub const ALL: [Verbosity; 6] = [
        Verbosity::Suite,
        Verbosity::Test,
        Verbosity::Low,
        Verbosity::Medium,
        Verbosity::High,
        Verbosity::Trace,
    ];

    /// Returns the numeric level used by templates.
    pub fn level(self) -> u32 {
        match self {
            Verbosity::Suite => 0,
            Verbosity::Test => 1,
            Verbosity::Low => 2,
            Verbosity::Medium => 3,
            Verbosity::High => 4,
            Verbosity::Trace => 16,
        }
    }

    /// Returns true if a line at `level` passes this threshold.
    pub fn allows(self, level: u32) -> bool {
        level <= self.level()
    }

    /// Returns the string representations of the levels, in order.
    pub fn variants() -> &'static [&'static str] {
        &["suite", "test", "low", "medium", "high", "trace"]
    }

    fn as_str(self) -> &'static str {
        match self {
            Verbosity::Suite => "suite",
            Verbosity::Test => "test",
            Verbosity::Low => "low",
            Verbosity::Medium => "medium",
            Verbosity::High => "high",
            Verbosity::Trace => "trace",
        }
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verbosity {
    type Err = VerbosityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Verbosity::ALL
            .into_iter()
            .find(|verbosity| verbosity.as_str() == s)
            .ok_or_else(|| VerbosityParseError::new(s))
    }
}

bitflags! {
    /// The set of destinations a record is routed to.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Destinations: u8 {
        /// The console.
        const CONSOLE = 1 << 0;
        /// The plain-text log file.
        const TEXT = 1 << 1;
        /// The XML log file.
        const XML = 1 << 2;
    }
}

/// Which log files are written for each suite.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogType {
    /// No log files; console only.
    None,
    /// The plain-text log only.
    Text,
    /// The XML log only.
    Xml,
    /// Both log files.
    #[default]
    Both,
}

impl LogType {
    /// Returns the file destinations enabled by this log type.
    pub fn destinations(self) -> Destinations {
        match self {
            LogType::None => Destinations::empty(),
            LogType::Text => Destinations::TEXT,
            LogType::Xml => Destinations::XML,
            LogType::Both => Destinations::TEXT | Destinations::XML,
        }
    }
}

impl FromStr for LogType {
    type Err = LogTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(LogType::None),
            "text" => Ok(LogType::Text),
            "xml" => Ok(LogType::Xml),
            "both" => Ok(LogType::Both),
            other => Err(LogTypeParseError::new(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_strategy::proptest;

    #[proptest]
    fn levels_are_monotonic(a: Verbosity, b: Verbosity) {
        assert_eq!(a <= b, a.level() <= b.level());
        // A threshold always admits its own level.
        assert!(a.allows(a.level()));
    }

    #[test]
    fn parse_roundtrip() {
        for verbosity in Verbosity::ALL {
            assert_eq!(verbosity.to_string().parse::<Verbosity>().unwrap(), verbosity);
        }
        assert!("ktrace".parse::<Verbosity>().is_err());
    }

    #[test]
    fn trace_suppressed_below_trace() {
        assert!(!Verbosity::High.allows(Verbosity::Trace.level()));
        assert!(Verbosity::Trace.allows(Verbosity::High.level()));
    }
}
