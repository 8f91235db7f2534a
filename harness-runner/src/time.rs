// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wall-clock and monotonic time for suite records.
//!
//! Record timestamps come from the local realtime clock. Suite durations are measured with an
//! `Instant`, so they are not affected by clock adjustments.

use chrono::{DateTime, Local};
use std::time::{Duration, Instant};

pub(crate) fn stopwatch() -> StopwatchStart {
    StopwatchStart::new()
}

/// The start state of a stopwatch.
#[derive(Clone, Debug)]
pub(crate) struct StopwatchStart {
    instant: Instant,
}

impl StopwatchStart {
    fn new() -> Self {
        Self {
            instant: Instant::now(),
        }
    }

    pub(crate) fn snapshot(&self) -> StopwatchSnapshot {
        StopwatchSnapshot {
            duration: self.instant.elapsed(),
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct StopwatchSnapshot {
    pub(crate) duration: Duration,
}

/// Formats the `Date` field of a record: `MM/DD/YY`.
pub(crate) fn format_date(when: &DateTime<Local>) -> String {
    when.format("%m/%d/%y").to_string()
}

/// Formats the `Time` field of a record: `HH:MM:SS.mmm`.
pub(crate) fn format_time(when: &DateTime<Local>) -> String {
    when.format("%H:%M:%S%.3f").to_string()
}

/// Formats a suite duration in seconds with millisecond precision.
pub(crate) fn format_duration_secs(duration: Duration) -> String {
    format!("{:.3}", duration.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn record_timestamps() {
        let when = Local
            .with_ymd_and_hms(2024, 3, 7, 9, 5, 2)
            .single()
            .expect("unambiguous local time");
        assert_eq!(format_date(&when), "03/07/24");
        assert_eq!(format_time(&when), "09:05:02.000");
    }

    #[test]
    fn duration_formatting() {
        assert_eq!(format_duration_secs(Duration::from_millis(1500)), "1.500");
        assert_eq!(format_duration_secs(Duration::ZERO), "0.000");
    }

    #[test]
    fn stopwatch_elapses() {
        let start = stopwatch();
        std::thread::sleep(Duration::from_millis(20));
        let snapshot = start.snapshot();
        assert!(snapshot.duration >= Duration::from_millis(20));
    }
}
