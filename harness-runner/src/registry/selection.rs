// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::SelectionParseError;
use std::{fmt, str::FromStr};

/// Selects a test by registration index or by name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TestSelector {
    /// The test with this registration index.
    Index(usize),
    /// The test with this identifier, or this `suite.test` name.
    Name(String),
}

impl TestSelector {
    fn matches(&self, suite: &str, id: &str, index: usize) -> bool {
        match self {
            TestSelector::Index(selected) => *selected == index,
            TestSelector::Name(name) => {
                name == id
                    || name
                        .strip_prefix(suite)
                        .and_then(|rest| rest.strip_prefix('.'))
                        == Some(id)
            }
        }
    }
}

/// An inclusive range of registration indices.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexRange {
    /// The first index in the range.
    pub start: usize,
    /// The last index in the range.
    pub end: usize,
}

impl IndexRange {
    /// Returns true if `index` lies in the range.
    pub fn contains(&self, index: usize) -> bool {
        (self.start..=self.end).contains(&index)
    }
}

impl FromStr for IndexRange {
    type Err = SelectionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SelectionParseError::InvalidRange {
            input: s.to_owned(),
        };
        let parse = |value: &str| value.trim().parse::<usize>().map_err(|_| invalid());

        let (start, end) = match s.split_once('-') {
            Some((start, end)) => (parse(start)?, parse(end)?),
            None => {
                let index = parse(s)?;
                (index, index)
            }
        };
        if start > end {
            return Err(SelectionParseError::ReversedRange { start, end });
        }
        Ok(Self { start, end })
    }
}

impl fmt::Display for IndexRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// Which registered tests are scheduled to run.
///
/// Selection is applied at registration time. A test that is not selected still receives a
/// registration index, so numbering is the same in filtered and unfiltered runs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSelection {
    tests: Vec<TestSelector>,
    range: Option<IndexRange>,
    suites: Vec<String>,
}

impl RunSelection {
    /// A selection that schedules every test.
    pub fn all() -> Self {
        Self::default()
    }

    /// Restricts the run to the listed tests.
    pub fn with_tests(mut self, tests: impl IntoIterator<Item = TestSelector>) -> Self {
        self.tests = tests.into_iter().collect();
        self
    }

    /// Restricts the run to a range of indices.
    pub fn with_range(mut self, range: IndexRange) -> Self {
        self.range = Some(range);
        self
    }

    /// Restricts the run to the listed suites.
    pub fn with_suites(mut self, suites: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.suites = suites.into_iter().map(Into::into).collect();
        self
    }

    /// Parses a comma-separated list of test names and indices.
    pub fn parse_tests(input: &str) -> Result<Vec<TestSelector>, SelectionParseError> {
        split_list(input).map(|items| {
            items
                .into_iter()
                .map(|item| match item.parse() {
                    Ok(index) => TestSelector::Index(index),
                    Err(_) => TestSelector::Name(item.to_owned()),
                })
                .collect()
        })
    }

    /// Parses a comma-separated list of suite names.
    pub fn parse_suites(input: &str) -> Result<Vec<String>, SelectionParseError> {
        split_list(input).map(|items| items.into_iter().map(str::to_owned).collect())
    }

    /// Returns true if any filter is configured.
    pub fn is_active(&self) -> bool {
        !self.tests.is_empty() || self.range.is_some() || !self.suites.is_empty()
    }

    /// Returns true if tests of `suite` may be scheduled.
    pub fn includes_suite(&self, suite: &str) -> bool {
        self.suites.is_empty() || self.suites.iter().any(|name| name == suite)
    }

    /// Returns true if the test is scheduled. Every configured filter must match.
    pub fn includes(&self, suite: &str, id: &str, index: usize) -> bool {
        self.includes_suite(suite)
            && (self.tests.is_empty()
                || self
                    .tests
                    .iter()
                    .any(|selector| selector.matches(suite, id, index)))
            && self.range.is_none_or(|range| range.contains(index))
    }
}

fn split_list(input: &str) -> Result<Vec<&str>, SelectionParseError> {
    input
        .split(',')
        .map(|item| {
            let item = item.trim();
            if item.is_empty() {
                Err(SelectionParseError::EmptyItem {
                    input: input.to_owned(),
                })
            } else {
                Ok(item)
            }
        })
        .collect()
}
