// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::{FilenameTemplateError, FilenameTemplateErrorKind};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{Datelike, NaiveDateTime, Timelike};
use std::fmt::Write as _;

/// The log file name template used when none is configured.
pub const DEFAULT_LOG_FILE_TEMPLATE: &str = "%testsuite%_%YYYYMMDD%_%hhmmss%.%ext%";

/// Extension of the text log.
pub const TEXT_LOG_EXTENSION: &str = "txt";
/// Extension of the XML log.
pub const XML_LOG_EXTENSION: &str = "xml";
/// Extension reserved for crash dumps.
pub const DUMP_EXTENSION: &str = "dmp";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DatePart {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
}

impl DatePart {
    fn from_char(c: char) -> Option<Self> {
        match c {
            'Y' => Some(DatePart::Year),
            'M' => Some(DatePart::Month),
            'D' => Some(DatePart::Day),
            'h' => Some(DatePart::Hour),
            'm' => Some(DatePart::Minute),
            's' => Some(DatePart::Second),
            _ => None,
        }
    }

    fn value(self, when: &NaiveDateTime) -> u32 {
        match self {
            // Years before the common era are not meaningful in file names.
            DatePart::Year => u32::try_from(when.year()).unwrap_or(0),
            DatePart::Month => when.month(),
            DatePart::Day => when.day(),
            DatePart::Hour => when.hour(),
            DatePart::Minute => when.minute(),
            DatePart::Second => when.second(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Token {
    Literal(String),
    Suite,
    Extension,
    /// A run of the same date character, e.g. `YYYY`.
    Date { part: DatePart, width: usize },
}

/// A parsed log file name template.
///
/// Templates are literal text mixed with tokens between `%` signs:
///
/// * `%testsuite%`: the suite name.
/// * `%ext%`: the file extension, without the dot.
/// * runs of `Y`, `M`, `D`, `h`, `m` and `s` for year, month, day, hour, minute and second, such
///   as `%YYYYMMDD%`. Each run keeps as many trailing digits as it is long, so `%YY%` is the
///   two-digit year.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogFileTemplate {
    tokens: Vec<Token>,
}

impl LogFileTemplate {
    /// Parses a template.
    pub fn parse(template: &str) -> Result<Self, FilenameTemplateError> {
        let error = |reason| FilenameTemplateError::new(template, reason);

        let mut tokens = Vec::new();
        let mut rest = template;
        while let Some(start) = rest.find('%') {
            if start > 0 {
                tokens.push(Token::Literal(rest[..start].to_owned()));
            }
            let after = &rest[start + 1..];
            let end = after
                .find('%')
                .ok_or_else(|| error(FilenameTemplateErrorKind::UnclosedToken))?;
            let token = &after[..end];
            match token {
                "testsuite" => tokens.push(Token::Suite),
                "ext" => tokens.push(Token::Extension),
                _ => parse_date_token(token, &mut tokens).ok_or_else(|| {
                    error(FilenameTemplateErrorKind::UnknownToken {
                        token: token.to_owned(),
                    })
                })?,
            }
            rest = &after[end + 1..];
        }
        if !rest.is_empty() {
            tokens.push(Token::Literal(rest.to_owned()));
        }

        Ok(Self { tokens })
    }

    /// Renders a file name.
    pub fn render(&self, suite: &str, ext: &str, when: &NaiveDateTime) -> String {
        let mut out = String::new();
        for token in &self.tokens {
            match token {
                Token::Literal(text) => out.push_str(text),
                Token::Suite => out.push_str(suite),
                Token::Extension => out.push_str(ext),
                Token::Date { part, width } => {
                    let digits = format!("{:0pad$}", part.value(when), pad = (*width).max(4));
                    let keep = digits.len().min(*width);
                    // Digits are ASCII, so slicing by byte is fine.
                    _ = write!(out, "{}", &digits[digits.len() - keep..]);
                }
            }
        }
        out
    }

    /// Returns the paths of the logs for `suite` in `log_dir`.
    pub fn paths(&self, log_dir: &Utf8Path, suite: &str, when: &NaiveDateTime) -> SuiteLogPaths {
        let path = |ext| log_dir.join(self.render(suite, ext, when));
        SuiteLogPaths {
            text: path(TEXT_LOG_EXTENSION),
            xml: path(XML_LOG_EXTENSION),
            dump: path(DUMP_EXTENSION),
        }
    }
}

impl Default for LogFileTemplate {
    fn default() -> Self {
        Self::parse(DEFAULT_LOG_FILE_TEMPLATE).unwrap_or(Self { tokens: Vec::new() })
    }
}

fn parse_date_token(token: &str, tokens: &mut Vec<Token>) -> Option<()> {
    let mut chars = token.chars().peekable();
    chars.peek()?;
    while let Some(c) = chars.next() {
        let part = DatePart::from_char(c)?;
        let mut width = 1;
        while chars.next_if_eq(&c).is_some() {
            width += 1;
        }
        tokens.push(Token::Date { part, width });
    }
    Some(())
}

/// The log files of one suite.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SuiteLogPaths {
    /// The text log.
    pub text: Utf8PathBuf,
    /// The XML log.
    pub xml: Utf8PathBuf,
    /// Where a crash dump would be written.
    pub dump: Utf8PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use test_case::test_case;

    fn when() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 7)
            .and_then(|date| date.and_hms_opt(9, 5, 42))
            .expect("valid date")
    }

    #[test_case("%testsuite%_%YYYY%%MM%%DD%.%ext%", "asserts_20240307.txt"; "separate groups")]
    #[test_case(DEFAULT_LOG_FILE_TEMPLATE, "asserts_20240307_090542.txt"; "default")]
    #[test_case("%YYMMDD%-%testsuite%", "240307-asserts"; "two digit year")]
    #[test_case("%hh%h%mm%", "09h05"; "literal between tokens")]
    #[test_case("log.%ext%", "log.txt"; "no suite")]
    #[test_case("%D%", "7"; "single digit keeps last digit")]
    fn render(template: &str, expected: &str) {
        let template = LogFileTemplate::parse(template).expect("template parses");
        assert_eq!(template.render("asserts", "txt", &when()), expected);
    }

    #[test]
    fn parse_errors() {
        let error = LogFileTemplate::parse("%testsuite%_%bogus%.%ext%").unwrap_err();
        assert_eq!(
            error.reason(),
            &FilenameTemplateErrorKind::UnknownToken {
                token: "bogus".to_owned()
            }
        );

        let error = LogFileTemplate::parse("%testsuite%_%YYYY").unwrap_err();
        assert_eq!(error.reason(), &FilenameTemplateErrorKind::UnclosedToken);

        let error = LogFileTemplate::parse("a%%b").unwrap_err();
        assert!(matches!(
            error.reason(),
            FilenameTemplateErrorKind::UnknownToken { token } if token.is_empty()
        ));
    }

    #[test]
    fn paths_share_a_stem() {
        let template = LogFileTemplate::default();
        let paths = template.paths(Utf8Path::new("logs"), "suite", &when());
        assert_eq!(paths.text, "logs/suite_20240307_090542.txt");
        assert_eq!(paths.xml, "logs/suite_20240307_090542.xml");
        assert_eq!(paths.dump, "logs/suite_20240307_090542.dmp");
    }
}
