// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::ConfigParseErrorKind,
    format::{FormatOverrides, MessageKind, OutputFlavor},
};
use camino::Utf8Path;
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FormatFileDeserialize {
    #[serde(default)]
    text: BTreeMap<String, String>,
    #[serde(default)]
    xml: BTreeMap<String, String>,
}

/// Reads template overrides from a TOML file with `[text]` and `[xml]` tables.
pub(super) fn read_format_file(path: &Utf8Path) -> Result<FormatOverrides, ConfigParseErrorKind> {
    let contents =
        std::fs::read_to_string(path).map_err(|error| ConfigParseErrorKind::FormatFileRead {
            path: path.to_owned(),
            error,
        })?;
    parse_format_file(path, &contents)
}

fn parse_format_file(
    path: &Utf8Path,
    contents: &str,
) -> Result<FormatOverrides, ConfigParseErrorKind> {
    let file: FormatFileDeserialize =
        toml::from_str(contents).map_err(|error| ConfigParseErrorKind::FormatFileParse {
            path: path.to_owned(),
            error,
        })?;

    let mut overrides = FormatOverrides::new();
    for (flavor, table) in [(OutputFlavor::Text, file.text), (OutputFlavor::Xml, file.xml)] {
        for (name, template) in table {
            let kind = MessageKind::from_name(&name).ok_or_else(|| {
                ConfigParseErrorKind::UnknownFormatKind {
                    path: path.to_owned(),
                    kind: name.clone(),
                }
            })?;
            overrides.set(kind, flavor, template);
        }
    }
    Ok(overrides)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn overrides_by_kind_name() {
        let overrides = parse_format_file(
            Utf8Path::new("format.toml"),
            indoc! {r#"
                [text]
                test-started = "start %TestName%\n"

                [xml]
                print = "<P>%Message%</P>\n"
            "#},
        )
        .unwrap();

        assert_eq!(
            overrides.get(MessageKind::TestStarted, OutputFlavor::Text),
            Some("start %TestName%\n")
        );
        assert_eq!(
            overrides.get(MessageKind::Print, OutputFlavor::Xml),
            Some("<P>%Message%</P>\n")
        );
        assert_eq!(overrides.get(MessageKind::Print, OutputFlavor::Text), None);
    }

    #[test]
    fn unknown_kind() {
        let error = parse_format_file(
            Utf8Path::new("format.toml"),
            indoc! {r#"
                [text]
                test-exploded = "boom"
            "#},
        )
        .unwrap_err();
        assert!(
            matches!(
                &error,
                ConfigParseErrorKind::UnknownFormatKind { kind, .. } if kind == "test-exploded"
            ),
            "{error}"
        );
    }

    #[test]
    fn missing_file() {
        assert!(matches!(
            read_format_file(Utf8Path::new("/nonexistent/format.toml")),
            Err(ConfigParseErrorKind::FormatFileRead { .. })
        ));
    }
}
