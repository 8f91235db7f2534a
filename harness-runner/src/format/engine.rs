// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{
    Field, FieldValues, FormatOverrides, LEVEL_MARKER, MessageKind, OutputFlavor, templates,
};
use crate::{
    errors::{FormatCompileError, FormatCompileErrorKind},
    verbosity::Verbosity,
};
use std::borrow::Cow;

/// Decides which compiled entries of a template are rendered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LevelFilter {
    threshold: Option<Verbosity>,
    forced: Option<u32>,
}

impl LevelFilter {
    /// Renders entries whose level is at or below `threshold`.
    pub fn threshold(threshold: Verbosity) -> Self {
        Self {
            threshold: Some(threshold),
            forced: None,
        }
    }

    /// Renders every entry.
    pub fn unfiltered() -> Self {
        Self {
            threshold: None,
            forced: None,
        }
    }

    /// Treats every entry as if it had `level`, overriding the level in the template.
    #[must_use]
    pub fn forced(mut self, level: u32) -> Self {
        self.forced = Some(level);
        self
    }

    /// Returns the level an entry is rendered at, or `None` if the entry is filtered out.
    fn effective_level(&self, entry_level: u32) -> Option<u32> {
        let level = self.forced.unwrap_or(entry_level);
        match self.threshold {
            Some(threshold) if !threshold.allows(level) => None,
            _ => Some(level),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Alignment {
    Left,
    Right,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Substitution {
    field: Field,
    width: usize,
    alignment: Alignment,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Part {
    Literal(String),
    Field(Substitution),
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct CompiledEntry {
    level: u32,
    parts: Vec<Part>,
}

/// A template compiled for one message kind and flavor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompiledTemplate {
    flavor: OutputFlavor,
    entries: Vec<CompiledEntry>,
}

impl CompiledTemplate {
    /// Compiles `template` for `kind` and `flavor`.
    pub fn compile(
        kind: MessageKind,
        flavor: OutputFlavor,
        template: &str,
    ) -> Result<Self, FormatCompileError> {
        let error = |reason| FormatCompileError::new(kind, flavor, reason);

        let mut entries = Vec::new();
        let mut current = CompiledEntry {
            level: Verbosity::Suite.level(),
            parts: Vec::new(),
        };
        let mut literal = String::new();
        let mut chars = template.char_indices().peekable();

        while let Some((offset, c)) = chars.next() {
            match c {
                LEVEL_MARKER => {
                    flush_literal(&mut literal, &mut current.parts);
                    let mut level = 0u32;
                    while let Some(digit) = chars.peek().and_then(|&(_, d)| d.to_digit(10)) {
                        level = level.saturating_mul(10).saturating_add(digit);
                        chars.next();
                    }
                    if !matches!(chars.next(), Some((_, ':'))) {
                        return Err(error(FormatCompileErrorKind::MissingLevelSeparator {
                            offset,
                        }));
                    }
                    let next = CompiledEntry {
                        level,
                        parts: Vec::new(),
                    };
                    let finished = std::mem::replace(&mut current, next);
                    if !finished.parts.is_empty() {
                        entries.push(finished);
                    }
                }
                '%' => {
                    let mut placeholder = String::new();
                    let mut closed = false;
                    for (_, c) in chars.by_ref() {
                        if c == '%' {
                            closed = true;
                            break;
                        }
                        placeholder.push(c);
                    }
                    if !closed {
                        return Err(error(FormatCompileErrorKind::UnclosedField { offset }));
                    }
                    let substitution = parse_substitution(kind, &placeholder).map_err(error)?;
                    flush_literal(&mut literal, &mut current.parts);
                    current.parts.push(Part::Field(substitution));
                }
                c => literal.push(c),
            }
        }

        flush_literal(&mut literal, &mut current.parts);
        if !current.parts.is_empty() {
            entries.push(current);
        }

        Ok(Self { flavor, entries })
    }

    /// Renders this template into `out`.
    pub fn render_into(&self, filter: LevelFilter, values: &FieldValues, out: &mut String) {
        for entry in &self.entries {
            let Some(level) = filter.effective_level(entry.level) else {
                continue;
            };
            for part in &entry.parts {
                match part {
                    Part::Literal(text) => out.push_str(text),
                    Part::Field(substitution) => {
                        let value: Cow<'_, str> = if substitution.field == Field::Level {
                            Cow::Owned(level.to_string())
                        } else {
                            Cow::Borrowed(values.get(substitution.field))
                        };
                        let value = if self.flavor == OutputFlavor::Xml
                            && !substitution.field.is_table()
                        {
                            Cow::Owned(escape_xml(&value).into_owned())
                        } else {
                            value
                        };
                        push_padded(out, &value, substitution.width, substitution.alignment);
                    }
                }
            }
        }
    }

    /// Returns the number of compiled entries.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

fn flush_literal(literal: &mut String, parts: &mut Vec<Part>) {
    if !literal.is_empty() {
        parts.push(Part::Literal(std::mem::take(literal)));
    }
}

fn parse_substitution(
    kind: MessageKind,
    placeholder: &str,
) -> Result<Substitution, FormatCompileErrorKind> {
    let (name, format) = match placeholder.split_once(':') {
        Some((name, format)) => (name, Some(format)),
        None => (placeholder, None),
    };

    let field = kind
        .fields()
        .iter()
        .copied()
        .find(|field| field.name() == name)
        .ok_or_else(|| FormatCompileErrorKind::UnknownField {
            field: name.to_owned(),
            allowed: kind.fields().iter().map(|field| field.name()).collect(),
        })?;

    let (alignment, width) = match format {
        None => (Alignment::Left, 0),
        Some(format) => {
            let (alignment, digits) = if let Some(digits) = format.strip_prefix('l') {
                (Alignment::Left, digits)
            } else if let Some(digits) = format.strip_prefix('r') {
                (Alignment::Right, digits)
            } else {
                (Alignment::Left, format)
            };
            let width = if digits.is_empty() {
                0
            } else {
                digits
                    .parse()
                    .map_err(|_| FormatCompileErrorKind::InvalidWidth {
                        field: name.to_owned(),
                        width: format.to_owned(),
                    })?
            };
            (alignment, width)
        }
    };

    Ok(Substitution {
        field,
        width,
        alignment,
    })
}

fn push_padded(out: &mut String, value: &str, width: usize, alignment: Alignment) {
    let padding = width.saturating_sub(value.chars().count());
    match alignment {
        Alignment::Left => {
            out.push_str(value);
            out.extend(std::iter::repeat_n(' ', padding));
        }
        Alignment::Right => {
            out.extend(std::iter::repeat_n(' ', padding));
            out.push_str(value);
        }
    }
}

/// Escapes the characters that are special in XML text and attribute values.
pub fn escape_xml(value: &str) -> Cow<'_, str> {
    if !value.contains(['<', '>', '"', '\'', '&']) {
        return Cow::Borrowed(value);
    }

    let mut escaped = String::with_capacity(value.len() + 16);
    for c in value.chars() {
        match c {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            '&' => escaped.push_str("&amp;"),
            c => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}

#[derive(Clone, Debug)]
struct CompiledKind {
    text: CompiledTemplate,
    xml: CompiledTemplate,
}

/// The compiled templates for every message kind and flavor.
///
/// Built once at startup and immutable afterwards; rendering has no side effects.
#[derive(Clone, Debug)]
pub struct FormatEngine {
    kinds: Vec<CompiledKind>,
}

impl FormatEngine {
    /// Compiles the built-in templates.
    pub fn new() -> Result<Self, FormatCompileError> {
        Self::with_overrides(&FormatOverrides::default())
    }

    /// Compiles the built-in templates, replacing those named in `overrides`.
    pub fn with_overrides(overrides: &FormatOverrides) -> Result<Self, FormatCompileError> {
        let kinds = MessageKind::ALL
            .into_iter()
            .map(|kind| {
                let compile = |flavor| {
                    let template = overrides
                        .get(kind, flavor)
                        .unwrap_or_else(|| templates::default_template(kind, flavor));
                    CompiledTemplate::compile(kind, flavor, template)
                };
                Ok(CompiledKind {
                    text: compile(OutputFlavor::Text)?,
                    xml: compile(OutputFlavor::Xml)?,
                })
            })
            .collect::<Result<Vec<_>, FormatCompileError>>()?;
        Ok(Self { kinds })
    }

    /// Returns the compiled template for `kind` in `flavor`.
    pub fn template(&self, kind: MessageKind, flavor: OutputFlavor) -> &CompiledTemplate {
        let compiled = &self.kinds[kind.index()];
        match flavor {
            OutputFlavor::Text => &compiled.text,
            OutputFlavor::Xml => &compiled.xml,
        }
    }

    /// Renders a record.
    ///
    /// The result is the concatenation of every entry that passes `filter`, which may be empty.
    pub fn render(
        &self,
        kind: MessageKind,
        flavor: OutputFlavor,
        filter: LevelFilter,
        values: &FieldValues,
    ) -> String {
        let mut out = String::new();
        self.template(kind, flavor)
            .render_into(filter, values, &mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use test_case::test_case;

    fn compile(kind: MessageKind, template: &str) -> CompiledTemplate {
        CompiledTemplate::compile(kind, OutputFlavor::Text, template).expect("template compiles")
    }

    fn compile_err(kind: MessageKind, template: &str) -> FormatCompileError {
        CompiledTemplate::compile(kind, OutputFlavor::Text, template)
            .expect_err("template fails to compile")
    }

    fn render(template: &CompiledTemplate, filter: LevelFilter, values: &FieldValues) -> String {
        let mut out = String::new();
        template.render_into(filter, values, &mut out);
        out
    }

    #[test]
    fn xml_escapes_values_text_does_not() {
        let engine = FormatEngine::new().unwrap();
        let values = FieldValues::new().with(Field::Message, "<tag>\"quoted\"");

        let xml = engine.render(
            MessageKind::Print,
            OutputFlavor::Xml,
            LevelFilter::unfiltered(),
            &values,
        );
        assert!(
            xml.contains("&lt;tag&gt;&quot;quoted&quot;"),
            "escaped value in {xml}"
        );
        assert!(!xml.contains("<tag>"));

        let text = engine.render(
            MessageKind::Print,
            OutputFlavor::Text,
            LevelFilter::unfiltered(),
            &values,
        );
        assert!(text.contains("<tag>\"quoted\""), "raw value in {text}");
    }

    #[test]
    fn escape_all_special_characters() {
        assert_eq!(
            escape_xml("a<b>c\"d'e&f"),
            "a&lt;b&gt;c&quot;d&apos;e&amp;f"
        );
        assert!(matches!(escape_xml("plain"), Cow::Borrowed("plain")));
    }

    #[test_case("%TestName:8%|", "abc     |"; "left default")]
    #[test_case("%TestName:l8%|", "abc     |"; "left explicit")]
    #[test_case("%TestName:r8%|", "     abc|"; "right")]
    #[test_case("%TestName:2%|", "abc|"; "never truncates")]
    #[test_case("%TestName:r%|", "abc|"; "alignment without width")]
    fn padding(template: &str, expected: &str) {
        let compiled = compile(MessageKind::TestStarted, template);
        let values = FieldValues::new().with(Field::TestName, "abc");
        assert_eq!(
            render(&compiled, LevelFilter::unfiltered(), &values),
            expected
        );
    }

    #[test]
    fn entries_are_filtered_by_level() {
        let compiled = compile(
            MessageKind::Print,
            "always\n~1:test %Message%\n~4:high\n~16:trace\n",
        );
        assert_eq!(compiled.entry_count(), 4);
        let values = FieldValues::new().with(Field::Message, "m");

        assert_eq!(
            render(&compiled, LevelFilter::threshold(Verbosity::Suite), &values),
            "always\n"
        );
        assert_eq!(
            render(&compiled, LevelFilter::threshold(Verbosity::High), &values),
            "always\ntest m\nhigh\n"
        );
        assert_eq!(
            render(&compiled, LevelFilter::unfiltered(), &values),
            "always\ntest m\nhigh\ntrace\n"
        );
    }

    #[test]
    fn forced_level_overrides_entry_levels() {
        let compiled = compile(MessageKind::Print, "~16:[%Level%] %Message%\n");
        let values = FieldValues::new().with(Field::Message, "m");

        let filter = LevelFilter::threshold(Verbosity::Suite);
        assert_eq!(render(&compiled, filter, &values), "");
        assert_eq!(render(&compiled, filter.forced(0), &values), "[0] m\n");
        assert_eq!(
            render(
                &compiled,
                LevelFilter::threshold(Verbosity::Medium).forced(3),
                &values
            ),
            "[3] m\n"
        );
    }

    #[test]
    fn marker_without_digits_is_suite_level() {
        let compiled = compile(MessageKind::Print, "~:a\n~2:b\n");
        let values = FieldValues::new();
        assert_eq!(
            render(&compiled, LevelFilter::threshold(Verbosity::Suite), &values),
            "a\n"
        );
    }

    #[test]
    fn table_fields_are_not_escaped_twice() {
        let compiled = CompiledTemplate::compile(
            MessageKind::TestTableFailed,
            OutputFlavor::Xml,
            "%TestListFailed%",
        )
        .unwrap();
        let values =
            FieldValues::new().with(Field::TestListFailed, "<TestName>a&amp;b</TestName>");
        assert_eq!(
            render(&compiled, LevelFilter::unfiltered(), &values),
            "<TestName>a&amp;b</TestName>"
        );
    }

    #[test]
    fn compile_errors() {
        let error = compile_err(MessageKind::Print, "%Bogus%");
        assert!(matches!(
            error.reason(),
            FormatCompileErrorKind::UnknownField { field, .. } if field == "Bogus"
        ));

        // TestName is not a Print field.
        let error = compile_err(MessageKind::Print, "%TestName%");
        assert_eq!(error.kind(), MessageKind::Print);

        let error = compile_err(MessageKind::Print, "abc %Message");
        assert_eq!(
            error.reason(),
            &FormatCompileErrorKind::UnclosedField { offset: 4 }
        );

        let error = compile_err(MessageKind::Print, "~12x");
        assert_eq!(
            error.reason(),
            &FormatCompileErrorKind::MissingLevelSeparator { offset: 0 }
        );

        let error = compile_err(MessageKind::Print, "%Message:r1x%");
        assert!(matches!(
            error.reason(),
            FormatCompileErrorKind::InvalidWidth { .. }
        ));

        // `%%` is not an escape.
        compile_err(MessageKind::Print, "100%%");
    }

    #[test]
    fn builtin_templates_compile() {
        let engine = FormatEngine::new().expect("built-in templates compile");
        for kind in MessageKind::ALL {
            for flavor in [OutputFlavor::Text, OutputFlavor::Xml] {
                assert!(
                    engine.template(kind, flavor).entry_count() > 0,
                    "{kind} {flavor} has entries"
                );
            }
        }
    }

    #[test]
    fn overrides_replace_builtin() {
        let mut overrides = FormatOverrides::new();
        overrides.set(MessageKind::Print, OutputFlavor::Text, "PRINT %Message%\n");
        let engine = FormatEngine::with_overrides(&overrides).unwrap();
        let values = FieldValues::new().with(Field::Message, "hi");
        assert_eq!(
            engine.render(
                MessageKind::Print,
                OutputFlavor::Text,
                LevelFilter::unfiltered(),
                &values
            ),
            "PRINT hi\n"
        );

        overrides.set(MessageKind::Header, OutputFlavor::Xml, "%Message%");
        assert!(FormatEngine::with_overrides(&overrides).is_err());
    }

    proptest! {
        #[test]
        fn render_is_idempotent(
            message in ".*",
            name in "[a-z<>&\"']{0,12}",
            index in 0usize..1000,
        ) {
            let engine = FormatEngine::new().unwrap();
            let values = FieldValues::new()
                .with(Field::Message, message)
                .with(Field::TestName, name)
                .with(Field::TestIndex, index.to_string());
            for kind in MessageKind::ALL {
                for flavor in [OutputFlavor::Text, OutputFlavor::Xml] {
                    let first = engine.render(kind, flavor, LevelFilter::unfiltered(), &values);
                    let second = engine.render(kind, flavor, LevelFilter::unfiltered(), &values);
                    prop_assert_eq!(first, second);
                }
            }
        }

        #[test]
        fn padding_never_truncates(value in "[a-zA-Z0-9 ]{0,40}", width in 0usize..30) {
            let mut out = String::new();
            push_padded(&mut out, &value, width, Alignment::Right);
            prop_assert!(out.ends_with(value.as_str()));
            prop_assert_eq!(out.chars().count(), value.chars().count().max(width));
        }
    }
}
