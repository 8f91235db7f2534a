// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Built-in templates.

use super::{MessageKind, OutputFlavor};

// Standard prefix for text entries. Class is not part of it; lines add it where wanted.
macro_rules! text_std {
    () => {
        "%Date% %Time% %Level:r2% %Section:6% "
    };
}

macro_rules! xml_std {
    ($tab:literal) => {
        concat!(
            $tab, "<Date>%Date%</Date>\n",
            $tab, "<Time>%Time%</Time>\n",
            $tab, "<Level>%Level%</Level>\n",
            $tab, "<Class>%Class%</Class>\n",
        )
    };
}

macro_rules! xml_field {
    ($tab:literal, $name:literal) => {
        concat!($tab, "<", $name, ">%", $name, "%</", $name, ">\n")
    };
}

const TEXT_HEADER: &str = concat!(
    "~1:", text_std!(), "Iteration      %Iteration%\n",
    "~1:", text_std!(), "%FormatName:14% Version %Version%\n",
    "~0:", text_std!(), "TestSuite      %SuiteName%\n",
    "~0:", text_std!(), "LogFile        %LogFile%\n",
    "~1:", text_std!(), "ComputerName   %ComputerName%\n",
    "~1:", text_std!(), "UserName       %UserName%\n",
    "~1:", text_std!(), "HarnessVersion %HarnessVersion%\n",
    "~1:", text_std!(), "CmdLine        %CmdLine%\n",
    "~0:", text_std!(), "SuiteStarted   %SuiteName%\n",
);

const TEXT_TEST_STARTED: &str = concat!(
    "~1:", text_std!(), "%Class:14% (%TestIndex:r2%) %TestName%: %TestDescription%\n",
);

const TEXT_ASSERT_FAILED: &str = concat!(
    "~0:", text_std!(), "%Class:14% %Message%\n",
    "~1:", text_std!(), "%Class:14%   Function: %Func%\n",
    "~1:", text_std!(), "%Class:14%   Thread:   %Thread%\n",
    "~1:", text_std!(), "%Class:14%   File:     %File%\n",
    "~1:", text_std!(), "%Class:14%   Line:     %Line%\n",
);

const TEXT_PRINT: &str = concat!("~0:", text_std!(), "%Class:14% %Message%\n");

const TEXT_TRACE: &str = concat!("~16:", text_std!(), "%Class:14% %Message%\n");

const TEXT_TEST_FINISHED: &str = concat!(
    "~1:", text_std!(), "%Class:14% (%TestIndex:r2%) %TestName% %TestStatus%\n",
);

const TEXT_RESULT: &str = concat!(
    "~1:", text_std!(), "SuiteFinished  Suite: %SuiteName% Duration: %Duration%s\n",
    "~1:%TestTableFailed%",
    "~1:%TestTableNotExecuted%",
    "~0:", text_std!(),
    "SuiteSummary   Status: %SuiteStatus% Failed: %TestsFailedCount% ",
    "Passed: %TestsPassedCount% NotExecuted: %TestsNotExecutedCount%\n",
);

const TEXT_TABLE_FAILED: &str = "~0:%TestListFailed%";

const TEXT_TABLE_NOT_EXECUTED: &str = "~0:%TestListNotExecuted%";

const TEXT_ITEM_FAILED: &str = concat!(
    "~0:", text_std!(), "TestFailed     (%TestIndex:r2%) %TestName%\n",
);

const TEXT_ITEM_NOT_EXECUTED: &str = concat!(
    "~0:", text_std!(), "TestNotRun     (%TestIndex:r2%) %TestName%\n",
);

const TEXT_SUMMARY: &str = concat!(
    "~1:", text_std!(), "SuiteSummary   Suite: %SuiteName%\n",
    "~1:%TestTableFailed%",
    "~1:%TestTableNotExecuted%",
    "~0:", text_std!(),
    "SuiteSummary   %SuiteName:14% Status: %SuiteStatus% Failed: %TestsFailedCount% ",
    "Passed: %TestsPassedCount% NotExecuted: %TestsNotExecutedCount%\n",
);

const XML_HEADER: &str = concat!(
    "~0:<?xml version=\"1.0\" encoding=\"utf-8\" ?>\n",
    "<HarnessLog>\n",
    "  <Header>\n",
    xml_std!("    "),
    xml_field!("    ", "FormatName"),
    xml_field!("    ", "Version"),
    xml_field!("    ", "HarnessVersion"),
    xml_field!("    ", "SuiteName"),
    xml_field!("    ", "LogFile"),
    xml_field!("    ", "UserName"),
    xml_field!("    ", "ComputerName"),
    xml_field!("    ", "Iteration"),
    xml_field!("    ", "CmdLine"),
    "  </Header>\n",
    "  <Body>\n",
);

const XML_TEST_STARTED: &str = concat!(
    "~1:    <LogEntry>\n",
    xml_std!("      "),
    xml_field!("      ", "TestIndex"),
    xml_field!("      ", "TestName"),
    xml_field!("      ", "TestDescription"),
    "    </LogEntry>\n",
);

const XML_ASSERT_FAILED: &str = concat!(
    "~0:    <LogEntry>\n",
    xml_std!("      "),
    xml_field!("      ", "Message"),
    xml_field!("      ", "Func"),
    xml_field!("      ", "Thread"),
    xml_field!("      ", "File"),
    xml_field!("      ", "Line"),
    "    </LogEntry>\n",
);

const XML_PRINT: &str = concat!(
    "~0:    <LogEntry>\n",
    xml_std!("      "),
    xml_field!("      ", "Message"),
    "    </LogEntry>\n",
);

const XML_TRACE: &str = concat!(
    "~16:    <LogEntry>\n",
    xml_std!("      "),
    xml_field!("      ", "Message"),
    "    </LogEntry>\n",
);

const XML_TEST_FINISHED: &str = concat!(
    "~1:    <LogEntry>\n",
    xml_std!("      "),
    xml_field!("      ", "TestIndex"),
    xml_field!("      ", "TestName"),
    xml_field!("      ", "TestStatus"),
    "    </LogEntry>\n",
);

const XML_RESULT: &str = concat!(
    "~0:  </Body>\n",
    "  <Result>\n",
    xml_std!("    "),
    xml_field!("    ", "SuiteName"),
    xml_field!("    ", "Duration"),
    "%TestTableFailed%",
    "%TestTableNotExecuted%",
    xml_field!("    ", "SuiteStatus"),
    xml_field!("    ", "TestsFailedCount"),
    xml_field!("    ", "TestsPassedCount"),
    xml_field!("    ", "TestsNotExecutedCount"),
    "  </Result>\n",
    "</HarnessLog>\n",
);

const XML_TABLE_FAILED: &str =
    "~0:    <TestListFailed>\n%TestListFailed%    </TestListFailed>\n";

const XML_TABLE_NOT_EXECUTED: &str =
    "~0:    <TestListNotExecuted>\n%TestListNotExecuted%    </TestListNotExecuted>\n";

const XML_ITEM_FAILED: &str = concat!(
    "~0:      <TestFailed>\n",
    xml_field!("        ", "TestIndex"),
    xml_field!("        ", "TestName"),
    "      </TestFailed>\n",
);

const XML_ITEM_NOT_EXECUTED: &str = concat!(
    "~0:      <TestNotExecuted>\n",
    xml_field!("        ", "TestIndex"),
    xml_field!("        ", "TestName"),
    "      </TestNotExecuted>\n",
);

const XML_SUMMARY: &str = concat!(
    "~0:<SuiteSummary>\n",
    xml_std!("  "),
    xml_field!("  ", "SuiteName"),
    "%TestTableFailed%",
    "%TestTableNotExecuted%",
    xml_field!("  ", "SuiteStatus"),
    xml_field!("  ", "TestsFailedCount"),
    xml_field!("  ", "TestsPassedCount"),
    xml_field!("  ", "TestsNotExecutedCount"),
    "</SuiteSummary>\n",
);

pub(super) fn default_template(kind: MessageKind, flavor: OutputFlavor) -> &'static str {
    match (kind, flavor) {
        (MessageKind::Header, OutputFlavor::Text) => TEXT_HEADER,
        (MessageKind::TestStarted, OutputFlavor::Text) => TEXT_TEST_STARTED,
        (MessageKind::AssertFailed, OutputFlavor::Text) => TEXT_ASSERT_FAILED,
        (MessageKind::Print, OutputFlavor::Text) => TEXT_PRINT,
        (MessageKind::Trace, OutputFlavor::Text) => TEXT_TRACE,
        (MessageKind::TestFinished, OutputFlavor::Text) => TEXT_TEST_FINISHED,
        (MessageKind::Result, OutputFlavor::Text) => TEXT_RESULT,
        (MessageKind::TestTableFailed, OutputFlavor::Text) => TEXT_TABLE_FAILED,
        (MessageKind::TestTableNotExecuted, OutputFlavor::Text) => TEXT_TABLE_NOT_EXECUTED,
        (MessageKind::TestItemFailed, OutputFlavor::Text) => TEXT_ITEM_FAILED,
        (MessageKind::TestItemNotExecuted, OutputFlavor::Text) => TEXT_ITEM_NOT_EXECUTED,
        (MessageKind::Summary, OutputFlavor::Text) => TEXT_SUMMARY,
        (MessageKind::Header, OutputFlavor::Xml) => XML_HEADER,
        (MessageKind::TestStarted, OutputFlavor::Xml) => XML_TEST_STARTED,
        (MessageKind::AssertFailed, OutputFlavor::Xml) => XML_ASSERT_FAILED,
        (MessageKind::Print, OutputFlavor::Xml) => XML_PRINT,
        (MessageKind::Trace, OutputFlavor::Xml) => XML_TRACE,
        (MessageKind::TestFinished, OutputFlavor::Xml) => XML_TEST_FINISHED,
        (MessageKind::Result, OutputFlavor::Xml) => XML_RESULT,
        (MessageKind::TestTableFailed, OutputFlavor::Xml) => XML_TABLE_FAILED,
        (MessageKind::TestTableNotExecuted, OutputFlavor::Xml) => XML_TABLE_NOT_EXECUTED,
        (MessageKind::TestItemFailed, OutputFlavor::Xml) => XML_ITEM_FAILED,
        (MessageKind::TestItemNotExecuted, OutputFlavor::Xml) => XML_ITEM_NOT_EXECUTED,
        (MessageKind::Summary, OutputFlavor::Xml) => XML_SUMMARY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        format::{Field, FieldValues, FormatEngine, LevelFilter},
        verbosity::Verbosity,
    };
    use pretty_assertions::assert_eq;

    fn std_values(kind: MessageKind) -> FieldValues {
        FieldValues::new()
            .with(Field::Class, kind.class())
            .with(Field::Date, "03/07/24")
            .with(Field::Time, "10:11:12.013")
            .with(Field::Section, "Body")
    }

    #[test]
    fn text_test_finished() {
        let engine = FormatEngine::new().unwrap();
        let values = std_values(MessageKind::TestFinished)
            .with(Field::TestIndex, "3")
            .with(Field::TestName, "asserts.fails")
            .with(Field::TestStatus, "Failed");
        let rendered = engine.render(
            MessageKind::TestFinished,
            OutputFlavor::Text,
            LevelFilter::threshold(Verbosity::Test),
            &values,
        );
        assert_eq!(
            rendered,
            "03/07/24 10:11:12.013  1 Body   TestFinished   ( 3) asserts.fails Failed\n"
        );

        // Suite verbosity hides per-test lines.
        let rendered = engine.render(
            MessageKind::TestFinished,
            OutputFlavor::Text,
            LevelFilter::threshold(Verbosity::Suite),
            &values,
        );
        assert_eq!(rendered, "");
    }

    #[test]
    fn xml_item_failed() {
        let engine = FormatEngine::new().unwrap();
        let values = std_values(MessageKind::TestItemFailed)
            .with(Field::TestIndex, "2")
            .with(Field::TestName, "a&b.c");
        let rendered = engine.render(
            MessageKind::TestItemFailed,
            OutputFlavor::Xml,
            LevelFilter::unfiltered(),
            &values,
        );
        assert_eq!(
            rendered,
            concat!(
                "      <TestFailed>\n",
                "        <TestIndex>2</TestIndex>\n",
                "        <TestName>a&amp;b.c</TestName>\n",
                "      </TestFailed>\n",
            )
        );
    }

    #[test]
    fn xml_header_opens_document() {
        let header = default_template(MessageKind::Header, OutputFlavor::Xml);
        assert!(header.starts_with("~0:<?xml"));
        assert!(header.ends_with("  <Body>\n"));
        let result = default_template(MessageKind::Result, OutputFlavor::Xml);
        assert!(result.ends_with("</HarnessLog>\n"));
    }
}
