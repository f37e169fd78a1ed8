//! Normalizes a run's raw results into [`Issue`]s.
//!
//! Failures are decoded through a fixed table that names, per reason tag,
//! which `info` fields hold the expected value and the actual value.

use crate::issue::{Issue, IssueKind};
use framework::{FailureDetail, Fields, ResultBundle, SourceLocation};
use serde_json::Value;

pub const PASSED_MESSAGE: &str = "no asserts failed";

/// Rendered in place of a field that the table or the failure info lacks.
pub const ABSENT: &str = "undefined";

/// Names of the `info` fields holding the expected and actual values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReasonFields {
    pub expected: Option<&'static str>,
    pub value: Option<&'static str>,
}

impl ReasonFields {
    pub const UNDEFINED: Self = Self {
        expected: None,
        value: None,
    };

    const fn new(expected: &'static str, value: &'static str) -> Self {
        Self {
            expected: Some(expected),
            value: Some(value),
        }
    }
}

// `assertNotEqual_failed` names `expected` twice. Kept as reported by the
// framework; see DESIGN.md before changing it.
static REASON_FIELDS: [(&str, ReasonFields); 10] = [
    (
        "assertException_failed",
        ReasonFields::new("pattern", "unexpected_success"),
    ),
    (
        "assertNotException_failed",
        ReasonFields::new("pattern", "unexpected_exception"),
    ),
    (
        "assertCmdOutput_failed",
        ReasonFields::new("expected_output", "output"),
    ),
    (
        "assertCmd_failed",
        ReasonFields::new("expected_status", "status"),
    ),
    ("assertEqual_failed", ReasonFields::new("expected", "value")),
    ("assertMatch_failed", ReasonFields::new("pattern", "value")),
    (
        "assertNotEqual_failed",
        ReasonFields::new("expected", "expected"),
    ),
    ("assertNotMatch_failed", ReasonFields::new("pattern", "value")),
    ("assertion_failed", ReasonFields::new("expected", "value")),
    (
        "command_failed",
        ReasonFields::new("expected_status", "status"),
    ),
];

pub fn reason_fields(reason: &str) -> ReasonFields {
    REASON_FIELDS
        .iter()
        .find(|(tag, _)| *tag == reason)
        .map(|(_, fields)| *fields)
        .unwrap_or(ReasonFields::UNDEFINED)
}

pub fn reason_table() -> impl Iterator<Item = (&'static str, ReasonFields)> {
    REASON_FIELDS.iter().copied()
}

/// Single-line rendering of a value: strings as-is, everything else as
/// compact JSON, with every line break removed.
pub fn display_term(value: &Value) -> String {
    let rendered = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    rendered.chars().filter(|c| !matches!(c, '\n' | '\r')).collect()
}

fn display_field(info: &Fields, field: Option<&str>) -> String {
    field
        .and_then(|name| info.get(name))
        .map(display_term)
        .unwrap_or_else(|| ABSENT.to_string())
}

pub fn failure_message(detail: &FailureDetail) -> String {
    let fields = reason_fields(&detail.reason);
    format!(
        "{}\nexpected: {}\nvalue: {}",
        detail.reason,
        display_field(&detail.info, fields.expected),
        display_field(&detail.info, fields.value)
    )
}

/// Successful results first, then failed, then cancelled, each group in the
/// order the framework reported it.
pub fn format_results(source: &SourceLocation, bundle: &ResultBundle) -> Vec<Issue> {
    let passed = bundle.successful.iter().map(|test| {
        Issue::new(
            IssueKind::PassedTest,
            source.clone(),
            test.line,
            PASSED_MESSAGE,
        )
    });

    let failed = bundle.failed.iter().map(|test| {
        Issue::new(
            IssueKind::FailedTest,
            source.clone(),
            test.line,
            failure_message(test.detail()),
        )
    });

    let cancelled = bundle.cancelled.iter().map(|test| {
        Issue::new(
            IssueKind::CancelledTest,
            source.clone(),
            test.line,
            display_term(&test.reason),
        )
    });

    passed.chain(failed).chain(cancelled).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use framework::{CancelledTest, FailedTest, PassedTest};
    use serde_json::json;

    fn src() -> SourceLocation {
        SourceLocation::new("file:///src/sample.erl")
    }

    #[test]
    fn test_one_of_each_kind() {
        let bundle = ResultBundle {
            successful: vec![PassedTest::new(1)],
            failed: vec![FailedTest::new(
                1,
                FailureDetail::new("assertion_failed")
                    .with_info("expected", "foo")
                    .with_info("value", "bar"),
            )],
            cancelled: vec![CancelledTest::new(1, "x")],
        };

        let issues = format_results(&src(), &bundle);
        let kinds: Vec<IssueKind> = issues.iter().map(Issue::kind).collect();
        assert_eq!(
            kinds,
            vec![
                IssueKind::PassedTest,
                IssueKind::FailedTest,
                IssueKind::CancelledTest
            ]
        );
        assert!(issues.iter().all(|i| i.line() == 1 && i.source() == &src()));

        assert_eq!(issues[0].message(), "no asserts failed");
        assert_eq!(
            issues[1].message(),
            "assertion_failed\nexpected: foo\nvalue: bar"
        );
        assert_eq!(issues[2].message(), "x");
    }

    #[test]
    fn test_group_order_ignores_input_key_order() {
        let bundle: ResultBundle = serde_json::from_value(json!({
            "cancelled": [{"line": 30, "reason": "timeout"}],
            "failed": [
                {"line": 20, "status": {"error": {"reason": "assertion_failed"}}},
                {"line": 21, "status": {"error": {"reason": "assertion_failed"}}}
            ],
            "successful": [{"line": 12}, {"line": 10}]
        }))
        .unwrap();

        let issues = format_results(&src(), &bundle);
        assert_eq!(issues.len(), bundle.len());
        let lines: Vec<u32> = issues.iter().map(Issue::line).collect();
        assert_eq!(lines, vec![12, 10, 20, 21, 30]);
    }

    #[test]
    fn test_empty_bundle() {
        assert!(format_results(&src(), &ResultBundle::default()).is_empty());
    }

    #[test]
    fn test_reason_table_entries() {
        let cases = [
            ("assertException_failed", "pattern", "unexpected_success"),
            ("assertNotException_failed", "pattern", "unexpected_exception"),
            ("assertCmdOutput_failed", "expected_output", "output"),
            ("assertCmd_failed", "expected_status", "status"),
            ("assertEqual_failed", "expected", "value"),
            ("assertMatch_failed", "pattern", "value"),
            ("assertNotEqual_failed", "expected", "expected"),
            ("assertNotMatch_failed", "pattern", "value"),
            ("assertion_failed", "expected", "value"),
            ("command_failed", "expected_status", "status"),
        ];

        for (tag, expected, value) in cases {
            assert_eq!(
                reason_fields(tag),
                ReasonFields {
                    expected: Some(expected),
                    value: Some(value)
                },
                "{}",
                tag
            );
        }
        assert_eq!(reason_table().count(), cases.len());
    }

    #[test]
    fn test_unknown_reason_is_undefined() {
        assert_eq!(reason_fields("unknown_tag"), ReasonFields::UNDEFINED);

        let detail = FailureDetail::new("unknown_tag").with_info("expected", 1);
        assert_eq!(
            failure_message(&detail),
            "unknown_tag\nexpected: undefined\nvalue: undefined"
        );
    }

    #[test]
    fn test_missing_info_field_is_undefined() {
        let detail = FailureDetail::new("assertMatch_failed").with_info("value", json!([1, 2]));
        assert_eq!(
            failure_message(&detail),
            "assertMatch_failed\nexpected: undefined\nvalue: [1,2]"
        );
    }

    #[test]
    fn test_assert_not_equal_shows_expected_twice() {
        let detail = FailureDetail::new("assertNotEqual_failed")
            .with_info("expected", 3)
            .with_info("value", 3);
        assert_eq!(
            failure_message(&detail),
            "assertNotEqual_failed\nexpected: 3\nvalue: 3"
        );
    }

    #[test]
    fn test_display_term_strips_line_breaks() {
        assert_eq!(display_term(&json!("first\nsecond\r\nthird")), "firstsecondthird");
        assert_eq!(display_term(&json!({"a": [1, 2]})), r#"{"a":[1,2]}"#);
        assert_eq!(display_term(&json!(42)), "42");
        assert_eq!(display_term(&Value::Null), "null");
    }

    #[test]
    fn test_multi_line_values_render_on_one_line() {
        let detail = FailureDetail::new("assertCmdOutput_failed")
            .with_info("expected_output", "ok\n")
            .with_info("output", "error:\n  badarg\n");
        assert_eq!(
            failure_message(&detail),
            "assertCmdOutput_failed\nexpected: ok\nvalue: error:  badarg"
        );

        let bundle = ResultBundle {
            cancelled: vec![CancelledTest::new(4, "setup\nfailed")],
            ..Default::default()
        };
        assert_eq!(format_results(&src(), &bundle)[0].message(), "setupfailed");
    }
}
