use framework::SourceLocation;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueKind {
    PassedTest,
    FailedTest,
    CancelledTest,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueKind::PassedTest => write!(f, "passed-test"),
            IssueKind::FailedTest => write!(f, "failed-test"),
            IssueKind::CancelledTest => write!(f, "cancelled-test"),
        }
    }
}

/// One normalized outcome, ready for editor tooling.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Issue {
    kind: IssueKind,
    source: SourceLocation,
    line: u32,
    message: String,
}

impl Issue {
    pub fn new(
        kind: IssueKind,
        source: SourceLocation,
        line: u32,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            source,
            line,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> IssueKind {
        self.kind
    }

    pub fn source(&self) -> &SourceLocation {
        &self.source
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}:", self.source, self.line, self.kind)?;
        for line in self.message.lines() {
            write!(f, "\n    {}", line)?;
        }
        Ok(())
    }
}

/// Per-kind counts over a report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueSummary {
    pub passed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl IssueSummary {
    pub fn from_issues(issues: &[Issue]) -> Self {
        issues
            .iter()
            .fold(Self::default(), |mut summary, issue| {
                match issue.kind() {
                    IssueKind::PassedTest => summary.passed += 1,
                    IssueKind::FailedTest => summary.failed += 1,
                    IssueKind::CancelledTest => summary.cancelled += 1,
                }
                summary
            })
    }

    pub fn total(&self) -> usize {
        self.passed + self.failed + self.cancelled
    }

    /// True when nothing failed or was cancelled.
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.cancelled == 0
    }
}

impl fmt::Display for IssueSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} tests: {} passed, {} failed, {} cancelled",
            self.total(),
            self.passed,
            self.failed,
            self.cancelled
        )
    }
}
