use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;
use uuid::Uuid;

/// Fields of a raw result record that are carried along but not interpreted.
pub type Fields = Map<String, Value>;

/// Correlates a started run with its acknowledgement and its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunToken(Uuid);

impl RunToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identifier for the source a target was loaded from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceLocation(String);

impl SourceLocation {
    pub fn new(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    pub fn from_path(path: &Path) -> Self {
        Self(format!("file://{}", path.display()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassedTest {
    pub line: u32,
    #[serde(flatten)]
    pub fields: Fields,
}

impl PassedTest {
    pub fn new(line: u32) -> Self {
        Self {
            line,
            fields: Fields::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedTest {
    pub line: u32,
    pub status: TestStatus,
    #[serde(flatten)]
    pub fields: Fields,
}

impl FailedTest {
    pub fn new(line: u32, detail: FailureDetail) -> Self {
        Self {
            line,
            status: TestStatus::Error(detail),
            fields: Fields::new(),
        }
    }

    pub fn detail(&self) -> &FailureDetail {
        let TestStatus::Error(detail) = &self.status;
        detail
    }
}

/// Status of a failed test. Failures are always reported as errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Error(FailureDetail),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureDetail {
    /// Reason tag, e.g. `assertEqual_failed`.
    pub reason: String,
    #[serde(default)]
    pub info: Fields,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub stack_trace: Value,
}

impl FailureDetail {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            info: Fields::new(),
            stack_trace: Value::Null,
        }
    }

    pub fn with_info(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.info.insert(field.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelledTest {
    pub line: u32,
    pub reason: Value,
    #[serde(flatten)]
    pub fields: Fields,
}

impl CancelledTest {
    pub fn new(line: u32, reason: impl Into<Value>) -> Self {
        Self {
            line,
            reason: reason.into(),
            fields: Fields::new(),
        }
    }
}

/// Raw results of a completed run, grouped by outcome.
///
/// All three groups are required when deserializing; a framework that omits
/// one is broken and its output is rejected rather than patched up.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultBundle {
    pub successful: Vec<PassedTest>,
    pub failed: Vec<FailedTest>,
    pub cancelled: Vec<CancelledTest>,
}

impl ResultBundle {
    pub fn len(&self) -> usize {
        self.successful.len() + self.failed.len() + self.cancelled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn record(&mut self, event: TestEvent) {
        match event {
            TestEvent::Passed(test) => self.successful.push(test),
            TestEvent::Failed(test) => self.failed.push(test),
            TestEvent::Cancelled(test) => self.cancelled.push(test),
        }
    }

    /// Events in report order: successful, failed, cancelled.
    pub fn into_events(self) -> impl Iterator<Item = TestEvent> {
        self.successful
            .into_iter()
            .map(TestEvent::Passed)
            .chain(self.failed.into_iter().map(TestEvent::Failed))
            .chain(self.cancelled.into_iter().map(TestEvent::Cancelled))
    }
}

/// A single test outcome as reported by a framework while a run is in progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TestEvent {
    Passed(PassedTest),
    Failed(FailedTest),
    Cancelled(CancelledTest),
}

/// Messages delivered to the coordinator's inbox.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    Started(RunToken),
    Result(RunToken, ResultBundle),
    /// Asynchronous failure. Not tagged with a run token.
    Error(String),
}
