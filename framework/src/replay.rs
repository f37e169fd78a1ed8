//! A framework that replays recorded results instead of running anything.
//!
//! Fixtures are JSON documents of the form
//!
//! ```json
//! { "targets": { "sample": { "source": "file:///src/sample.erl",
//!                            "results": { "successful": [], "failed": [], "cancelled": [] } } } }
//! ```

use crate::listener::ListenerHandle;
use crate::session::{
    FrameworkError, FrameworkResult, ResolveError, ResolveResult, RunOptions, SignalSender,
    SourceResolver, TestFramework,
};
use crate::types::{ResultBundle, RunToken, Signal, SourceLocation};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayFixture {
    pub targets: BTreeMap<String, ReplayTarget>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayTarget {
    pub source: SourceLocation,
    pub results: ResultBundle,
}

#[derive(Debug, Clone, Default)]
pub struct ReplayFramework {
    fixture: ReplayFixture,
}

impl ReplayFramework {
    pub fn new(fixture: ReplayFixture) -> Self {
        Self { fixture }
    }

    pub fn from_json(json: &str) -> FrameworkResult<Self> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    pub fn from_file(path: impl AsRef<Path>) -> FrameworkResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn with_target(
        mut self,
        name: impl Into<String>,
        source: SourceLocation,
        results: ResultBundle,
    ) -> Self {
        self.fixture
            .targets
            .insert(name.into(), ReplayTarget { source, results });
        self
    }

    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.fixture.targets.keys().map(String::as_str)
    }
}

#[async_trait]
impl TestFramework for ReplayFramework {
    async fn start_run(
        &self,
        listener: ListenerHandle,
        target: &str,
        options: &RunOptions,
        inbox: SignalSender,
    ) -> FrameworkResult<RunToken> {
        let recorded = self
            .fixture
            .targets
            .get(target)
            .ok_or_else(|| FrameworkError::TargetNotFound {
                target: target.to_string(),
            })?;

        let token = RunToken::new();
        let _ = inbox.send(Signal::Started(token));

        for event in recorded.results.clone().into_events() {
            if options.verbose {
                debug!("Replaying {:?} for {}", event, target);
            }
            listener.event(event);
        }
        listener.finish();

        Ok(token)
    }

    fn framework_name(&self) -> &'static str {
        "replay"
    }
}

#[async_trait]
impl SourceResolver for ReplayFramework {
    async fn module_source(&self, target: &str) -> ResolveResult<SourceLocation> {
        self.fixture
            .targets
            .get(target)
            .map(|recorded| recorded.source.clone())
            .ok_or_else(|| ResolveError::NotFound {
                target: target.to_string(),
            })
    }
}
