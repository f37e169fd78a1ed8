//! Runs a target's tests through a [`TestFramework`] and reports the outcome
//! as normalized [`Issue`]s.

pub mod coordinator;
pub mod formatter;
pub mod issue;

pub use coordinator::{RunCoordinator, RunError, RunResult, RunState};
pub use formatter::{
    display_term, failure_message, format_results, reason_fields, reason_table, ReasonFields,
};
pub use issue::{Issue, IssueKind, IssueSummary};

use framework::{RunConfig, SourceResolver, TestFramework};
use std::sync::Arc;
use tracing::info;

/// Entry point: resolves a target's source, runs its tests and formats the
/// results.
#[derive(Clone)]
pub struct TestRunner {
    framework: Arc<dyn TestFramework>,
    resolver: Arc<dyn SourceResolver>,
    config: RunConfig,
}

impl TestRunner {
    pub fn new(framework: Arc<dyn TestFramework>, resolver: Arc<dyn SourceResolver>) -> Self {
        Self {
            framework,
            resolver,
            config: RunConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Either every result of the run as an issue, or the reason there are none.
    pub async fn run_tests(&self, target: &str) -> RunResult<Vec<Issue>> {
        let source = self.resolver.module_source(target).await?;
        let bundle = RunCoordinator::new(self.framework.clone(), self.config.clone())
            .run(target)
            .await?;

        let issues = format_results(&source, &bundle);
        info!(
            "Reporting {} issues for {} ({})",
            issues.len(),
            target,
            IssueSummary::from_issues(&issues)
        );
        Ok(issues)
    }
}
