use crate::listener::ListenerHandle;
use crate::types::{RunToken, Signal, SourceLocation};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Error, Debug)]
pub enum FrameworkError {
    #[error("Target not found: {target}")]
    TargetNotFound { target: String },

    #[error("Failed to spawn test command '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Run rejected: {message}")]
    Rejected { message: String },

    #[error("Invalid fixture: {0}")]
    Fixture(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type FrameworkResult<T> = Result<T, FrameworkError>;

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("No source found for target '{target}'")]
    NotFound { target: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ResolveResult<T> = Result<T, ResolveError>;

/// Sending half of a coordinator's inbox.
pub type SignalSender = mpsc::UnboundedSender<Signal>;

/// Options handed to the framework along with the run request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOptions {
    pub verbose: bool,
}

/// A test framework that can run the tests of one target at a time.
///
/// `start_run` either rejects the request immediately or returns the token
/// the run is known by. After that everything arrives on `inbox`: a
/// `Signal::Started` carrying the token once the run is underway, and later
/// either the listener's `Signal::Result` or an untagged `Signal::Error`.
/// Test events go to `listener`, which only collects them once the
/// coordinator has forwarded the start.
#[async_trait]
pub trait TestFramework: Send + Sync {
    async fn start_run(
        &self,
        listener: ListenerHandle,
        target: &str,
        options: &RunOptions,
        inbox: SignalSender,
    ) -> FrameworkResult<RunToken>;

    fn framework_name(&self) -> &'static str;
}

/// Finds where a target's source lives.
#[async_trait]
pub trait SourceResolver: Send + Sync {
    async fn module_source(&self, target: &str) -> ResolveResult<SourceLocation>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::Listener;
    use crate::types::{PassedTest, ResultBundle, TestEvent};

    struct MockFramework;

    #[async_trait]
    impl TestFramework for MockFramework {
        async fn start_run(
            &self,
            listener: ListenerHandle,
            target: &str,
            _options: &RunOptions,
            inbox: SignalSender,
        ) -> FrameworkResult<RunToken> {
            if target != "mock_tests" {
                return Err(FrameworkError::TargetNotFound {
                    target: target.to_string(),
                });
            }
            let token = RunToken::new();
            let _ = inbox.send(Signal::Started(token));
            listener.event(TestEvent::Passed(PassedTest::new(1)));
            listener.finish();
            Ok(token)
        }

        fn framework_name(&self) -> &'static str {
            "mock"
        }
    }

    #[tokio::test]
    async fn test_mock_framework() {
        let framework = MockFramework;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let listener = Listener::spawn(tx.clone());

        let token = framework
            .start_run(listener.clone(), "mock_tests", &RunOptions::default(), tx)
            .await
            .unwrap();

        assert_eq!(rx.recv().await, Some(Signal::Started(token)));
        assert!(listener.start(token));

        let mut expected = ResultBundle::default();
        expected.successful.push(PassedTest::new(1));
        assert_eq!(rx.recv().await, Some(Signal::Result(token, expected)));
        assert_eq!(framework.framework_name(), "mock");
    }

    #[tokio::test]
    async fn test_mock_framework_rejects_unknown_target() {
        let framework = MockFramework;
        let (tx, _rx) = mpsc::unbounded_channel();
        let listener = Listener::spawn(tx.clone());

        let result = framework
            .start_run(listener, "missing", &RunOptions::default(), tx)
            .await;
        assert!(matches!(
            result,
            Err(FrameworkError::TargetNotFound { target }) if target == "missing"
        ));
    }

    #[test]
    fn test_error_messages() {
        let err = FrameworkError::Rejected {
            message: "module not loadable".to_string(),
        };
        assert_eq!(err.to_string(), "Run rejected: module not loadable");

        let err = ResolveError::NotFound {
            target: "sample".to_string(),
        };
        assert_eq!(err.to_string(), "No source found for target 'sample'");
    }
}
