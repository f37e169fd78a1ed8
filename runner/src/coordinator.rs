//! Drives a single test run from request to result.
//!
//! ```text
//! Idle -> AwaitingStart -> AwaitingResult -> Completed | Failed | TimedOut
//!   \-> Failed (framework rejected the run)
//! ```
//!
//! The wait for the start acknowledgement is unbounded unless
//! `RunConfig::start_timeout` is set: a framework that accepts a run but
//! never reports it started keeps the caller waiting. The wait for the
//! result is always bounded by `RunConfig::timeout`.

use framework::{
    FrameworkError, Listener, ResolveError, ResultBundle, RunConfig, RunOptions, RunToken, Signal,
    TestFramework,
};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum RunError {
    #[error("Test framework rejected the run: {0}")]
    FrameworkRejected(#[from] FrameworkError),

    #[error("Test run failed: {0}")]
    OutOfBand(String),

    #[error("Test run timed out after {0:?}")]
    Timeout(Duration),

    #[error("Could not resolve test source: {0}")]
    SourceUnresolved(#[from] ResolveError),

    #[error("Every sender to the run inbox hung up before the run completed")]
    InboxClosed,
}

pub type RunResult<T> = Result<T, RunError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    AwaitingStart,
    AwaitingResult,
    Completed,
    Failed,
    TimedOut,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::Failed | RunState::TimedOut
        )
    }
}

type Inbox = mpsc::UnboundedReceiver<Signal>;

/// One-shot coordinator for a single run. Consumed by [`RunCoordinator::run`].
pub struct RunCoordinator {
    framework: Arc<dyn TestFramework>,
    config: RunConfig,
    state: RunState,
    /// Signals that arrived before the phase that handles them.
    deferred: VecDeque<Signal>,
}

impl RunCoordinator {
    pub fn new(framework: Arc<dyn TestFramework>, config: RunConfig) -> Self {
        Self {
            framework,
            config,
            state: RunState::Idle,
            deferred: VecDeque::new(),
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub async fn run(mut self, target: &str) -> RunResult<ResultBundle> {
        self.drive(target).await
    }

    async fn drive(&mut self, target: &str) -> RunResult<ResultBundle> {
        let (inbox_tx, mut inbox) = mpsc::unbounded_channel();
        let listener = Listener::spawn(inbox_tx.clone());
        let options = RunOptions {
            verbose: self.config.verbose,
        };

        info!(
            "Starting {} run for {}",
            self.framework.framework_name(),
            target
        );
        let token = match self
            .framework
            .start_run(listener.clone(), target, &options, inbox_tx)
            .await
        {
            Ok(token) => token,
            Err(e) => {
                warn!("Run for {} rejected: {}", target, e);
                self.transition_to(RunState::Failed);
                return Err(e.into());
            }
        };

        self.transition_to(RunState::AwaitingStart);
        let start_timeout = self.config.start_timeout;
        let started = match start_timeout {
            Some(limit) => timeout(limit, self.await_start(&mut inbox, token))
                .await
                .unwrap_or_else(|_| Err(RunError::Timeout(limit))),
            None => self.await_start(&mut inbox, token).await,
        };
        if let Err(e) = started {
            return Err(self.fail(target, e));
        }

        if !listener.start(token) {
            warn!("Listener for run {} exited before it was started", token);
        }
        self.transition_to(RunState::AwaitingResult);

        let limit = self.config.timeout;
        let outcome = timeout(limit, self.await_result(&mut inbox, token))
            .await
            .unwrap_or_else(|_| Err(RunError::Timeout(limit)));

        match outcome {
            Ok(bundle) => {
                info!("Run for {} completed with {} results", target, bundle.len());
                self.transition_to(RunState::Completed);
                Ok(bundle)
            }
            Err(e) => Err(self.fail(target, e)),
        }
    }

    async fn await_start(&mut self, inbox: &mut Inbox, token: RunToken) -> RunResult<()> {
        loop {
            match inbox.recv().await.ok_or(RunError::InboxClosed)? {
                Signal::Started(started) if started == token => return Ok(()),
                Signal::Started(other) => debug!("Ignoring start of unrelated run {}", other),
                signal => self.deferred.push_back(signal),
            }
        }
    }

    async fn await_result(&mut self, inbox: &mut Inbox, token: RunToken) -> RunResult<ResultBundle> {
        loop {
            let signal = match self.deferred.pop_front() {
                Some(signal) => signal,
                None => inbox.recv().await.ok_or(RunError::InboxClosed)?,
            };

            match signal {
                Signal::Result(finished, bundle) if finished == token => return Ok(bundle),
                Signal::Result(other, _) => debug!("Discarding result of unrelated run {}", other),
                Signal::Error(reason) => return Err(RunError::OutOfBand(reason)),
                Signal::Started(other) => debug!("Ignoring late start of run {}", other),
            }
        }
    }

    fn fail(&mut self, target: &str, error: RunError) -> RunError {
        warn!("Run for {} failed: {}", target, error);
        let state = match error {
            RunError::Timeout(_) => RunState::TimedOut,
            _ => RunState::Failed,
        };
        self.transition_to(state);
        error
    }

    fn transition_to(&mut self, new_state: RunState) {
        debug_assert!(!self.state.is_terminal(), "run already finished");
        if self.config.verbose {
            debug!("Run state transition: {:?} → {:?}", self.state, new_state);
        }
        self.state = new_state;
    }
}
