//! Collector that assembles a [`ResultBundle`] from test events.
//!
//! The listener stays idle until it is forwarded a start for a run token.
//! Anything it receives before that is held back and collected once the run
//! has started. When the framework reports the run finished, the bundle is
//! sent to the coordinator's inbox as `Signal::Result` and the task exits.

use crate::session::SignalSender;
use crate::types::{ResultBundle, RunToken, Signal, TestEvent};
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ListenerMessage {
    Start(RunToken),
    Event(TestEvent),
    Finished,
}

/// Address of a running listener. Cloning it does not spawn a new listener.
#[derive(Debug, Clone)]
pub struct ListenerHandle {
    tx: mpsc::UnboundedSender<ListenerMessage>,
}

impl ListenerHandle {
    /// Returns `false` if the listener has already exited.
    pub fn start(&self, token: RunToken) -> bool {
        self.send(ListenerMessage::Start(token))
    }

    pub fn event(&self, event: TestEvent) -> bool {
        self.send(ListenerMessage::Event(event))
    }

    pub fn finish(&self) -> bool {
        self.send(ListenerMessage::Finished)
    }

    fn send(&self, message: ListenerMessage) -> bool {
        self.tx.send(message).is_ok()
    }
}

pub struct Listener;

impl Listener {
    /// Spawn a listener that reports into `inbox`.
    pub fn spawn(inbox: SignalSender) -> ListenerHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(collect(rx, inbox));
        ListenerHandle { tx }
    }
}

async fn collect(mut rx: mpsc::UnboundedReceiver<ListenerMessage>, inbox: SignalSender) {
    let mut held = Vec::new();
    let token = loop {
        match rx.recv().await {
            Some(ListenerMessage::Start(token)) => break token,
            Some(message) => held.push(message),
            None => {
                debug!("Listener dropped before it was started");
                return;
            }
        }
    };

    debug!("Listener collecting results for run {}", token);
    let mut bundle = ResultBundle::default();
    let mut held = held.into_iter();

    loop {
        let message = match held.next() {
            Some(message) => message,
            None => match rx.recv().await {
                Some(message) => message,
                None => {
                    debug!("Listener for run {} dropped before the run finished", token);
                    return;
                }
            },
        };

        match message {
            ListenerMessage::Event(event) => bundle.record(event),
            ListenerMessage::Finished => {
                debug!("Run {} finished with {} results", token, bundle.len());
                let _ = inbox.send(Signal::Result(token, bundle));
                return;
            }
            ListenerMessage::Start(other) => {
                debug!("Listener already started for {}, ignoring {}", token, other);
            }
        }
    }
}
