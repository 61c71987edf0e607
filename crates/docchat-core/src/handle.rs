//! A cloneable handle for sending intents to a running controller.

use tokio::sync::{broadcast, mpsc, watch};

use crate::controller::Inbound;
use crate::conversation::Snapshot;
use crate::error::{Error, Result};
use crate::events::ConversationEvent;

/// A user intent, as forwarded by a front end
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Ask a question
    Submit(String),
    /// Cancel the pending response, keeping the question replayable
    Pause,
    /// Replay the paused question
    Resume,
    /// Cancel and discard the pending or paused response
    Stop,
    /// End the controller's run loop
    Shutdown,
}

/// A cloneable handle for driving a controller from another task.
///
/// Intents go into the same queue the network tasks report into, so the
/// controller sees everything in arrival order. Rejected intents are logged by
/// the controller and otherwise dropped.
#[derive(Clone)]
pub struct ControllerHandle {
    pub(crate) inbound: mpsc::UnboundedSender<Inbound>,
    pub(crate) events: broadcast::Sender<ConversationEvent>,
    pub(crate) snapshot: watch::Receiver<Snapshot>,
}

impl ControllerHandle {
    /// Queue an intent
    pub fn send(&self, intent: Intent) -> Result<()> {
        self.inbound
            .send(Inbound::Intent(intent))
            .map_err(|_| Error::Closed)
    }

    pub fn submit(&self, text: impl Into<String>) -> Result<()> {
        self.send(Intent::Submit(text.into()))
    }

    pub fn pause(&self) -> Result<()> {
        self.send(Intent::Pause)
    }

    pub fn resume(&self) -> Result<()> {
        self.send(Intent::Resume)
    }

    pub fn stop(&self) -> Result<()> {
        self.send(Intent::Stop)
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(Intent::Shutdown)
    }

    /// Subscribe to conversation events
    pub fn subscribe(&self) -> broadcast::Receiver<ConversationEvent> {
        self.events.subscribe()
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.borrow().clone()
    }

    /// A receiver that wakes whenever a new snapshot is published
    pub fn watch(&self) -> watch::Receiver<Snapshot> {
        self.snapshot.clone()
    }
}
