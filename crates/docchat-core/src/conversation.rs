//! Conversation snapshot: what a front end renders.

use serde::{Deserialize, Serialize};

use crate::session::SessionId;
use crate::turn::Turn;

/// Which controls a front end should offer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Controls {
    /// Nothing in flight: accept a new question
    Send,
    /// A response is pending: offer pause and stop
    PauseOrStop,
    /// The last response was paused: offer resume (a new question is also accepted)
    Resume,
}

/// Read-only copy of the conversation state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Session token sent with every request
    pub session_id: SessionId,
    /// Turns in order
    pub turns: Vec<Turn>,
    /// Whether a request is outstanding
    pub in_flight: bool,
    /// Whether the last assistant turn was paused
    pub paused: bool,
}

impl Snapshot {
    pub fn controls(&self) -> Controls {
        if self.in_flight {
            Controls::PauseOrStop
        } else if self.paused {
            Controls::Resume
        } else {
            Controls::Send
        }
    }

    /// The last turn, if any
    pub fn last_turn(&self) -> Option<&Turn> {
        self.turns.last()
    }
}
