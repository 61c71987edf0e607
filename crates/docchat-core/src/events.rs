//! Conversation event types

use serde::{Deserialize, Serialize};

use crate::controller::ExchangeId;
use crate::turn::Turn;

/// Transitions emitted by the controller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationEvent {
    /// A turn was appended at `index`
    TurnAppended { index: usize, turn: Turn },

    /// A request was issued for `question`
    ExchangeStarted {
        exchange: ExchangeId,
        question: String,
    },

    /// The placeholder at `index` reached a terminal status
    TurnResolved { index: usize, turn: Turn },

    /// The placeholder at `index` was discarded (resume or stop)
    TurnRemoved { index: usize },

    /// A settlement arrived for an exchange that is no longer current
    SettlementDiscarded { exchange: ExchangeId },
}

impl ConversationEvent {
    /// The turn an exchange settled into, if this event is a resolution
    pub fn resolved_turn(&self) -> Option<&Turn> {
        match self {
            ConversationEvent::TurnResolved { turn, .. } => Some(turn),
            _ => None,
        }
    }
}
