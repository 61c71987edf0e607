//! Turns: the messages that make up a conversation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who authored a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// Resolution state of an assistant turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    /// Waiting on the answer service
    Pending,
    /// The service answered
    Completed,
    /// The user paused the exchange
    Cancelled,
    /// The request failed
    Failed,
}

impl TurnStatus {
    /// Terminal statuses never change again
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TurnStatus::Pending)
    }
}

/// One message in the conversation.
///
/// Only a pending assistant turn can be modified, and only once, by
/// resolving it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<TurnStatus>,
}

impl Turn {
    /// A user turn carrying the submitted text
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Some(content.into()),
            created_at: Utc::now(),
            status: None,
        }
    }

    /// An assistant turn with no content yet
    pub fn placeholder() -> Self {
        Self {
            role: Role::Assistant,
            content: None,
            created_at: Utc::now(),
            status: Some(TurnStatus::Pending),
        }
    }

    /// An already-completed assistant turn (greetings)
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Some(content.into()),
            created_at: Utc::now(),
            status: Some(TurnStatus::Completed),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Text of the turn; `None` while an assistant turn is pending
    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Status of an assistant turn; always `None` for user turns
    pub fn status(&self) -> Option<TurnStatus> {
        self.status
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }

    /// Whether this is an assistant turn still waiting on the service
    pub fn is_pending(&self) -> bool {
        self.status == Some(TurnStatus::Pending)
    }

    /// Whether this is an assistant turn the user paused
    pub fn is_cancelled(&self) -> bool {
        self.status == Some(TurnStatus::Cancelled)
    }

    /// Settle a pending placeholder. Returns `false` (and changes nothing)
    /// if the turn is not pending or `status` is not terminal.
    pub(crate) fn resolve(&mut self, status: TurnStatus, content: impl Into<String>) -> bool {
        if !self.is_pending() || !status.is_terminal() {
            return false;
        }
        self.status = Some(status);
        self.content = Some(content.into());
        true
    }
}
