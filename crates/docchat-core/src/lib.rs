//! docchat-core: Turn lifecycle controller
//!
//! This crate owns the conversation: the ordered turns, the single in-flight
//! exchange with its cancellation token, and the reconciliation that runs when
//! a request settles. Front ends read [`Snapshot`]s and send intents through a
//! [`ControllerHandle`].

pub mod controller;
pub mod conversation;
pub mod error;
pub mod events;
pub mod handle;
pub mod session;
pub mod transport;
pub mod turn;

pub use controller::{
    ControllerConfig, DEFAULT_GREETING, ExchangeId, FAILURE_MESSAGE, FALLBACK_ANSWER, Failure,
    Outcome, PAUSE_NOTICE, Settlement, TurnController,
};
pub use conversation::{Controls, Snapshot};
pub use error::{Error, Result};
pub use events::ConversationEvent;
pub use handle::{ControllerHandle, Intent};
pub use session::{SessionId, SessionIdentity};
pub use transport::{AnswerService, HttpTransport};
pub use turn::{Role, Turn, TurnStatus};
