//! Error types for docchat-core

use thiserror::Error;

/// Result type alias using docchat-core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving a conversation.
///
/// Intent rejections leave the conversation untouched; front ends are free to
/// ignore them.
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the answer service client
    #[error(transparent)]
    Api(#[from] docchat_api::Error),

    /// Submitted text was empty or whitespace
    #[error("Nothing to send")]
    EmptyInput,

    /// An exchange is already waiting on the service
    #[error("A response is already in progress")]
    ExchangeInFlight,

    /// Pause was requested with nothing in flight
    #[error("No response is in progress")]
    NothingInFlight,

    /// Resume was requested but the last response was not paused
    #[error("Nothing to resume")]
    NotPaused,

    /// The controller's run loop has shut down
    #[error("Conversation closed")]
    Closed,
}

impl Error {
    /// Whether this is an intent rejected by a precondition
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Error::EmptyInput | Error::ExchangeInFlight | Error::NothingInFlight | Error::NotPaused
        )
    }
}
