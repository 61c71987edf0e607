//! Error types for docchat-api

use thiserror::Error;

/// Result type alias using docchat-api Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to the answer service
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed (connection refused, reset, timeout, ...)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The service answered with a non-success status
    #[error("Service returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Invalid client configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create a status error from a status code and response body
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            status,
            body: body.into(),
        }
    }

    /// HTTP status code, if the service produced one
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Status { status, .. } => Some(*status),
            Error::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether the failure looks transient (worth asking again by hand).
    ///
    /// The client never retries on its own; this only feeds the failure log.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http(e) => e.is_timeout() || e.is_connect(),
            Error::Status { status, .. } => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }
}
