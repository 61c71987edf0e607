//! docchat-api: Client for the document chat answer service
//!
//! This crate speaks the service's single endpoint: a question is posted to
//! `/chat` under a session id, and the service replies with an optional answer.

pub mod client;
pub mod error;
pub mod types;

pub use client::{ChatClient, DEFAULT_BASE_URL};
pub use error::{Error, Result};
pub use types::{ChatRequest, ChatResponse};
