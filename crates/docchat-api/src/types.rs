//! Wire types for the `/chat` endpoint

use serde::{Deserialize, Serialize};

/// Body of `POST /chat`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub question: String,
}

impl ChatRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
        }
    }
}

/// Successful reply from `POST /chat`.
///
/// `answer` may be absent; that is a valid reply, not an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
}

impl ChatResponse {
    /// The answer text, treating an empty string the same as a missing field
    pub fn into_answer(self) -> Option<String> {
        self.answer.filter(|a| !a.is_empty())
    }
}
