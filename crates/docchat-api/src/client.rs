//! HTTP client for the answer service

use std::time::Duration;

use crate::{
    error::{Error, Result},
    types::{ChatRequest, ChatResponse},
};

/// Where the service listens when nothing else is configured
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Answer service client
#[derive(Debug, Clone)]
pub struct ChatClient {
    client: reqwest::Client,
    base_url: String,
}

impl ChatClient {
    /// Create a client for the given base URL, with no request timeout
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, None)
    }

    /// Create a client whose requests give up after `timeout`.
    ///
    /// `None` waits for the service indefinitely.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Option<Duration>) -> Result<Self> {
        let base_url = base_url.into();
        let base_url = base_url.trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(Error::InvalidConfig(format!(
                "base URL must start with http:// or https://, got {:?}",
                base_url
            )));
        }

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            base_url,
        })
    }

    /// Base URL requests are sent to (no trailing slash)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Post a question under the given session.
    ///
    /// Any non-2xx status is an error; a 2xx body must be a JSON object, but
    /// its `answer` field is optional.
    pub async fn ask(&self, session_id: &str, question: &str) -> Result<ChatResponse> {
        let url = format!("{}/chat", self.base_url);
        tracing::debug!(%url, session_id, "posting question");

        let response = self
            .client
            .post(&url)
            .query(&[("session_id", session_id)])
            .json(&ChatRequest::new(question))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::status(status.as_u16(), body));
        }

        let body = response.text().await?;
        let reply: ChatResponse = serde_json::from_str(&body)?;
        Ok(reply)
    }
}
