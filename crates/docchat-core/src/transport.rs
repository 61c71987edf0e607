//! Transport abstraction for reaching the answer service

use std::time::Duration;

use async_trait::async_trait;
use docchat_api::ChatClient;

use crate::session::SessionId;

/// Something that can answer a question within a session.
///
/// Implementations do not need to handle cancellation: the controller stops
/// waiting on the future when an exchange is paused or stopped, and whatever
/// the service does afterwards is ignored.
#[async_trait]
pub trait AnswerService: Send + Sync {
    /// Ask one question. `Ok(None)` means the service replied without an answer.
    async fn ask(&self, session_id: &SessionId, question: &str)
    -> docchat_api::Result<Option<String>>;
}

/// HTTP transport - posts questions to the service's `/chat` endpoint
pub struct HttpTransport {
    client: ChatClient,
}

impl HttpTransport {
    /// Create a transport for the service at `base_url`
    pub fn new(base_url: impl Into<String>, timeout: Option<Duration>) -> crate::Result<Self> {
        Ok(Self {
            client: ChatClient::with_timeout(base_url, timeout)?,
        })
    }

    pub fn base_url(&self) -> &str {
        self.client.base_url()
    }
}

#[async_trait]
impl AnswerService for HttpTransport {
    async fn ask(
        &self,
        session_id: &SessionId,
        question: &str,
    ) -> docchat_api::Result<Option<String>> {
        let reply = self.client.ask(session_id.as_str(), question).await?;
        Ok(reply.into_answer())
    }
}
