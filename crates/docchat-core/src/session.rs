//! Session identity: one opaque token per conversation

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Opaque token correlating every request of one conversation at the service
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh random token
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hands out the session token, generating it on first use.
///
/// The token never changes once produced.
#[derive(Debug, Default)]
pub struct SessionIdentity {
    id: OnceLock<SessionId>,
}

impl SessionIdentity {
    /// Create a provider that generates its token lazily
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a provider pinned to an existing token
    pub fn with_id(id: impl Into<SessionId>) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(id.into());
        Self { id: cell }
    }

    /// The session token; generated on the first call, cached afterwards
    pub fn id(&self) -> &SessionId {
        self.id.get_or_init(|| {
            let id = SessionId::generate();
            tracing::debug!(session_id = %id, "generated session id");
            id
        })
    }
}
