//! Agent Connector Port - Issues signed voice-session URLs.

use async_trait::async_trait;
use secrecy::{ExposeSecret, Secret};

use crate::domain::foundation::AgentId;

/// Port for requesting a signed connection to a conversational agent.
#[async_trait]
pub trait AgentConnector: Send + Sync {
    /// Requests a signed URL for `agent_id`.
    ///
    /// A failure here must prevent the conversation from starting.
    async fn signed_url(&self, agent_id: &AgentId) -> Result<SignedUrl, ConnectorError>;
}

/// Short-lived URL that authorizes one voice session.
///
/// The URL embeds a credential, so it is kept out of `Debug` output and logs.
#[derive(Clone)]
pub struct SignedUrl(Secret<String>);

impl SignedUrl {
    pub fn new(url: impl Into<String>) -> Self {
        Self(Secret::new(url.into()))
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for SignedUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SignedUrl([REDACTED])")
    }
}

/// Agent connector errors.
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("agent not found: {0}")]
    UnknownAgent(AgentId),

    #[error("unexpected status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_url_debug_is_redacted() {
        let url = SignedUrl::new("wss://agents.example/session?token=abc");
        assert!(!format!("{:?}", url).contains("token"));
        assert!(url.expose().ends_with("token=abc"));
    }

    #[test]
    fn test_unknown_agent_message() {
        let err = ConnectorError::UnknownAgent(AgentId::from("agent-x"));
        assert_eq!(err.to_string(), "agent not found: agent-x");
    }
}
