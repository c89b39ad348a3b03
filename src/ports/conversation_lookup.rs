//! Conversation Lookup Port - Authoritative conversation records.
//!
//! The external agent service finishes its analysis some time after the voice
//! socket closes. This port fetches whatever it currently knows about a
//! conversation so the reconciler can merge it into local progress.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{AgentId, ConversationId};

/// Port for fetching conversation records from the agent service.
#[async_trait]
pub trait ConversationLookup: Send + Sync {
    /// Fetches the current record for `conversation_id`.
    ///
    /// # Errors
    ///
    /// Any failure means "reconciliation failed this attempt". Callers must
    /// leave local state untouched and retry later.
    async fn fetch_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<RemoteConversation, LookupError>;
}

/// A conversation record as reported by the agent service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConversation {
    #[serde(alias = "conversation_id")]
    pub conversation_id: ConversationId,
    #[serde(default, alias = "agent_id")]
    pub agent_id: Option<AgentId>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub transcript: Vec<TranscriptEntry>,
    #[serde(default)]
    pub analysis: Option<serde_json::Value>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// One turn of a remote transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub role: String,
    #[serde(default, alias = "content")]
    pub message: Option<String>,
    #[serde(default)]
    pub time_in_call_secs: Option<f64>,
}

/// Conversation lookup errors.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    /// Network error during request.
    #[error("network error: {0}")]
    Network(String),

    /// Request timed out.
    #[error("request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// The service has no record of this conversation (yet).
    #[error("conversation not found: {0}")]
    NotFound(ConversationId),

    /// Non-success status code.
    #[error("unexpected status {status}: {message}")]
    Status { status: u16, message: String },

    /// Body was not a conversation record.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl LookupError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse(message.into())
    }

    /// Returns true if a later attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            LookupError::Network(_) | LookupError::Timeout { .. } | LookupError::NotFound(_) => {
                true
            }
            LookupError::Status { status, .. } => *status == 429 || *status >= 500,
            LookupError::MalformedResponse(_) => false,
        }
    }
}
