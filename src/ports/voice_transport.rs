//! Voice Transport Port - The realtime audio session with an agent.
//!
//! The progress engine does not care about the audio protocol. It only opens
//! and closes sessions and reacts to the events a session emits.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::ConversationId;
use crate::domain::progress::MessageRole;

use super::SignedUrl;

/// Port for the realtime voice session.
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    /// Opens a session using a signed URL from the agent connector.
    async fn start_session(&self, signed_url: &SignedUrl) -> Result<(), TransportError>;

    /// Closes the current session. Closing an idle transport is a no-op.
    async fn end_session(&self) -> Result<(), TransportError>;

    fn status(&self) -> TransportStatus;
}

/// Connection status of the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportStatus {
    Connecting,
    Connected,
    Disconnected,
}

/// Events emitted by an open session.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The remote side assigned the conversation id.
    Connected { conversation_id: ConversationId },
    /// A transcribed message from either side.
    Message { content: String, role: MessageRole },
    Disconnected,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to connect: {0}")]
    ConnectFailed(String),

    #[error("a session is already open")]
    AlreadyOpen,

    #[error("transport error: {0}")]
    Other(String),
}
