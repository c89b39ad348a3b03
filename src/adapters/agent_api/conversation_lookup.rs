//! HTTP adapter for the `ConversationLookup` port.

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::domain::foundation::ConversationId;
use crate::ports::{ConversationLookup, LookupError, RemoteConversation};

use super::client::{AgentApiClient, ApiFailure};

/// Fetches conversation records via `GET /api/conversation/{id}`.
#[derive(Debug, Clone)]
pub struct HttpConversationLookup {
    client: AgentApiClient,
}

impl HttpConversationLookup {
    pub fn new(client: AgentApiClient) -> Self {
        Self { client }
    }

    fn map_failure(conversation_id: &ConversationId, failure: ApiFailure) -> LookupError {
        match failure {
            ApiFailure::Timeout { timeout_secs } => LookupError::Timeout { timeout_secs },
            ApiFailure::Network(message) => LookupError::Network(message),
            ApiFailure::Status { status, .. } if status == StatusCode::NOT_FOUND => {
                LookupError::NotFound(conversation_id.clone())
            }
            ApiFailure::Status { status, body } => LookupError::Status {
                status: status.as_u16(),
                message: body,
            },
            ApiFailure::Malformed(message) => LookupError::MalformedResponse(message),
        }
    }
}

#[async_trait]
impl ConversationLookup for HttpConversationLookup {
    async fn fetch_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<RemoteConversation, LookupError> {
        let request = self
            .client
            .get_segments(&["api", "conversation", conversation_id.as_str()])
            .map_err(|failure| Self::map_failure(conversation_id, failure))?;
        let record: RemoteConversation = self
            .client
            .send_json(request)
            .await
            .map_err(|failure| Self::map_failure(conversation_id, failure))?;

        if &record.conversation_id != conversation_id {
            return Err(LookupError::MalformedResponse(format!(
                "requested conversation '{}' but received '{}'",
                conversation_id, record.conversation_id
            )));
        }
        Ok(record)
    }
}
