//! HTTP adapter for the `AgentConnector` port.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::AgentId;
use crate::ports::{AgentConnector, ConnectorError, SignedUrl};

use super::client::{AgentApiClient, ApiFailure};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignedUrlRequest<'a> {
    agent_id: &'a AgentId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignedUrlResponse {
    #[serde(alias = "signed_url")]
    signed_url: String,
}

/// Requests signed session URLs via `POST /api/workflow/agent`.
#[derive(Debug, Clone)]
pub struct HttpAgentConnector {
    client: AgentApiClient,
}

impl HttpAgentConnector {
    pub fn new(client: AgentApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AgentConnector for HttpAgentConnector {
    async fn signed_url(&self, agent_id: &AgentId) -> Result<SignedUrl, ConnectorError> {
        let request = self
            .client
            .post("/api/workflow/agent")
            .json(&SignedUrlRequest { agent_id });

        let response: SignedUrlResponse =
            self.client
                .send_json(request)
                .await
                .map_err(|failure| match failure {
                    ApiFailure::Timeout { timeout_secs } => ConnectorError::Timeout { timeout_secs },
                    ApiFailure::Network(message) => ConnectorError::Network(message),
                    ApiFailure::Status { status, .. } if status == StatusCode::NOT_FOUND => {
                        ConnectorError::UnknownAgent(agent_id.clone())
                    }
                    ApiFailure::Status { status, body } => ConnectorError::Status {
                        status: status.as_u16(),
                        message: body,
                    },
                    ApiFailure::Malformed(message) => ConnectorError::MalformedResponse(message),
                })?;

        if response.signed_url.trim().is_empty() {
            return Err(ConnectorError::MalformedResponse(
                "empty signedUrl".to_string(),
            ));
        }
        Ok(SignedUrl::new(response.signed_url))
    }
}
