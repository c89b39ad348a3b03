//! HTTP adapter for the `WorkflowSource` port.

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::ExposeSecret;
use serde::Serialize;

use crate::domain::workflow::WorkflowDefinition;
use crate::ports::{WorkflowRequest, WorkflowSource, WorkflowSourceError};

use super::client::{AgentApiClient, ApiFailure};

#[derive(Serialize)]
struct WorkflowFetchBody<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    passcode: Option<&'a str>,
}

/// Loads workflow definitions via `POST /api/workflow`.
#[derive(Debug, Clone)]
pub struct HttpWorkflowSource {
    client: AgentApiClient,
}

impl HttpWorkflowSource {
    pub fn new(client: AgentApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WorkflowSource for HttpWorkflowSource {
    async fn load_workflow(
        &self,
        request: &WorkflowRequest,
    ) -> Result<WorkflowDefinition, WorkflowSourceError> {
        let body = WorkflowFetchBody {
            name: &request.name,
            passcode: request.passcode.as_ref().map(|p| p.expose_secret().as_str()),
        };

        self.client
            .send_json(self.client.post("/api/workflow").json(&body))
            .await
            .map_err(|failure| match failure {
                ApiFailure::Timeout { timeout_secs } => WorkflowSourceError::Timeout { timeout_secs },
                ApiFailure::Network(message) => WorkflowSourceError::Network(message),
                ApiFailure::Status { status, .. } if status == StatusCode::NOT_FOUND => {
                    WorkflowSourceError::NotFound(request.name.clone())
                }
                ApiFailure::Status { status, .. }
                    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN =>
                {
                    WorkflowSourceError::Unauthorized(request.name.clone())
                }
                ApiFailure::Status { status, body } => WorkflowSourceError::Status {
                    status: status.as_u16(),
                    message: body,
                },
                ApiFailure::Malformed(message) => WorkflowSourceError::Parse(message),
            })
    }
}
