//! Workflow Source Port - Where workflow definitions come from.

use async_trait::async_trait;
use secrecy::Secret;

use crate::domain::workflow::WorkflowDefinition;

/// Port for loading a workflow definition by name.
#[async_trait]
pub trait WorkflowSource: Send + Sync {
    async fn load_workflow(
        &self,
        request: &WorkflowRequest,
    ) -> Result<WorkflowDefinition, WorkflowSourceError>;
}

/// Name of the workflow plus the optional passcode guarding it.
#[derive(Debug, Clone)]
pub struct WorkflowRequest {
    pub name: String,
    pub passcode: Option<Secret<String>>,
}

impl WorkflowRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passcode: None,
        }
    }

    pub fn with_passcode(mut self, passcode: impl Into<String>) -> Self {
        self.passcode = Some(Secret::new(passcode.into()));
        self
    }
}

/// Workflow source errors.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowSourceError {
    #[error("workflow not found: {0}")]
    NotFound(String),

    #[error("passcode rejected for workflow {0}")]
    Unauthorized(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("unexpected status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("IO error: {0}")]
    Io(String),

    #[error("could not parse workflow: {0}")]
    Parse(String),
}
