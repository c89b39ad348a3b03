//! Workflow selection configuration

use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use std::path::PathBuf;

use super::error::ValidationError;
use crate::ports::WorkflowRequest;

/// Which workflow to run and where its definition comes from
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowConfig {
    /// Workflow name (its definition id)
    pub name: String,

    /// Passcode for protected workflows
    pub passcode: Option<Secret<String>>,

    /// Load the definition from this YAML/JSON file instead of the agent service
    pub definition_path: Option<PathBuf>,
}

impl WorkflowConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingRequired("workflow.name"));
        }
        Ok(())
    }

    /// Request for the configured workflow.
    pub fn request(&self) -> WorkflowRequest {
        let request = WorkflowRequest::new(self.name.trim());
        match &self.passcode {
            Some(passcode) => request.with_passcode(passcode.expose_secret().as_str()),
            None => request,
        }
    }
}
