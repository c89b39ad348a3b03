//! File-based Workflow Source Adapter
//!
//! Reads a single workflow definition from a YAML or JSON file. JSON is
//! accepted because `serde_yaml` parses it as well.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::domain::workflow::WorkflowDefinition;
use crate::ports::{WorkflowRequest, WorkflowSource, WorkflowSourceError};

/// Loads the workflow stored at `path`.
///
/// The requested name must match the definition id; the passcode is ignored.
#[derive(Debug, Clone)]
pub struct FileWorkflowSource {
    path: PathBuf,
}

impl FileWorkflowSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Parses a definition from YAML or JSON text.
    pub fn parse(text: &str) -> Result<WorkflowDefinition, WorkflowSourceError> {
        serde_yaml::from_str(text).map_err(|e| WorkflowSourceError::Parse(e.to_string()))
    }
}

#[async_trait]
impl WorkflowSource for FileWorkflowSource {
    async fn load_workflow(
        &self,
        request: &WorkflowRequest,
    ) -> Result<WorkflowDefinition, WorkflowSourceError> {
        let text = match fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(WorkflowSourceError::NotFound(request.name.clone()))
            }
            Err(e) => {
                return Err(WorkflowSourceError::Io(format!(
                    "{}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        let definition = Self::parse(&text)?;
        if definition.id().as_str() != request.name {
            return Err(WorkflowSourceError::NotFound(request.name.clone()));
        }

        tracing::debug!(
            workflow_id = %definition.id(),
            steps = definition.steps().len(),
            path = %self.path.display(),
            "Loaded workflow definition from file"
        );
        Ok(definition)
    }
}
