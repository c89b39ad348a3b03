//! Remote conversation signals merged into step progress.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::CapturedField;

/// Free-text status reported by the agent service (`processing`, `done`, `failed`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationStatus(String);

impl ConversationStatus {
    pub const PROCESSING: &'static str = "processing";
    pub const IN_PROGRESS: &'static str = "in-progress";
    pub const DONE: &'static str = "done";
    pub const FAILED: &'static str = "failed";

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn processing() -> Self {
        Self::new(Self::PROCESSING)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True while the remote side has not produced a final outcome yet.
    pub fn is_pending(&self) -> bool {
        let normalized = self.0.trim().to_ascii_lowercase();
        matches!(normalized.as_str(), "processing" | "in-progress" | "in_progress")
    }
}

impl fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationStatus {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Update about an external conversation. Absent fields leave the step untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSignal {
    #[serde(default)]
    pub conversation_status: Option<ConversationStatus>,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub analysis: Option<serde_json::Value>,
    #[serde(default)]
    pub captured_data: Option<Vec<CapturedField>>,
}

impl ConversationSignal {
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.conversation_status = Some(ConversationStatus::new(status));
        self
    }

    pub fn with_success(mut self, success: bool) -> Self {
        self.success = Some(success);
        self
    }

    pub fn with_analysis(mut self, analysis: serde_json::Value) -> Self {
        self.analysis = Some(analysis);
        self
    }

    pub fn with_captured_data(mut self, data: Vec<CapturedField>) -> Self {
        self.captured_data = Some(data);
        self
    }

    /// Returns true if the signal carries nothing.
    pub fn is_empty(&self) -> bool {
        self.conversation_status.is_none()
            && self.success.is_none()
            && self.analysis.is_none()
            && self.captured_data.is_none()
    }
}
