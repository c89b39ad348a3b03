//! StepProgress - the progress record of a single step.
//!
//! Every operation here is a pure transform: it takes the current snapshot by
//! reference and returns the next one. Persisting the result is the caller's
//! job, which keeps the merge rules testable without any store.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{
    AgentId, ConversationId, MessageId, SectionId, StepId, StepState, Timestamp,
};
use crate::domain::workflow::Step;

use super::{CapturedField, ConversationMessage, ConversationSignal, ConversationStatus, NewMessage};

/// Mutable progress of one step.
///
/// Invariants: `completed_at` is set iff `state == Complete`; `last_modified`
/// moves on every transform; `messages` only ever grows at the end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepProgress {
    pub step_id: StepId,
    pub section_id: SectionId,
    pub agent_id: AgentId,
    pub state: StepState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<ConversationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_status: Option<ConversationStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<serde_json::Value>,
    #[serde(default)]
    pub messages: Vec<ConversationMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured_data: Option<Vec<CapturedField>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Timestamp>,
    pub last_modified: Timestamp,
}

impl StepProgress {
    /// Fresh record for a definition step, denormalizing its section and agent.
    pub fn new(step: &Step, now: Timestamp) -> Self {
        Self {
            step_id: step.id.clone(),
            section_id: step.section_id.clone(),
            agent_id: step.agent_id.clone(),
            state: StepState::NotStarted,
            conversation_id: None,
            conversation_status: None,
            success: None,
            analysis: None,
            messages: Vec::new(),
            captured_data: None,
            error_reason: None,
            started_at: None,
            completed_at: None,
            last_modified: now,
        }
    }

    /// Sets the state.
    ///
    /// `started_at` is stamped the first time the step enters `InProgress` and
    /// never reset afterwards. `completed_at` is stamped on entering `Complete`
    /// (kept if already set) and cleared for any other state.
    pub fn with_state(
        &self,
        state: StepState,
        captured_data: Option<Vec<CapturedField>>,
        now: Timestamp,
    ) -> Self {
        let mut next = self.clone();

        if state == StepState::InProgress && next.started_at.is_none() {
            next.started_at = Some(now);
        }
        if state == StepState::Complete {
            next.completed_at.get_or_insert(now);
        } else {
            next.completed_at = None;
        }
        if state != StepState::Error {
            next.error_reason = None;
        }
        if let Some(data) = captured_data {
            next.captured_data = Some(data);
        }

        next.state = state;
        next.last_modified = now;
        next
    }

    /// Moves the step into the fail-stop state.
    pub fn with_error(&self, reason: impl Into<String>, now: Timestamp) -> Self {
        let mut next = self.with_state(StepState::Error, None, now);
        next.error_reason = Some(reason.into());
        next
    }

    /// Appends a message, returning the new snapshot and the stored message id.
    pub fn with_message(&self, message: NewMessage, now: Timestamp) -> (Self, MessageId) {
        let mut next = self.clone();
        let message = message.into_message(now);
        let id = message.id.clone();
        next.messages.push(message);
        next.last_modified = now;
        (next, id)
    }

    /// Records the external conversation reference.
    ///
    /// The same id again only refreshes `last_modified`. A different id starts a
    /// new conversation, so the previous remote outcome is dropped.
    pub fn with_conversation(&self, conversation_id: ConversationId, now: Timestamp) -> Self {
        let mut next = self.clone();
        if next.conversation_id.as_ref() != Some(&conversation_id) {
            next.conversation_id = Some(conversation_id);
            next.conversation_status = None;
            next.success = None;
            next.analysis = None;
        }
        next.last_modified = now;
        next
    }

    /// Merges a remote signal.
    ///
    /// A successful outcome promotes the step to `Complete` unless it is already
    /// complete or in the fail-stop state. This is the only path through which a
    /// remote signal completes a step.
    pub fn with_conversation_signal(&self, signal: &ConversationSignal, now: Timestamp) -> Self {
        let mut next = self.clone();

        if let Some(status) = &signal.conversation_status {
            next.conversation_status = Some(status.clone());
        }
        if let Some(success) = signal.success {
            next.success = Some(success);
        }
        if let Some(analysis) = &signal.analysis {
            next.analysis = Some(analysis.clone());
        }
        if let Some(data) = &signal.captured_data {
            next.captured_data = Some(data.clone());
        }

        if next.success == Some(true) && !matches!(next.state, StepState::Complete | StepState::Error)
        {
            next.state = StepState::Complete;
            next.completed_at.get_or_insert(now);
        }

        next.last_modified = now;
        next
    }

    /// True when the remote side still owes this step an outcome.
    pub fn has_pending_conversation(&self) -> bool {
        self.conversation_status
            .as_ref()
            .is_some_and(ConversationStatus::is_pending)
    }
}
