//! VoiceSessionBridge - connects a realtime voice session to step progress.
//!
//! Flow for one step:
//!
//! 1. `begin` asks the agent connector for a signed URL, activates the step and
//!    opens the transport. The step is "awaiting agent" until it connects.
//! 2. Transport events are fed to `handle_event`: the conversation id is bound
//!    on connect, transcribed messages are logged, and a disconnect triggers
//!    one reconciliation.
//! 3. `end` closes the transport. An in-flight reconciliation is not cancelled.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use crate::domain::foundation::StepId;
use crate::domain::progress::{NewMessage, ProgressRuleError};
use crate::ports::{AgentConnector, ConnectorError, TransportError, TransportEvent, VoiceTransport};

use super::{ConversationReconciler, ProgressError, ProgressService, ReconcileOutcome};

#[derive(Debug, thiserror::Error)]
pub enum VoiceSessionError {
    #[error(transparent)]
    Progress(#[from] ProgressError),

    #[error("could not get a session for the agent: {0}")]
    Connector(#[from] ConnectorError),

    #[error("voice transport failed: {0}")]
    Transport(#[from] TransportError),
}

impl From<ProgressRuleError> for VoiceSessionError {
    fn from(err: ProgressRuleError) -> Self {
        Self::Progress(ProgressError::Rule(err))
    }
}

/// Drives voice sessions for workflow steps.
pub struct VoiceSessionBridge {
    service: Arc<ProgressService>,
    reconciler: Arc<ConversationReconciler>,
    connector: Arc<dyn AgentConnector>,
    transport: Arc<dyn VoiceTransport>,
    awaiting_agent: Mutex<HashSet<StepId>>,
}

impl VoiceSessionBridge {
    pub fn new(
        service: Arc<ProgressService>,
        reconciler: Arc<ConversationReconciler>,
        connector: Arc<dyn AgentConnector>,
        transport: Arc<dyn VoiceTransport>,
    ) -> Self {
        Self {
            service,
            reconciler,
            connector,
            transport,
            awaiting_agent: Mutex::new(HashSet::new()),
        }
    }

    /// Opens a voice session for `step_id`.
    ///
    /// Nothing is mutated if the step is locked or no signed URL can be issued.
    pub async fn begin(&self, step_id: &StepId) -> Result<(), VoiceSessionError> {
        let step = self
            .service
            .definition()
            .step(step_id)
            .ok_or_else(|| ProgressRuleError::StepNotFound(step_id.clone()))?;
        let agent_id = step.agent_id.clone();

        if !self.service.can_activate_step(step_id).await? {
            return Err(ProgressRuleError::StepLocked(step_id.clone()).into());
        }

        let signed_url = self.connector.signed_url(&agent_id).await?;
        self.service.activate_step(step_id).await?;
        self.transport.start_session(&signed_url).await?;

        self.awaiting().insert(step_id.clone());
        tracing::info!(step_id = %step_id, agent_id = %agent_id, "Voice session opened");
        Ok(())
    }

    /// Applies one transport event to the step's progress.
    ///
    /// Returns the reconciliation outcome for `Disconnected`.
    pub async fn handle_event(
        &self,
        step_id: &StepId,
        event: TransportEvent,
    ) -> Result<Option<ReconcileOutcome>, VoiceSessionError> {
        match event {
            TransportEvent::Connected { conversation_id } => {
                self.awaiting().remove(step_id);
                self.service
                    .start_conversation(step_id, conversation_id)
                    .await?;
                Ok(None)
            }
            TransportEvent::Message { content, role } => {
                self.service
                    .record_message(step_id, NewMessage::new(role, content))
                    .await?;
                Ok(None)
            }
            TransportEvent::Disconnected => {
                self.awaiting().remove(step_id);
                let outcome = self.reconciler.handle_disconnect(step_id).await?;
                tracing::debug!(step_id = %step_id, outcome = ?outcome, "Voice session disconnected");
                Ok(Some(outcome))
            }
        }
    }

    /// Closes the transport and stops waiting for the agent.
    pub async fn end(&self, step_id: &StepId) -> Result<(), VoiceSessionError> {
        self.awaiting().remove(step_id);
        self.transport.end_session().await?;
        tracing::info!(step_id = %step_id, "Voice session closed");
        Ok(())
    }

    /// True between `begin` and the agent connecting (or the session ending).
    pub fn is_awaiting_agent(&self, step_id: &StepId) -> bool {
        self.awaiting().contains(step_id)
    }

    fn awaiting(&self) -> std::sync::MutexGuard<'_, HashSet<StepId>> {
        self.awaiting_agent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
