//! ProgressService - the orchestration facade over one progress aggregate.
//!
//! Every mutation runs as one transaction behind an async mutex:
//!
//! 1. take the current aggregate (loading or creating it on first access)
//! 2. apply a domain transform to a copy
//! 3. persist the copy, then publish it
//!
//! A rejected transform or a failed persist leaves both the store and the
//! in-memory aggregate as they were.

use std::sync::Arc;

use tokio::sync::{watch, Mutex};

use crate::domain::foundation::{ConversationId, MessageId, StepId, Timestamp};
use crate::domain::progress::{
    check_consistency, CapturedField, ConversationSignal, NewMessage, ProgressAggregate,
    ProgressRuleError,
};
use crate::domain::workflow::WorkflowDefinition;
use crate::ports::{Clock, StorageError};

use super::ProgressPersistence;

/// Errors returned by the progress facade.
#[derive(Debug, thiserror::Error)]
pub enum ProgressError {
    #[error(transparent)]
    Rule(#[from] ProgressRuleError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Behavior switches for the facade.
#[derive(Debug, Clone)]
pub struct ProgressServiceConfig {
    /// Activate the next step after the current one completes.
    pub auto_advance: bool,
}

impl Default for ProgressServiceConfig {
    fn default() -> Self {
        Self { auto_advance: true }
    }
}

impl ProgressServiceConfig {
    pub fn with_auto_advance(mut self, auto_advance: bool) -> Self {
        self.auto_advance = auto_advance;
        self
    }
}

/// Result of an operation that may complete a step.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StepOutcome {
    /// The operation moved the step into `Complete`.
    pub completed: bool,
    /// The step auto-advance activated afterwards, if any.
    pub advanced_to: Option<StepId>,
}

/// Result of applying a remote conversation record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteApplyOutcome {
    Applied(StepOutcome),
    /// The step no longer carries the fetched conversation (reset or restarted).
    Stale,
}

/// Facade over the progress of one workflow in the current session.
pub struct ProgressService {
    definition: Arc<WorkflowDefinition>,
    persistence: ProgressPersistence,
    clock: Arc<dyn Clock>,
    config: ProgressServiceConfig,
    state: Mutex<Option<ProgressAggregate>>,
    updates: watch::Sender<Option<ProgressAggregate>>,
}

impl ProgressService {
    pub fn new(
        definition: Arc<WorkflowDefinition>,
        persistence: ProgressPersistence,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::with_config(definition, persistence, clock, ProgressServiceConfig::default())
    }

    pub fn with_config(
        definition: Arc<WorkflowDefinition>,
        persistence: ProgressPersistence,
        clock: Arc<dyn Clock>,
        config: ProgressServiceConfig,
    ) -> Self {
        let (updates, _) = watch::channel(None);
        Self {
            definition,
            persistence,
            clock,
            config,
            state: Mutex::new(None),
            updates,
        }
    }

    pub fn definition(&self) -> &WorkflowDefinition {
        &self.definition
    }

    /// Observes the current aggregate. `None` until first access and after a reset.
    pub fn subscribe(&self) -> watch::Receiver<Option<ProgressAggregate>> {
        self.updates.subscribe()
    }

    // ───────────────────────────────────────────────────────────────
    // Queries
    // ───────────────────────────────────────────────────────────────

    /// Current aggregate, loaded from storage or created on first access.
    pub async fn current(&self) -> Result<ProgressAggregate, ProgressError> {
        let mut slot = self.state.lock().await;
        self.snapshot(&mut slot).await
    }

    pub async fn can_activate_step(&self, step_id: &StepId) -> Result<bool, ProgressError> {
        Ok(self
            .current()
            .await?
            .can_activate_step(&self.definition, step_id))
    }

    // ───────────────────────────────────────────────────────────────
    // Commands
    // ───────────────────────────────────────────────────────────────

    /// Makes `step_id` the current step if the unlock rule allows it.
    pub async fn activate_step(&self, step_id: &StepId) -> Result<(), ProgressError> {
        self.transact(|aggregate, now| aggregate.activate_step(&self.definition, step_id, now))
            .await?;
        tracing::info!(step_id = %step_id, "Step activated");
        Ok(())
    }

    /// Completes the current step and, with auto-advance on, activates the next one.
    pub async fn complete_current_step(
        &self,
        captured_data: Option<Vec<CapturedField>>,
    ) -> Result<StepOutcome, ProgressError> {
        let (step_id, completed) = self
            .transact(|aggregate, now| {
                let step_id = aggregate.current_step_id.clone();
                let completed = aggregate.complete_step(&step_id, captured_data, now)?;
                Ok((step_id, completed))
            })
            .await?;

        if completed {
            tracing::info!(step_id = %step_id, "Step completed");
        }
        self.outcome(&step_id, completed).await
    }

    /// Binds an external conversation to a step and makes it active.
    pub async fn start_conversation(
        &self,
        step_id: &StepId,
        conversation_id: ConversationId,
    ) -> Result<(), ProgressError> {
        let conversation = conversation_id.clone();
        self.transact(|aggregate, now| {
            aggregate.start_conversation(&self.definition, step_id, conversation_id, now)
        })
        .await?;
        tracing::info!(step_id = %step_id, conversation_id = %conversation, "Conversation started");
        Ok(())
    }

    pub async fn record_message(
        &self,
        step_id: &StepId,
        message: NewMessage,
    ) -> Result<MessageId, ProgressError> {
        self.transact(|aggregate, now| aggregate.record_message(step_id, message, now))
            .await
    }

    /// Merges a conversation signal reported by the local driver.
    pub async fn apply_conversation_update(
        &self,
        step_id: &StepId,
        signal: ConversationSignal,
    ) -> Result<StepOutcome, ProgressError> {
        let completed = self
            .transact(|aggregate, now| aggregate.apply_conversation_signal(step_id, &signal, now))
            .await?;
        if completed {
            tracing::info!(step_id = %step_id, "Step completed by conversation outcome");
        }
        self.outcome(step_id, completed).await
    }

    /// Merges a fetched remote record, unless the step has moved on since the
    /// fetch started.
    pub async fn apply_remote_update(
        &self,
        step_id: &StepId,
        conversation_id: &ConversationId,
        signal: ConversationSignal,
    ) -> Result<RemoteApplyOutcome, ProgressError> {
        let applied = self
            .transact(|aggregate, now| {
                let still_bound = aggregate
                    .step(step_id)
                    .is_some_and(|s| s.conversation_id.as_ref() == Some(conversation_id));
                if !still_bound {
                    return Ok(None);
                }
                aggregate
                    .apply_conversation_signal(step_id, &signal, now)
                    .map(Some)
            })
            .await?;

        match applied {
            None => {
                tracing::debug!(
                    step_id = %step_id,
                    conversation_id = %conversation_id,
                    "Dropping stale conversation result"
                );
                Ok(RemoteApplyOutcome::Stale)
            }
            Some(completed) => {
                if completed {
                    tracing::info!(step_id = %step_id, "Step completed by reconciliation");
                }
                Ok(RemoteApplyOutcome::Applied(self.outcome(step_id, completed).await?))
            }
        }
    }

    /// Flags the step's conversation as awaiting its remote outcome.
    pub async fn mark_conversation_processing(&self, step_id: &StepId) -> Result<bool, ProgressError> {
        self.transact(|aggregate, now| aggregate.mark_conversation_processing(step_id, now))
            .await
    }

    /// Moves a step into the fail-stop `error` state.
    pub async fn fail_step(
        &self,
        step_id: &StepId,
        reason: impl Into<String>,
    ) -> Result<(), ProgressError> {
        let reason = reason.into();
        tracing::warn!(step_id = %step_id, reason = %reason, "Step failed");
        self.transact(|aggregate, now| aggregate.fail_step(step_id, reason, now))
            .await
    }

    pub async fn clear_step_error(&self, step_id: &StepId) -> Result<(), ProgressError> {
        self.transact(|aggregate, now| aggregate.clear_step_error(step_id, now))
            .await
    }

    /// Discards the aggregate. A fresh one is created on next access.
    pub async fn reset_progress(&self) -> Result<(), ProgressError> {
        let mut slot = self.state.lock().await;
        self.persistence.clear(self.definition.id()).await?;
        *slot = None;
        self.updates.send_replace(None);
        tracing::info!(workflow_id = %self.definition.id(), "Progress reset");
        Ok(())
    }

    /// Serializes all progress of the session.
    pub async fn export_progress(&self) -> Result<String, ProgressError> {
        let _slot = self.state.lock().await;
        Ok(self.persistence.export_all(self.clock.now()).await?)
    }

    /// Restores progress from an export. Returns false and changes nothing
    /// when the blob is malformed.
    pub async fn import_progress(&self, blob: &str) -> Result<bool, ProgressError> {
        let mut slot = self.state.lock().await;
        if !self.persistence.import_all(blob, self.clock.now()).await? {
            return Ok(false);
        }
        *slot = None;
        self.snapshot(&mut slot).await?;
        Ok(true)
    }

    // ───────────────────────────────────────────────────────────────
    // Internals
    // ───────────────────────────────────────────────────────────────

    async fn transact<T, F>(&self, apply: F) -> Result<T, ProgressError>
    where
        F: FnOnce(&mut ProgressAggregate, Timestamp) -> Result<T, ProgressRuleError>,
    {
        let mut slot = self.state.lock().await;
        let current = self.snapshot(&mut slot).await?;

        let now = self.clock.now();
        let mut next = current.clone();
        let value = apply(&mut next, now)?;

        if next != current {
            let saved = self.persistence.save(&next, now).await?;
            *slot = Some(saved.clone());
            self.updates.send_replace(Some(saved));
        }
        Ok(value)
    }

    async fn snapshot(
        &self,
        slot: &mut Option<ProgressAggregate>,
    ) -> Result<ProgressAggregate, ProgressError> {
        if let Some(aggregate) = slot.as_ref() {
            return Ok(aggregate.clone());
        }

        let aggregate = match self.persistence.load(self.definition.id()).await? {
            Some(stored) => {
                for warning in check_consistency(&stored, &self.definition) {
                    tracing::warn!(workflow_id = %stored.workflow_id, "Inconsistent progress: {}", warning);
                }
                stored
            }
            None => {
                let session_id = self.persistence.session_id().await?;
                tracing::debug!(workflow_id = %self.definition.id(), "Starting fresh progress");
                ProgressAggregate::new(&self.definition, session_id, self.clock.now())
            }
        };

        *slot = Some(aggregate.clone());
        self.updates.send_replace(Some(aggregate.clone()));
        Ok(aggregate)
    }

    async fn outcome(&self, step_id: &StepId, completed: bool) -> Result<StepOutcome, ProgressError> {
        let advanced_to = if completed {
            self.advance_after(step_id).await?
        } else {
            None
        };
        Ok(StepOutcome {
            completed,
            advanced_to,
        })
    }

    /// Activates the step after `completed`, if it is still current.
    async fn advance_after(&self, completed: &StepId) -> Result<Option<StepId>, ProgressError> {
        if !self.config.auto_advance {
            return Ok(None);
        }
        let Some(next) = self.definition.next_step_after(completed) else {
            tracing::info!(workflow_id = %self.definition.id(), "Workflow finished");
            return Ok(None);
        };
        let next = next.id.clone();

        let result = self
            .transact(|aggregate, now| {
                if &aggregate.current_step_id != completed {
                    return Ok(false);
                }
                aggregate
                    .activate_step(&self.definition, &next, now)
                    .map(|_| true)
            })
            .await;

        match result {
            Ok(true) => {
                tracing::info!(from = %completed, to = %next, "Advanced to next step");
                Ok(Some(next))
            }
            Ok(false) => Ok(None),
            Err(ProgressError::Rule(e)) => {
                tracing::debug!(step_id = %next, error = %e, "Next step not activated");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
