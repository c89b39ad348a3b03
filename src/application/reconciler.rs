//! ConversationReconciler - folds authoritative conversation outcomes from the
//! agent service back into local progress.
//!
//! The agent service analyses a conversation some time after the voice socket
//! closes, so local progress can be behind. Reconciliation fetches the record,
//! maps it to a `ConversationSignal` and applies it through the facade. The
//! fetch happens outside the facade lock; the apply re-reads the aggregate and
//! drops the result if the step has moved on.

use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;

use crate::domain::foundation::{ConversationId, StepId};
use crate::domain::progress::{CapturedField, ConversationSignal, ConversationStatus};
use crate::ports::{ConversationLookup, LookupError, RemoteConversation};

use super::{ProgressError, ProgressService, RemoteApplyOutcome, StepOutcome};

/// Why a step was not reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    StepNotFound,
    NoConversation,
    /// The remote outcome is already recorded.
    AlreadySettled,
}

/// Result of reconciling one step.
#[derive(Debug)]
pub enum ReconcileOutcome {
    Applied(StepOutcome),
    Skipped(SkipReason),
    /// The fetch failed; local state is untouched and the next sweep retries.
    LookupFailed(LookupError),
    /// The step was reset or rebound while the fetch was in flight.
    Stale,
}

/// Tally of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub checked: usize,
    pub applied: usize,
    pub completed: usize,
    pub failed: usize,
    pub stale: usize,
    pub skipped: usize,
}

impl SweepReport {
    fn record(&mut self, outcome: &ReconcileOutcome) {
        self.checked += 1;
        match outcome {
            ReconcileOutcome::Applied(step) => {
                self.applied += 1;
                if step.completed {
                    self.completed += 1;
                }
            }
            ReconcileOutcome::Skipped(_) => self.skipped += 1,
            ReconcileOutcome::LookupFailed(_) => self.failed += 1,
            ReconcileOutcome::Stale => self.stale += 1,
        }
    }
}

/// Reconciles pending conversations with the agent service.
pub struct ConversationReconciler {
    service: Arc<ProgressService>,
    lookup: Arc<dyn ConversationLookup>,
}

impl ConversationReconciler {
    pub fn new(service: Arc<ProgressService>, lookup: Arc<dyn ConversationLookup>) -> Self {
        Self { service, lookup }
    }

    /// Fetches and applies the remote outcome for one step.
    pub async fn reconcile_step(&self, step_id: &StepId) -> Result<ReconcileOutcome, ProgressError> {
        let current = self.service.current().await?;
        let Some(step) = current.step(step_id) else {
            return Ok(ReconcileOutcome::Skipped(SkipReason::StepNotFound));
        };
        let Some(conversation_id) = step.conversation_id.clone() else {
            tracing::debug!(step_id = %step_id, "No conversation to reconcile");
            return Ok(ReconcileOutcome::Skipped(SkipReason::NoConversation));
        };

        let record = match self.lookup.fetch_conversation(&conversation_id).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(
                    step_id = %step_id,
                    conversation_id = %conversation_id,
                    error = %e,
                    retryable = e.is_retryable(),
                    "Conversation lookup failed"
                );
                return Ok(ReconcileOutcome::LookupFailed(e));
            }
        };

        if record.conversation_id != conversation_id {
            tracing::warn!(
                step_id = %step_id,
                conversation_id = %conversation_id,
                received = %record.conversation_id,
                "Lookup returned a record for another conversation"
            );
            return Ok(ReconcileOutcome::LookupFailed(LookupError::MalformedResponse(
                format!(
                    "requested conversation '{}' but received '{}'",
                    conversation_id, record.conversation_id
                ),
            )));
        }

        let signal = signal_from_record(&record);
        let outcome = self
            .service
            .apply_remote_update(step_id, &conversation_id, signal)
            .await?;

        Ok(match outcome {
            RemoteApplyOutcome::Applied(step) => ReconcileOutcome::Applied(step),
            RemoteApplyOutcome::Stale => ReconcileOutcome::Stale,
        })
    }

    /// Reconciles a step whose voice session just closed.
    pub async fn handle_disconnect(&self, step_id: &StepId) -> Result<ReconcileOutcome, ProgressError> {
        let marked = match self.service.mark_conversation_processing(step_id).await {
            Ok(marked) => marked,
            Err(ProgressError::Rule(_)) => {
                return Ok(ReconcileOutcome::Skipped(SkipReason::StepNotFound))
            }
            Err(e) => return Err(e),
        };

        if !marked {
            let current = self.service.current().await?;
            match current.step(step_id) {
                Some(step) if step.conversation_id.is_none() => {
                    return Ok(ReconcileOutcome::Skipped(SkipReason::NoConversation))
                }
                Some(step) if !step.has_pending_conversation() => {
                    return Ok(ReconcileOutcome::Skipped(SkipReason::AlreadySettled))
                }
                _ => {}
            }
        }

        self.reconcile_step(step_id).await
    }

    /// Reconciles every step whose conversation outcome is still pending.
    ///
    /// Lookups run concurrently; each result is applied in its own facade
    /// transaction. A step whose apply fails counts as failed; the other
    /// steps are still tallied.
    pub async fn sweep(&self) -> Result<SweepReport, ProgressError> {
        let current = self.service.current().await?;
        let pending: Vec<StepId> = current
            .pending_conversation_steps()
            .map(|step| step.step_id.clone())
            .collect();

        let mut report = SweepReport::default();
        if pending.is_empty() {
            return Ok(report);
        }

        let outcomes = join_all(pending.iter().map(|step_id| self.reconcile_step(step_id))).await;
        for (step_id, outcome) in pending.iter().zip(outcomes) {
            match outcome {
                Ok(outcome) => report.record(&outcome),
                Err(e) => {
                    tracing::warn!(step_id = %step_id, error = %e, "Failed to apply conversation outcome");
                    report.checked += 1;
                    report.failed += 1;
                }
            }
        }

        tracing::debug!(
            checked = report.checked,
            applied = report.applied,
            completed = report.completed,
            failed = report.failed,
            "Reconciliation sweep finished"
        );
        Ok(report)
    }
}

/// Maps an agent-service record onto a conversation signal.
pub fn signal_from_record(record: &RemoteConversation) -> ConversationSignal {
    let analysis = record.analysis.as_ref();
    ConversationSignal {
        conversation_status: record.status.as_deref().map(ConversationStatus::from),
        success: analysis.and_then(success_from_analysis),
        analysis: record.analysis.clone(),
        captured_data: analysis.and_then(captured_from_analysis),
    }
}

fn success_from_analysis(analysis: &Value) -> Option<bool> {
    let verdict = analysis
        .get("call_successful")
        .or_else(|| analysis.get("callSuccessful"));
    match verdict {
        Some(Value::String(s)) => match s.to_ascii_lowercase().as_str() {
            "success" => Some(true),
            "failure" => Some(false),
            _ => None,
        },
        Some(Value::Bool(b)) => Some(*b),
        _ => analysis.get("success").and_then(Value::as_bool),
    }
}

fn captured_from_analysis(analysis: &Value) -> Option<Vec<CapturedField>> {
    if let Some(results) = analysis
        .get("data_collection_results")
        .and_then(Value::as_object)
    {
        let fields = results
            .iter()
            .filter_map(|(label, result)| {
                let value = result.get("value").unwrap_or(result);
                display_value(value).map(|v| CapturedField::new(label.clone(), v))
            })
            .collect();
        return Some(fields);
    }

    analysis
        .get("capturedData")
        .and_then(|data| serde_json::from_value(data.clone()).ok())
}

fn display_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::clock::SystemClock;
    use crate::adapters::storage::InMemoryKeyValueStore;
    use crate::application::persistence::{ProgressPersistence, DEFAULT_NAMESPACE};
    use crate::domain::foundation::StepState;
    use crate::domain::workflow::test_support::three_step_workflow;
    use crate::ports::{KeyValueStore, StorageError};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Lookup serving canned records; unknown ids fail like a 502.
    #[derive(Default)]
    struct CannedLookup {
        records: Mutex<HashMap<String, RemoteConversation>>,
        calls: AtomicUsize,
    }

    impl CannedLookup {
        fn with(self, id: &str, status: &str, analysis: Option<Value>) -> Self {
            self.records.lock().unwrap().insert(
                id.to_string(),
                RemoteConversation {
                    conversation_id: ConversationId::from(id),
                    agent_id: None,
                    status: Some(status.to_string()),
                    transcript: Vec::new(),
                    analysis,
                    metadata: None,
                },
            );
            self
        }
    }

    #[async_trait]
    impl ConversationLookup for CannedLookup {
        async fn fetch_conversation(
            &self,
            conversation_id: &ConversationId,
        ) -> Result<RemoteConversation, LookupError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.records
                .lock()
                .unwrap()
                .get(conversation_id.as_str())
                .cloned()
                .ok_or(LookupError::Status {
                    status: 502,
                    message: "bad gateway".to_string(),
                })
        }
    }

    fn setup(lookup: CannedLookup) -> (Arc<ProgressService>, ConversationReconciler, Arc<CannedLookup>) {
        let service = Arc::new(ProgressService::new(
            Arc::new(three_step_workflow()),
            ProgressPersistence::new(Arc::new(InMemoryKeyValueStore::new()), DEFAULT_NAMESPACE),
            Arc::new(SystemClock),
        ));
        let lookup = Arc::new(lookup);
        let reconciler = ConversationReconciler::new(service.clone(), lookup.clone());
        (service, reconciler, lookup)
    }

    fn id(s: &str) -> StepId {
        StepId::from(s)
    }

    async fn pending_conversation(service: &ProgressService, step: &str, conversation: &str) {
        service
            .start_conversation(&id(step), ConversationId::from(conversation))
            .await
            .unwrap();
        service.mark_conversation_processing(&id(step)).await.unwrap();
    }

    // ───────────────────────────────────────────────────────────────
    // Mapping
    // ───────────────────────────────────────────────────────────────

    #[test]
    fn test_maps_call_successful_verdicts() {
        assert_eq!(success_from_analysis(&json!({"call_successful": "success"})), Some(true));
        assert_eq!(success_from_analysis(&json!({"callSuccessful": "failure"})), Some(false));
        assert_eq!(success_from_analysis(&json!({"call_successful": "unknown"})), None);
        assert_eq!(success_from_analysis(&json!({"success": true})), Some(true));
        assert_eq!(success_from_analysis(&json!({"summary": "..."})), None);
    }

    #[test]
    fn test_maps_data_collection_results() {
        let analysis = json!({
            "data_collection_results": {
                "hero_name": {"value": "Pip", "rationale": "said so"},
                "age": {"value": 12},
                "unknown": {"value": null}
            }
        });
        let mut fields = captured_from_analysis(&analysis).unwrap();
        fields.sort_by(|a, b| a.label.cmp(&b.label));

        assert_eq!(
            fields,
            vec![CapturedField::new("age", "12"), CapturedField::new("hero_name", "Pip")]
        );
    }

    #[test]
    fn test_maps_camel_case_captured_data() {
        let analysis = json!({"capturedData": [{"label": "name", "value": "Pip"}]});
        assert_eq!(
            captured_from_analysis(&analysis),
            Some(vec![CapturedField::new("name", "Pip")])
        );
    }

    #[test]
    fn test_signal_from_record_without_analysis() {
        let record = RemoteConversation {
            conversation_id: ConversationId::from("c1"),
            agent_id: None,
            status: Some("processing".to_string()),
            transcript: Vec::new(),
            analysis: None,
            metadata: None,
        };
        let signal = signal_from_record(&record);
        assert!(signal.conversation_status.unwrap().is_pending());
        assert!(signal.success.is_none());
        assert!(signal.captured_data.is_none());
    }

    // ───────────────────────────────────────────────────────────────
    // reconcile_step / handle_disconnect
    // ───────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_successful_record_completes_step() {
        let lookup = CannedLookup::default().with("c1", "done", Some(json!({"call_successful": "success"})));
        let (service, reconciler, _) = setup(lookup);
        pending_conversation(&service, "s1", "c1").await;

        let outcome = reconciler.reconcile_step(&id("s1")).await.unwrap();

        assert!(matches!(outcome, ReconcileOutcome::Applied(StepOutcome { completed: true, .. })));
        let step = service.current().await.unwrap().step(&id("s1")).cloned().unwrap();
        assert_eq!(step.state, StepState::Complete);
        assert!(!step.has_pending_conversation());
    }

    #[tokio::test]
    async fn test_failed_lookup_leaves_state_untouched() {
        let (service, reconciler, _) = setup(CannedLookup::default());
        pending_conversation(&service, "s1", "c1").await;
        let before = service.current().await.unwrap();

        let outcome = reconciler.reconcile_step(&id("s1")).await.unwrap();

        assert!(matches!(outcome, ReconcileOutcome::LookupFailed(_)));
        assert_eq!(service.current().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_record_for_another_conversation_is_not_applied() {
        let lookup = CannedLookup::default();
        lookup.records.lock().unwrap().insert(
            "c2".to_string(),
            RemoteConversation {
                conversation_id: ConversationId::from("c1"),
                agent_id: None,
                status: Some("done".to_string()),
                transcript: Vec::new(),
                analysis: Some(json!({"call_successful": "success"})),
                metadata: None,
            },
        );
        let (service, reconciler, _) = setup(lookup);
        pending_conversation(&service, "s1", "c2").await;
        let before = service.current().await.unwrap();

        let outcome = reconciler.reconcile_step(&id("s1")).await.unwrap();

        assert!(matches!(
            outcome,
            ReconcileOutcome::LookupFailed(LookupError::MalformedResponse(_))
        ));
        let after = service.current().await.unwrap();
        assert_eq!(after, before);
        assert_eq!(after.step(&id("s1")).unwrap().state, StepState::InProgress);
    }

    #[tokio::test]
    async fn test_step_without_conversation_is_skipped() {
        let (_, reconciler, lookup) = setup(CannedLookup::default());

        let outcome = reconciler.reconcile_step(&id("s1")).await.unwrap();

        assert!(matches!(outcome, ReconcileOutcome::Skipped(SkipReason::NoConversation)));
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reconciling_twice_is_idempotent() {
        let lookup = CannedLookup::default().with("c1", "done", Some(json!({"call_successful": "success"})));
        let (service, reconciler, _) = setup(lookup);
        pending_conversation(&service, "s1", "c1").await;

        reconciler.reconcile_step(&id("s1")).await.unwrap();
        let once = service.current().await.unwrap();
        let second = reconciler.reconcile_step(&id("s1")).await.unwrap();
        let twice = service.current().await.unwrap();

        assert!(matches!(second, ReconcileOutcome::Applied(StepOutcome { completed: false, .. })));
        assert_eq!(once.overall_progress, twice.overall_progress);
        let (a, b) = (once.step(&id("s1")).unwrap(), twice.step(&id("s1")).unwrap());
        assert_eq!(a.state, b.state);
        assert_eq!(a.completed_at, b.completed_at);
        assert_eq!(a.success, b.success);
    }

    #[tokio::test]
    async fn test_disconnect_marks_processing_and_reconciles() {
        let lookup = CannedLookup::default().with("c1", "processing", None);
        let (service, reconciler, lookup) = setup(lookup);
        service
            .start_conversation(&id("s1"), ConversationId::from("c1"))
            .await
            .unwrap();

        let outcome = reconciler.handle_disconnect(&id("s1")).await.unwrap();

        assert!(matches!(outcome, ReconcileOutcome::Applied(StepOutcome { completed: false, .. })));
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);
        let step = service.current().await.unwrap().step(&id("s1")).cloned().unwrap();
        assert!(step.has_pending_conversation());
        assert_eq!(step.state, StepState::InProgress);
    }

    #[tokio::test]
    async fn test_disconnect_after_settled_outcome_is_skipped() {
        let (service, reconciler, lookup) = setup(CannedLookup::default());
        service
            .start_conversation(&id("s1"), ConversationId::from("c1"))
            .await
            .unwrap();
        service
            .apply_conversation_update(
                &id("s1"),
                ConversationSignal::default().with_status("done").with_success(false),
            )
            .await
            .unwrap();

        let outcome = reconciler.handle_disconnect(&id("s1")).await.unwrap();

        assert!(matches!(outcome, ReconcileOutcome::Skipped(SkipReason::AlreadySettled)));
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 0);
    }

    // ───────────────────────────────────────────────────────────────
    // sweep
    // ───────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_sweep_only_visits_pending_steps() {
        let lookup = CannedLookup::default()
            .with("c1", "done", Some(json!({"call_successful": "success"})));
        let (service, reconciler, lookup) = setup(lookup);
        pending_conversation(&service, "s1", "c1").await;
        pending_conversation(&service, "s2", "c2").await;
        service
            .start_conversation(&id("s3"), ConversationId::from("c3"))
            .await
            .unwrap();

        let report = reconciler.sweep().await.unwrap();

        assert_eq!(report.checked, 2);
        assert_eq!(report.completed, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            service.current().await.unwrap().step(&id("s1")).unwrap().state,
            StepState::Complete
        );
    }

    /// In-memory store that turns read-only once `read_only` is set.
    #[derive(Default)]
    struct LockableStore {
        inner: InMemoryKeyValueStore,
        read_only: AtomicBool,
    }

    #[async_trait]
    impl KeyValueStore for LockableStore {
        async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.inner.get(key).await
        }

        async fn put(&self, key: &str, value: &str) -> Result<(), StorageError> {
            if self.read_only.load(Ordering::SeqCst) {
                return Err(StorageError::io("read-only file system"));
            }
            self.inner.put(key, value).await
        }

        async fn remove(&self, key: &str) -> Result<(), StorageError> {
            self.inner.remove(key).await
        }

        async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
            self.inner.keys_with_prefix(prefix).await
        }
    }

    /// Serves canned records and makes the store read-only when `c2` is fetched.
    struct LockingLookup {
        records: CannedLookup,
        store: Arc<LockableStore>,
    }

    #[async_trait]
    impl ConversationLookup for LockingLookup {
        async fn fetch_conversation(
            &self,
            conversation_id: &ConversationId,
        ) -> Result<RemoteConversation, LookupError> {
            if conversation_id.as_str() == "c2" {
                self.store.read_only.store(true, Ordering::SeqCst);
            }
            self.records.fetch_conversation(conversation_id).await
        }
    }

    #[tokio::test]
    async fn test_sweep_reports_applied_steps_when_a_later_save_fails() {
        let store = Arc::new(LockableStore::default());
        let service = Arc::new(ProgressService::new(
            Arc::new(three_step_workflow()),
            ProgressPersistence::new(store.clone(), DEFAULT_NAMESPACE),
            Arc::new(SystemClock),
        ));
        pending_conversation(&service, "s1", "c1").await;
        pending_conversation(&service, "s2", "c2").await;
        let lookup = LockingLookup {
            records: CannedLookup::default()
                .with("c1", "done", Some(json!({"call_successful": "success"})))
                .with("c2", "done", Some(json!({"call_successful": "success"}))),
            store: store.clone(),
        };
        let reconciler = ConversationReconciler::new(service.clone(), Arc::new(lookup));

        let report = reconciler.sweep().await.unwrap();

        assert_eq!(report.checked, 2);
        assert_eq!(report.completed, 1);
        assert_eq!(report.failed, 1);
        let current = service.current().await.unwrap();
        assert_eq!(current.step(&id("s1")).unwrap().state, StepState::Complete);
        assert_eq!(current.step(&id("s2")).unwrap().state, StepState::InProgress);
    }

    #[tokio::test]
    async fn test_sweep_with_nothing_pending_is_empty() {
        let (_, reconciler, lookup) = setup(CannedLookup::default());
        assert_eq!(reconciler.sweep().await.unwrap(), SweepReport::default());
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 0);
    }
}
