//! ProgressAggregate - whole-workflow progress for one session.
//!
//! Owns the invariants that span steps:
//! - at most one step is `InProgress`;
//! - a step is activatable only if it is the first step or some step at or
//!   before it has been started, is in progress, or is complete;
//! - `overall_progress` is always recomputed from the step records.
//!
//! Mutators take `&mut self` and either apply completely or return an error
//! with the aggregate untouched. Callers work on a copy and persist it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{
    ConversationId, MessageId, SessionId, StateMachine, StepId, StepState, Timestamp, WorkflowId,
};
use crate::domain::workflow::WorkflowDefinition;

use super::{
    CapturedField, ConversationSignal, ConversationStatus, NewMessage, OverallProgress,
    ProgressRuleError, SessionData, StepProgress,
};

/// Progress of one (session, workflow) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressAggregate {
    pub workflow_id: WorkflowId,
    pub session_id: SessionId,
    pub current_step_id: StepId,
    pub steps: BTreeMap<StepId, StepProgress>,
    pub overall_progress: OverallProgress,
    pub session_data: SessionData,
    /// Stamped by the persistence layer on every save.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<Timestamp>,
}

impl ProgressAggregate {
    /// Creates a fresh aggregate with one `NotStarted` record per step.
    ///
    /// The current step pointer starts at the first step, which is activatable
    /// but not yet active.
    pub fn new(definition: &WorkflowDefinition, session_id: SessionId, now: Timestamp) -> Self {
        let steps: BTreeMap<_, _> = definition
            .steps()
            .iter()
            .map(|step| (step.id.clone(), StepProgress::new(step, now)))
            .collect();

        Self {
            workflow_id: definition.id().clone(),
            session_id,
            current_step_id: definition.first_step().id.clone(),
            overall_progress: OverallProgress::from_steps(steps.values()),
            steps,
            session_data: SessionData::started(now),
            last_updated: None,
        }
    }

    // ───────────────────────────────────────────────────────────────
    // Queries
    // ───────────────────────────────────────────────────────────────

    pub fn step(&self, id: &StepId) -> Option<&StepProgress> {
        self.steps.get(id)
    }

    pub fn current_step(&self) -> Option<&StepProgress> {
        self.steps.get(&self.current_step_id)
    }

    /// Ids of steps currently `InProgress`. Never more than one.
    pub fn active_step_ids(&self) -> Vec<&StepId> {
        self.steps
            .values()
            .filter(|s| s.state.is_in_progress())
            .map(|s| &s.step_id)
            .collect()
    }

    /// Steps whose remote conversation has not reported a final outcome.
    pub fn pending_conversation_steps(&self) -> impl Iterator<Item = &StepProgress> {
        self.steps.values().filter(|s| s.has_pending_conversation())
    }

    /// Number of `Complete` steps, counted from the records.
    pub fn completed_count(&self) -> usize {
        self.steps.values().filter(|s| s.state.is_complete()).count()
    }

    /// True if `id` is the first step or some step at or before it has
    /// unlocked its successors.
    pub fn can_activate_step(&self, definition: &WorkflowDefinition, id: &StepId) -> bool {
        if !self.steps.contains_key(id) {
            return false;
        }
        match definition.position_of(id) {
            Some(0) => true,
            Some(_) => definition.steps_through(id).iter().any(|step| {
                self.steps
                    .get(&step.id)
                    .is_some_and(|p| p.state.unlocks_successors())
            }),
            None => false,
        }
    }

    // ───────────────────────────────────────────────────────────────
    // Mutations
    // ───────────────────────────────────────────────────────────────

    /// Makes `id` the current step.
    ///
    /// Any other `InProgress` step is parked as `Started`. A `Complete` target
    /// becomes current for review but keeps its state.
    pub fn activate_step(
        &mut self,
        definition: &WorkflowDefinition,
        id: &StepId,
        now: Timestamp,
    ) -> Result<(), ProgressRuleError> {
        let state = self.step_entry(id)?.state;
        if state.is_error() {
            return Err(ProgressRuleError::StepFailed(id.clone()));
        }
        if !self.can_activate_step(definition, id) {
            return Err(ProgressRuleError::StepLocked(id.clone()));
        }

        if state.is_complete() {
            self.demote_active_except(id, now);
        } else {
            self.set_step_state(id, StepState::InProgress, None, now)?;
        }

        self.current_step_id = id.clone();
        self.refresh(now);
        Ok(())
    }

    /// Sets a step's state, parking any other active step when the target
    /// becomes `InProgress`.
    pub fn set_step_state(
        &mut self,
        id: &StepId,
        state: StepState,
        captured_data: Option<Vec<CapturedField>>,
        now: Timestamp,
    ) -> Result<(), ProgressRuleError> {
        let updated = self.step_entry(id)?.with_state(state, captured_data, now);
        if state.is_in_progress() {
            self.demote_active_except(id, now);
        }
        self.replace(updated);
        self.refresh(now);
        Ok(())
    }

    /// Marks a step complete. Returns true if this call completed it.
    pub fn complete_step(
        &mut self,
        id: &StepId,
        captured_data: Option<Vec<CapturedField>>,
        now: Timestamp,
    ) -> Result<bool, ProgressRuleError> {
        let step = self.step_entry(id)?;
        if step.state.is_error() {
            return Err(ProgressRuleError::StepFailed(id.clone()));
        }
        let newly_completed = !step.state.is_complete();

        let updated = step.with_state(StepState::Complete, captured_data, now);
        self.replace(updated);
        self.refresh(now);
        Ok(newly_completed)
    }

    /// Binds an external conversation to a step and makes it the active step.
    pub fn start_conversation(
        &mut self,
        definition: &WorkflowDefinition,
        id: &StepId,
        conversation_id: ConversationId,
        now: Timestamp,
    ) -> Result<(), ProgressRuleError> {
        let step = self.step_entry(id)?;
        match step.state {
            StepState::Error => return Err(ProgressRuleError::StepFailed(id.clone())),
            StepState::Complete => {
                return Err(ProgressRuleError::InvalidTransition {
                    step_id: id.clone(),
                    from: StepState::Complete,
                    to: StepState::InProgress,
                })
            }
            _ => {}
        }
        if !self.can_activate_step(definition, id) {
            return Err(ProgressRuleError::StepLocked(id.clone()));
        }

        let updated = step
            .with_conversation(conversation_id, now)
            .with_state(StepState::InProgress, None, now);
        self.demote_active_except(id, now);
        self.replace(updated);
        self.current_step_id = id.clone();
        self.refresh(now);
        Ok(())
    }

    /// Appends a message to a step's log.
    pub fn record_message(
        &mut self,
        id: &StepId,
        message: NewMessage,
        now: Timestamp,
    ) -> Result<MessageId, ProgressRuleError> {
        let (updated, message_id) = self.step_entry(id)?.with_message(message, now);
        self.replace(updated);
        self.refresh(now);
        Ok(message_id)
    }

    /// Merges a remote conversation signal. Returns true if the signal
    /// completed the step.
    pub fn apply_conversation_signal(
        &mut self,
        id: &StepId,
        signal: &ConversationSignal,
        now: Timestamp,
    ) -> Result<bool, ProgressRuleError> {
        let step = self.step_entry(id)?;
        let was_complete = step.state.is_complete();
        let updated = step.with_conversation_signal(signal, now);
        let completed_now = !was_complete && updated.state.is_complete();

        self.replace(updated);
        self.refresh(now);
        Ok(completed_now)
    }

    /// Flags the step's conversation as awaiting its remote outcome.
    ///
    /// Returns false (and changes nothing) when the step has no conversation or
    /// the remote side already reported a final status.
    pub fn mark_conversation_processing(
        &mut self,
        id: &StepId,
        now: Timestamp,
    ) -> Result<bool, ProgressRuleError> {
        let step = self.step_entry(id)?;
        let awaiting = step.conversation_id.is_some()
            && step.success.is_none()
            && step
                .conversation_status
                .as_ref()
                .map_or(true, ConversationStatus::is_pending);
        if !awaiting {
            return Ok(false);
        }

        let signal = ConversationSignal {
            conversation_status: Some(ConversationStatus::processing()),
            ..Default::default()
        };
        let updated = step.with_conversation_signal(&signal, now);
        self.replace(updated);
        self.refresh(now);
        Ok(true)
    }

    /// Moves a non-terminal step into the fail-stop `Error` state.
    pub fn fail_step(
        &mut self,
        id: &StepId,
        reason: impl Into<String>,
        now: Timestamp,
    ) -> Result<(), ProgressRuleError> {
        let step = self.step_entry(id)?;
        step.state
            .transition_to(StepState::Error)
            .map_err(|_| ProgressRuleError::InvalidTransition {
                step_id: id.clone(),
                from: step.state,
                to: StepState::Error,
            })?;

        let updated = step.with_error(reason, now);
        self.replace(updated);
        self.refresh(now);
        Ok(())
    }

    /// Clears the fail-stop state, parking the step as `Started`.
    pub fn clear_step_error(&mut self, id: &StepId, now: Timestamp) -> Result<(), ProgressRuleError> {
        let step = self.step_entry(id)?;
        if !step.state.is_error() {
            return Err(ProgressRuleError::InvalidTransition {
                step_id: id.clone(),
                from: step.state,
                to: StepState::Started,
            });
        }

        let updated = step.with_state(StepState::Started, None, now);
        self.replace(updated);
        self.refresh(now);
        Ok(())
    }

    // ───────────────────────────────────────────────────────────────
    // Internals
    // ───────────────────────────────────────────────────────────────

    fn step_entry(&self, id: &StepId) -> Result<&StepProgress, ProgressRuleError> {
        self.steps
            .get(id)
            .ok_or_else(|| ProgressRuleError::StepNotFound(id.clone()))
    }

    fn replace(&mut self, step: StepProgress) {
        self.steps.insert(step.step_id.clone(), step);
    }

    fn demote_active_except(&mut self, keep: &StepId, now: Timestamp) {
        for step in self.steps.values_mut() {
            if &step.step_id != keep && step.state.is_in_progress() {
                *step = step.with_state(StepState::Started, None, now);
            }
        }
    }

    fn refresh(&mut self, now: Timestamp) {
        self.overall_progress = OverallProgress::from_steps(self.steps.values());
        self.session_data = self.session_data.touched(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::progress::MessageRole;
    use crate::domain::workflow::test_support::{section, step, three_step_workflow};
    use proptest::prelude::*;

    fn id(s: &str) -> StepId {
        StepId::from(s)
    }

    fn fresh() -> (WorkflowDefinition, ProgressAggregate, Timestamp) {
        let def = three_step_workflow();
        let now = Timestamp::now();
        let agg = ProgressAggregate::new(&def, SessionId::new(), now);
        (def, agg, now)
    }

    // ───────────────────────────────────────────────────────────────
    // Creation
    // ───────────────────────────────────────────────────────────────

    #[test]
    fn new_aggregate_has_one_record_per_step() {
        let (_, agg, _) = fresh();
        assert_eq!(agg.steps.len(), 3);
        assert!(agg.steps.values().all(|s| s.state == StepState::NotStarted));
        assert_eq!(agg.current_step_id, id("s1"));
        assert_eq!(agg.overall_progress.total_steps, 3);
        assert_eq!(agg.overall_progress.completed_steps, 0);
    }

    // ───────────────────────────────────────────────────────────────
    // Activation
    // ───────────────────────────────────────────────────────────────

    #[test]
    fn activating_locked_step_is_refused_without_changes() {
        let (def, mut agg, now) = fresh();
        let before = agg.clone();

        let err = agg.activate_step(&def, &id("s2"), now).unwrap_err();

        assert_eq!(err, ProgressRuleError::StepLocked(id("s2")));
        assert_eq!(agg, before);
        assert_eq!(agg.step(&id("s2")).unwrap().state, StepState::NotStarted);
    }

    #[test]
    fn activating_first_step_makes_it_in_progress() {
        let (def, mut agg, now) = fresh();
        agg.activate_step(&def, &id("s1"), now).unwrap();
        assert_eq!(agg.step(&id("s1")).unwrap().state, StepState::InProgress);
        assert_eq!(agg.step(&id("s1")).unwrap().started_at, Some(now));
    }

    #[test]
    fn activating_another_step_parks_the_previous_one() {
        let (def, mut agg, now) = fresh();
        agg.activate_step(&def, &id("s1"), now).unwrap();
        agg.activate_step(&def, &id("s2"), now).unwrap();

        assert_eq!(agg.step(&id("s1")).unwrap().state, StepState::Started);
        assert_eq!(agg.step(&id("s2")).unwrap().state, StepState::InProgress);
        assert_eq!(agg.current_step_id, id("s2"));
        assert_eq!(agg.active_step_ids(), vec![&id("s2")]);
    }

    #[test]
    fn activating_completed_step_keeps_it_complete() {
        let (def, mut agg, now) = fresh();
        agg.activate_step(&def, &id("s1"), now).unwrap();
        agg.complete_step(&id("s1"), None, now).unwrap();
        agg.activate_step(&def, &id("s2"), now).unwrap();

        agg.activate_step(&def, &id("s1"), now).unwrap();

        assert_eq!(agg.current_step_id, id("s1"));
        assert_eq!(agg.step(&id("s1")).unwrap().state, StepState::Complete);
        assert_eq!(agg.step(&id("s2")).unwrap().state, StepState::Started);
        assert!(agg.active_step_ids().is_empty());
    }

    #[test]
    fn errored_step_cannot_be_activated() {
        let (def, mut agg, now) = fresh();
        agg.fail_step(&id("s1"), "mic blocked", now).unwrap();
        assert_eq!(
            agg.activate_step(&def, &id("s1"), now),
            Err(ProgressRuleError::StepFailed(id("s1")))
        );
    }

    #[test]
    fn unknown_step_is_reported() {
        let (def, mut agg, now) = fresh();
        assert_eq!(
            agg.activate_step(&def, &id("ghost"), now),
            Err(ProgressRuleError::StepNotFound(id("ghost")))
        );
        assert!(!agg.can_activate_step(&def, &id("ghost")));
    }

    #[test]
    fn completing_a_step_unlocks_the_next() {
        let (def, mut agg, now) = fresh();
        agg.activate_step(&def, &id("s1"), now).unwrap();
        assert!(agg.complete_step(&id("s1"), None, now).unwrap());

        assert!(agg.can_activate_step(&def, &id("s2")));
        assert_eq!(agg.overall_progress.completed_steps, 1);
        assert_eq!(agg.overall_progress.percent_complete, 33);
    }

    #[test]
    fn any_touched_earlier_step_unlocks_later_ones() {
        let (def, mut agg, now) = fresh();
        agg.activate_step(&def, &id("s1"), now).unwrap();
        assert!(agg.can_activate_step(&def, &id("s3")));
    }

    // ───────────────────────────────────────────────────────────────
    // Completion / conversations
    // ───────────────────────────────────────────────────────────────

    #[test]
    fn completing_twice_reports_only_first_completion() {
        let (_, mut agg, now) = fresh();
        assert!(agg.complete_step(&id("s1"), None, now).unwrap());
        assert!(!agg.complete_step(&id("s1"), None, now.plus_secs(1)).unwrap());
        assert_eq!(agg.step(&id("s1")).unwrap().completed_at, Some(now));
    }

    #[test]
    fn start_conversation_binds_and_activates() {
        let (def, mut agg, now) = fresh();
        agg.activate_step(&def, &id("s1"), now).unwrap();
        agg.complete_step(&id("s1"), None, now).unwrap();

        agg.start_conversation(&def, &id("s2"), ConversationId::from("c2"), now)
            .unwrap();

        let s2 = agg.step(&id("s2")).unwrap();
        assert_eq!(s2.state, StepState::InProgress);
        assert_eq!(s2.conversation_id, Some(ConversationId::from("c2")));
        assert_eq!(agg.current_step_id, id("s2"));
    }

    #[test]
    fn start_conversation_on_complete_step_is_refused() {
        let (def, mut agg, now) = fresh();
        agg.complete_step(&id("s1"), None, now).unwrap();
        let before = agg.clone();

        let result = agg.start_conversation(
            &def,
            &id("s1"),
            ConversationId::from("c9"),
            now.plus_secs(30),
        );

        assert!(matches!(result, Err(ProgressRuleError::InvalidTransition { .. })));
        assert_eq!(agg, before);
        let s1 = agg.step(&id("s1")).unwrap();
        assert_eq!(s1.state, StepState::Complete);
        assert_eq!(s1.completed_at, Some(now));
    }

    #[test]
    fn success_signal_completes_and_counts() {
        let (def, mut agg, now) = fresh();
        agg.activate_step(&def, &id("s1"), now).unwrap();
        agg.start_conversation(&def, &id("s1"), ConversationId::from("c1"), now)
            .unwrap();

        let signal = ConversationSignal::default().with_success(true);
        assert!(agg.apply_conversation_signal(&id("s1"), &signal, now).unwrap());
        assert!(!agg.apply_conversation_signal(&id("s1"), &signal, now).unwrap());

        assert_eq!(agg.step(&id("s1")).unwrap().state, StepState::Complete);
        assert_eq!(agg.overall_progress.completed_steps, 1);
    }

    #[test]
    fn mark_processing_requires_open_conversation() {
        let (def, mut agg, now) = fresh();
        assert!(!agg.mark_conversation_processing(&id("s1"), now).unwrap());

        agg.start_conversation(&def, &id("s1"), ConversationId::from("c1"), now)
            .unwrap();
        assert!(agg.mark_conversation_processing(&id("s1"), now).unwrap());
        assert_eq!(agg.pending_conversation_steps().count(), 1);

        let done = ConversationSignal::default().with_status("done");
        agg.apply_conversation_signal(&id("s1"), &done, now).unwrap();
        assert!(!agg.mark_conversation_processing(&id("s1"), now).unwrap());
    }

    #[test]
    fn record_message_appends() {
        let (_, mut agg, now) = fresh();
        let first = agg
            .record_message(&id("s1"), NewMessage::new(MessageRole::Assistant, "Hi!"), now)
            .unwrap();
        agg.record_message(&id("s1"), NewMessage::new(MessageRole::User, "Hello"), now)
            .unwrap();

        let messages = &agg.step(&id("s1")).unwrap().messages;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].id, first);
    }

    // ───────────────────────────────────────────────────────────────
    // Error lifecycle
    // ───────────────────────────────────────────────────────────────

    #[test]
    fn fail_and_clear_round_trip() {
        let (def, mut agg, now) = fresh();
        agg.activate_step(&def, &id("s1"), now).unwrap();
        agg.fail_step(&id("s1"), "agent hung up", now).unwrap();
        assert_eq!(agg.step(&id("s1")).unwrap().state, StepState::Error);
        assert!(agg.active_step_ids().is_empty());

        agg.clear_step_error(&id("s1"), now).unwrap();
        let s1 = agg.step(&id("s1")).unwrap();
        assert_eq!(s1.state, StepState::Started);
        assert!(s1.error_reason.is_none());
        assert!(agg.activate_step(&def, &id("s1"), now).is_ok());
    }

    #[test]
    fn complete_step_cannot_fail() {
        let (_, mut agg, now) = fresh();
        agg.complete_step(&id("s1"), None, now).unwrap();
        assert!(agg.fail_step(&id("s1"), "late", now).is_err());
    }

    #[test]
    fn clearing_a_healthy_step_is_refused() {
        let (_, mut agg, now) = fresh();
        assert!(agg.clear_step_error(&id("s1"), now).is_err());
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let (_, agg, _) = fresh();
        let json = serde_json::to_value(&agg).unwrap();
        assert!(json.get("workflowId").is_some());
        assert!(json.get("currentStepId").is_some());
        assert_eq!(json["overallProgress"]["totalSteps"], 3);
        assert_eq!(json["steps"]["s1"]["state"], "not_started");

        let back: ProgressAggregate = serde_json::from_value(json).unwrap();
        assert_eq!(back, agg);
    }

    // ───────────────────────────────────────────────────────────────
    // Properties
    // ───────────────────────────────────────────────────────────────

    #[derive(Debug, Clone)]
    enum Op {
        Activate(usize),
        Complete(usize),
        Converse(usize),
        Succeed(usize),
        Fail(usize),
        Clear(usize),
        Message(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..5usize).prop_map(Op::Activate),
            (0..5usize).prop_map(Op::Complete),
            (0..5usize).prop_map(Op::Converse),
            (0..5usize).prop_map(Op::Succeed),
            (0..5usize).prop_map(Op::Fail),
            (0..5usize).prop_map(Op::Clear),
            (0..5usize).prop_map(Op::Message),
        ]
    }

    fn five_step_workflow() -> WorkflowDefinition {
        WorkflowDefinition::new(
            WorkflowId::from("wf"),
            "Five",
            vec![section("a", 1)],
            (1..=5).map(|i| step(&format!("s{}", i), i * 10, "a")).collect(),
        )
        .unwrap()
    }

    proptest! {
        #[test]
        fn invariants_hold_for_any_operation_sequence(ops in prop::collection::vec(op(), 0..40)) {
            let def = five_step_workflow();
            let mut now = Timestamp::now();
            let mut agg = ProgressAggregate::new(&def, SessionId::new(), now);

            for op in ops {
                now = now.plus_secs(1);
                let before = agg.clone();
                let target = |i: usize| def.steps()[i].id.clone();

                let result = match &op {
                    Op::Activate(i) => agg.activate_step(&def, &target(*i), now).map(|_| ()),
                    Op::Complete(i) => agg.complete_step(&target(*i), None, now).map(|_| ()),
                    Op::Converse(i) => agg
                        .start_conversation(&def, &target(*i), ConversationId::new(format!("c{}", i)), now)
                        .map(|_| ()),
                    Op::Succeed(i) => agg
                        .apply_conversation_signal(&target(*i), &ConversationSignal::default().with_success(true), now)
                        .map(|_| ()),
                    Op::Fail(i) => agg.fail_step(&target(*i), "boom", now),
                    Op::Clear(i) => agg.clear_step_error(&target(*i), now),
                    Op::Message(i) => agg
                        .record_message(&target(*i), NewMessage::new(MessageRole::User, "hi"), now)
                        .map(|_| ()),
                };

                if result.is_err() {
                    prop_assert_eq!(&agg, &before);
                }

                // Single active step.
                prop_assert!(agg.active_step_ids().len() <= 1);

                // Completion count is derived.
                prop_assert_eq!(agg.overall_progress.completed_steps, agg.completed_count());

                for (step_id, step) in &agg.steps {
                    // completed_at iff complete.
                    prop_assert_eq!(step.completed_at.is_some(), step.state.is_complete());

                    // Messages only grow at the end.
                    let old = &before.steps[step_id].messages;
                    prop_assert!(step.messages.len() >= old.len());
                    prop_assert_eq!(&step.messages[..old.len()], &old[..]);
                }

                // A successful activation always satisfied the unlock rule.
                if let (Op::Activate(i), Ok(())) = (&op, &result) {
                    prop_assert!(before.can_activate_step(&def, &target(*i)));
                }
            }
        }

        #[test]
        fn unlock_rule_matches_definition(states in prop::collection::vec(0..5usize, 5)) {
            let def = five_step_workflow();
            let now = Timestamp::now();
            let mut agg = ProgressAggregate::new(&def, SessionId::new(), now);
            for (i, s) in states.iter().enumerate() {
                let step_id = def.steps()[i].id.clone();
                let state = StepState::ALL[*s];
                let updated = agg.steps[&step_id].with_state(state, None, now);
                agg.steps.insert(step_id, updated);
            }

            for (pos, step) in def.steps().iter().enumerate() {
                let expected = pos == 0
                    || def.steps()[..=pos]
                        .iter()
                        .any(|s| agg.steps[&s.id].state.unlocks_successors());
                prop_assert_eq!(agg.can_activate_step(&def, &step.id), expected);
            }
        }
    }
}
