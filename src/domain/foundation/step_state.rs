//! StepState enum for tracking the lifecycle of a single wizard step.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::StateMachine;

/// Lifecycle state of one step.
///
/// `Started` means "was active, then parked" (another step took over).
/// `Complete` and `Error` are terminal; leaving `Error` needs an explicit clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    #[default]
    NotStarted,
    Started,
    InProgress,
    Complete,
    Error,
}

impl StepState {
    pub const ALL: [StepState; 5] = [
        StepState::NotStarted,
        StepState::Started,
        StepState::InProgress,
        StepState::Complete,
        StepState::Error,
    ];

    /// Returns true if the step has been touched at all.
    pub fn is_started(&self) -> bool {
        !matches!(self, StepState::NotStarted)
    }

    /// Returns true if the step is finished.
    pub fn is_complete(&self) -> bool {
        matches!(self, StepState::Complete)
    }

    /// Returns true if the step is the active one.
    pub fn is_in_progress(&self) -> bool {
        matches!(self, StepState::InProgress)
    }

    /// Returns true if the step is in the fail-stop state.
    pub fn is_error(&self) -> bool {
        matches!(self, StepState::Error)
    }

    /// Returns true if this state unlocks later steps for activation.
    pub fn unlocks_successors(&self) -> bool {
        matches!(
            self,
            StepState::Started | StepState::InProgress | StepState::Complete
        )
    }
}

impl StateMachine for StepState {
    fn can_transition_to(&self, target: &Self) -> bool {
        self.valid_transitions().contains(target)
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use StepState::*;
        match self {
            NotStarted => vec![InProgress, Complete, Error],
            Started => vec![InProgress, Complete, Error],
            InProgress => vec![Started, Complete, Error],
            Complete => vec![],
            // Only reachable through an explicit clear.
            Error => vec![Started],
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, StepState::Complete | StepState::Error)
    }
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepState::NotStarted => "Not Started",
            StepState::Started => "Started",
            StepState::InProgress => "In Progress",
            StepState::Complete => "Complete",
            StepState::Error => "Error",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_not_started() {
        assert_eq!(StepState::default(), StepState::NotStarted);
    }

    #[test]
    fn only_touched_states_unlock_successors() {
        assert!(!StepState::NotStarted.unlocks_successors());
        assert!(StepState::Started.unlocks_successors());
        assert!(StepState::InProgress.unlocks_successors());
        assert!(StepState::Complete.unlocks_successors());
        assert!(!StepState::Error.unlocks_successors());
    }

    #[test]
    fn in_progress_can_be_parked() {
        assert!(StepState::InProgress.can_transition_to(&StepState::Started));
        assert!(!StepState::NotStarted.can_transition_to(&StepState::Started));
    }

    #[test]
    fn complete_and_error_are_terminal() {
        assert!(StepState::Complete.is_terminal());
        assert!(StepState::Error.is_terminal());
        assert!(!StepState::InProgress.is_terminal());
    }

    #[test]
    fn error_reachable_from_every_non_terminal_state() {
        for state in StepState::ALL.iter().filter(|s| !s.is_terminal()) {
            assert!(
                state.can_transition_to(&StepState::Error),
                "{:?} should be able to fail",
                state
            );
        }
    }

    #[test]
    fn error_only_clears_to_started() {
        assert_eq!(
            StepState::Error.transition_to(StepState::Started),
            Ok(StepState::Started)
        );
        assert!(StepState::Error.transition_to(StepState::InProgress).is_err());
        assert!(StepState::Complete.transition_to(StepState::InProgress).is_err());
    }

    #[test]
    fn serializes_to_snake_case_json() {
        assert_eq!(
            serde_json::to_string(&StepState::NotStarted).unwrap(),
            "\"not_started\""
        );
        assert_eq!(
            serde_json::to_string(&StepState::InProgress).unwrap(),
            "\"in_progress\""
        );
        let state: StepState = serde_json::from_str("\"complete\"").unwrap();
        assert_eq!(state, StepState::Complete);
    }

    #[test]
    fn display_works_correctly() {
        assert_eq!(format!("{}", StepState::NotStarted), "Not Started");
        assert_eq!(format!("{}", StepState::Error), "Error");
    }
}
