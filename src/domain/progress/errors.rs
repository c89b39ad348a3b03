//! Rule violations raised by the progress aggregate.

use crate::domain::foundation::{StepId, StepState};

/// Why a progress mutation was refused. The aggregate is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProgressRuleError {
    #[error("Step not found: {0}")]
    StepNotFound(StepId),

    #[error("Step {0} is locked until an earlier step has been started")]
    StepLocked(StepId),

    #[error("Step {0} is in the error state and must be cleared first")]
    StepFailed(StepId),

    #[error("Invalid transition for step {step_id} from {from:?} to {to:?}")]
    InvalidTransition {
        step_id: StepId,
        from: StepState,
        to: StepState,
    },
}
