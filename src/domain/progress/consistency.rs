//! Diagnostics comparing a stored aggregate with the current definition.
//!
//! Warnings only. Progress is never rewritten because the definition moved.

use std::fmt;

use crate::domain::foundation::{AgentId, SectionId, StepId};
use crate::domain::workflow::WorkflowDefinition;

use super::ProgressAggregate;

/// A mismatch between persisted progress and the workflow definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsistencyWarning {
    /// The definition has a step the aggregate has no record for.
    MissingStep { step_id: StepId },
    /// The aggregate has a record for a step the definition no longer lists.
    UnknownStep { step_id: StepId },
    AgentMismatch {
        step_id: StepId,
        stored: AgentId,
        defined: AgentId,
    },
    SectionMismatch {
        step_id: StepId,
        stored: SectionId,
        defined: SectionId,
    },
}

impl fmt::Display for ConsistencyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingStep { step_id } => write!(f, "step {} has no progress record", step_id),
            Self::UnknownStep { step_id } => {
                write!(f, "progress record for step {} is not in the definition", step_id)
            }
            Self::AgentMismatch {
                step_id,
                stored,
                defined,
            } => write!(
                f,
                "step {} was recorded with agent {} but is defined with agent {}",
                step_id, stored, defined
            ),
            Self::SectionMismatch {
                step_id,
                stored,
                defined,
            } => write!(
                f,
                "step {} was recorded in section {} but is defined in section {}",
                step_id, stored, defined
            ),
        }
    }
}

/// Lists every mismatch between `aggregate` and `definition`.
pub fn check_consistency(
    aggregate: &ProgressAggregate,
    definition: &WorkflowDefinition,
) -> Vec<ConsistencyWarning> {
    let mut warnings = Vec::new();

    for step in definition.steps() {
        let Some(progress) = aggregate.step(&step.id) else {
            warnings.push(ConsistencyWarning::MissingStep {
                step_id: step.id.clone(),
            });
            continue;
        };
        if progress.agent_id != step.agent_id {
            warnings.push(ConsistencyWarning::AgentMismatch {
                step_id: step.id.clone(),
                stored: progress.agent_id.clone(),
                defined: step.agent_id.clone(),
            });
        }
        if progress.section_id != step.section_id {
            warnings.push(ConsistencyWarning::SectionMismatch {
                step_id: step.id.clone(),
                stored: progress.section_id.clone(),
                defined: step.section_id.clone(),
            });
        }
    }

    for step_id in aggregate.steps.keys() {
        if definition.step(step_id).is_none() {
            warnings.push(ConsistencyWarning::UnknownStep {
                step_id: step_id.clone(),
            });
        }
    }

    warnings
}
