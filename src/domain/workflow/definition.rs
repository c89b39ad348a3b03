//! WorkflowDefinition - the static, ordered description of a wizard.
//!
//! A definition is validated whenever it is constructed or deserialized, so a
//! `WorkflowDefinition` value always has at least one step, strictly increasing
//! step orders, and every step pointing at a known section.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{AgentId, SectionId, StepId, ValidationError, WorkflowId};

/// Display grouping of steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub id: SectionId,
    pub title: String,
    pub order: u32,
}

/// One unit of the wizard, bound to one external conversational agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub id: StepId,
    pub title: String,
    pub order: u32,
    pub section_id: SectionId,
    pub agent_id: AgentId,
}

/// Unvalidated wire shape of a definition.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawWorkflowDefinition {
    id: WorkflowId,
    #[serde(default)]
    title: String,
    #[serde(default)]
    sections: Vec<Section>,
    #[serde(default)]
    steps: Vec<Step>,
}

/// Immutable, validated workflow definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawWorkflowDefinition")]
pub struct WorkflowDefinition {
    id: WorkflowId,
    title: String,
    sections: Vec<Section>,
    steps: Vec<Step>,
}

impl TryFrom<RawWorkflowDefinition> for WorkflowDefinition {
    type Error = ValidationError;

    fn try_from(raw: RawWorkflowDefinition) -> Result<Self, Self::Error> {
        WorkflowDefinition::new(raw.id, raw.title, raw.sections, raw.steps)
    }
}

impl WorkflowDefinition {
    /// Builds a definition, sorting sections and steps by `order` and
    /// validating the structural invariants.
    pub fn new(
        id: WorkflowId,
        title: impl Into<String>,
        mut sections: Vec<Section>,
        mut steps: Vec<Step>,
    ) -> Result<Self, ValidationError> {
        if id.is_blank() {
            return Err(ValidationError::empty_field("id"));
        }
        if steps.is_empty() {
            return Err(ValidationError::empty_field("steps"));
        }

        sections.sort_by_key(|s| s.order);
        steps.sort_by_key(|s| s.order);

        let mut section_ids = HashSet::new();
        for section in &sections {
            if section.id.is_blank() {
                return Err(ValidationError::empty_field("section.id"));
            }
            if !section_ids.insert(section.id.as_str()) {
                return Err(ValidationError::duplicate("section.id", section.id.as_str()));
            }
        }

        let mut step_ids = HashSet::new();
        for (index, step) in steps.iter().enumerate() {
            if step.id.is_blank() {
                return Err(ValidationError::empty_field("step.id"));
            }
            if step.agent_id.is_blank() {
                return Err(ValidationError::empty_field("step.agentId"));
            }
            if !step_ids.insert(step.id.as_str()) {
                return Err(ValidationError::duplicate("step.id", step.id.as_str()));
            }
            if index > 0 && steps[index - 1].order == step.order {
                return Err(ValidationError::duplicate("step.order", step.order.to_string()));
            }
            if !section_ids.contains(step.section_id.as_str()) {
                return Err(ValidationError::invalid_format(
                    "step.sectionId",
                    format!("step '{}' references unknown section '{}'", step.id, step.section_id),
                ));
            }
        }

        Ok(Self {
            id,
            title: title.into(),
            sections,
            steps,
        })
    }

    pub fn id(&self) -> &WorkflowId {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Sections in display order.
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Steps in `order` sequence.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// The first step of the wizard. Definitions always have one.
    pub fn first_step(&self) -> &Step {
        &self.steps[0]
    }

    /// Looks up a step by id.
    pub fn step(&self, id: &StepId) -> Option<&Step> {
        self.steps.iter().find(|s| &s.id == id)
    }

    /// Looks up a section by id.
    pub fn section(&self, id: &SectionId) -> Option<&Section> {
        self.sections.iter().find(|s| &s.id == id)
    }

    /// Zero-based position of a step in `order` sequence.
    pub fn position_of(&self, id: &StepId) -> Option<usize> {
        self.steps.iter().position(|s| &s.id == id)
    }

    /// The step following `id` by order, if any.
    pub fn next_step_after(&self, id: &StepId) -> Option<&Step> {
        self.position_of(id).and_then(|pos| self.steps.get(pos + 1))
    }

    /// Steps at or before `id` in order. Empty for unknown ids.
    pub fn steps_through(&self, id: &StepId) -> &[Step] {
        match self.position_of(id) {
            Some(pos) => &self.steps[..=pos],
            None => &[],
        }
    }

    /// Steps belonging to a section, in order.
    pub fn steps_in_section(&self, section_id: &SectionId) -> Vec<&Step> {
        self.steps
            .iter()
            .filter(|s| &s.section_id == section_id)
            .collect()
    }
}
