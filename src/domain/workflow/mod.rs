//! Workflow module - static wizard definitions.

mod definition;

#[cfg(test)]
pub(crate) use definition::test_support;

pub use definition::{Section, Step, WorkflowDefinition};
