//! Foundation module - Shared domain primitives.
//!
//! Contains identifiers, timestamps, the step lifecycle enum and error types
//! that form the vocabulary of the progress domain.

mod errors;
mod ids;
mod state_machine;
mod step_state;
mod timestamp;

pub use errors::ValidationError;
pub use ids::{AgentId, ConversationId, MessageId, SectionId, SessionId, StepId, WorkflowId};
pub use state_machine::StateMachine;
pub use step_state::StepState;
pub use timestamp::Timestamp;
