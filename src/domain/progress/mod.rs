//! Progress module - per-session progress through a workflow.
//!
//! `StepProgress` holds the pure per-step transforms; `ProgressAggregate`
//! enforces the rules that span steps (single active step, unlock order,
//! derived counters).

mod aggregate;
mod consistency;
mod errors;
mod message;
mod overall;
mod signal;
mod step_progress;

pub use aggregate::ProgressAggregate;
pub use consistency::{check_consistency, ConsistencyWarning};
pub use errors::ProgressRuleError;
pub use message::{CapturedField, ConversationMessage, MessageRole, NewMessage};
pub use overall::{OverallProgress, SessionData};
pub use signal::{ConversationSignal, ConversationStatus};
pub use step_progress::StepProgress;
