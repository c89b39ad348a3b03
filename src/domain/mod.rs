//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, timestamps, step states, errors)
//! - `workflow` - Static workflow definitions (sections and steps)
//! - `progress` - Per-session progress aggregate and its transforms

pub mod foundation;
pub mod progress;
pub mod workflow;
