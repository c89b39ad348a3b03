//! Workflow Progress - step progress tracking for multi-step creation wizards
//!
//! Each step of a workflow is worked through in a voice conversation with an
//! agent. This crate keeps the per-step progress of one session, persists it
//! through a key-value store and reconciles it with conversation outcomes
//! reported by the agent service.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
