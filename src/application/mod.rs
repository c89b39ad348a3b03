//! Application layer - Orchestration over the progress domain.
//!
//! - `ProgressService` - transactional facade over the progress aggregate
//! - `ProgressPersistence` - aggregate encoding over a `KeyValueStore`
//! - `ConversationReconciler` / `ReconciliationSweeper` - remote outcome sync
//! - `VoiceSessionBridge` - voice transport events into progress

mod persistence;
mod progress_service;
mod reconciler;
mod sweeper;
mod voice_session;

pub use persistence::{ProgressPersistence, DEFAULT_NAMESPACE};
pub use progress_service::{
    ProgressError, ProgressService, ProgressServiceConfig, RemoteApplyOutcome, StepOutcome,
};
pub use reconciler::{
    signal_from_record, ConversationReconciler, ReconcileOutcome, SkipReason, SweepReport,
};
pub use sweeper::{ReconciliationSweeper, DEFAULT_SWEEP_INTERVAL};
pub use voice_session::{VoiceSessionBridge, VoiceSessionError};
