//! ReconciliationSweeper - periodic reconciliation of pending conversations.
//!
//! Owns at most one background task. `start()` replaces any running task, so
//! two timers never run for the same reconciler.
//!
//! ## Configuration
//!
//! | Setting | Default | Description |
//! |---------|---------|-------------|
//! | `interval` | 10s | Time between sweeps |

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use super::ConversationReconciler;

/// Default time between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10);

struct RunningSweep {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Scheduler that runs `ConversationReconciler::sweep` on a fixed interval.
pub struct ReconciliationSweeper {
    reconciler: Arc<ConversationReconciler>,
    interval: Duration,
    running: Mutex<Option<RunningSweep>>,
}

impl ReconciliationSweeper {
    pub fn new(reconciler: Arc<ConversationReconciler>) -> Self {
        Self::with_interval(reconciler, DEFAULT_SWEEP_INTERVAL)
    }

    pub fn with_interval(reconciler: Arc<ConversationReconciler>, interval: Duration) -> Self {
        Self {
            reconciler,
            interval,
            running: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Starts sweeping, stopping any previous timer first.
    ///
    /// The first sweep runs one interval after the call. Must be called from
    /// within a tokio runtime.
    pub fn start(&self) {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = running.take() {
            let _ = previous.shutdown.send(true);
            previous.handle.abort();
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run(self.reconciler.clone(), self.interval, shutdown_rx));
        *running = Some(RunningSweep {
            shutdown: shutdown_tx,
            handle,
        });

        tracing::info!(interval_secs = self.interval.as_secs(), "Reconciliation sweeper started");
    }

    /// Stops sweeping and waits for an in-progress sweep to finish.
    pub async fn stop(&self) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(running) = running else {
            return;
        };

        let _ = running.shutdown.send(true);
        if let Err(e) = running.handle.await {
            if !e.is_cancelled() {
                tracing::error!(error = %e, "Reconciliation sweeper task failed");
            }
        }
        tracing::info!("Reconciliation sweeper stopped");
    }

    pub fn is_active(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }
}

impl Drop for ReconciliationSweeper {
    fn drop(&mut self) {
        let running = self
            .running
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(running) = running {
            running.handle.abort();
        }
    }
}

async fn run(
    reconciler: Arc<ConversationReconciler>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return;
                }
            }
            _ = ticker.tick() => {
                match reconciler.sweep().await {
                    Ok(report) if report.checked > 0 => tracing::info!(
                        checked = report.checked,
                        completed = report.completed,
                        failed = report.failed,
                        "Reconciled pending conversations"
                    ),
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "Reconciliation sweep failed"),
                }
            }
        }
    }
}
