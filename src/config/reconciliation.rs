//! Reconciliation configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Sweep timing and step advancement
#[derive(Debug, Clone, Deserialize)]
pub struct ReconciliationConfig {
    /// Seconds between reconciliation sweeps
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Activate the next step when the current one completes
    #[serde(default = "default_auto_advance")]
    pub auto_advance: bool,
}

impl ReconciliationConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.sweep_interval_secs == 0 || self.sweep_interval_secs > 3600 {
            return Err(ValidationError::InvalidSweepInterval);
        }
        Ok(())
    }
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
            auto_advance: default_auto_advance(),
        }
    }
}

fn default_sweep_interval() -> u64 {
    10
}

fn default_auto_advance() -> bool {
    true
}
