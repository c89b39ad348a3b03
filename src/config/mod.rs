//! Application configuration module
//!
//! Type-safe configuration loaded from environment variables using the `config`
//! and `dotenvy` crates. Variables carry the `WORKFLOW_PROGRESS` prefix and
//! nested values are separated by double underscores.
//!
//! # Example
//!
//! ```no_run
//! use workflow_progress::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Running workflow {}", config.workflow.name);
//! ```

mod api;
mod error;
mod logging;
mod reconciliation;
mod storage;
mod workflow;

pub use api::ApiConfig;
pub use error::{ConfigError, ValidationError};
pub use logging::LoggingConfig;
pub use reconciliation::ReconciliationConfig;
pub use storage::{StorageBackend, StorageConfig};
pub use workflow::WorkflowConfig;

use serde::Deserialize;

/// Root application configuration
///
/// Load using [`AppConfig::load()`] which reads from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Workflow to run (name, passcode, optional local definition)
    pub workflow: WorkflowConfig,

    /// Agent service connection
    #[serde(default)]
    pub api: ApiConfig,

    /// Progress storage backend
    #[serde(default)]
    pub storage: StorageConfig,

    /// Sweep interval and auto-advance
    #[serde(default)]
    pub reconciliation: ReconciliationConfig,

    /// Log filter and format
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `WORKFLOW_PROGRESS` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `WORKFLOW_PROGRESS__WORKFLOW__NAME=character-creation` -> `workflow.name`
    /// - `WORKFLOW_PROGRESS__STORAGE__BACKEND=memory` -> `storage.backend`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or values cannot
    /// be parsed into the expected types.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("WORKFLOW_PROGRESS")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns the first `ValidationError` found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.workflow.validate()?;
        self.api.validate()?;
        self.storage.validate()?;
        self.reconciliation.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}
