//! Progress storage configuration

use serde::Deserialize;
use std::path::PathBuf;

use super::error::ValidationError;

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Which key-value store to use
    #[serde(default)]
    pub backend: StorageBackend,

    /// Directory for the file backend
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Key namespace shared by all records of this deployment
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

/// Key-value store backend
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Memory,
}

impl StorageConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.namespace.is_empty()
            || self
                .namespace
                .chars()
                .any(|c| c == ':' || c.is_whitespace())
        {
            return Err(ValidationError::InvalidNamespace);
        }
        if self.backend == StorageBackend::File && self.data_dir.as_os_str().is_empty() {
            return Err(ValidationError::MissingRequired("storage.data_dir"));
        }
        Ok(())
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            data_dir: default_data_dir(),
            namespace: default_namespace(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data/progress")
}

fn default_namespace() -> String {
    crate::application::DEFAULT_NAMESPACE.to_string()
}
