//! Key-Value Store Port - Durable string storage for progress records.
//!
//! Progress is stored as JSON text under namespaced keys. The store itself
//! knows nothing about aggregates; encoding lives in the persistence layer.

use async_trait::async_trait;

/// Errors that can occur during key-value store operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Failed to serialize value: {0}")]
    SerializationFailed(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

impl StorageError {
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io(message.into())
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationFailed(err.to_string())
    }
}

/// Port for a durable string store.
///
/// Writes replace the whole value; there is no partial update.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Returns the value stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Stores `value` under `key`, replacing any previous value.
    async fn put(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Deletes `key`. Deleting a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Lists every key starting with `prefix`, sorted.
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}
