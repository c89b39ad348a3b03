//! ProgressPersistence - JSON encoding of progress aggregates over a
//! `KeyValueStore`.
//!
//! Layout under a namespace `ns`:
//!
//! | Key | Value |
//! |-----|-------|
//! | `ns:progress:<workflowId>` | JSON `ProgressAggregate` |
//! | `ns:session-id` | session UUID |
//!
//! Undecodable records are logged and treated as absent. Store failures are
//! returned to the caller so a broken disk never looks like "no progress yet".

use std::sync::Arc;

use serde_json::{json, Map, Value};
use tokio::sync::OnceCell;

use crate::domain::foundation::{SessionId, Timestamp, WorkflowId};
use crate::domain::progress::ProgressAggregate;
use crate::ports::{KeyValueStore, StorageError};

/// Default key namespace.
pub const DEFAULT_NAMESPACE: &str = "workflow-progress";

/// Reads and writes progress aggregates for one session.
pub struct ProgressPersistence {
    store: Arc<dyn KeyValueStore>,
    namespace: String,
    session_id: OnceCell<SessionId>,
}

impl ProgressPersistence {
    pub fn new(store: Arc<dyn KeyValueStore>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            session_id: OnceCell::new(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Storage key of the aggregate for `workflow_id`.
    pub fn session_key(&self, workflow_id: &WorkflowId) -> String {
        format!("{}{}", self.progress_prefix(), workflow_id)
    }

    fn progress_prefix(&self) -> String {
        format!("{}:progress:", self.namespace)
    }

    fn session_id_key(&self) -> String {
        format!("{}:session-id", self.namespace)
    }

    /// Process-wide session id, read from the store or created once and persisted.
    pub async fn session_id(&self) -> Result<SessionId, StorageError> {
        self.session_id
            .get_or_try_init(|| async {
                let key = self.session_id_key();
                if let Some(raw) = self.store.get(&key).await? {
                    match raw.trim().parse::<SessionId>() {
                        Ok(id) => return Ok(id),
                        Err(e) => tracing::warn!(error = %e, "Stored session id is invalid, replacing it"),
                    }
                }
                let id = SessionId::new();
                self.store.put(&key, &id.to_string()).await?;
                tracing::info!(session_id = %id, "Created progress session");
                Ok::<_, StorageError>(id)
            })
            .await
            .copied()
    }

    /// Overwrites the stored aggregate, returning the copy stamped with
    /// `last_updated = now`.
    pub async fn save(
        &self,
        aggregate: &ProgressAggregate,
        now: Timestamp,
    ) -> Result<ProgressAggregate, StorageError> {
        let mut stamped = aggregate.clone();
        stamped.last_updated = Some(now);

        let json = serde_json::to_string(&stamped)?;
        self.store
            .put(&self.session_key(&stamped.workflow_id), &json)
            .await?;
        Ok(stamped)
    }

    /// Loads the aggregate for `workflow_id`.
    ///
    /// Returns `Ok(None)` when nothing is stored or the record cannot be decoded.
    pub async fn load(
        &self,
        workflow_id: &WorkflowId,
    ) -> Result<Option<ProgressAggregate>, StorageError> {
        let Some(raw) = self.store.get(&self.session_key(workflow_id)).await? else {
            return Ok(None);
        };

        match serde_json::from_str::<ProgressAggregate>(&raw) {
            Ok(aggregate) if &aggregate.workflow_id == workflow_id => Ok(Some(aggregate)),
            Ok(aggregate) => {
                tracing::warn!(
                    workflow_id = %workflow_id,
                    stored_workflow_id = %aggregate.workflow_id,
                    "Stored progress belongs to another workflow, ignoring it"
                );
                Ok(None)
            }
            Err(e) => {
                tracing::warn!(workflow_id = %workflow_id, error = %e, "Stored progress is unreadable, ignoring it");
                Ok(None)
            }
        }
    }

    /// Deletes the stored aggregate for `workflow_id`.
    pub async fn clear(&self, workflow_id: &WorkflowId) -> Result<(), StorageError> {
        self.store.remove(&self.session_key(workflow_id)).await
    }

    /// Serializes every stored aggregate of this namespace plus the session id.
    ///
    /// Output shape: `{"sessionId", "exportedAt", "progress": {workflowId: aggregate}}`.
    pub async fn export_all(&self, now: Timestamp) -> Result<String, StorageError> {
        let session_id = self.session_id().await?;
        let prefix = self.progress_prefix();

        let mut progress = Map::new();
        for key in self.store.keys_with_prefix(&prefix).await? {
            let Some(raw) = self.store.get(&key).await? else {
                continue;
            };
            match serde_json::from_str::<Value>(&raw) {
                Ok(value) => {
                    let workflow_id = key[prefix.len()..].to_string();
                    progress.insert(workflow_id, value);
                }
                Err(e) => tracing::warn!(key = %key, error = %e, "Skipping unreadable progress record"),
            }
        }

        let blob = json!({
            "sessionId": session_id,
            "exportedAt": now,
            "progress": progress,
        });
        Ok(serde_json::to_string_pretty(&blob)?)
    }

    /// Restores aggregates from an `export_all` blob, saving each one stamped
    /// with `last_updated = now`.
    ///
    /// Every entry is validated before anything is written. Returns
    /// `Ok(false)` without touching the store when the blob is malformed. If a
    /// write fails midway, entries already written are rolled back.
    pub async fn import_all(&self, blob: &str, now: Timestamp) -> Result<bool, StorageError> {
        let Some(aggregates) = Self::parse_import(blob) else {
            return Ok(false);
        };

        let mut written: Vec<(String, Option<String>)> = Vec::with_capacity(aggregates.len());
        for aggregate in &aggregates {
            let key = self.session_key(&aggregate.workflow_id);
            let previous = self.store.get(&key).await?;

            if let Err(e) = self.save(aggregate, now).await {
                written.push((key, previous));
                self.roll_back(written).await;
                return Err(e);
            }
            written.push((key, previous));
        }

        tracing::info!(count = aggregates.len(), "Imported progress");
        Ok(true)
    }

    fn parse_import(blob: &str) -> Option<Vec<ProgressAggregate>> {
        let value: Value = match serde_json::from_str(blob) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "Import blob is not JSON");
                return None;
            }
        };
        let Some(entries) = value.get("progress").and_then(Value::as_object) else {
            tracing::warn!("Import blob has no progress map");
            return None;
        };

        let mut aggregates = Vec::with_capacity(entries.len());
        for (name, entry) in entries {
            let well_formed = entry.get("workflowId").is_some_and(Value::is_string)
                && entry.get("steps").is_some_and(Value::is_object);
            if !well_formed {
                tracing::warn!(entry = %name, "Import entry lacks workflowId or steps");
                return None;
            }
            match serde_json::from_value::<ProgressAggregate>(entry.clone()) {
                Ok(aggregate) => aggregates.push(aggregate),
                Err(e) => {
                    tracing::warn!(entry = %name, error = %e, "Import entry is not a progress record");
                    return None;
                }
            }
        }
        Some(aggregates)
    }

    async fn roll_back(&self, written: Vec<(String, Option<String>)>) {
        for (key, previous) in written.into_iter().rev() {
            let restored = match previous {
                Some(value) => self.store.put(&key, &value).await,
                None => self.store.remove(&key).await,
            };
            if let Err(e) = restored {
                tracing::error!(key = %key, error = %e, "Failed to roll back import");
            }
        }
    }
}
