use std::sync::Arc;

use super::{snapshot_key, KeyValueStore};
use crate::error::StorageError;
use crate::models::UserStatsSnapshot;

/// Persisted cell holding the user's current snapshot.
///
/// No validation happens here; callers are responsible for the invariants.
#[derive(Clone)]
pub struct LocalStateStore {
    kv: Arc<dyn KeyValueStore>,
    key: String,
}

impl LocalStateStore {
    pub fn new(kv: Arc<dyn KeyValueStore>, user_id: &str) -> Self {
        Self {
            kv,
            key: snapshot_key(user_id),
        }
    }

    /// Returns the stored snapshot, or the default one if nothing usable is
    /// stored.
    pub fn get(&self) -> UserStatsSnapshot {
        match self.kv.get(&self.key) {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    tracing::warn!("Discarding unreadable snapshot '{}': {}", self.key, e);
                    UserStatsSnapshot::default()
                }
            },
            Ok(None) => UserStatsSnapshot::default(),
            Err(e) => {
                tracing::warn!("Failed to read snapshot '{}': {}", self.key, e);
                UserStatsSnapshot::default()
            }
        }
    }

    /// Durably replaces the stored snapshot.
    pub fn set(&self, snapshot: &UserStatsSnapshot) -> Result<(), StorageError> {
        let raw = serde_json::to_string(snapshot)
            .map_err(|e| StorageError::Encode(self.key.clone(), e))?;
        self.kv.set(&self.key, &raw)
    }
}
