use std::collections::HashMap;

use parking_lot::Mutex;

use super::KeyValueStore;
use crate::error::StorageError;

/// In-memory [`KeyValueStore`], for tests and ephemeral sessions.
///
/// Clones share the same underlying map, so a clone handed to a second
/// engine behaves like the same device storage after a restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: std::sync::Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.records.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.records
            .lock()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.records.lock().remove(key);
        Ok(())
    }
}
