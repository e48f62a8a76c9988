//! Durable storage for the local snapshot and the pending mutation queue.
//!
//! # Keys
//!
//! Every user gets two records in the key-value store:
//! - `stats:<user_id>:snapshot`: the current [`UserStatsSnapshot`] as JSON
//! - `stats:<user_id>:queue`: the pending [`MutationJob`]s as a JSON array
//!
//! [`UserStatsSnapshot`]: crate::models::UserStatsSnapshot
//! [`MutationJob`]: crate::models::MutationJob

mod file;
mod memory;
mod queue;
mod state;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use queue::PendingQueue;
pub use state::LocalStateStore;

use crate::error::StorageError;

/// A durable string-record store.
///
/// Each `set` must replace the record atomically: a reader never observes
/// a partially written value.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Key of the snapshot record for `user_id`.
pub fn snapshot_key(user_id: &str) -> String {
    format!("stats:{}:snapshot", user_id)
}

/// Key of the pending queue record for `user_id`.
pub fn queue_key(user_id: &str) -> String {
    format!("stats:{}:queue", user_id)
}
