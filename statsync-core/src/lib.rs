//! Statsync Core Library
//!
//! Offline-first sync engine for per-user gamification stats.

pub mod config;
pub mod error;
pub mod models;
pub mod storage;
pub mod sync;
pub mod transport;

pub use config::{EngineConfig, RealtimeConfig};
pub use error::{StorageError, SyncError, TransportError};
pub use models::{MutationJob, StatsDelta, UserStatsSnapshot};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use sync::{Engine, FlushReport, PullOutcome, Subscription, SyncPhase};
pub use transport::{
    check_server, HttpStatsApi, RealtimeCredentials, StaticToken, StatsApi, TokenProvider,
};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
