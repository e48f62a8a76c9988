//! Network collaborators of the engine.
//!
//! - [`StatsApi`]: the GET/POST snapshot endpoint pair
//! - [`RealtimeChannel`]: the persistent WebSocket carrying presence and
//!   server-pushed snapshots
//! - [`TokenProvider`]: read-only source of the bearer token

mod http;
mod mock;
mod realtime;
mod url;

pub use http::{check_server, HttpStatsApi};
pub use mock::MockStatsApi;
pub use realtime::{ChannelEvent, ChannelMessage, RealtimeChannel, RealtimeCredentials};
pub use url::{http_url, ws_url};

use futures::future::BoxFuture;

use crate::error::TransportError;
use crate::models::UserStatsSnapshot;

/// The remote authoritative stats store.
pub trait StatsApi: Send + Sync {
    /// Fetches the server's current snapshot for `user_id`.
    fn pull<'a>(&'a self, user_id: &'a str)
        -> BoxFuture<'a, Result<UserStatsSnapshot, TransportError>>;

    /// Stores `snapshot` as the new authoritative state for `user_id`.
    fn push<'a>(
        &'a self,
        user_id: &'a str,
        snapshot: &'a UserStatsSnapshot,
    ) -> BoxFuture<'a, Result<(), TransportError>>;
}

/// Source of the bearer token. The engine never refreshes it.
pub trait TokenProvider: Send + Sync {
    fn token(&self) -> Option<String>;
}

/// A fixed token.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

impl TokenProvider for StaticToken {
    fn token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}
