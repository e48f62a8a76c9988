use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::snapshot::UserStatsSnapshot;

/// A durable record of "push this snapshot to the server".
///
/// Carries the full merged snapshot rather than the delta that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationJob {
    pub id: Uuid,
    pub snapshot: UserStatsSnapshot,
    pub enqueued_at: DateTime<Utc>,
}

impl MutationJob {
    /// Creates a job for `snapshot` with a fresh id.
    pub fn new(snapshot: UserStatsSnapshot, enqueued_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            snapshot,
            enqueued_at,
        }
    }
}
