use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default number of heart slots for a fresh account.
pub const DEFAULT_MAX_HEARTS: u32 = 5;
/// Lower bound for `max_hearts`.
pub const MIN_MAX_HEARTS: u32 = 1;
/// Upper bound for `max_hearts`.
pub const MAX_MAX_HEARTS: u32 = 10;

/// A complete point-in-time record of one user's gamification stats.
///
/// Serialized as camelCase JSON, which is the shape the stats endpoints
/// exchange and the shape kept in durable storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserStatsSnapshot {
    pub xp: u64,
    pub diamonds: u64,
    /// Always within `0..=max_hearts`.
    pub hearts: u32,
    pub max_hearts: u32,
    pub level: u32,
    pub streak: u32,
    pub max_streak: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    pub completed_questions: u64,
    pub correct_answers: u64,
    pub wrong_answers: u64,
    /// Opaque payload from the last finished game, replaced as a whole.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_game_results: Option<serde_json::Value>,
    /// Time of the last mutation. The only conflict tie-breaker.
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for UserStatsSnapshot {
    fn default() -> Self {
        Self {
            xp: 0,
            diamonds: 0,
            hearts: DEFAULT_MAX_HEARTS,
            max_hearts: DEFAULT_MAX_HEARTS,
            level: 1,
            streak: 0,
            max_streak: 0,
            accuracy: None,
            completed_questions: 0,
            correct_answers: 0,
            wrong_answers: 0,
            last_game_results: None,
            updated_at: None,
        }
    }
}

impl UserStatsSnapshot {
    /// Returns true if the heart invariants hold.
    pub fn is_consistent(&self) -> bool {
        (MIN_MAX_HEARTS..=MAX_MAX_HEARTS).contains(&self.max_hearts)
            && self.hearts <= self.max_hearts
    }

    /// Returns a copy with `max_hearts` and `hearts` forced into range.
    ///
    /// Snapshots received from the network go through this before they
    /// replace local state.
    pub fn normalized(&self) -> Self {
        let max_hearts = self.max_hearts.clamp(MIN_MAX_HEARTS, MAX_MAX_HEARTS);
        Self {
            max_hearts,
            hearts: self.hearts.min(max_hearts),
            level: self.level.max(1),
            ..self.clone()
        }
    }

    /// Sort key used by last-write-wins. A missing timestamp sorts before
    /// every real one.
    pub fn version(&self) -> DateTime<Utc> {
        self.updated_at.unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}
