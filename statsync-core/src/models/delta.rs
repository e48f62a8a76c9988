use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::snapshot::{UserStatsSnapshot, MAX_MAX_HEARTS, MIN_MAX_HEARTS};

/// A partial, incremental change to a [`UserStatsSnapshot`].
///
/// Counter fields are signed increments. `accuracy` and `last_game_results`
/// replace the current value when present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatsDelta {
    pub xp: Option<i64>,
    pub diamonds: Option<i64>,
    pub hearts: Option<i64>,
    pub max_hearts: Option<i64>,
    pub level: Option<i64>,
    pub streak: Option<i64>,
    pub max_streak: Option<i64>,
    pub accuracy: Option<f64>,
    pub completed_questions: Option<i64>,
    pub correct_answers: Option<i64>,
    pub wrong_answers: Option<i64>,
    pub last_game_results: Option<serde_json::Value>,
}

impl StatsDelta {
    /// Returns true if the delta carries no change at all.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Folds this delta into `current`, stamping the result with `now`.
    ///
    /// `max_hearts` is clamped to `[1, 10]` first, then `hearts` is clamped
    /// against that effective maximum. Other counters saturate at zero and
    /// `level` never drops below 1. `max_streak` tracks the highest streak.
    pub fn apply_to(&self, current: &UserStatsSnapshot, now: DateTime<Utc>) -> UserStatsSnapshot {
        let max_hearts = clamp(
            add(current.max_hearts as u64, self.max_hearts),
            MIN_MAX_HEARTS as u64,
            MAX_MAX_HEARTS as u64,
        ) as u32;
        let hearts = add(current.hearts as u64, self.hearts).min(max_hearts as u64) as u32;
        let streak = to_u32(add(current.streak as u64, self.streak));
        let max_streak = to_u32(add(current.max_streak as u64, self.max_streak)).max(streak);

        UserStatsSnapshot {
            xp: add(current.xp, self.xp),
            diamonds: add(current.diamonds, self.diamonds),
            hearts,
            max_hearts,
            level: to_u32(add(current.level as u64, self.level)).max(1),
            streak,
            max_streak,
            accuracy: self.accuracy.or(current.accuracy),
            completed_questions: add(current.completed_questions, self.completed_questions),
            correct_answers: add(current.correct_answers, self.correct_answers),
            wrong_answers: add(current.wrong_answers, self.wrong_answers),
            last_game_results: self
                .last_game_results
                .clone()
                .or_else(|| current.last_game_results.clone()),
            updated_at: Some(now),
        }
    }
}

fn add(value: u64, delta: Option<i64>) -> u64 {
    match delta {
        Some(d) if d >= 0 => value.saturating_add(d as u64),
        Some(d) => value.saturating_sub(d.unsigned_abs()),
        None => value,
    }
}

fn clamp(value: u64, min: u64, max: u64) -> u64 {
    value.max(min).min(max)
}

fn to_u32(value: u64) -> u32 {
    value.min(u32::MAX as u64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        "2024-03-01T12:00:00Z".parse().unwrap()
    }

    #[test]
    fn test_counters_are_added() {
        let current = UserStatsSnapshot {
            xp: 100,
            diamonds: 10,
            ..Default::default()
        };
        let delta = StatsDelta {
            xp: Some(25),
            diamonds: Some(-3),
            completed_questions: Some(1),
            correct_answers: Some(1),
            ..Default::default()
        };

        let next = delta.apply_to(&current, now());
        assert_eq!(next.xp, 125);
        assert_eq!(next.diamonds, 7);
        assert_eq!(next.completed_questions, 1);
        assert_eq!(next.correct_answers, 1);
        assert_eq!(next.updated_at, Some(now()));
    }

    #[test]
    fn test_counters_saturate_at_zero() {
        let current = UserStatsSnapshot {
            diamonds: 2,
            ..Default::default()
        };
        let delta = StatsDelta {
            diamonds: Some(-50),
            level: Some(-4),
            ..Default::default()
        };

        let next = delta.apply_to(&current, now());
        assert_eq!(next.diamonds, 0);
        assert_eq!(next.level, 1);
    }

    #[test]
    fn test_hearts_clamped_to_max() {
        let current = UserStatsSnapshot::default();
        let delta = StatsDelta {
            hearts: Some(3),
            ..Default::default()
        };
        assert_eq!(delta.apply_to(&current, now()).hearts, 5);

        let delta = StatsDelta {
            hearts: Some(-9),
            ..Default::default()
        };
        assert_eq!(delta.apply_to(&current, now()).hearts, 0);
    }

    #[test]
    fn test_hearts_use_effective_max() {
        let current = UserStatsSnapshot::default();
        let delta = StatsDelta {
            hearts: Some(3),
            max_hearts: Some(2),
            ..Default::default()
        };

        let next = delta.apply_to(&current, now());
        assert_eq!(next.max_hearts, 7);
        assert_eq!(next.hearts, 7);
    }

    #[test]
    fn test_max_hearts_clamped() {
        let current = UserStatsSnapshot::default();
        let up = StatsDelta {
            max_hearts: Some(40),
            ..Default::default()
        };
        assert_eq!(up.apply_to(&current, now()).max_hearts, 10);

        let down = StatsDelta {
            max_hearts: Some(-40),
            ..Default::default()
        };
        let next = down.apply_to(&current, now());
        assert_eq!(next.max_hearts, 1);
        assert_eq!(next.hearts, 1);
    }

    #[test]
    fn test_clamp_invariant_over_sequence() {
        let deltas = [
            (Some(4), None),
            (Some(-12), Some(3)),
            (Some(20), Some(-6)),
            (None, Some(-20)),
            (Some(9), Some(15)),
            (Some(-1), None),
        ];

        let mut snapshot = UserStatsSnapshot::default();
        for (hearts, max_hearts) in deltas {
            let delta = StatsDelta {
                hearts,
                max_hearts,
                ..Default::default()
            };
            snapshot = delta.apply_to(&snapshot, now());
            assert!(snapshot.is_consistent(), "violated by {:?}", delta);
        }
    }

    #[test]
    fn test_max_streak_follows_streak() {
        let current = UserStatsSnapshot {
            streak: 4,
            max_streak: 5,
            ..Default::default()
        };
        let delta = StatsDelta {
            streak: Some(3),
            ..Default::default()
        };

        let next = delta.apply_to(&current, now());
        assert_eq!(next.streak, 7);
        assert_eq!(next.max_streak, 7);

        let reset = StatsDelta {
            streak: Some(-7),
            ..Default::default()
        };
        let next = reset.apply_to(&next, now());
        assert_eq!(next.streak, 0);
        assert_eq!(next.max_streak, 7);
    }

    #[test]
    fn test_opaque_fields_replaced_when_present() {
        let current = UserStatsSnapshot {
            accuracy: Some(80.0),
            last_game_results: Some(serde_json::json!({"score": 1})),
            ..Default::default()
        };

        let untouched = StatsDelta {
            xp: Some(1),
            ..Default::default()
        }
        .apply_to(&current, now());
        assert_eq!(untouched.accuracy, Some(80.0));
        assert_eq!(
            untouched.last_game_results,
            Some(serde_json::json!({"score": 1}))
        );

        let replaced = StatsDelta {
            accuracy: Some(92.5),
            last_game_results: Some(serde_json::json!({"score": 9, "mode": "match"})),
            ..Default::default()
        }
        .apply_to(&current, now());
        assert_eq!(replaced.accuracy, Some(92.5));
        assert_eq!(
            replaced.last_game_results,
            Some(serde_json::json!({"score": 9, "mode": "match"}))
        );
    }

    #[test]
    fn test_is_empty() {
        assert!(StatsDelta::default().is_empty());
        assert!(!StatsDelta {
            xp: Some(0),
            ..Default::default()
        }
        .is_empty());
    }
}
