//! Last-write-wins resolution between the local snapshot and a remote one.
//!
//! The whole snapshot is the unit of conflict: whichever side carries the
//! newer `updated_at` wins every field. Ties go to the incoming snapshot.
//! An accepted snapshot is normalized so the heart invariants still hold.

use super::snapshot::UserStatsSnapshot;

/// Outcome of comparing an incoming snapshot against the local one.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The incoming snapshot is at least as new and replaces local wholesale.
    TakeIncoming(UserStatsSnapshot),
    /// The incoming snapshot is older; local stays unchanged.
    KeepLocal,
}

impl Resolution {
    pub fn is_replacement(&self) -> bool {
        matches!(self, Resolution::TakeIncoming(_))
    }
}

/// Resolves `incoming` against `local`.
pub fn resolve(local: &UserStatsSnapshot, incoming: &UserStatsSnapshot) -> Resolution {
    if incoming.version() >= local.version() {
        Resolution::TakeIncoming(incoming.normalized())
    } else {
        Resolution::KeepLocal
    }
}

/// Applies [`resolve`] and returns the snapshot that should be current.
pub fn merge(local: &UserStatsSnapshot, incoming: &UserStatsSnapshot) -> UserStatsSnapshot {
    match resolve(local, incoming) {
        Resolution::TakeIncoming(snapshot) => snapshot,
        Resolution::KeepLocal => local.clone(),
    }
}
