//! Data model for the stats sync engine.

mod delta;
mod job;
pub mod merge;
mod snapshot;

pub use delta::StatsDelta;
pub use job::MutationJob;
pub use merge::Resolution;
pub use snapshot::{UserStatsSnapshot, DEFAULT_MAX_HEARTS, MAX_MAX_HEARTS, MIN_MAX_HEARTS};
