//! Sync coordination: the engine and the timers, monitors and fan-out it
//! is built from.

mod backoff;
mod debounce;
mod engine;
mod hub;
mod monitor;

pub use backoff::Backoff;
pub use debounce::Debouncer;
pub use engine::{Engine, FlushReport, PullOutcome, SyncPhase};
pub use hub::{SubscriberHub, Subscription};
pub use monitor::{LifecycleMonitor, NetworkMonitor};
