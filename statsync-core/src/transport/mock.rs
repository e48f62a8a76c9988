//! Scriptable in-memory [`StatsApi`] for tests.

use std::collections::VecDeque;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::StatsApi;
use crate::error::TransportError;
use crate::models::UserStatsSnapshot;

/// A [`StatsApi`] that behaves like a single-user stats store.
///
/// Successful pushes replace the stored snapshot, which later pulls return.
/// Failures can be scripted per push or set for every pull.
#[derive(Debug, Default)]
pub struct MockStatsApi {
    remote: Mutex<Option<UserStatsSnapshot>>,
    pull_error: Mutex<Option<TransportError>>,
    push_failures: Mutex<VecDeque<TransportError>>,
    push_latency: Mutex<Duration>,
    attempts: Mutex<Vec<(Instant, UserStatsSnapshot)>>,
    pushed: Mutex<Vec<UserStatsSnapshot>>,
    pulls: Mutex<usize>,
}

impl MockStatsApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the snapshot returned by pulls.
    pub fn set_remote(&self, snapshot: UserStatsSnapshot) {
        *self.remote.lock() = Some(snapshot);
    }

    pub fn remote(&self) -> Option<UserStatsSnapshot> {
        self.remote.lock().clone()
    }

    /// Makes every pull fail with `error`, or restores pulls with `None`.
    pub fn fail_pulls(&self, error: Option<TransportError>) {
        *self.pull_error.lock() = error;
    }

    /// Queues errors for the next pushes, one per attempt.
    pub fn fail_next_pushes(&self, errors: impl IntoIterator<Item = TransportError>) {
        self.push_failures.lock().extend(errors);
    }

    /// Makes every push take `latency` before answering.
    pub fn set_push_latency(&self, latency: Duration) {
        *self.push_latency.lock() = latency;
    }

    /// Every push attempt with the time it started, successful or not.
    pub fn attempts(&self) -> Vec<(Instant, UserStatsSnapshot)> {
        self.attempts.lock().clone()
    }

    /// Snapshots of successful pushes, in order.
    pub fn pushed(&self) -> Vec<UserStatsSnapshot> {
        self.pushed.lock().clone()
    }

    pub fn pull_count(&self) -> usize {
        *self.pulls.lock()
    }
}

impl StatsApi for MockStatsApi {
    fn pull<'a>(
        &'a self,
        _user_id: &'a str,
    ) -> BoxFuture<'a, Result<UserStatsSnapshot, TransportError>> {
        async move {
            *self.pulls.lock() += 1;
            if let Some(error) = self.pull_error.lock().clone() {
                return Err(error);
            }
            self.remote.lock().clone().ok_or(TransportError::Status {
                status: 404,
                body: "no stats stored".to_string(),
            })
        }
        .boxed()
    }

    fn push<'a>(
        &'a self,
        _user_id: &'a str,
        snapshot: &'a UserStatsSnapshot,
    ) -> BoxFuture<'a, Result<(), TransportError>> {
        async move {
            self.attempts.lock().push((Instant::now(), snapshot.clone()));

            let latency = *self.push_latency.lock();
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }

            if let Some(error) = self.push_failures.lock().pop_front() {
                return Err(error);
            }

            self.pushed.lock().push(snapshot.clone());
            *self.remote.lock() = Some(snapshot.clone());
            Ok(())
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_push_then_pull() {
        let api = MockStatsApi::new();
        assert!(api.pull("u1").await.is_err());

        let snapshot = UserStatsSnapshot {
            xp: 3,
            ..Default::default()
        };
        api.push("u1", &snapshot).await.unwrap();
        assert_eq!(api.pull("u1").await.unwrap(), snapshot);
        assert_eq!(api.pull_count(), 2);
    }

    #[tokio::test]
    async fn test_scripted_failures_consumed_in_order() {
        let api = MockStatsApi::new();
        api.fail_next_pushes([
            TransportError::Timeout,
            TransportError::Status {
                status: 400,
                body: String::new(),
            },
        ]);
        let snapshot = UserStatsSnapshot::default();

        assert_eq!(
            api.push("u1", &snapshot).await,
            Err(TransportError::Timeout)
        );
        assert!(matches!(
            api.push("u1", &snapshot).await,
            Err(TransportError::Status { status: 400, .. })
        ));
        assert!(api.push("u1", &snapshot).await.is_ok());
        assert_eq!(api.attempts().len(), 3);
        assert_eq!(api.pushed().len(), 1);
    }
}
