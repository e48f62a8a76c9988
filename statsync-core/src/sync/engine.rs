//! The sync coordinator.
//!
//! [`Engine`] is the single owner of the local snapshot and the pending
//! queue. Every read-modify-write of either happens under one mutex that is
//! never held across a network call or a sleep. Everything else (realtime
//! channel, monitors, timers) only triggers engine operations.
//!
//! ## Push path
//!
//! `apply_delta` folds the delta into the snapshot, persists it, queues the
//! full snapshot and schedules a debounced flush. The flush is a single
//! sequential worker that drains the queue front to back:
//! - success: the job is removed and the backoff resets
//! - 4xx: the job is dropped so the queue cannot stall on it
//! - anything else: the same job is retried after a doubling delay
//!
//! ## Pull path
//!
//! `force_pull`, realtime pushes and periodic pulls resolve the remote
//! snapshot against the local one by last-write-wins on `updated_at`.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant, MissedTickBehavior};
use uuid::Uuid;

use super::backoff::Backoff;
use super::debounce::Debouncer;
use super::hub::{SubscriberHub, Subscription};
use super::monitor::{LifecycleMonitor, NetworkMonitor};
use crate::config::EngineConfig;
use crate::error::{SyncError, TransportError};
use crate::models::merge::{self, Resolution};
use crate::models::{MutationJob, StatsDelta, UserStatsSnapshot};
use crate::storage::{KeyValueStore, LocalStateStore, PendingQueue};
use crate::transport::{ChannelEvent, RealtimeChannel, RealtimeCredentials, StatsApi};

/// What the engine is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// Nothing scheduled or running.
    Idle,
    /// A push is scheduled but not yet due.
    Debouncing,
    /// The push worker is draining the queue.
    Pushing,
    /// A pull is in flight.
    Pulling,
}

/// Result of [`Engine::force_pull`].
#[derive(Debug, Clone, PartialEq)]
pub enum PullOutcome {
    /// The server snapshot was newer and replaced local state.
    Applied(UserStatsSnapshot),
    /// The server snapshot was older; local state is unchanged.
    KeptLocal,
    /// The pull failed. Local state is unchanged.
    Failed,
}

/// Result of [`Engine::flush_queue`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Jobs accepted by the server.
    pub pushed: usize,
    /// Jobs dropped after a non-retryable error.
    pub dropped: usize,
    /// Retry sleeps taken.
    pub retries: usize,
    /// Jobs still queued when the worker stopped.
    pub remaining: usize,
    /// Another worker was already draining; this call did nothing.
    pub already_running: bool,
}

/// Order of a catch-up cycle.
#[derive(Debug, Clone, Copy)]
enum CatchUp {
    FlushThenPull,
    PullThenFlush,
}

/// Why a drain stopped.
enum DrainEnd {
    Empty,
    Offline,
    NoToken,
    GaveUp,
}

struct LocalState {
    snapshot: UserStatsSnapshot,
    queue: PendingQueue,
    /// Job currently being sent, if any. It must not be coalesced.
    in_flight: Option<Uuid>,
    last_pushed_at: Option<Instant>,
    /// Bumped on every committed snapshot change; orders notifications.
    revision: u64,
}

struct Inner {
    user_id: String,
    config: EngineConfig,
    api: Arc<dyn StatsApi>,
    store: LocalStateStore,
    state: Mutex<LocalState>,
    hub: SubscriberHub,
    debouncer: Debouncer,
    backoff: Mutex<Backoff>,
    pushing: AtomicBool,
    pulling: AtomicUsize,
    network: NetworkMonitor,
    lifecycle: LifecycleMonitor,
    runtime: Handle,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Resets the push worker flag when the worker ends, even if its task is
/// aborted mid-push.
struct RunningFlag<'a>(&'a AtomicBool);

impl Drop for RunningFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

struct ActiveCount<'a>(&'a AtomicUsize);

impl<'a> ActiveCount<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for ActiveCount<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Sync engine for one user.
///
/// Cheap to clone; clones share the same state. Must be created inside a
/// tokio runtime.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

impl Engine {
    /// Creates the engine for `user_id`, restoring the snapshot and any
    /// unsent jobs from `storage`.
    ///
    /// Recovered jobs are scheduled for a push right away. If a pull interval
    /// is configured the first pull-then-flush cycle starts immediately.
    pub fn init(
        user_id: impl Into<String>,
        config: EngineConfig,
        api: Arc<dyn StatsApi>,
        storage: Arc<dyn KeyValueStore>,
    ) -> Result<Self, SyncError> {
        let runtime = Handle::try_current().map_err(|_| SyncError::NoRuntime)?;
        let user_id = user_id.into();

        let store = LocalStateStore::new(storage.clone(), &user_id);
        let queue = PendingQueue::hydrate(storage, &user_id)?;
        let snapshot = store.get();
        let recovered = queue.len();

        let (shutdown, _) = watch::channel(false);
        let inner = Inner {
            backoff: Mutex::new(Backoff::new(config.backoff_base, config.backoff_max)),
            network: NetworkMonitor::new(config.start_online),
            lifecycle: LifecycleMonitor::new(true),
            debouncer: Debouncer::new(runtime.clone()),
            state: Mutex::new(LocalState {
                snapshot,
                queue,
                in_flight: None,
                last_pushed_at: None,
                revision: 0,
            }),
            user_id,
            config,
            api,
            store,
            hub: SubscriberHub::new(),
            pushing: AtomicBool::new(false),
            pulling: AtomicUsize::new(0),
            runtime,
            shutdown,
            tasks: Mutex::new(Vec::new()),
        };

        let engine = Self {
            inner: Arc::new(inner),
        };

        tracing::info!(
            "Sync engine ready for '{}' ({} pending job(s))",
            engine.inner.user_id,
            recovered
        );

        if recovered > 0 {
            engine.schedule_push(engine.inner.config.debounce);
        }
        engine.start_periodic_pull();

        Ok(engine)
    }

    pub fn user_id(&self) -> &str {
        &self.inner.user_id
    }

    /// The current local snapshot.
    pub fn snapshot(&self) -> UserStatsSnapshot {
        self.inner.state.lock().snapshot.clone()
    }

    /// Number of jobs waiting to be pushed.
    pub fn pending_jobs(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    pub fn is_online(&self) -> bool {
        self.inner.network.is_online()
    }

    pub fn phase(&self) -> SyncPhase {
        if self.inner.pushing.load(Ordering::SeqCst) {
            SyncPhase::Pushing
        } else if self.inner.pulling.load(Ordering::SeqCst) > 0 {
            SyncPhase::Pulling
        } else if self.inner.debouncer.is_pending() {
            SyncPhase::Debouncing
        } else {
            SyncPhase::Idle
        }
    }

    /// Applies `delta` locally and schedules it for upload.
    ///
    /// Never blocks on the network and never fails: storage errors are
    /// logged and the in-memory state still advances.
    pub fn apply_delta(&self, delta: &StatsDelta) -> UserStatsSnapshot {
        let (snapshot, revision, delay) = {
            let mut state = self.inner.state.lock();
            let now = Utc::now();
            let next = delta.apply_to(&state.snapshot, now);
            state.snapshot = next.clone();
            state.revision += 1;

            if let Err(e) = self.inner.store.set(&next) {
                tracing::error!("Failed to persist snapshot: {}", e);
            }

            let job = MutationJob::new(next.clone(), now);
            let coalesce = state
                .queue
                .peek_back()
                .is_some_and(|back| Some(back.id) != state.in_flight);
            let queued = if coalesce {
                state.queue.replace_back(job)
            } else {
                state.queue.enqueue(job)
            };
            if let Err(e) = queued {
                tracing::error!("Failed to persist pending queue: {}", e);
            }

            (next, state.revision, self.push_delay(&state))
        };

        self.inner.hub.notify(revision, &snapshot);
        self.schedule_push(delay);

        snapshot
    }

    /// Fetches the server snapshot and merges it by last-write-wins.
    ///
    /// Failures are logged and reported as [`PullOutcome::Failed`].
    pub async fn force_pull(&self) -> PullOutcome {
        let inner = &self.inner;
        let _pulling = ActiveCount::enter(&inner.pulling);

        let result = match timeout(inner.config.pull_timeout, inner.api.pull(&inner.user_id)).await
        {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        };

        match result {
            Ok(incoming) => match self.merge_snapshot(&incoming) {
                Some(snapshot) => PullOutcome::Applied(snapshot),
                None => PullOutcome::KeptLocal,
            },
            Err(e) => {
                tracing::warn!("Pull for '{}' failed: {}", inner.user_id, e);
                PullOutcome::Failed
            }
        }
    }

    /// Merges a snapshot pushed by the server. Returns true if it replaced
    /// local state.
    pub fn merge_remote(&self, incoming: &UserStatsSnapshot) -> bool {
        self.merge_snapshot(incoming).is_some()
    }

    fn merge_snapshot(&self, incoming: &UserStatsSnapshot) -> Option<UserStatsSnapshot> {
        let (merged, revision) = {
            let mut state = self.inner.state.lock();
            match merge::resolve(&state.snapshot, incoming) {
                Resolution::KeepLocal => {
                    tracing::debug!(
                        "Keeping local snapshot; remote {:?} is older than {:?}",
                        incoming.updated_at,
                        state.snapshot.updated_at
                    );
                    return None;
                }
                Resolution::TakeIncoming(snapshot) => {
                    state.snapshot = snapshot.clone();
                    state.revision += 1;
                    if let Err(e) = self.inner.store.set(&snapshot) {
                        tracing::error!("Failed to persist snapshot: {}", e);
                    }
                    (snapshot, state.revision)
                }
            }
        };

        self.inner.hub.notify(revision, &merged);
        Some(merged)
    }

    /// Drains the pending queue in order while the network is up.
    ///
    /// Only one drain runs at a time; a second call while one is active
    /// returns immediately with `already_running` set.
    pub async fn flush_queue(&self) -> FlushReport {
        let inner = &self.inner;
        let mut report = FlushReport::default();
        let mut first = true;

        loop {
            if inner
                .pushing
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                tracing::debug!("Push worker already running");
                report.already_running = first;
                break;
            }
            first = false;

            let end = {
                let _running = RunningFlag(&inner.pushing);
                self.drain(&mut report).await
            };

            // A job queued between the final empty check and the flag reset
            // would otherwise wait for the next trigger.
            match end {
                DrainEnd::Empty if !inner.state.lock().queue.is_empty() => continue,
                _ => break,
            }
        }

        report.remaining = inner.state.lock().queue.len();
        report
    }

    async fn drain(&self, report: &mut FlushReport) -> DrainEnd {
        let inner = &self.inner;
        let mut failures = 0u32;

        loop {
            if !inner.network.is_online() {
                tracing::debug!("Offline, pausing push worker");
                return DrainEnd::Offline;
            }

            let job = {
                let mut state = inner.state.lock();
                match state.queue.peek_front().cloned() {
                    Some(job) => {
                        state.in_flight = Some(job.id);
                        job
                    }
                    None => return DrainEnd::Empty,
                }
            };

            let result = match timeout(
                inner.config.push_timeout,
                inner.api.push(&inner.user_id, &job.snapshot),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout),
            };

            match result {
                Ok(()) => {
                    failures = 0;
                    self.complete(&job, true);
                    inner.backoff.lock().reset();
                    report.pushed += 1;
                    tracing::debug!("Pushed job {}", job.id);
                }
                Err(TransportError::Unauthenticated) => {
                    // Never reached the server; wait for a token.
                    let queued = {
                        let mut state = inner.state.lock();
                        state.in_flight = None;
                        state.queue.len()
                    };
                    tracing::warn!("No auth token, leaving {} job(s) queued", queued);
                    return DrainEnd::NoToken;
                }
                Err(e) if !e.is_retryable() => {
                    tracing::warn!("Dropping job {} after non-retryable error: {}", job.id, e);
                    self.complete(&job, false);
                    report.dropped += 1;
                }
                Err(e) => {
                    inner.state.lock().in_flight = None;
                    failures += 1;

                    if let Some(max) = inner.config.max_retries_per_flush {
                        if failures > max {
                            tracing::warn!(
                                "Push of job {} failed {} times; leaving it queued: {}",
                                job.id,
                                failures,
                                e
                            );
                            return DrainEnd::GaveUp;
                        }
                    }

                    let delay = inner.backoff.lock().next_delay();
                    tracing::warn!(
                        "Push of job {} failed: {}. Retrying in {:?}",
                        job.id,
                        e,
                        delay
                    );
                    report.retries += 1;
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Removes the job that was just sent from the head of the queue.
    fn complete(&self, job: &MutationJob, delivered: bool) {
        let mut state = self.inner.state.lock();
        state.in_flight = None;
        if delivered {
            state.last_pushed_at = Some(Instant::now());
        }

        if state.queue.peek_front().map(|front| front.id) != Some(job.id) {
            tracing::error!("Job {} is no longer at the head of the queue", job.id);
            return;
        }
        if let Err(e) = state.queue.pop_front() {
            tracing::error!("Failed to persist pending queue: {}", e);
        }
    }

    /// Registers `callback` for snapshot changes. It is called right away
    /// with the current snapshot.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&UserStatsSnapshot) + Send + Sync + 'static,
    {
        self.inner.hub.subscribe(
            || {
                let state = self.inner.state.lock();
                (state.revision, state.snapshot.clone())
            },
            callback,
        )
    }

    /// Feeds a reachability report. Coming back online flushes, then pulls.
    pub fn set_online(&self, online: bool) {
        if self.inner.network.observe(online) {
            tracing::info!("Network reachable again, catching up");
            self.spawn_catch_up(CatchUp::FlushThenPull);
        } else if !online {
            tracing::debug!("Network unreachable");
        }
    }

    /// Feeds an app lifecycle report. Returning to the foreground pulls,
    /// then flushes.
    pub fn set_foreground(&self, foreground: bool) {
        if self.inner.lifecycle.observe(foreground) {
            tracing::info!("App foregrounded, catching up");
            self.spawn_catch_up(CatchUp::PullThenFlush);
        }
    }

    /// Opens the realtime channel. Each (re)connect triggers a pull and a
    /// flush; server-pushed snapshots are merged by last-write-wins.
    pub fn connect_realtime(&self, credentials: RealtimeCredentials) {
        let inner = &self.inner;
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        let channel = RealtimeChannel::new(
            inner.config.realtime.clone(),
            credentials,
            events_tx,
            inner.shutdown.subscribe(),
        );
        let channel_task = inner.runtime.spawn(channel.run());

        let weak = Arc::downgrade(inner);
        let pump = inner.runtime.spawn(async move {
            while let Some(event) = events_rx.recv().await {
                let Some(engine) = upgrade(&weak) else {
                    break;
                };
                match event {
                    ChannelEvent::Connected => engine.spawn_catch_up(CatchUp::PullThenFlush),
                    ChannelEvent::Snapshot(snapshot) => {
                        engine.merge_remote(&snapshot);
                    }
                }
            }
        });

        inner.tasks.lock().extend([channel_task, pump]);
    }

    /// Stops timers, background tasks and the realtime channel, and drops
    /// all subscribers. Queued jobs stay in storage for the next session.
    pub fn destroy(&self) {
        let inner = &self.inner;
        let _ = inner.shutdown.send(true);
        inner.debouncer.cancel();
        for task in inner.tasks.lock().drain(..) {
            task.abort();
        }
        inner.hub.clear();
        tracing::info!("Sync engine for '{}' stopped", inner.user_id);
    }

    fn push_delay(&self, state: &LocalState) -> Duration {
        let config = &self.inner.config;
        match state.last_pushed_at.map(|at| at.elapsed()) {
            Some(elapsed) if elapsed < config.throttle => config.throttle - elapsed,
            _ => config.debounce,
        }
    }

    fn schedule_push(&self, delay: Duration) {
        let weak = Arc::downgrade(&self.inner);
        self.inner.debouncer.schedule(delay, async move {
            if let Some(engine) = upgrade(&weak) {
                engine.flush_queue().await;
            }
        });
    }

    fn spawn_catch_up(&self, order: CatchUp) {
        let weak = Arc::downgrade(&self.inner);
        self.inner.runtime.spawn(async move {
            let Some(engine) = upgrade(&weak) else {
                return;
            };
            match order {
                CatchUp::FlushThenPull => {
                    engine.flush_queue().await;
                    engine.force_pull().await;
                }
                CatchUp::PullThenFlush => {
                    engine.force_pull().await;
                    engine.flush_queue().await;
                }
            }
        });
    }

    fn start_periodic_pull(&self) {
        let Some(period) = self.inner.config.pull_interval else {
            return;
        };

        let weak = Arc::downgrade(&self.inner);
        let mut shutdown = self.inner.shutdown.subscribe();
        let task = self.inner.runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown.changed() => break,
                }
                let Some(engine) = upgrade(&weak) else {
                    break;
                };
                engine.force_pull().await;
                engine.flush_queue().await;
            }
        });

        self.inner.tasks.lock().push(task);
    }
}

fn upgrade(weak: &Weak<Inner>) -> Option<Engine> {
    weak.upgrade().map(|inner| Engine { inner })
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("user_id", &self.inner.user_id)
            .field("phase", &self.phase())
            .field("pending_jobs", &self.pending_jobs())
            .finish()
    }
}
