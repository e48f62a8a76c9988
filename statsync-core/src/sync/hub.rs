//! Fan-out of snapshot changes to registered callbacks.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex};

use crate::models::UserStatsSnapshot;

type Callback = Arc<dyn Fn(&UserStatsSnapshot) + Send + Sync>;

struct Subscriber {
    callback: Callback,
    /// Highest revision this subscriber has been handed.
    seen: Mutex<Option<u64>>,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    subscribers: Vec<(u64, Arc<Subscriber>)>,
}

/// Registry of snapshot subscribers.
///
/// Every change carries a revision number. A subscriber only ever sees
/// revisions in increasing order; a change that arrives after a newer one
/// was delivered is skipped for that subscriber.
///
/// Callbacks run on the thread that produced the change and must not block.
/// They may call back into the engine.
#[derive(Default)]
pub struct SubscriberHub {
    registry: Arc<Mutex<Registry>>,
    // Reentrant so a callback can commit a change and be notified of it.
    delivery: ReentrantMutex<()>,
}

impl SubscriberHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` and immediately invokes it with the snapshot
    /// returned by `current`.
    ///
    /// `current` runs after registration, so a change committed after it
    /// reads its revision still reaches the new subscriber.
    pub fn subscribe<C, F>(&self, current: C, callback: F) -> Subscription
    where
        C: FnOnce() -> (u64, UserStatsSnapshot),
        F: Fn(&UserStatsSnapshot) + Send + Sync + 'static,
    {
        let subscriber = Arc::new(Subscriber {
            callback: Arc::new(callback),
            seen: Mutex::new(None),
        });
        let id = {
            let mut registry = self.registry.lock();
            let id = registry.next_id;
            registry.next_id += 1;
            registry.subscribers.push((id, subscriber.clone()));
            id
        };

        let (revision, snapshot) = current();
        let _delivery = self.delivery.lock();
        deliver(id, &subscriber, revision, &snapshot);

        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Delivers `snapshot`, committed as `revision`, to every subscriber.
    ///
    /// A panicking callback is logged and skipped; the rest still run.
    pub fn notify(&self, revision: u64, snapshot: &UserStatsSnapshot) {
        let _delivery = self.delivery.lock();
        // Callbacks run outside the registry lock so they may subscribe or
        // unsubscribe.
        let subscribers: Vec<(u64, Arc<Subscriber>)> =
            self.registry.lock().subscribers.clone();
        for (id, subscriber) in &subscribers {
            deliver(*id, subscriber, revision, snapshot);
        }
    }

    /// Number of registered subscribers.
    pub fn len(&self) -> usize {
        self.registry.lock().subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every subscriber.
    pub fn clear(&self) {
        self.registry.lock().subscribers.clear();
    }
}

fn deliver(id: u64, subscriber: &Subscriber, revision: u64, snapshot: &UserStatsSnapshot) {
    {
        let mut seen = subscriber.seen.lock();
        if matches!(*seen, Some(last) if revision <= last) {
            return;
        }
        *seen = Some(revision);
    }

    let callback = &subscriber.callback;
    if catch_unwind(AssertUnwindSafe(|| callback(snapshot))).is_err() {
        tracing::error!("Subscriber {} panicked while handling a snapshot", id);
    }
}

/// Handle returned by [`SubscriberHub::subscribe`].
///
/// Dropping the handle keeps the subscription alive; call
/// [`Subscription::unsubscribe`] to remove it.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Removes the callback. A no-op if the hub is already gone.
    pub fn unsubscribe(self) {
        if let Some(registry) = self.registry.upgrade() {
            registry
                .lock()
                .subscribers
                .retain(|(id, _)| *id != self.id);
        }
    }
}

impl std::fmt::Debug for SubscriberHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberHub")
            .field("subscribers", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn snapshot(xp: u64) -> UserStatsSnapshot {
        UserStatsSnapshot {
            xp,
            ..Default::default()
        }
    }

    #[test]
    fn test_subscribe_replays_current() {
        let hub = SubscriberHub::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        let _sub = hub.subscribe(|| (0, snapshot(12)), move |s| sink.lock().push(s.xp));

        assert_eq!(*seen.lock(), vec![12]);
    }

    #[test]
    fn test_notify_reaches_all_subscribers() {
        let hub = SubscriberHub::new();
        let total = Arc::new(AtomicU64::new(0));

        for _ in 0..3 {
            let total = total.clone();
            let _ = hub.subscribe(|| (0, snapshot(0)), move |s| {
                total.fetch_add(s.xp, Ordering::SeqCst);
            });
        }

        hub.notify(1, &snapshot(5));
        assert_eq!(total.load(Ordering::SeqCst), 15);
    }

    #[test]
    fn test_panicking_subscriber_does_not_block_others() {
        let hub = SubscriberHub::new();
        let delivered = Arc::new(AtomicU64::new(0));

        let _bad = hub.subscribe(|| (0, snapshot(0)), |s| {
            if s.xp > 0 {
                panic!("subscriber failure");
            }
        });
        let counter = delivered.clone();
        let _good = hub.subscribe(|| (0, snapshot(0)), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        hub.notify(1, &snapshot(1));
        hub.notify(2, &snapshot(2));

        // One replay plus two notifications.
        assert_eq!(delivered.load(Ordering::SeqCst), 3);
        assert_eq!(hub.len(), 2);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let hub = SubscriberHub::new();
        let count = Arc::new(AtomicU64::new(0));

        let counter = count.clone();
        let sub = hub.subscribe(|| (0, snapshot(0)), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        sub.unsubscribe();
        hub.notify(1, &snapshot(1));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(hub.is_empty());
    }

    #[test]
    fn test_unsubscribe_after_hub_dropped() {
        let hub = SubscriberHub::new();
        let sub = hub.subscribe(|| (0, snapshot(0)), |_| {});
        drop(hub);
        sub.unsubscribe();
    }

    #[test]
    fn test_stale_revision_is_skipped() {
        let hub = SubscriberHub::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        let _sub = hub.subscribe(|| (3, snapshot(3)), move |s| sink.lock().push(s.xp));
        hub.notify(2, &snapshot(2));
        hub.notify(5, &snapshot(5));
        hub.notify(4, &snapshot(4));
        hub.notify(5, &snapshot(5));

        assert_eq!(*seen.lock(), vec![3, 5]);
    }

    #[test]
    fn test_callback_may_notify_reentrantly() {
        let hub = Arc::new(SubscriberHub::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        let _first = hub.subscribe(|| (0, snapshot(0)), move |s| sink.lock().push(s.xp));
        let inner = Arc::downgrade(&hub);
        let _second = hub.subscribe(|| (0, snapshot(0)), move |s| {
            if s.xp == 1 {
                if let Some(hub) = inner.upgrade() {
                    hub.notify(2, &snapshot(2));
                }
            }
        });

        hub.notify(1, &snapshot(1));

        assert_eq!(*seen.lock(), vec![0, 1, 2]);
    }
}
