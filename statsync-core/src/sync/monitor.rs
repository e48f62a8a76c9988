//! Reachability and app-lifecycle observers.
//!
//! Both monitors only remember the previous state and report the one
//! transition that matters to them. The engine decides what to run.

use std::sync::atomic::{AtomicBool, Ordering};

/// Tracks the online/offline flag.
#[derive(Debug)]
pub struct NetworkMonitor {
    online: AtomicBool,
}

impl NetworkMonitor {
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Records the latest reachability report. Returns true exactly when
    /// this report moves the connection from offline to online.
    pub fn observe(&self, online: bool) -> bool {
        let was_online = self.online.swap(online, Ordering::SeqCst);
        !was_online && online
    }
}

/// Tracks whether the app is in the foreground.
#[derive(Debug)]
pub struct LifecycleMonitor {
    foreground: AtomicBool,
}

impl LifecycleMonitor {
    pub fn new(foreground: bool) -> Self {
        Self {
            foreground: AtomicBool::new(foreground),
        }
    }

    /// Records the latest lifecycle report. Returns true exactly when this
    /// report brings the app from the background to the foreground.
    pub fn observe(&self, foreground: bool) -> bool {
        let was_foreground = self.foreground.swap(foreground, Ordering::SeqCst);
        !was_foreground && foreground
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_reports_only_reconnect() {
        let monitor = NetworkMonitor::new(true);
        assert!(!monitor.observe(true));
        assert!(!monitor.observe(false));
        assert!(!monitor.is_online());
        assert!(!monitor.observe(false));
        assert!(monitor.observe(true));
        assert!(monitor.is_online());
        assert!(!monitor.observe(true));
    }

    #[test]
    fn test_network_starting_offline() {
        let monitor = NetworkMonitor::new(false);
        assert!(monitor.observe(true));
    }

    #[test]
    fn test_lifecycle_reports_only_foregrounding() {
        let monitor = LifecycleMonitor::new(true);
        assert!(!monitor.observe(true));
        assert!(!monitor.observe(false));
        assert!(!monitor.observe(false));
        assert!(monitor.observe(true));
        assert!(!monitor.observe(true));
    }
}
