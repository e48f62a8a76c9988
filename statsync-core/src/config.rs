//! Tunables for the sync engine.

use std::time::Duration;

/// Timing and retry configuration for an [`Engine`](crate::Engine).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Delay before a push when no push happened recently.
    pub debounce: Duration,
    /// Minimum spacing between the last successful push and the next one.
    pub throttle: Duration,
    /// Timeout for a single push request.
    pub push_timeout: Duration,
    /// Timeout for a single pull request.
    pub pull_timeout: Duration,
    /// First retry delay after a retryable push failure.
    pub backoff_base: Duration,
    /// Upper bound for the retry delay.
    pub backoff_max: Duration,
    /// Consecutive retryable failures tolerated in one drain before the
    /// worker yields. `None` retries for as long as the network is up.
    pub max_retries_per_flush: Option<u32>,
    /// Interval of the background pull-then-flush cycle. `None` disables it.
    pub pull_interval: Option<Duration>,
    /// Initial reachability state.
    pub start_online: bool,
    pub realtime: RealtimeConfig,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self {
            debounce: Duration::from_millis(180),
            throttle: Duration::from_millis(600),
            push_timeout: Duration::from_secs(8),
            pull_timeout: Duration::from_secs(8),
            backoff_base: Duration::from_millis(400),
            backoff_max: Duration::from_millis(6000),
            max_retries_per_flush: Some(10),
            pull_interval: Some(Duration::from_secs(30)),
            start_online: true,
            realtime: RealtimeConfig::default(),
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    /// Sets both the push and the pull timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.push_timeout = timeout;
        self.pull_timeout = timeout;
        self
    }

    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_max = max;
        self
    }

    pub fn with_max_retries_per_flush(mut self, max: Option<u32>) -> Self {
        self.max_retries_per_flush = max;
        self
    }

    pub fn with_pull_interval(mut self, interval: Option<Duration>) -> Self {
        self.pull_interval = interval;
        self
    }

    pub fn with_start_online(mut self, online: bool) -> Self {
        self.start_online = online;
        self
    }

    pub fn with_realtime(mut self, realtime: RealtimeConfig) -> Self {
        self.realtime = realtime;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for the realtime channel.
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Interval between `presence:ping` events.
    pub heartbeat: Duration,
    /// First reconnect delay.
    pub reconnect_base: Duration,
    /// Upper bound for the reconnect delay.
    pub reconnect_max: Duration,
    /// Timeout for establishing the WebSocket.
    pub connect_timeout: Duration,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            heartbeat: Duration::from_secs(15),
            reconnect_base: Duration::from_secs(1),
            reconnect_max: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}
