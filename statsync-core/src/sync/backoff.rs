use std::time::Duration;

/// Doubling retry delay with a fixed cap.
///
/// Produces `base, 2*base, 4*base, ...` until the cap, then the cap forever.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        let base = base.min(max);
        Self {
            base,
            max,
            current: base,
        }
    }

    /// Returns the delay to wait now and advances to the next one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    /// The delay [`next_delay`](Self::next_delay) would return.
    pub fn peek(&self) -> Duration {
        self.current
    }

    /// Goes back to the base delay.
    pub fn reset(&mut self) {
        self.current = self.base;
    }
}
