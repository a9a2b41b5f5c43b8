use std::time::Duration;

/// Capped exponential reconnect delay.
///
/// The N-th consecutive failure (counting from zero) waits
/// `min(floor * 2^N, max)`.
#[derive(Debug, Clone)]
pub struct Backoff {
    floor: Duration,
    max: Duration,
    current: Duration,
    failures: u32,
}

impl Backoff {
    pub fn new(floor: Duration, max: Duration) -> Self {
        let max = max.max(floor);
        Self {
            floor,
            max,
            current: floor,
            failures: 0,
        }
    }

    /// Delay to wait before the next attempt; doubles the following one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        self.failures = self.failures.saturating_add(1);
        delay
    }

    /// Back to the floor after a successful connect.
    pub fn reset(&mut self) {
        self.current = self.floor;
        self.failures = 0;
    }

    /// Consecutive failures since the last reset.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn floor(&self) -> Duration {
        self.floor
    }
}
