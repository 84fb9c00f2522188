// Reconnection policy with exponential backoff
// Audio input retries once per device-change notification; callers may ask for more.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ReconnectionStrategy {
    max_attempts: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    current_attempt: u32,
}

impl ReconnectionStrategy {
    pub fn new(max_attempts: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
            max_delay_ms,
            current_attempt: 0,
        }
    }

    /// A single attempt after a short settle delay
    ///
    /// Freshly plugged devices often refuse to open for a few hundred
    /// milliseconds after the host reports them.
    pub fn once() -> Self {
        Self::new(1, 300, 300)
    }

    /// Delay before the next attempt (exponential backoff), `None` when exhausted
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.current_attempt >= self.max_attempts {
            return None;
        }

        // base * 2^attempt
        let delay_ms = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(self.current_attempt));
        let delay_ms = delay_ms.min(self.max_delay_ms);

        self.current_attempt += 1;

        Some(Duration::from_millis(delay_ms))
    }

    /// Reset the attempt counter (after success or a new device notification)
    pub fn reset(&mut self) {
        self.current_attempt = 0;
    }

    pub fn should_retry(&self) -> bool {
        self.current_attempt < self.max_attempts
    }

    pub fn current_attempt(&self) -> u32 {
        self.current_attempt
    }
}

impl Default for ReconnectionStrategy {
    fn default() -> Self {
        Self::new(10, 1000, 30000)
    }
}
