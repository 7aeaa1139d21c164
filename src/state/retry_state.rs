use std::time::Duration;

/// Retry bookkeeping for one fetch call
///
/// Created fresh for every URL; never shared between URLs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryState {
    attempt: u32,
    total_backoff: Duration,
    delays: Vec<Duration>,
}

impl RetryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of attempts made so far
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    /// Records one fetch attempt
    pub fn record_attempt(&mut self) {
        self.attempt += 1;
    }

    /// Records a backoff sleep taken before the next attempt
    pub fn record_backoff(&mut self, delay: Duration) {
        self.total_backoff += delay;
        self.delays.push(delay);
    }

    pub fn is_exhausted(&self, max_attempts: u32) -> bool {
        self.attempt >= max_attempts
    }

    pub fn total_backoff(&self) -> Duration {
        self.total_backoff
    }

    /// Backoff delays in the order they were applied
    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }
}
