//! Backoff schedule for failed deliveries.

use std::time::Duration;

/// Default schedule in seconds: roughly doubling, capped at five minutes.
pub const RETRY_SCHEDULE_SECS: [u64; 7] = [5, 10, 20, 40, 60, 120, 300];

/// Maps an attempt count to the delay before the next drain.
///
/// Pure: the same attempt count always yields the same delay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    schedule: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            schedule: RETRY_SCHEDULE_SECS
                .iter()
                .map(|secs| Duration::from_secs(*secs))
                .collect(),
        }
    }
}

impl RetryPolicy {
    /// Use a custom schedule. An empty schedule falls back to the default.
    pub fn with_schedule(schedule: Vec<Duration>) -> Self {
        if schedule.is_empty() {
            return Self::default();
        }
        Self { schedule }
    }

    /// Delay for an event that has failed `attempt_count` times.
    ///
    /// Index is `min(attempt_count - 1, len - 1)`; a count of zero is treated
    /// as one.
    pub fn delay_for(&self, attempt_count: u32) -> Duration {
        let index = (attempt_count.saturating_sub(1) as usize).min(self.schedule.len() - 1);
        self.schedule[index]
    }

    /// The longest delay the policy will ever return.
    pub fn max_delay(&self) -> Duration {
        self.schedule[self.schedule.len() - 1]
    }
}
