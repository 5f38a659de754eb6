use std::time::Duration;

use chrono::{DateTime, Utc};

/// Default delay applied after the first throttled scan.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(60);

/// Default ceiling for the throttling delay.
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(600);

/// Exponential delay schedule: `base * 2^(n-1)` for the n-th consecutive failure, capped at
/// `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay after the first failure
    pub base: Duration,
    /// Upper bound for any delay
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_MAX)
    }
}

impl BackoffPolicy {
    /// Create a new policy. A `max` below `base` is raised to `base`.
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max: max.max(base) }
    }

    /// Delay to apply after `failures` consecutive failures.
    pub fn delay_for(&self, failures: u32) -> Duration {
        if failures <= 1 {
            return self.base;
        }
        let factor = 1u32.checked_shl(failures - 1).unwrap_or(u32::MAX);
        self.base.checked_mul(factor).map_or(self.max, |delay| delay.min(self.max))
    }
}

/// Process-local throttling state of a scan loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffState {
    policy: BackoffPolicy,
    retry_count: u32,
    last_retry_at: Option<DateTime<Utc>>,
    current_delay: Duration,
}

impl BackoffState {
    /// Fresh state with no recorded failures.
    pub const fn new(policy: BackoffPolicy) -> Self {
        Self { policy, retry_count: 0, last_retry_at: None, current_delay: policy.base }
    }

    /// Number of consecutive throttled cycles.
    pub const fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// When the last throttled cycle was recorded.
    pub const fn last_retry_at(&self) -> Option<DateTime<Utc>> {
        self.last_retry_at
    }

    /// Delay of the current backoff window.
    pub const fn current_delay(&self) -> Duration {
        self.current_delay
    }

    /// Record a throttled cycle at `now` and return the new delay.
    pub fn record_throttle(&mut self, now: DateTime<Utc>) -> Duration {
        self.retry_count = self.retry_count.saturating_add(1);
        self.current_delay = self.policy.delay_for(self.retry_count);
        self.last_retry_at = Some(now);
        self.current_delay
    }

    /// Forget all recorded failures.
    pub fn reset(&mut self) {
        self.retry_count = 0;
        self.last_retry_at = None;
        self.current_delay = self.policy.base;
    }

    /// Time left in the current backoff window, if any.
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        let last = self.last_retry_at?;
        let elapsed = (now - last).to_std().unwrap_or_default();
        self.current_delay.checked_sub(elapsed).filter(|left| !left.is_zero())
    }

    /// Whether scanning should be suppressed at `now`.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.remaining(now).is_some()
    }
}
