//! Retry policy for event delivery

use std::time::Duration;

use rand::Rng;

/// Exponential backoff with additive jitter.
///
/// The wait after failed attempt `n` (0-based) is
/// `initial_interval * backoff_coefficient^n` plus a random jitter in
/// `[0, max_jitter)`.
///
/// # Example
///
/// ```
/// use chargeside_session::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::exponential()
///     .with_max_attempts(3)
///     .with_initial_interval(Duration::from_secs(1))
///     .with_max_jitter(Duration::ZERO);
///
/// assert_eq!(policy.delay_for_retry(0), Duration::from_secs(1));
/// assert_eq!(policy.delay_for_retry(1), Duration::from_secs(2));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including initial)
    pub max_attempts: u32,

    /// Base delay before the first retry
    pub initial_interval: Duration,

    /// Backoff multiplier
    pub backoff_coefficient: f64,

    /// Upper bound of the random delay added to each backoff
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential()
    }
}

impl RetryPolicy {
    /// 3 attempts, 1s base, doubling, up to 0.5s jitter
    pub fn exponential() -> Self {
        Self {
            max_attempts: 3,
            initial_interval: Duration::from_secs(1),
            backoff_coefficient: 2.0,
            max_jitter: Duration::from_millis(500),
        }
    }

    /// Create a policy that never retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_interval: Duration::ZERO,
            backoff_coefficient: 1.0,
            max_jitter: Duration::ZERO,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    pub fn with_backoff_coefficient(mut self, coefficient: f64) -> Self {
        self.backoff_coefficient = coefficient;
        self
    }

    pub fn with_max_jitter(mut self, jitter: Duration) -> Self {
        self.max_jitter = jitter;
        self
    }

    /// Delay to wait after failed attempt `attempt` (0-based)
    pub fn delay_for_retry(&self, attempt: u32) -> Duration {
        let base = self.initial_interval.as_secs_f64() * self.backoff_coefficient.powi(attempt as i32);

        let jitter = if self.max_jitter.is_zero() {
            0.0
        } else {
            rand::thread_rng().gen_range(0.0..self.max_jitter.as_secs_f64())
        };

        Duration::from_secs_f64((base + jitter).max(0.0))
    }

    /// Whether another attempt is allowed after `attempts_made`
    pub fn has_attempts_remaining(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }
}
