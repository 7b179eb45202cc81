//! Retry policy for webhook delivery

use std::time::Duration;

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,

    /// Delay before the first retry
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,

    /// Scale each delay by a random factor in `[1, 2)`
    pub randomize: bool,

    /// No retry starts once this much time has passed since the first attempt
    pub max_retry_time: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 10,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30 * 60),
            backoff_multiplier: 2.0,
            randomize: true,
            max_retry_time: Duration::from_secs(60 * 60),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with no retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Create a policy with a fixed number of retries
    pub fn fixed(retries: u32, delay: Duration) -> Self {
        Self {
            max_retries: retries,
            initial_delay: delay,
            max_delay: delay,
            backoff_multiplier: 1.0,
            randomize: false,
            ..Default::default()
        }
    }

    /// Create a policy with randomized exponential backoff
    pub fn exponential(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    pub fn with_max_retry_time(mut self, ceiling: Duration) -> Self {
        self.max_retry_time = ceiling;
        self
    }

    /// Calculate the delay before retry number `retry` (1-based)
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }

        let base_delay =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi((retry - 1) as i32);

        let delay_secs = if self.randomize {
            base_delay * (1.0 + rand_jitter())
        } else {
            base_delay
        };

        Duration::from_secs_f64(delay_secs.min(self.max_delay.as_secs_f64()))
    }

    /// Whether retry number `retry` may start after `elapsed` since the first attempt
    pub fn should_retry(&self, retry: u32, elapsed: Duration) -> bool {
        retry <= self.max_retries && elapsed < self.max_retry_time
    }
}

/// Jitter in `[0, 1)`
fn rand_jitter() -> f64 {
    rand::random::<f64>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 10);
        assert_eq!(policy.max_retry_time, Duration::from_secs(3600));
        assert!(policy.randomize);
    }

    #[test]
    fn test_no_retries() {
        let policy = RetryPolicy::none();
        assert!(!policy.should_retry(1, Duration::ZERO));
    }

    #[test]
    fn test_fixed_policy() {
        let policy = RetryPolicy::fixed(5, Duration::from_secs(10));
        assert_eq!(policy.delay_for_retry(1), policy.delay_for_retry(4));
    }

    #[test]
    fn test_exponential_backoff() {
        let policy = RetryPolicy {
            randomize: false,
            ..RetryPolicy::default()
        };

        assert_eq!(policy.delay_for_retry(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for_retry(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for_retry(3), Duration::from_secs(4));
    }

    #[test]
    fn test_randomized_delay_bounds() {
        let policy = RetryPolicy::default();
        for retry in 1..=4 {
            let base = Duration::from_secs(1 << (retry - 1));
            let delay = policy.delay_for_retry(retry);
            assert!(delay >= base);
            assert!(delay < base * 2);
        }
    }

    #[test]
    fn test_jitter_spreads_back_to_back_delays() {
        let policy = RetryPolicy::default();
        let delays: std::collections::HashSet<Duration> =
            (0..64).map(|_| policy.delay_for_retry(1)).collect();
        assert!(delays.len() > 1);
        assert!((0..256).map(|_| rand_jitter()).all(|j| (0.0..1.0).contains(&j)));
    }

    #[test]
    fn test_max_delay_cap() {
        let policy = RetryPolicy {
            max_delay: Duration::from_secs(30),
            ..RetryPolicy::exponential(20)
        };
        assert!(policy.delay_for_retry(15) <= Duration::from_secs(30));
    }

    #[test]
    fn test_retry_ceiling() {
        let policy = RetryPolicy::exponential(3).with_max_retry_time(Duration::from_secs(10));

        assert!(policy.should_retry(1, Duration::ZERO));
        assert!(policy.should_retry(3, Duration::from_secs(9)));
        assert!(!policy.should_retry(4, Duration::ZERO));
        assert!(!policy.should_retry(1, Duration::from_secs(10)));
    }
}
