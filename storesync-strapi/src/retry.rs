//! Rate-limit retry contract.
//!
//! A 429 from the CMS is turned into a [`RetryDecision`]; the request loop
//! only reads the decision and never inspects error types.

use reqwest::header::HeaderMap;
use std::time::Duration;

/// Header carrying an explicit retry delay, in seconds.
pub const RETRY_AFTER_HEADER: &str = "x-retry-after";

/// Header carrying the epoch second at which the rate-limit window resets.
pub const RATE_LIMIT_RESET_HEADER: &str = "x-ratelimit-reset";

/// Outcome of classifying a response for retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    /// Whether the request should be issued again
    pub retryable: bool,
    /// How long to wait first
    pub delay_hint: Option<Duration>,
}

impl RetryDecision {
    /// Do not retry.
    pub const fn stop() -> Self {
        Self {
            retryable: false,
            delay_hint: None,
        }
    }

    /// Retry after `delay`.
    pub const fn after(delay: Duration) -> Self {
        Self {
            retryable: true,
            delay_hint: Some(delay),
        }
    }
}

/// Retry policy for rate-limited CMS calls.
#[derive(Debug, Clone)]
pub struct RateLimitPolicy {
    /// Maximum number of retries for one request
    pub max_attempts: u32,
    /// Delay used when the response names no delay at all
    pub fallback_delay: Duration,
    /// Added on top of the time left until the rate-limit reset
    pub reset_margin: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 100,
            fallback_delay: Duration::from_secs(400),
            reset_margin: Duration::from_secs(2),
        }
    }
}

impl RateLimitPolicy {
    /// Set the maximum number of retries.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set the delay used when no rate-limit header is present.
    pub fn with_fallback_delay(mut self, delay: Duration) -> Self {
        self.fallback_delay = delay;
        self
    }

    /// Classify a response.
    ///
    /// `attempt` is 1 for the first retry. `now_secs` is the current epoch
    /// second, passed in so the computation stays pure.
    pub fn decide(&self, status: u16, headers: &HeaderMap, attempt: u32, now_secs: i64) -> RetryDecision {
        if status != 429 || attempt > self.max_attempts {
            return RetryDecision::stop();
        }

        RetryDecision::after(self.delay_for(headers, attempt, now_secs))
    }

    /// Delay for a rate-limited response.
    ///
    /// An explicit retry-after value grows linearly with the attempt number.
    /// Otherwise the wait runs until the reset epoch plus the margin. A zero
    /// or unparsable header counts as absent.
    pub fn delay_for(&self, headers: &HeaderMap, attempt: u32, now_secs: i64) -> Duration {
        if let Some(retry_after) = header_number(headers, RETRY_AFTER_HEADER) {
            let seconds = retry_after.unsigned_abs().saturating_mul(attempt.max(1) as u64);
            return Duration::from_secs(seconds);
        }

        if let Some(reset) = header_number(headers, RATE_LIMIT_RESET_HEADER) {
            let until_reset = reset.saturating_sub(now_secs).unsigned_abs();
            return Duration::from_secs(until_reset) + self.reset_margin;
        }

        self.fallback_delay
    }
}

fn header_number(headers: &HeaderMap, name: &str) -> Option<i64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .map(|v| v.trunc() as i64)
        .filter(|v| *v != 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_reset_header_delay() {
        let policy = RateLimitPolicy::default();
        let now = 1_700_000_000;
        let h = headers(&[(RATE_LIMIT_RESET_HEADER, "1700000010")]);

        let decision = policy.decide(429, &h, 1, now);
        assert!(decision.retryable);
        assert_eq!(decision.delay_hint, Some(Duration::from_millis(12_000)));
    }

    #[test]
    fn test_reset_in_the_past_uses_distance() {
        let policy = RateLimitPolicy::default();
        let h = headers(&[(RATE_LIMIT_RESET_HEADER, "95")]);
        assert_eq!(policy.delay_for(&h, 1, 100), Duration::from_secs(7));
    }

    #[test]
    fn test_retry_after_scales_with_attempt() {
        let policy = RateLimitPolicy::default();
        let h = headers(&[
            (RETRY_AFTER_HEADER, "3"),
            (RATE_LIMIT_RESET_HEADER, "1700000010"),
        ]);

        assert_eq!(policy.delay_for(&h, 1, 0), Duration::from_secs(3));
        assert_eq!(policy.delay_for(&h, 4, 0), Duration::from_secs(12));
    }

    #[test]
    fn test_no_headers_falls_back() {
        let policy = RateLimitPolicy::default();
        assert_eq!(
            policy.delay_for(&HeaderMap::new(), 1, 0),
            Duration::from_millis(400_000)
        );

        let zero = headers(&[(RETRY_AFTER_HEADER, "0")]);
        assert_eq!(policy.delay_for(&zero, 1, 0), Duration::from_secs(400));
    }

    #[test]
    fn test_stop_conditions() {
        let policy = RateLimitPolicy::default().with_max_attempts(2);
        let h = HeaderMap::new();

        assert_eq!(policy.decide(500, &h, 1, 0), RetryDecision::stop());
        assert!(policy.decide(429, &h, 2, 0).retryable);
        assert_eq!(policy.decide(429, &h, 3, 0), RetryDecision::stop());
    }
}
