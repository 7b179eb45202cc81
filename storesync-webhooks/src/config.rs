//! Configuration for the webhook dispatcher

use crate::RetryPolicy;
use std::time::Duration;
use storesync_config::WebhookSettings;

/// Configuration for the webhook dispatcher
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Timeout for a single webhook call
    pub timeout: Duration,

    /// User-Agent header for outgoing requests
    pub user_agent: String,

    /// Delivery retry policy
    pub retry_policy: RetryPolicy,

    /// Concurrency cap per stage; `None` runs each stage as one batch
    pub batch_size: Option<usize>,

    /// Event names the dispatcher is subscribed to
    pub events: Vec<String>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: format!("storesync-webhooks/{}", env!("CARGO_PKG_VERSION")),
            retry_policy: RetryPolicy::default(),
            batch_size: None,
            events: Vec::new(),
        }
    }
}

impl DispatcherConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder for custom configuration
    pub fn builder() -> DispatcherConfigBuilder {
        DispatcherConfigBuilder::new()
    }

    /// Build from loaded settings
    pub fn from_settings(settings: &WebhookSettings) -> Self {
        let defaults = Self::default();
        Self {
            retry_policy: RetryPolicy {
                max_retries: settings.max_retry_count,
                max_retry_time: Duration::from_millis(settings.max_retry_time_ms),
                ..defaults.retry_policy
            },
            events: settings.events.clone(),
            ..defaults
        }
    }

    /// Whether `event` is one the dispatcher listens to
    pub fn subscribes_to(&self, event: &str) -> bool {
        self.events.iter().any(|e| e == event)
    }
}

/// Builder for DispatcherConfig
#[derive(Debug, Clone, Default)]
pub struct DispatcherConfigBuilder {
    config: DispatcherConfig,
}

impl DispatcherConfigBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self {
            config: DispatcherConfig::default(),
        }
    }

    /// Set the request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the User-Agent header
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Set the retry policy
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.retry_policy = policy;
        self
    }

    /// Disable retries
    pub fn no_retries(mut self) -> Self {
        self.config.retry_policy = RetryPolicy::none();
        self
    }

    /// Cap concurrency per stage
    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = Some(size);
        self
    }

    /// Set the subscribed event names
    pub fn events<I, S>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.events = events.into_iter().map(Into::into).collect();
        self
    }

    /// Build the configuration
    pub fn build(self) -> DispatcherConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DispatcherConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.retry_policy.max_retries, 10);
        assert!(config.batch_size.is_none());
    }

    #[test]
    fn test_builder() {
        let config = DispatcherConfig::builder()
            .timeout(Duration::from_secs(5))
            .no_retries()
            .batch_size(4)
            .events(["order.placed"])
            .build();

        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.retry_policy.max_retries, 0);
        assert_eq!(config.batch_size, Some(4));
        assert!(config.subscribes_to("order.placed"));
        assert!(!config.subscribes_to("order.updated"));
    }

    #[test]
    fn test_from_settings() {
        let settings = WebhookSettings {
            max_retry_count: 3,
            max_retry_time_ms: 1_000,
            events: vec!["product.created".to_string()],
        };
        let config = DispatcherConfig::from_settings(&settings);

        assert_eq!(config.retry_policy.max_retries, 3);
        assert_eq!(config.retry_policy.max_retry_time, Duration::from_secs(1));
        assert!(config.retry_policy.randomize);
        assert!(config.subscribes_to("product.created"));
    }
}
