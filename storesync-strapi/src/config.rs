//! Engine configuration.

use crate::health::{HealthConfig, HealthMode};
use crate::retry::RateLimitPolicy;
use crate::session::Credentials;
use std::time::Duration;
use storesync_config::{AdminCredentials, StrapiSettings, UserCredentials};

/// Configuration for the CMS sync engine.
#[derive(Debug, Clone)]
pub struct StrapiConfig {
    /// `{protocol}://{host}[:{port}]`, no trailing slash
    pub base_url: String,

    /// Service account used for content API calls
    pub default_user: UserCredentials,

    /// Super-admin account
    pub admin: AdminCredentials,

    /// Shared secret for inbound signed signals
    pub signal_secret: Option<String>,

    /// Lifetime of echo-suppression markers
    pub ignore_threshold: Duration,

    /// Health gate behaviour
    pub health: HealthConfig,

    /// Initial token reuse window, replaced by rate-limit delays
    pub retry_window: Duration,

    /// Rate-limit retry policy
    pub rate_limit: RateLimitPolicy,

    /// Per-request timeout
    pub request_timeout: Duration,

    /// Timeout for the long-running plugin calls (user creation, full sync)
    pub plugin_timeout: Duration,

    /// Trigger a full CMS sync after bootstrap
    pub sync_on_init: bool,

    /// Run bootstrap on startup once the CMS is healthy
    pub auto_start: bool,

    /// Page size for seed exports
    pub max_page_size: u64,

    /// How long content calls wait for the service account to be
    /// registered; `None` sends without waiting
    pub service_account_wait: Option<Duration>,
}

impl Default for StrapiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://localhost".to_string(),
            default_user: UserCredentials {
                confirmed: true,
                ..UserCredentials::default()
            },
            admin: AdminCredentials::default(),
            signal_secret: None,
            ignore_threshold: Duration::from_secs(3),
            health: HealthConfig::default(),
            retry_window: Duration::from_secs(180),
            rate_limit: RateLimitPolicy::default(),
            request_timeout: Duration::from_secs(30),
            plugin_timeout: Duration::from_secs(3600),
            sync_on_init: false,
            auto_start: false,
            max_page_size: 50,
            service_account_wait: None,
        }
    }
}

impl StrapiConfig {
    /// Create a new configuration builder.
    pub fn builder() -> StrapiConfigBuilder {
        StrapiConfigBuilder::default()
    }

    /// Build from loaded settings.
    pub fn from_settings(settings: &StrapiSettings) -> Self {
        let timeout = Duration::from_millis(settings.healthcheck_timeout_ms);
        Self {
            base_url: settings.base_url(),
            default_user: settings.default_user.clone(),
            admin: settings.admin.clone(),
            signal_secret: settings.secret.clone(),
            ignore_threshold: Duration::from_secs(settings.ignore_threshold_secs),
            health: HealthConfig {
                timeout,
                mode: if settings.self_test {
                    HealthMode::SelfTest
                } else {
                    HealthMode::Live
                },
                ..HealthConfig::default()
            },
            sync_on_init: settings.sync_on_init,
            auto_start: settings.auto_start,
            max_page_size: settings.max_page_size,
            service_account_wait: Some(timeout),
            ..Self::default()
        }
    }

    /// Credentials of the default service account.
    pub fn default_credentials(&self) -> Credentials {
        Credentials::from(&self.default_user)
    }
}

/// Builder for [`StrapiConfig`].
#[derive(Debug, Default)]
pub struct StrapiConfigBuilder {
    config: StrapiConfig,
}

impl StrapiConfigBuilder {
    /// Set the CMS base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the service account.
    pub fn default_user(mut self, email: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.default_user.email = email.into();
        self.config.default_user.password = password.into();
        self
    }

    /// Set the super-admin account.
    pub fn admin(mut self, email: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.admin.email = email.into();
        self.config.admin.password = password.into();
        self
    }

    /// Set the signal secret.
    pub fn signal_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.signal_secret = Some(secret.into());
        self
    }

    /// Set the ignore-marker lifetime.
    pub fn ignore_threshold(mut self, ttl: Duration) -> Self {
        self.config.ignore_threshold = ttl;
        self
    }

    /// Set the health gate configuration.
    pub fn health(mut self, health: HealthConfig) -> Self {
        self.config.health = health;
        self
    }

    /// Skip liveness probes.
    pub fn self_test(mut self) -> Self {
        self.config.health.mode = HealthMode::SelfTest;
        self
    }

    /// Set the initial token reuse window.
    pub fn retry_window(mut self, window: Duration) -> Self {
        self.config.retry_window = window;
        self
    }

    /// Set the rate-limit policy.
    pub fn rate_limit(mut self, policy: RateLimitPolicy) -> Self {
        self.config.rate_limit = policy;
        self
    }

    /// Set the per-request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Trigger a full sync after bootstrap.
    pub fn sync_on_init(mut self, enabled: bool) -> Self {
        self.config.sync_on_init = enabled;
        self
    }

    /// Bootstrap on startup.
    pub fn auto_start(mut self, enabled: bool) -> Self {
        self.config.auto_start = enabled;
        self
    }

    /// Set the seed export page size.
    pub fn max_page_size(mut self, size: u64) -> Self {
        self.config.max_page_size = size;
        self
    }

    /// Hold content calls until bootstrap has registered the service
    /// account, failing them after `limit`.
    pub fn await_service_account(mut self, limit: Duration) -> Self {
        self.config.service_account_wait = Some(limit);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> StrapiConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = StrapiConfig::builder()
            .base_url("http://cms:1337/")
            .default_user("svc@example.com", "pw")
            .admin("admin@example.com", "admin-pw")
            .ignore_threshold(Duration::from_secs(5))
            .self_test()
            .build();

        assert_eq!(config.base_url, "http://cms:1337");
        assert_eq!(config.default_credentials().email, "svc@example.com");
        assert_eq!(config.admin.email, "admin@example.com");
        assert_eq!(config.ignore_threshold, Duration::from_secs(5));
        assert_eq!(config.health.mode, HealthMode::SelfTest);
        assert_eq!(config.retry_window, Duration::from_secs(180));
        assert!(config.service_account_wait.is_none());
    }

    #[test]
    fn test_from_settings() {
        let settings = StrapiSettings {
            protocol: "http".to_string(),
            host: "cms".to_string(),
            healthcheck_timeout_ms: 5_000,
            self_test: true,
            max_page_size: 10,
            ..StrapiSettings::default()
        };

        let config = StrapiConfig::from_settings(&settings);
        assert_eq!(config.base_url, "http://cms:1337");
        assert_eq!(config.health.timeout, Duration::from_secs(5));
        assert_eq!(config.health.mode, HealthMode::SelfTest);
        assert_eq!(config.max_page_size, 10);
        assert_eq!(config.ignore_threshold, Duration::from_secs(3));
        assert_eq!(config.service_account_wait, Some(Duration::from_secs(5)));
    }
}
