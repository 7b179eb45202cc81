//! CMS liveness gate.
//!
//! Every outbound CMS call first waits on [`HealthGate::wait_until_healthy`].
//! A healthy result is cached for the configured timeout, so in steady state
//! the gate costs no network round trip.

use crate::error::{Result, StrapiError};
use crate::state::SessionState;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// How the gate decides health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HealthMode {
    /// Probe `HEAD {base}/_health`
    #[default]
    Live,
    /// Always healthy, no network traffic; for isolated testing
    SelfTest,
}

/// Health gate configuration.
#[derive(Debug, Clone)]
pub struct HealthConfig {
    pub mode: HealthMode,
    /// Lifetime of a healthy result, and the budget of one probe
    pub timeout: Duration,
    /// Delay between probe attempts that got no response
    pub probe_interval: Duration,
    /// Delay between health checks while waiting
    pub poll_interval: Duration,
    /// Give up waiting after this long; wait forever when `None`
    pub wait_limit: Option<Duration>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            mode: HealthMode::Live,
            timeout: Duration::from_secs(120),
            probe_interval: Duration::from_secs(3),
            poll_interval: Duration::from_secs(1),
            wait_limit: None,
        }
    }
}

impl HealthConfig {
    pub fn self_test() -> Self {
        Self {
            mode: HealthMode::SelfTest,
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = interval;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_wait_limit(mut self, limit: Duration) -> Self {
        self.wait_limit = Some(limit);
        self
    }
}

/// Cached liveness check for one CMS.
#[derive(Debug, Clone)]
pub struct HealthGate {
    client: Client,
    url: String,
    config: HealthConfig,
    state: Arc<SessionState>,
}

impl HealthGate {
    pub fn new(client: Client, base_url: &str, config: HealthConfig, state: Arc<SessionState>) -> Self {
        Self {
            client,
            url: format!("{}/_health", base_url.trim_end_matches('/')),
            config,
            state,
        }
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    /// Cached health, probing when the cache is stale or unhealthy.
    pub async fn check_health(&self) -> bool {
        if self.config.mode == HealthMode::SelfTest {
            return true;
        }

        let status = self.state.health();
        if !status.healthy {
            // tokens obtained before an outage are not trusted
            self.state.clear_admin_token();
        } else if status
            .last_check
            .is_some_and(|at| at.elapsed() < self.config.timeout)
        {
            return true;
        }

        self.probe_health().await
    }

    /// Probe the CMS until it answers or the timeout budget runs out.
    ///
    /// Any answer counts; the CMS is healthy when the status is below 300.
    pub async fn probe_health(&self) -> bool {
        let deadline = Instant::now() + self.config.timeout;
        debug!(url = %self.url, "Checking CMS health");

        loop {
            match self.client.head(&self.url).send().await {
                Ok(response) => {
                    let healthy = response.status().as_u16() < 300;
                    self.state.record_health(healthy, Instant::now());
                    if healthy {
                        info!("CMS is healthy");
                    } else {
                        warn!(status = response.status().as_u16(), "CMS is unhealthy");
                    }
                    return healthy;
                }
                Err(e) => {
                    warn!(url = %self.url, error = %e, "Health probe got no response");
                }
            }

            if Instant::now() + self.config.probe_interval > deadline {
                break;
            }
            tokio::time::sleep(self.config.probe_interval).await;
        }

        self.state.record_health(false, Instant::now());
        false
    }

    /// Suspend until the CMS is healthy.
    pub async fn wait_until_healthy(&self) -> Result<()> {
        let started = Instant::now();

        loop {
            if self.check_health().await {
                return Ok(());
            }
            if let Some(limit) = self.config.wait_limit
                && started.elapsed() >= limit
            {
                return Err(StrapiError::Unavailable(self.url.clone()));
            }
            debug!("Awaiting CMS health");
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}
