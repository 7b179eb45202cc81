//! Low-level request execution against the CMS.
//!
//! [`CmsHttp`] sends one logical request and transparently waits out rate
//! limiting. It never interprets other statuses; that is the caller's job.

use crate::error::{Result, StrapiError};
use crate::retry::RateLimitPolicy;
use crate::state::SessionState;
use reqwest::{Client, Method};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A request to send.
#[derive(Debug, Clone)]
pub struct CmsRequest {
    pub method: Method,
    pub url: String,
    pub bearer: Option<String>,
    pub body: Option<Value>,
    pub timeout: Option<Duration>,
}

impl CmsRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            bearer: None,
            body: None,
            timeout: None,
        }
    }

    /// Attach `Authorization: Bearer {token}`.
    pub fn bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    /// Attach a JSON body.
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Override the client timeout for this request.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A response with its body decoded.
#[derive(Debug, Clone)]
pub struct CmsResponse {
    pub status: u16,
    /// Parsed JSON body; `Null` when empty, a string when not JSON
    pub body: Value,
}

impl CmsResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Request executor shared by the session manager, transport and admin API.
#[derive(Debug, Clone)]
pub struct CmsHttp {
    client: Client,
    policy: RateLimitPolicy,
    state: Arc<SessionState>,
}

impl CmsHttp {
    /// Build an executor with a fresh client.
    pub fn new(timeout: Duration, policy: RateLimitPolicy, state: Arc<SessionState>) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, policy, state))
    }

    /// Build an executor over an existing client.
    pub fn with_client(client: Client, policy: RateLimitPolicy, state: Arc<SessionState>) -> Self {
        Self {
            client,
            policy,
            state,
        }
    }

    /// The underlying client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Send `request`, retrying while the CMS answers 429.
    ///
    /// Each rate-limit delay also becomes the session retry window.
    pub async fn execute(&self, request: &CmsRequest) -> Result<CmsResponse> {
        let mut attempt = 0;

        loop {
            let response = self.send_once(request).await?;
            let status = response.status().as_u16();

            if status == 429 {
                attempt += 1;
                let now = chrono::Utc::now().timestamp();
                let decision = self.policy.decide(status, response.headers(), attempt, now);

                let Some(delay) = decision.delay_hint.filter(|_| decision.retryable) else {
                    return Err(StrapiError::RateLimited {
                        attempts: attempt,
                        url: request.url.clone(),
                    });
                };

                warn!(
                    method = %request.method,
                    url = %request.url,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "CMS rate limit hit, backing off"
                );
                self.state.set_retry_window(delay);
                tokio::time::sleep(delay).await;
                continue;
            }

            let body = decode_body(&response.text().await?);
            debug!(method = %request.method, url = %request.url, status, "CMS responded");
            return Ok(CmsResponse { status, body });
        }
    }

    async fn send_once(&self, request: &CmsRequest) -> Result<reqwest::Response> {
        let mut builder = self.client.request(request.method.clone(), &request.url);
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        Ok(builder.send().await?)
    }
}

fn decode_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}
