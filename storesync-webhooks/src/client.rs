//! Webhook delivery over HTTP

use crate::model::{Delivery, EventWebhook};
use crate::record::DeliveryRecord;
use crate::{DispatcherConfig, Result, RetryPolicy, WebhookError};
use chrono::Utc;
use handlebars::Handlebars;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use serde_json::Value;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use url::Url;

/// Header carrying the subscription's access key
pub const ACCESS_KEY_HEADER: &str = "x-access_key";

/// Sends payloads to webhooks with retries
#[derive(Debug, Clone)]
pub struct DeliveryClient {
    http_client: Client,
    retry_policy: RetryPolicy,
    templates: Arc<Handlebars<'static>>,
}

impl DeliveryClient {
    /// Create a client from dispatcher configuration
    pub fn new(config: &DispatcherConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()?;
        Ok(Self::with_client(http_client, config.retry_policy.clone()))
    }

    /// Create a client around an existing HTTP client
    pub fn with_client(http_client: Client, retry_policy: RetryPolicy) -> Self {
        let mut templates = Handlebars::new();
        templates.register_escape_fn(handlebars::no_escape);

        Self {
            http_client,
            retry_policy,
            templates: Arc::new(templates),
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Render the webhook URL template against `payload`.
    pub fn render_url(&self, webhook: &EventWebhook, payload: &Value) -> Result<Url> {
        let rendered = self.templates.render_template(&webhook.webhook_url, payload)?;
        Ok(Url::parse(&rendered)?)
    }

    /// Request headers for `webhook`.
    ///
    /// Configured default headers never replace the content type or the
    /// access key.
    pub fn headers(webhook: &EventWebhook) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        for (name, value) in webhook.default_headers.iter().flatten() {
            let header = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| WebhookError::ConfigError(format!("header `{name}`: {e}")))?;
            headers.insert(header, header_value(name, value)?);
        }

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            HeaderName::from_static(ACCESS_KEY_HEADER),
            header_value(ACCESS_KEY_HEADER, &webhook.access_key)?,
        );
        Ok(headers)
    }

    /// Deliver one payload, retrying any failure per the retry policy.
    ///
    /// Never fails; the outcome is in the returned record.
    pub async fn deliver(&self, delivery: &Delivery) -> DeliveryRecord {
        let webhook = &delivery.webhook;
        let prepared = self
            .render_url(webhook, &delivery.payload)
            .and_then(|url| Ok((url, Self::headers(webhook)?)));

        let (url, headers) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                let mut record = DeliveryRecord::new(&webhook.id, &webhook.webhook_url);
                error!(webhook_id = %webhook.id, error = %e, "Unable to prepare webhook call");
                record.mark_failed(e.to_string(), None, None);
                return record;
            }
        };

        let mut record = DeliveryRecord::new(&webhook.id, url.as_str());
        let method = Method::from(webhook.method);
        let started = Instant::now();
        let mut retry = 0;

        loop {
            debug!(webhook_id = %webhook.id, url = %url, attempt = retry + 1, "Calling webhook");

            match self
                .attempt(method.clone(), url.clone(), headers.clone(), &delivery.payload)
                .await
            {
                Ok((status, body)) => {
                    info!(webhook_id = %webhook.id, url = %url, status, attempts = retry + 1, "Webhook delivered");
                    record.mark_succeeded(status, body);
                    return record;
                }
                Err(e) => {
                    retry += 1;
                    let status = match &e {
                        WebhookError::Status { status, .. } => Some(*status),
                        _ => None,
                    };

                    if !self.retry_policy.should_retry(retry, started.elapsed()) {
                        error!(
                            webhook_id = %webhook.id,
                            url = %url,
                            payload = %storesync_log::redacted_string(&delivery.payload),
                            attempts = retry,
                            error = %e,
                            "Webhook delivery failed"
                        );
                        record.mark_failed(e.to_string(), status, None);
                        return record;
                    }

                    let delay = self.retry_policy.delay_for_retry(retry);
                    let next = Utc::now() + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());
                    warn!(webhook_id = %webhook.id, url = %url, retry, error = %e, "Webhook call failed, retrying");
                    record.mark_failed(e.to_string(), status, Some(next));
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn attempt(
        &self,
        method: Method,
        url: Url,
        headers: HeaderMap,
        payload: &Value,
    ) -> Result<(u16, Option<String>)> {
        let mut request = self.http_client.request(method.clone(), url.clone()).headers(headers);
        if method != Method::GET {
            request = request.body(serde_json::to_vec(payload)?);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await.ok();

        if (200..300).contains(&status) {
            Ok((status, body))
        } else {
            Err(WebhookError::Status {
                status,
                url: url.to_string(),
            })
        }
    }
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| WebhookError::ConfigError(format!("header `{name}`: {e}")))
}
