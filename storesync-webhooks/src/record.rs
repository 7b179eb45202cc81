//! Delivery tracking

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a webhook delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Delivery is pending
    Pending,

    /// Delivery is in progress
    InProgress,

    /// Delivery succeeded
    Succeeded,

    /// Delivery failed but will be retried
    Failed,

    /// Delivery permanently failed (no more retries)
    PermanentlyFailed,
}

impl DeliveryStatus {
    /// Check if the delivery is complete (success or permanent failure)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::PermanentlyFailed)
    }

    /// Check if the delivery succeeded
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// Record of one webhook delivery and its attempts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRecord {
    /// Unique delivery ID
    pub id: String,

    /// Subscription the payload was sent to
    pub webhook_id: String,

    /// Rendered target URL, or the raw template when rendering failed
    pub url: String,

    /// Current status
    pub status: DeliveryStatus,

    /// Number of delivery attempts
    pub attempts: u32,

    /// HTTP status code from last attempt
    pub last_status_code: Option<u16>,

    /// Error message from last failed attempt
    pub last_error: Option<String>,

    /// Response body from last attempt (truncated)
    pub last_response_body: Option<String>,

    /// Next retry timestamp (if applicable)
    pub next_retry: Option<DateTime<Utc>>,

    /// Created timestamp
    pub created_at: DateTime<Utc>,

    /// Updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl DeliveryRecord {
    /// Create a new delivery record
    pub fn new(webhook_id: impl Into<String>, url: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            webhook_id: webhook_id.into(),
            url: url.into(),
            status: DeliveryStatus::Pending,
            attempts: 0,
            last_status_code: None,
            last_error: None,
            last_response_body: None,
            next_retry: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record a successful attempt
    pub fn mark_succeeded(&mut self, status_code: u16, response_body: Option<String>) {
        self.status = DeliveryStatus::Succeeded;
        self.last_status_code = Some(status_code);
        self.last_response_body = response_body.map(|s| truncate_string(&s, 1024));
        self.last_error = None;
        self.next_retry = None;
        self.touch();
    }

    /// Record a failed attempt; `next_retry` is `None` when giving up
    pub fn mark_failed(
        &mut self,
        error: String,
        status_code: Option<u16>,
        next_retry: Option<DateTime<Utc>>,
    ) {
        self.status = if next_retry.is_some() {
            DeliveryStatus::Failed
        } else {
            DeliveryStatus::PermanentlyFailed
        };
        self.last_status_code = status_code.or(self.last_status_code);
        self.last_error = Some(error);
        self.next_retry = next_retry;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
        self.attempts += 1;
    }
}

/// Truncate a string to at most `max_len` bytes on a char boundary
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len.saturating_sub(3);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}
