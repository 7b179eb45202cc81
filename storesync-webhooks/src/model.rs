//! Webhook subscriptions and transformations

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Prefix of subscription ids
pub const WEBHOOK_ID_PREFIX: &str = "ewb";

/// Prefix of transformation ids
pub const TRANSFORMATION_ID_PREFIX: &str = "trf";

/// Assign action used when a transformation names none
pub const DEFAULT_ASSIGN_ACTION: &str = "append";

fn prefixed_id(prefix: &str) -> String {
    format!("{prefix}_{}", Uuid::new_v4().simple())
}

/// HTTP method used to call a webhook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    Get,
    #[default]
    Post,
    Put,
    Patch,
    Delete,
}

impl From<HttpMethod> for Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Patch => Method::PATCH,
            HttpMethod::Delete => Method::DELETE,
        }
    }
}

/// Reshapes an event payload before delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transformation {
    pub id: String,

    /// Name of a registered serializer, or a JSON handlebars template
    pub serialization_logic: String,

    /// Event this transformation was written for
    pub event_name: String,

    /// Post-callback applied to the serialized output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_callback: Option<String>,

    /// How the output joins the delivery list
    #[serde(default = "default_assign_action")]
    pub assign_action: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub updated_by: Option<String>,
}

fn default_assign_action() -> String {
    DEFAULT_ASSIGN_ACTION.to_string()
}

impl Transformation {
    pub fn new(event_name: impl Into<String>, serialization_logic: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: prefixed_id(TRANSFORMATION_ID_PREFIX),
            serialization_logic: serialization_logic.into(),
            event_name: event_name.into(),
            post_callback: None,
            assign_action: default_assign_action(),
            created_at: now,
            updated_at: now,
            created_by: None,
            updated_by: None,
        }
    }

    pub fn with_post_callback(mut self, name: impl Into<String>) -> Self {
        self.post_callback = Some(name.into());
        self
    }

    pub fn with_assign_action(mut self, name: impl Into<String>) -> Self {
        self.assign_action = name.into();
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        let author = author.into();
        self.created_by = Some(author.clone());
        self.updated_by = Some(author);
        self
    }
}

/// A webhook subscribed to one event type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventWebhook {
    pub id: String,

    #[serde(default)]
    pub method: HttpMethod,

    /// Target URL; a handlebars template rendered against the payload
    pub webhook_url: String,

    /// Event name this webhook fires on
    pub event_type: Option<String>,

    /// Extra request headers
    #[serde(default)]
    pub default_headers: Option<BTreeMap<String, String>>,

    pub transformation_id: Option<String>,

    #[serde(default = "default_active")]
    pub active: bool,

    /// Sent as `X-ACCESS_KEY`
    pub access_key: String,

    /// Named pre-callback enriching the payload
    #[serde(default)]
    pub pre_callback: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Loaded with the subscription when `transformation_id` is set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformation: Option<Transformation>,
}

fn default_active() -> bool {
    true
}

impl EventWebhook {
    pub fn new(webhook_url: impl Into<String>, access_key: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: prefixed_id(WEBHOOK_ID_PREFIX),
            method: HttpMethod::default(),
            webhook_url: webhook_url.into(),
            event_type: None,
            default_headers: None,
            transformation_id: None,
            active: true,
            access_key: access_key.into(),
            pre_callback: None,
            created_at: now,
            updated_at: now,
            transformation: None,
        }
    }

    pub fn for_event(mut self, event: impl Into<String>) -> Self {
        self.event_type = Some(event.into());
        self
    }

    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), value.into());
        self
    }

    pub fn with_transformation(mut self, transformation_id: impl Into<String>) -> Self {
        self.transformation_id = Some(transformation_id.into());
        self
    }

    pub fn with_pre_callback(mut self, name: impl Into<String>) -> Self {
        self.pre_callback = Some(name.into());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Whether this webhook fires on `event`.
    pub fn matches(&self, event: &str) -> bool {
        self.active && self.event_type.as_deref() == Some(event)
    }
}

/// A payload bound for one webhook.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub payload: Value,
    pub webhook: EventWebhook,
}

impl Delivery {
    pub fn new(payload: Value, webhook: EventWebhook) -> Self {
        Self { payload, webhook }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prefixed_ids() {
        let webhook = EventWebhook::new("https://example.com/hook", "key");
        assert!(webhook.id.starts_with("ewb_"));
        assert!(Transformation::new("order.placed", "flat").id.starts_with("trf_"));
    }

    #[test]
    fn test_matches_exact_active_event() {
        let webhook = EventWebhook::new("https://example.com/hook", "key").for_event("order.placed");
        assert!(webhook.matches("order.placed"));
        assert!(!webhook.matches("order"));
        assert!(!webhook.matches("order.placed.extra"));
        assert!(!webhook.inactive().matches("order.placed"));
    }

    #[test]
    fn test_deserialize_defaults() {
        let webhook: EventWebhook = serde_json::from_value(json!({
            "id": "ewb_1",
            "webhook_url": "https://example.com/{{id}}",
            "event_type": "product.created",
            "transformation_id": null,
            "access_key": "k",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        }))
        .unwrap();

        assert_eq!(webhook.method, HttpMethod::Post);
        assert!(webhook.active);
        assert!(webhook.default_headers.is_none());
    }

    #[test]
    fn test_method_conversion() {
        assert_eq!(Method::from(HttpMethod::Patch), Method::PATCH);
        let parsed: HttpMethod = serde_json::from_value(json!("put")).unwrap();
        assert_eq!(parsed, HttpMethod::Put);
    }
}
