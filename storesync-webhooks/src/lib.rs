//! Event-to-webhook dispatch for storesync
//!
//! Subscriptions ([`EventWebhook`]) name an event, a URL template and an
//! access key. When the event fires, [`WebhookDispatcher`] loads the
//! matching subscriptions, runs their pre-callbacks and transformations,
//! and delivers the payloads concurrently with retries.
//!
//! # Features
//!
//! - **URL templates**: handlebars placeholders filled from the payload
//! - **Pre-callbacks**: enrichment run once per distinct name, shared by webhooks
//! - **Transformations**: named serializers or JSON templates, post-callbacks
//!   and assign actions (`append`, `prepend`, `replace`)
//! - **Retries**: randomized exponential backoff bounded by count and total time
//! - **Isolation**: a failing webhook never affects its siblings
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use storesync_webhooks::*;
//!
//! # async fn example() -> Result<()> {
//! let store = Arc::new(InMemoryWebhookStore::new());
//! store
//!     .create_webhook(
//!         EventWebhook::new("https://hooks.example.com/orders/{{id}}", "access-key")
//!             .for_event("order.placed"),
//!     )
//!     .await?;
//!
//! let dispatcher = WebhookDispatcher::new(DispatcherConfig::default(), store)?;
//! let report = dispatcher
//!     .dispatch("order.placed", &serde_json::json!({"id": "order_1"}))
//!     .await?;
//! println!("{} delivered", report.delivered);
//! # Ok(())
//! # }
//! ```

mod batch;
mod callbacks;
mod client;
mod config;
mod dispatcher;
mod error;
mod fetcher;
mod model;
mod record;
mod retry;
mod store;

pub use batch::process_in_batches;
pub use callbacks::{
    Append, AssignAction, CALLBACK_CREATED, CallbackRegistry, CallbackResult, FnPostCallback,
    FnSerializer, PostCallback, PreCallback, Prepend, Replace, Serializer, TemplateSerializer,
};
pub use client::{ACCESS_KEY_HEADER, DeliveryClient};
pub use config::{DispatcherConfig, DispatcherConfigBuilder};
pub use dispatcher::{DispatchReport, STATUS_NO_WEBHOOKS, STATUS_PROCESSED, WebhookDispatcher};
pub use error::WebhookError;
pub use fetcher::{EventDataFetcher, PassthroughFetcher};
pub use model::{
    DEFAULT_ASSIGN_ACTION, Delivery, EventWebhook, HttpMethod, TRANSFORMATION_ID_PREFIX,
    Transformation, WEBHOOK_ID_PREFIX,
};
pub use record::{DeliveryRecord, DeliveryStatus};
pub use retry::RetryPolicy;
pub use store::{InMemoryWebhookStore, WebhookStore};

/// Result type for webhook operations
pub type Result<T> = std::result::Result<T, WebhookError>;
