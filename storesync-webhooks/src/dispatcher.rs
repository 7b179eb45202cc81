//! Event-to-webhook dispatch
//!
//! A dispatch runs three stages, each as concurrent batches:
//!
//! 1. every distinct pre-callback named by a matching webhook runs once
//! 2. webhooks with a transformation get their payload serialized and
//!    post-processed; a failure drops only that webhook
//! 3. every resulting payload is delivered with retries

use crate::batch::process_in_batches;
use crate::callbacks::{AssignAction, CallbackRegistry};
use crate::client::DeliveryClient;
use crate::fetcher::{EventDataFetcher, PassthroughFetcher};
use crate::model::{Delivery, EventWebhook};
use crate::record::DeliveryRecord;
use crate::store::WebhookStore;
use crate::{DispatcherConfig, Result, WebhookError};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Status of a dispatch with no matching webhook
pub const STATUS_NO_WEBHOOKS: u16 = 200;

/// Status of a dispatch that ran its stages
pub const STATUS_PROCESSED: u16 = 201;

/// Outcome of one dispatch
#[derive(Debug, Clone, Serialize)]
pub struct DispatchReport {
    pub status: u16,
    pub message: String,
    pub delivered: usize,
    pub failed: usize,
    /// Webhooks dropped during transformation
    pub dropped: usize,
    #[serde(skip)]
    pub records: Vec<DeliveryRecord>,
}

impl DispatchReport {
    fn empty(event: &str) -> Self {
        Self {
            status: STATUS_NO_WEBHOOKS,
            message: format!("No active webhook found for event: {event}"),
            delivered: 0,
            failed: 0,
            dropped: 0,
            records: Vec::new(),
        }
    }
}

/// Fans events out to subscribed webhooks
#[derive(Clone)]
pub struct WebhookDispatcher {
    store: Arc<dyn WebhookStore>,
    fetcher: Arc<dyn EventDataFetcher>,
    callbacks: CallbackRegistry,
    client: DeliveryClient,
    config: DispatcherConfig,
}

impl std::fmt::Debug for WebhookDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookDispatcher")
            .field("callbacks", &self.callbacks)
            .field("client", &self.client)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl WebhookDispatcher {
    /// Dispatcher with pass-through payloads and the built-in callbacks only
    pub fn new(config: DispatcherConfig, store: Arc<dyn WebhookStore>) -> Result<Self> {
        Ok(Self {
            store,
            fetcher: Arc::new(PassthroughFetcher),
            callbacks: CallbackRegistry::new(),
            client: DeliveryClient::new(&config)?,
            config,
        })
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn EventDataFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_callbacks(mut self, callbacks: CallbackRegistry) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn with_client(mut self, client: DeliveryClient) -> Self {
        self.client = client;
        self
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn WebhookStore> {
        &self.store
    }

    /// Dispatch `event` if it is one of the configured events.
    pub async fn handle(&self, event: &str, data: &Value) -> Result<Option<DispatchReport>> {
        if !self.config.subscribes_to(event) {
            debug!(event, "Event not subscribed, skipping webhooks");
            return Ok(None);
        }
        self.dispatch(event, data).await.map(Some)
    }

    /// Deliver `event` to every active webhook subscribed to it.
    ///
    /// Individual transform or delivery failures are logged and counted,
    /// never returned.
    pub async fn dispatch(&self, event: &str, data: &Value) -> Result<DispatchReport> {
        let webhooks = self.store.active_for_event(event).await?;
        if webhooks.is_empty() {
            debug!(event, "No active webhook for event");
            return Ok(DispatchReport::empty(event));
        }

        let base = self.fetcher.fetch(event, data).await?;
        let enriched = self.run_pre_callbacks(&webhooks, &base).await;

        let (transformed, plain): (Vec<&EventWebhook>, Vec<&EventWebhook>) = webhooks
            .iter()
            .partition(|webhook| webhook.transformation_id.is_some());

        let mut deliveries: Vec<Delivery> = plain
            .into_iter()
            .map(|webhook| Delivery::new(payload_for(webhook, &base, &enriched), webhook.clone()))
            .collect();

        let outcomes = process_in_batches(
            transformed
                .iter()
                .map(|webhook| self.transform(webhook, &base, &enriched)),
            self.config.batch_size,
        )
        .await;

        let mut dropped = 0;
        for (webhook, outcome) in transformed.iter().zip(outcomes) {
            match outcome {
                Ok((delivery, action)) => action.assign(&mut deliveries, delivery),
                Err(e) => {
                    dropped += 1;
                    error!(
                        event,
                        webhook_id = %webhook.id,
                        url = %webhook.webhook_url,
                        error = %e,
                        "Transformation failed, webhook skipped"
                    );
                }
            }
        }

        let records = process_in_batches(
            deliveries.iter().map(|delivery| self.client.deliver(delivery)),
            self.config.batch_size,
        )
        .await;

        let delivered = records.iter().filter(|r| r.status.is_success()).count();
        let failed = records.len() - delivered;
        info!(event, delivered, failed, dropped, "Webhooks processed");

        Ok(DispatchReport {
            status: STATUS_PROCESSED,
            message: format!("Webhook processed for event: {event}"),
            delivered,
            failed,
            dropped,
            records,
        })
    }

    /// Consume events until the sender side closes.
    pub async fn run(&self, mut events: mpsc::Receiver<(String, Value)>) {
        while let Some((event, data)) = events.recv().await {
            if let Err(e) = self.handle(&event, &data).await {
                error!(event = %event, error = %e, "Webhook dispatch failed");
            }
        }
    }

    /// Results of the distinct registered pre-callbacks that answered 201.
    async fn run_pre_callbacks(&self, webhooks: &[EventWebhook], base: &Value) -> HashMap<String, Value> {
        let names: BTreeSet<&str> = webhooks
            .iter()
            .filter_map(|webhook| webhook.pre_callback.as_deref())
            .filter(|name| self.callbacks.pre_callback(name).is_some())
            .collect();

        let calls = names.into_iter().filter_map(|name| {
            let callback = self.callbacks.pre_callback(name)?;
            Some(async move { (name, callback.call(base).await) })
        });

        process_in_batches(calls, self.config.batch_size)
            .await
            .into_iter()
            .filter_map(|(name, outcome)| match outcome {
                Ok(result) if result.is_created() => Some((name.to_string(), result.data)),
                Ok(result) => {
                    debug!(callback = name, status = result.status_code, "Pre-callback result not used");
                    None
                }
                Err(e) => {
                    warn!(callback = name, error = %e, "Pre-callback failed");
                    None
                }
            })
            .collect()
    }

    async fn transform(
        &self,
        webhook: &EventWebhook,
        base: &Value,
        enriched: &HashMap<String, Value>,
    ) -> Result<(Delivery, Arc<dyn AssignAction>)> {
        let transformation = webhook.transformation.as_ref().ok_or_else(|| {
            WebhookError::TransformationNotFound(
                webhook.transformation_id.clone().unwrap_or_default(),
            )
        })?;

        let action = self.callbacks.assign_action(&transformation.assign_action)?;
        let payload = self
            .callbacks
            .transform(transformation, &payload_for(webhook, base, enriched))
            .await?;

        Ok((Delivery::new(payload, webhook.clone()), action))
    }
}

/// The pre-callback result for `webhook` when there is one, else the base payload.
fn payload_for(webhook: &EventWebhook, base: &Value, enriched: &HashMap<String, Value>) -> Value {
    webhook
        .pre_callback
        .as_deref()
        .and_then(|name| enriched.get(name))
        .unwrap_or(base)
        .clone()
}
