//! Signed signals sent by the CMS plugin.
//!
//! The CMS posts `{signedMessage}` where the message is an HS256 token
//! signed with the shared secret. Its claims carry `{message, code, data}`.

use crate::error::{Result, StrapiError};
use crate::reverse::MedusaSync;
use crate::seed::SeedExporter;
use crate::traits::{EntityKind, EventBus};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Known signal messages.
pub mod message {
    pub const SYNC_COMPLETED: &str = "SYNC COMPLETED";
    pub const STATUS_UPDATE: &str = "STATUS UPDATE";
    pub const SEED: &str = "SEED";
    pub const UPDATE_MEDUSA: &str = "UPDATE MEDUSA";
}

/// Events emitted for signals that need no local processing.
pub mod event {
    pub const SYNC_COMPLETED: &str = "strapi.sync-completed";
    pub const STATUS_UPDATE: &str = "strapi.status.update";
    pub const MESSAGE: &str = "strapi.message";
}

/// Decoded signal claims.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrapiSignal {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<Value>,
    #[serde(default)]
    pub data: Value,
}

/// Request body of the signal endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalRequest {
    pub signed_message: String,
}

/// Status and body to answer a signal with.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalReply {
    pub status: u16,
    pub body: Value,
}

impl SignalReply {
    pub fn ok() -> Self {
        Self {
            status: 200,
            body: Value::Null,
        }
    }

    pub fn ok_with(body: Value) -> Self {
        Self { status: 200, body }
    }

    fn webhook_error(error: impl std::fmt::Display) -> Self {
        Self {
            status: 400,
            body: Value::String(format!("Webhook error: {error}")),
        }
    }
}

/// Verifies and routes CMS signals.
#[derive(Clone)]
pub struct SignalHandler {
    key: DecodingKey,
    validation: Validation,
    events: Arc<dyn EventBus>,
    seed: SeedExporter,
    reverse: MedusaSync,
}

impl SignalHandler {
    pub fn new(
        secret: &str,
        events: Arc<dyn EventBus>,
        seed: SeedExporter,
        reverse: MedusaSync,
    ) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // signals carry no `exp`; an expiry is still enforced when present
        validation.required_spec_claims.clear();

        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            events,
            seed,
            reverse,
        }
    }

    /// Verify a signed message and decode its claims.
    pub fn verify(&self, signed_message: &str) -> Result<StrapiSignal> {
        let data = decode::<StrapiSignal>(signed_message, &self.key, &self.validation)?;
        Ok(data.claims)
    }

    /// Verify and process one signal.
    ///
    /// Verification and event-bus failures are errors. Seed and update
    /// failures are answered with a 400 reply.
    pub async fn handle(&self, signed_message: &str) -> Result<SignalReply> {
        let signal = self.verify(signed_message).inspect_err(|e| {
            error!(error = %e, "Rejected CMS signal");
        })?;
        debug!(message = %signal.message, "Received CMS signal");

        match signal.message.as_str() {
            message::SYNC_COMPLETED => self.forward(event::SYNC_COMPLETED, signal).await,
            message::STATUS_UPDATE => self.forward(event::STATUS_UPDATE, signal).await,
            message::SEED => Ok(self.seed(&signal.data).await),
            message::UPDATE_MEDUSA => Ok(self.update_medusa(&signal.data).await),
            _ => self.forward(event::MESSAGE, signal).await,
        }
    }

    async fn forward(&self, name: &str, signal: StrapiSignal) -> Result<SignalReply> {
        self.events.emit(name, serde_json::to_value(&signal)?).await?;
        Ok(SignalReply::ok())
    }

    async fn seed(&self, data: &Value) -> SignalReply {
        let page_number = data
            .pointer("/meta/pageNumber")
            .and_then(Value::as_u64)
            .unwrap_or(1);
        info!(page_number, "CMS requested a seed page");

        let page = match self.seed.export(page_number).await {
            Ok(page) => page,
            Err(e) => return SignalReply::webhook_error(e),
        };
        match serde_json::to_value(page) {
            Ok(body) => SignalReply::ok_with(body),
            Err(e) => SignalReply::webhook_error(e),
        }
    }

    async fn update_medusa(&self, data: &Value) -> SignalReply {
        if data.get("origin").and_then(Value::as_str) == Some("medusa") {
            info!("Received update confirmation");
            return SignalReply::ok();
        }

        let Some(kind) = data
            .get("type")
            .and_then(Value::as_str)
            .and_then(EntityKind::from_signal_name)
        else {
            return SignalReply::ok_with(json!({}));
        };

        let entry = data.get("data").cloned().unwrap_or(Value::Null);
        let Some(id) = entry.get("medusa_id").and_then(Value::as_str) else {
            return SignalReply::webhook_error(StrapiError::InvalidRequest(
                "entry has no medusa_id".to_string(),
            ));
        };

        match self.reverse.apply(kind, id, &entry).await {
            Ok(outcome) => SignalReply::ok_with(outcome.entity().cloned().unwrap_or(json!({}))),
            Err(e) => {
                error!(kind = %kind, id, error = %e, "Unable to apply CMS change");
                SignalReply::webhook_error(e)
            }
        }
    }
}

impl std::fmt::Debug for SignalHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalHandler")
            .field("seed", &self.seed)
            .field("reverse", &self.reverse)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{IgnoreLedger, Side};
    use crate::memory::{InMemoryRepository, InMemorySeedSource, RecordingEventBus};
    use crate::traits::SeedCollection;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use std::time::Duration;
    use storesync_cache::InMemoryCache;

    const SECRET: &str = "signal-secret";

    struct Fixture {
        handler: SignalHandler,
        events: Arc<RecordingEventBus>,
        repo: Arc<InMemoryRepository>,
        ledger: IgnoreLedger,
    }

    fn fixture() -> Fixture {
        let events = Arc::new(RecordingEventBus::new());
        let repo = Arc::new(InMemoryRepository::new());
        let ledger = IgnoreLedger::new(Arc::new(InMemoryCache::new()), Duration::from_secs(3));
        let source = InMemorySeedSource::new()
            .with(SeedCollection::Regions, vec![json!({"id": "reg_1"})]);

        let handler = SignalHandler::new(
            SECRET,
            events.clone(),
            SeedExporter::new(Arc::new(source), 50),
            MedusaSync::new(repo.clone(), ledger.clone()),
        );
        Fixture {
            handler,
            events,
            repo,
            ledger,
        }
    }

    fn sign(claims: Value, secret: &str) -> String {
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[tokio::test]
    async fn test_rejects_bad_signature() {
        let f = fixture();
        let token = sign(json!({"message": "SEED"}), "other-secret");
        assert!(matches!(
            f.handler.handle(&token).await.unwrap_err(),
            StrapiError::Signal(_)
        ));
    }

    #[tokio::test]
    async fn test_forwards_events() {
        let f = fixture();
        for message in ["SYNC COMPLETED", "STATUS UPDATE", "HELLO"] {
            let reply = f
                .handler
                .handle(&sign(json!({"message": message, "data": {}}), SECRET))
                .await
                .unwrap();
            assert_eq!(reply.status, 200);
        }

        assert_eq!(
            f.events.names(),
            vec!["strapi.sync-completed", "strapi.status.update", "strapi.message"]
        );
    }

    #[tokio::test]
    async fn test_seed_page() {
        let f = fixture();
        let token = sign(json!({"message": "SEED", "data": {"meta": {"pageNumber": 1}}}), SECRET);
        let reply = f.handler.handle(&token).await.unwrap();

        assert_eq!(reply.status, 200);
        assert_eq!(reply.body["meta"]["pageNumber"], 1);
        assert_eq!(reply.body["meta"]["pageLimit"], 50);
        assert_eq!(reply.body["data"]["regions"][0]["medusa_id"], "reg_1");
    }

    #[tokio::test]
    async fn test_update_medusa() {
        let f = fixture();
        f.repo
            .insert(EntityKind::Region, json!({"id": "reg_1", "name": "EU"}))
            .unwrap();

        let token = sign(
            json!({
                "message": "UPDATE MEDUSA",
                "data": {"type": "region", "data": {"medusa_id": "reg_1", "name": "Europe"}},
            }),
            SECRET,
        );
        let reply = f.handler.handle(&token).await.unwrap();

        assert_eq!(reply.status, 200);
        assert_eq!(reply.body["name"], "Europe");
        assert!(f.ledger.is_ignored("reg_1", Side::Strapi).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_medusa_failure_is_400() {
        let f = fixture();
        let token = sign(
            json!({
                "message": "UPDATE MEDUSA",
                "data": {"type": "product", "data": {"medusa_id": "missing"}},
            }),
            SECRET,
        );
        let reply = f.handler.handle(&token).await.unwrap();
        assert_eq!(reply.status, 400);
        assert!(reply.body.as_str().unwrap().starts_with("Webhook error:"));
    }

    #[tokio::test]
    async fn test_origin_medusa_is_ack() {
        let f = fixture();
        let token = sign(
            json!({"message": "UPDATE MEDUSA", "data": {"origin": "medusa", "type": "region"}}),
            SECRET,
        );
        assert_eq!(f.handler.handle(&token).await.unwrap(), SignalReply::ok());
        assert!(f.repo.patches().is_empty());
    }
}
