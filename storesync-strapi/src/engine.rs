//! Wiring of the sync engine components.

use crate::admin::AdminApi;
use crate::bootstrap::Bootstrap;
use crate::config::StrapiConfig;
use crate::error::{Result, StrapiError};
use crate::health::HealthGate;
use crate::http::CmsHttp;
use crate::ledger::IgnoreLedger;
use crate::reverse::MedusaSync;
use crate::seed::SeedExporter;
use crate::session::SessionManager;
use crate::signal::SignalHandler;
use crate::state::SessionState;
use crate::subscriber::SyncSubscriber;
use crate::sync::StrapiSync;
use crate::traits::{EntityRepository, EventBus, SeedSource};
use crate::transport::StrapiClient;
use std::sync::Arc;
use storesync_cache::{CacheConfig, CacheStore, InMemoryCache};
use storesync_config::StrapiSettings;
use tracing::info;

/// Fully wired sync engine.
///
/// Every component shares one [`SessionState`] and one ledger store, so
/// tokens, health and echo markers are consistent across them.
#[derive(Debug, Clone)]
pub struct StrapiEngine {
    config: StrapiConfig,
    state: Arc<SessionState>,
    client: StrapiClient,
    ledger: IgnoreLedger,
    sync: StrapiSync,
    admin: AdminApi,
}

impl StrapiEngine {
    /// Build an engine over an explicit ledger store.
    pub fn new(config: StrapiConfig, store: Arc<dyn CacheStore>) -> Result<Self> {
        let state = Arc::new(SessionState::new(config.retry_window));
        let http = CmsHttp::new(config.request_timeout, config.rate_limit.clone(), state.clone())?;
        let health = HealthGate::new(
            http.client().clone(),
            &config.base_url,
            config.health.clone(),
            state.clone(),
        );
        let sessions = SessionManager::new(
            http.clone(),
            health.clone(),
            &config.base_url,
            (&config.admin).into(),
            state.clone(),
        );
        let mut client = StrapiClient::new(http, sessions, health, &config.base_url);
        if let Some(limit) = config.service_account_wait {
            client = client.with_service_account_gate(state.clone(), limit);
        }
        let ledger = IgnoreLedger::new(store, config.ignore_threshold);
        let sync = StrapiSync::new(client.clone(), ledger.clone(), config.default_credentials());
        let admin = AdminApi::new(
            client.clone(),
            config.admin.clone(),
            config.default_user.clone(),
            config.plugin_timeout,
        );

        Ok(Self {
            config,
            state,
            client,
            ledger,
            sync,
            admin,
        })
    }

    /// Build an engine with a process-local ledger.
    pub fn in_memory(config: StrapiConfig) -> Result<Self> {
        Self::new(config, Arc::new(InMemoryCache::new()))
    }

    /// Build an engine from loaded settings, connecting the ledger backend.
    ///
    /// Redis is used when `redis_url` is set, the in-memory store otherwise.
    pub async fn connect(settings: &StrapiSettings) -> Result<Self> {
        let cache_config = match &settings.redis_url {
            Some(url) => CacheConfig::redis(url.as_str())?.with_key_prefix("storesync"),
            None => CacheConfig::memory(),
        };
        info!(backend = %cache_config.backend, url = %settings.base_url(), "Connecting sync engine");

        let store = storesync_cache::connect(cache_config).await?;
        Self::new(StrapiConfig::from_settings(settings), store)
    }

    pub fn config(&self) -> &StrapiConfig {
        &self.config
    }

    pub fn state(&self) -> &Arc<SessionState> {
        &self.state
    }

    pub fn client(&self) -> &StrapiClient {
        &self.client
    }

    pub fn ledger(&self) -> &IgnoreLedger {
        &self.ledger
    }

    pub fn sync(&self) -> &StrapiSync {
        &self.sync
    }

    pub fn admin(&self) -> &AdminApi {
        &self.admin
    }

    pub fn subscriber(&self) -> SyncSubscriber {
        SyncSubscriber::new(self.sync.clone())
    }

    pub fn bootstrap(&self) -> Bootstrap {
        Bootstrap::new(self.admin.clone(), self.config.sync_on_init, self.config.auto_start)
    }

    /// Inbound sync applying CMS edits to `repository`.
    pub fn reverse(&self, repository: Arc<dyn EntityRepository>) -> MedusaSync {
        MedusaSync::new(repository, self.ledger.clone())
    }

    pub fn seed_exporter(&self, source: Arc<dyn SeedSource>) -> SeedExporter {
        SeedExporter::new(source, self.config.max_page_size)
    }

    /// Handler for signed CMS signals; requires a configured secret.
    pub fn signal_handler(
        &self,
        events: Arc<dyn EventBus>,
        source: Arc<dyn SeedSource>,
        repository: Arc<dyn EntityRepository>,
    ) -> Result<SignalHandler> {
        let secret = self
            .config
            .signal_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| StrapiError::Config("no signal secret configured".to_string()))?;

        Ok(SignalHandler::new(
            secret,
            events,
            self.seed_exporter(source),
            self.reverse(repository),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryRepository, InMemorySeedSource, RecordingEventBus};
    use std::time::Duration;

    #[test]
    fn test_components_share_configuration() {
        let config = StrapiConfig::builder()
            .base_url("http://cms.local:1337/")
            .ignore_threshold(Duration::from_secs(7))
            .max_page_size(25)
            .build();
        let engine = StrapiEngine::in_memory(config).unwrap();

        assert_eq!(engine.client().base_url(), "http://cms.local:1337");
        assert_eq!(engine.ledger().ttl(), Duration::from_secs(7));
        assert_eq!(
            engine
                .seed_exporter(Arc::new(InMemorySeedSource::new()))
                .page_limit(),
            25
        );
    }

    #[test]
    fn test_signal_handler_requires_secret() {
        let engine = StrapiEngine::in_memory(StrapiConfig::default()).unwrap();
        let result = engine.signal_handler(
            Arc::new(RecordingEventBus::new()),
            Arc::new(InMemorySeedSource::new()),
            Arc::new(InMemoryRepository::new()),
        );
        assert!(matches!(result, Err(StrapiError::Config(_))));
    }

    #[tokio::test]
    async fn test_connect_defaults_to_memory_ledger() {
        let engine = StrapiEngine::connect(&StrapiSettings::default()).await.unwrap();
        assert!(!engine.state().service_account_ready());
    }
}
