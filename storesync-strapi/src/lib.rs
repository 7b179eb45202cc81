//! Bidirectional content sync between a commerce backend and a Strapi CMS.
//!
//! Changes made on the commerce side are pushed to the CMS through
//! [`StrapiSync`]; edits made in the CMS come back as signed signals handled
//! by [`SignalHandler`] and are applied with [`MedusaSync`]. An
//! [`IgnoreLedger`] of short-lived markers keeps each write from bouncing
//! back as an echo.
//!
//! # Features
//!
//! - Session management with cached tokens and a single re-login on 401
//! - Health gate suspending calls while the CMS is down
//! - Rate-limit aware retries driven by `x-retry-after` / `x-ratelimit-reset`
//! - Create-if-absent writes keyed by the commerce id
//! - Diff-only reverse patches
//! - Paginated seed export for the CMS initial import
//! - `redis` - share ignore markers between instances
//!
//! # Examples
//!
//! ```no_run
//! use storesync_strapi::prelude::*;
//! use serde_json::json;
//!
//! # async fn example() -> Result<()> {
//! let config = StrapiConfig::builder()
//!     .base_url("http://localhost:1337")
//!     .default_user("service@example.com", "secret")
//!     .admin("admin@example.com", "secret")
//!     .build();
//! let engine = StrapiEngine::in_memory(config)?;
//!
//! engine.bootstrap().initialize().await?;
//! engine
//!     .subscriber()
//!     .handle("product.created", &json!({"id": "prod_1", "title": "Shirt"}))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod admin;
pub mod bootstrap;
pub mod config;
pub mod engine;
pub mod error;
pub mod health;
pub mod http;
pub mod ledger;
pub mod memory;
pub mod retry;
pub mod reverse;
pub mod seed;
pub mod session;
pub mod signal;
pub mod state;
pub mod subscriber;
pub mod sync;
pub mod traits;
pub mod translate;
pub mod transport;

pub use admin::{AdminApi, AdminUserUpdate};
pub use bootstrap::{Bootstrap, BootstrapReport};
pub use config::{StrapiConfig, StrapiConfigBuilder};
pub use engine::StrapiEngine;
pub use error::{Result, StrapiError};
pub use health::{HealthConfig, HealthGate, HealthMode};
pub use http::{CmsHttp, CmsRequest, CmsResponse};
pub use ledger::{IgnoreLedger, Side};
pub use memory::{InMemoryRepository, InMemorySeedSource, RecordingEventBus};
pub use retry::{RateLimitPolicy, RetryDecision};
pub use reverse::{MedusaSync, ReverseSync};
pub use seed::{SeedExporter, SeedMeta, SeedPage};
pub use session::{Credentials, SessionManager};
pub use signal::{SignalHandler, SignalReply, SignalRequest, StrapiSignal};
pub use state::SessionState;
pub use subscriber::{SyncEvent, SyncSubscriber};
pub use sync::StrapiSync;
pub use traits::{EntityKind, EntityRepository, EventBus, Page, SeedCollection, SeedSource};
pub use transport::{SendRequest, StrapiClient, StrapiResult};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::bootstrap::Bootstrap;
    pub use crate::config::StrapiConfig;
    pub use crate::engine::StrapiEngine;
    pub use crate::error::{Result, StrapiError};
    pub use crate::ledger::{IgnoreLedger, Side};
    pub use crate::reverse::{MedusaSync, ReverseSync};
    pub use crate::session::Credentials;
    pub use crate::signal::{SignalHandler, SignalReply};
    pub use crate::subscriber::SyncSubscriber;
    pub use crate::sync::StrapiSync;
    pub use crate::traits::{EntityKind, EntityRepository, EventBus, SeedSource};
    pub use crate::transport::StrapiResult;
}
