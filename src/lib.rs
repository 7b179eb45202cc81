// storesync - keeps a commerce backend and a Strapi CMS in step
//
// This library bundles the sync engine, the webhook dispatcher and the
// shared configuration, logging and cache layers they run on.

// Always available
pub use storesync_cache as cache;
pub use storesync_config as config;
pub use storesync_log as log;

pub use storesync_config::Settings;

// Re-export optional crates
#[cfg(feature = "strapi")]
pub use storesync_strapi as strapi;

#[cfg(feature = "webhooks")]
pub use storesync_webhooks as webhooks;

// Prelude for common imports
pub mod prelude {
    pub use crate::Settings;

    #[cfg(feature = "strapi")]
    pub use storesync_strapi::prelude::*;

    #[cfg(feature = "webhooks")]
    pub use storesync_webhooks::{
        CallbackRegistry, DispatcherConfig, EventWebhook, InMemoryWebhookStore, Transformation,
        WebhookDispatcher, WebhookError, WebhookStore,
    };
}
