// Typed settings for the sync engine and the webhook dispatcher

use crate::validation::{ConfigValidator, Validate};
use crate::{ConfigError, ConfigLoader, EnvLoader, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Service account the engine uses for content API calls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserCredentials {
    pub email: String,
    pub password: String,
    pub firstname: String,
    pub username: Option<String>,
    pub confirmed: bool,
    pub blocked: bool,
}

/// Super-admin account used for admin API calls and user registration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminCredentials {
    pub email: String,
    pub password: String,
    pub firstname: String,
    pub lastname: Option<String>,
    pub username: Option<String>,
}

/// CMS connection and sync behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrapiSettings {
    pub protocol: String,
    pub host: String,
    /// Explicit port; http without one uses 1337
    pub port: Option<u16>,
    pub default_user: UserCredentials,
    pub admin: AdminCredentials,
    /// Shared secret for signed inbound signals
    pub secret: Option<String>,
    /// Lifetime of echo-suppression markers, in seconds
    pub ignore_threshold_secs: u64,
    /// Health cache lifetime and probe budget, in milliseconds
    pub healthcheck_timeout_ms: u64,
    pub sync_on_init: bool,
    pub auto_start: bool,
    pub max_page_size: u64,
    /// Skip liveness probes entirely
    pub self_test: bool,
    /// Ledger backend; in-memory when unset
    pub redis_url: Option<String>,
}

impl Default for StrapiSettings {
    fn default() -> Self {
        Self {
            protocol: "https".to_string(),
            host: "localhost".to_string(),
            port: None,
            default_user: UserCredentials {
                confirmed: true,
                ..UserCredentials::default()
            },
            admin: AdminCredentials::default(),
            secret: None,
            ignore_threshold_secs: 3,
            healthcheck_timeout_ms: 120_000,
            sync_on_init: false,
            auto_start: false,
            max_page_size: 50,
            self_test: false,
            redis_url: None,
        }
    }
}

impl StrapiSettings {
    /// `{protocol}://{host}[:{port}]`
    pub fn base_url(&self) -> String {
        let port = self
            .port
            .or(if self.protocol == "http" { Some(1337) } else { None });

        match port {
            Some(port) => format!("{}://{}:{}", self.protocol, self.host, port),
            None => format!("{}://{}", self.protocol, self.host),
        }
    }

    fn from_loader(env: &EnvLoader) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            protocol: env.load_var_or("STRAPI_PROTOCOL", &defaults.protocol),
            host: env.load_var_or("STRAPI_HOST", &defaults.host),
            port: env.load_parsed_opt("STRAPI_PORT")?,
            default_user: UserCredentials {
                email: env.load_var_or("STRAPI_DEFAULT_USER_EMAIL", ""),
                password: env.load_var_or("STRAPI_DEFAULT_USER_PASSWORD", ""),
                firstname: env.load_var_or("STRAPI_DEFAULT_USER_FIRSTNAME", "medusa"),
                username: env.load_opt("STRAPI_DEFAULT_USER_USERNAME"),
                confirmed: true,
                blocked: false,
            },
            admin: AdminCredentials {
                email: env.load_var_or("STRAPI_ADMIN_EMAIL", ""),
                password: env.load_var_or("STRAPI_ADMIN_PASSWORD", ""),
                firstname: env.load_var_or("STRAPI_ADMIN_FIRSTNAME", "admin"),
                lastname: env.load_opt("STRAPI_ADMIN_LASTNAME"),
                username: env.load_opt("STRAPI_ADMIN_USERNAME"),
            },
            secret: env.load_opt("STRAPI_SECRET"),
            ignore_threshold_secs: env
                .load_parsed("STRAPI_IGNORE_THRESHOLD", defaults.ignore_threshold_secs)?,
            healthcheck_timeout_ms: env
                .load_parsed("STRAPI_HEALTHCHECK_TIMEOUT", defaults.healthcheck_timeout_ms)?,
            sync_on_init: env.load_flag("STRAPI_SYNC_ON_INIT", false),
            auto_start: env.load_flag("STRAPI_AUTO_START", false),
            max_page_size: env.load_parsed("STRAPI_MAX_PAGE_SIZE", defaults.max_page_size)?,
            self_test: env.load_flag("STRAPI_SELF_TEST", false),
            redis_url: env.load_opt("REDIS_URL"),
        })
    }
}

impl Validate for StrapiSettings {
    fn validate(&self) -> Result<()> {
        ConfigValidator::one_of(self.protocol.as_str(), &["http", "https"], "strapi.protocol")?;
        ConfigValidator::not_empty(&self.host, "strapi.host")?;
        ConfigValidator::in_range(self.max_page_size, 1, 10_000, "strapi.max_page_size")?;
        ConfigValidator::in_range(
            self.ignore_threshold_secs,
            1,
            3_600,
            "strapi.ignore_threshold_secs",
        )?;
        Ok(())
    }
}

/// Event-to-webhook dispatcher settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookSettings {
    /// Retries per delivery after the first attempt
    pub max_retry_count: u32,
    /// Ceiling on the total time spent retrying one delivery, in milliseconds
    pub max_retry_time_ms: u64,
    /// Event names the dispatcher subscribes to
    pub events: Vec<String>,
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            max_retry_count: 10,
            max_retry_time_ms: 3_600_000,
            events: Vec::new(),
        }
    }
}

impl WebhookSettings {
    fn from_loader(env: &EnvLoader) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            max_retry_count: env.load_parsed("MAX_RETRY_COUNT", defaults.max_retry_count)?,
            max_retry_time_ms: env
                .load_parsed("WEBHOOK_MAX_RETRY_TIME", defaults.max_retry_time_ms)?,
            events: env.load_list("MEDUSA_ADMIN_EVENTS"),
        })
    }
}

/// All settings, as loaded at process start.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub strapi: StrapiSettings,
    pub webhooks: WebhookSettings,
}

impl Settings {
    /// Load from the process environment, reading `.env` first when present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Ignore if .env doesn't exist
        Self::from_loader(&EnvLoader::default())
    }

    /// Load from a specific `.env` file, then the environment.
    pub fn from_dotenv(path: impl AsRef<Path>) -> Result<Self> {
        dotenvy::from_path(path.as_ref()).map_err(|e| ConfigError::LoadError(e.to_string()))?;
        Self::from_loader(&EnvLoader::default())
    }

    /// Load from an explicit variable source.
    pub fn from_loader(env: &EnvLoader) -> Result<Self> {
        let settings = Self {
            strapi: StrapiSettings::from_loader(env)?,
            webhooks: WebhookSettings::from_loader(env)?,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Load from a TOML or JSON file; missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let value = ConfigLoader::auto(path.as_ref())?.load_file(path.as_ref())?;
        let settings: Self = serde_json::from_value(value)
            .map_err(|e| ConfigError::DeserializationError(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }
}

impl Validate for Settings {
    fn validate(&self) -> Result<()> {
        self.strapi.validate()
    }
}
