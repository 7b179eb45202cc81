//! Logging for storesync.
//!
//! Every crate in the workspace logs through the `tracing` macros. This
//! crate installs the process-wide subscriber from environment variables
//! and provides [`redact`], which must be applied to any request body
//! before it is written to a log line.
//!
//! # Usage
//!
//! ```rust
//! storesync_log::init();
//! tracing::info!(entity_type = "products", "sync started");
//! ```
//!
//! # Environment Variables
//!
//! - `STORESYNC_DEBUG=1` - Enable debug logging
//! - `STORESYNC_LOG_LEVEL=trace|debug|info|warn|error|off` - Set log level
//! - `STORESYNC_LOG_FORMAT=pretty|compact|json` - Set output format
//! - `STORESYNC_LOG_COLOR=1|0` - Enable/disable ANSI colors
//! - `RUST_LOG` - Full filter directive, overrides the level

use once_cell::sync::OnceCell;
use serde_json::Value;
use std::env;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

// ============================================================================
// Log Levels
// ============================================================================

/// Minimum level written by the subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    /// Trace level (most verbose)
    Trace,
    /// Debug level
    Debug,
    /// Info level
    Info,
    /// Warning level
    Warn,
    /// Error level (least verbose)
    Error,
    /// Off (no logging)
    Off,
}

impl Level {
    /// Get level from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Some(Level::Trace),
            "debug" => Some(Level::Debug),
            "info" => Some(Level::Info),
            "warn" | "warning" => Some(Level::Warn),
            "error" => Some(Level::Error),
            "off" | "none" => Some(Level::Off),
            _ => None,
        }
    }

    /// Filter directive understood by `EnvFilter`.
    pub fn as_directive(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Off => "off",
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_directive())
    }
}

// ============================================================================
// Log Format
// ============================================================================

/// Output format for log messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Multi-line human readable output
    Pretty,
    /// Compact single-line format
    Compact,
    /// JSON format for structured logging
    Json,
}

impl Format {
    /// Get format from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pretty" => Some(Format::Pretty),
            "compact" => Some(Format::Compact),
            "json" => Some(Format::Json),
            _ => None,
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Whether debug mode is enabled
    pub debug: bool,
    /// Minimum log level
    pub level: Level,
    /// Output format
    pub format: Format,
    /// Whether colors are enabled
    pub color: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            debug: false,
            level: Level::Info,
            format: Format::Pretty,
            color: false,
        }
    }
}

fn flag(value: Option<String>) -> Option<bool> {
    value.map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

impl LogConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Create config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let debug = flag(lookup("STORESYNC_DEBUG")).unwrap_or(false);

        let level = lookup("STORESYNC_LOG_LEVEL")
            .and_then(|s| Level::from_str(&s))
            .unwrap_or(if debug { Level::Debug } else { Level::Info });

        let format = lookup("STORESYNC_LOG_FORMAT")
            .and_then(|s| Format::from_str(&s))
            .unwrap_or(Format::Pretty);

        let color = flag(lookup("STORESYNC_LOG_COLOR"))
            .unwrap_or_else(|| lookup("NO_COLOR").is_none() && lookup("TERM").is_some());

        Self {
            debug,
            level,
            format,
            color: color && format != Format::Json,
        }
    }

    /// Effective level once the debug flag is applied.
    pub fn effective_level(&self) -> Level {
        if self.debug && self.level > Level::Debug {
            Level::Debug
        } else {
            self.level
        }
    }
}

// ============================================================================
// Subscriber
// ============================================================================

static INSTALLED: OnceCell<LogConfig> = OnceCell::new();

/// Install the global subscriber from the environment.
///
/// Safe to call more than once; only the first call installs anything.
pub fn init() -> &'static LogConfig {
    init_with(LogConfig::from_env())
}

/// Install the global subscriber with an explicit configuration.
pub fn init_with(config: LogConfig) -> &'static LogConfig {
    INSTALLED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.effective_level().as_directive()));

        let registry = tracing_subscriber::registry().with(filter);
        // Another subscriber may already be set (tests, host application)
        let _ = match config.format {
            Format::Pretty => registry
                .with(fmt::layer().pretty().with_ansi(config.color))
                .try_init(),
            Format::Compact => registry
                .with(fmt::layer().compact().with_ansi(config.color))
                .try_init(),
            Format::Json => registry.with(fmt::layer().json()).try_init(),
        };

        config
    })
}

// ============================================================================
// Redaction
// ============================================================================

/// Placeholder written in place of secrets.
pub const REDACTED: &str = "######";

const SECRET_KEYS: &[&str] = &["password", "jwt", "token", "access_key"];

/// Copy of `value` with secret fields replaced, at any depth.
///
/// Empty or null secrets stay as they are so the log still shows that the
/// field was missing.
pub fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, field)| {
                    let is_secret = SECRET_KEYS.contains(&key.to_lowercase().as_str());
                    let redacted = match field {
                        Value::Null => Value::Null,
                        Value::String(s) if s.is_empty() => field.clone(),
                        _ if is_secret => Value::String(REDACTED.to_string()),
                        _ => redact(field),
                    };
                    (key.clone(), redacted)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}

/// Redact and serialize `value` for a log line.
pub fn redacted_string(value: &Value) -> String {
    redact(value).to_string()
}

// ============================================================================
// Tests
// ============================================================================
