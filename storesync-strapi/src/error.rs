//! Error types for the CMS sync engine.

use storesync_cache::CacheError;
use thiserror::Error;

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, StrapiError>;

/// Errors raised while talking to the CMS or applying inbound changes.
#[derive(Debug, Error)]
pub enum StrapiError {
    /// Transport-level failure (connect, timeout, body decoding)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The CMS answered with a non-success status
    #[error("{method} {url} failed with status {status}")]
    Status {
        status: u16,
        method: String,
        url: String,
        /// Redacted response body
        body: String,
    },

    /// Rate limiting did not clear within the attempt budget
    #[error("rate limited {attempts} times on {url}")]
    RateLimited { attempts: u32, url: String },

    /// Login rejected or failed
    #[error("login failed for {email}: {message}")]
    Login { email: String, message: String },

    /// Login answered without a token
    #[error("no token in login response for {0}")]
    MissingToken(String),

    /// The CMS, or its service account, was not ready within the configured wait
    #[error("CMS unavailable: {0}")]
    Unavailable(String),

    /// The two systems disagree on an entity in a way sync must not resolve
    #[error("Synchronization Error - {0}")]
    Synchronization(String),

    /// Ledger backend failure
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Signed signal could not be verified
    #[error("invalid signal: {0}")]
    Signal(#[from] jsonwebtoken::errors::Error),

    /// Entity repository failure
    #[error("repository error: {0}")]
    Repository(String),

    /// Malformed request from the caller
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// URL building error
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Engine configuration cannot be used
    #[error("configuration error: {0}")]
    Config(String),
}

impl StrapiError {
    /// HTTP status of the failed call, if the CMS answered.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            Self::RateLimited { .. } => Some(429),
            _ => None,
        }
    }

    /// Whether the failure calls for a token refresh.
    pub fn is_unauthorized(&self) -> bool {
        self.status_code() == Some(401)
    }
}
