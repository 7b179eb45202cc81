//! Error types for webhook operations

use thiserror::Error;

/// Errors that can occur during webhook operations
#[derive(Error, Debug)]
pub enum WebhookError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The webhook answered with a non-success status
    #[error("{url} answered with status {status}")]
    Status { status: u16, url: String },

    /// URL template could not be rendered
    #[error("Template error: {0}")]
    TemplateError(String),

    /// Payload serialization/deserialization failed
    #[error("Payload error: {0}")]
    PayloadError(String),

    /// Delivery failed after all retries
    #[error("Delivery failed after {attempts} attempts: {message}")]
    DeliveryFailed { attempts: u32, message: String },

    /// Subscription not found
    #[error("Webhook not found: {0}")]
    WebhookNotFound(String),

    /// Transformation not found
    #[error("Transformation not found: {0}")]
    TransformationNotFound(String),

    /// Another subscription already uses this URL or access key
    #[error("Duplicate {field}: {value}")]
    Duplicate { field: &'static str, value: String },

    /// A named callback, serializer or assign action failed or is missing
    #[error("Callback `{name}` failed: {message}")]
    CallbackError { name: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl WebhookError {
    pub fn callback(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CallbackError {
            name: name.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for WebhookError {
    fn from(err: serde_json::Error) -> Self {
        WebhookError::PayloadError(err.to_string())
    }
}

impl From<handlebars::RenderError> for WebhookError {
    fn from(err: handlebars::RenderError) -> Self {
        WebhookError::TemplateError(err.to_string())
    }
}
