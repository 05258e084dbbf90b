//! Error types for webhook ingestion

use thiserror::Error;

/// Errors that are fatal to a whole webhook request.
#[derive(Error, Debug)]
pub enum WebhookError {
    /// Signature missing or not produced by any configured secret
    #[error("Webhook signature could not be authenticated")]
    Unauthenticated,

    /// Body is not JSON or has no `events` list
    #[error("Malformed webhook payload: {0}")]
    MalformedPayload(String),

    /// Record store failed outside of per-event handling
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<serde_json::Error> for WebhookError {
    fn from(err: serde_json::Error) -> Self {
        WebhookError::MalformedPayload(err.to_string())
    }
}

/// Errors raised while applying a single event. These never escape the
/// dispatcher; they are logged and the batch moves on.
#[derive(Error, Debug)]
pub enum HandlerError {
    /// The event does not carry the id needed to find its target record
    #[error("Event is missing {0}")]
    MissingReference(&'static str),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("GoCardless API error: {0}")]
    Api(#[from] ApiError),

    /// Settings, gateway or account wiring is incomplete
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid timestamp {value:?}: {message}")]
    InvalidTimestamp { value: String, message: String },
}

/// Errors reported by record store implementations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{doctype} {name} not found")]
    NotFound { doctype: &'static str, name: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl StoreError {
    pub fn not_found(doctype: &'static str, name: impl Into<String>) -> Self {
        StoreError::NotFound {
            doctype,
            name: name.into(),
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

/// Errors from the GoCardless REST API client.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status returned by the API
    #[error("GoCardless returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Missing access token for settings {0}")]
    MissingAccessToken(String),

    #[error("Invalid API base URL {url:?}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Unexpected response: {0}")]
    Decode(String),
}

pub type Result<T, E = WebhookError> = std::result::Result<T, E>;
