//! Receiver for GoCardless webhooks: verifies deliveries against the
//! configured webhook secrets and applies mandate, payment request and payout
//! events to local records.

pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod http_server;
pub mod secrets;
pub mod store;
pub mod types;
pub mod verification;

pub use dispatcher::{BatchSummary, Outcome, WebhookProcessor};
pub use error::{HandlerError, StoreError, WebhookError};
pub use secrets::SecretCache;
