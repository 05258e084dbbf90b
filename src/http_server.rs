use crate::dispatcher::{Outcome, WebhookProcessor};
use crate::error::WebhookError;
use crate::verification::SIGNATURE_HEADER;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use tokio::net::TcpListener;

pub const WEBHOOK_PATH: &str = "/webhooks/gocardless";

pub fn router(processor: WebhookProcessor) -> Router {
    Router::new()
        .route(WEBHOOK_PATH, post(handle_webhook))
        .route("/health", get(|| async { StatusCode::OK }))
        .with_state(processor)
}

/// Bind and serve until the process is stopped.
pub async fn serve(addr: SocketAddr, processor: WebhookProcessor) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "webhook receiver listening");
    axum::serve(listener, router(processor)).await
}

#[tracing::instrument(name = "gocardless_webhook", skip_all, fields(delivery_id = %uuid::Uuid::new_v4()))]
async fn handle_webhook(
    State(processor): State<WebhookProcessor>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    match processor.handle_request(&body, signature).await {
        Ok(Outcome::Empty | Outcome::Processed(_)) => StatusCode::OK,
        Err(WebhookError::Unauthenticated) => StatusCode::UNAUTHORIZED,
        Err(WebhookError::MalformedPayload(message)) => {
            tracing::warn!(%message, "rejecting malformed webhook payload");
            StatusCode::BAD_REQUEST
        }
        Err(err) => {
            tracing::error!(error = %err, "webhook request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
