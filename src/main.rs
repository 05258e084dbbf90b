use anyhow::Context;
use gocardless_webhooks::client::HttpGoCardlessClient;
use gocardless_webhooks::config::Config;
use gocardless_webhooks::handlers::LedgerIntegration;
use gocardless_webhooks::store::MemoryStore;
use gocardless_webhooks::{http_server, SecretCache, WebhookProcessor};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    let store = Arc::new(
        MemoryStore::open(config.data_dir.clone())
            .with_context(|| format!("failed to load records from {}", config.data_dir.display()))?,
    );
    let secrets = Arc::new(SecretCache::new(store.clone()));

    let ledger = if config.ledger_enabled {
        let api = HttpGoCardlessClient::new(config.http_timeout)?
            .with_base_urls(&config.live_url, &config.sandbox_url)
            .with_api_version(&config.api_version);
        Some(LedgerIntegration {
            ledger: store.clone(),
            api: Arc::new(api),
        })
    } else {
        tracing::info!("ledger integration disabled, payout events will be ignored");
        None
    };

    let processor = WebhookProcessor::new(secrets, store, ledger);
    http_server::serve(config.bind_addr, processor)
        .await
        .context("HTTP server error")
}
