//! GoCardless REST API access needed to book payouts.

use crate::error::ApiError;
use crate::types::{CreditorBankAccount, GatewaySettings, Payout};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use reqwest::Url;
use serde::Deserialize;
use std::time::Duration;

pub const LIVE_URL: &str = "https://api.gocardless.com";
pub const SANDBOX_URL: &str = "https://api-sandbox.gocardless.com";
pub const API_VERSION: &str = "2015-07-06";

#[async_trait]
pub trait GoCardlessApi: Send + Sync {
    async fn get_payout(&self, settings: &GatewaySettings, id: &str) -> Result<Payout, ApiError>;

    async fn get_creditor_bank_account(
        &self,
        settings: &GatewaySettings,
        id: &str,
    ) -> Result<CreditorBankAccount, ApiError>;
}

#[derive(Deserialize)]
struct PayoutEnvelope {
    payouts: Payout,
}

#[derive(Deserialize)]
struct CreditorBankAccountEnvelope {
    creditor_bank_accounts: CreditorBankAccount,
}

/// `reqwest` client authenticating with each settings record's access token.
#[derive(Debug, Clone)]
pub struct HttpGoCardlessClient {
    http: reqwest::Client,
    live_url: String,
    sandbox_url: String,
    api_version: String,
}

impl HttpGoCardlessClient {
    pub fn new(timeout: Duration) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("gocardless-webhooks/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            live_url: LIVE_URL.to_string(),
            sandbox_url: SANDBOX_URL.to_string(),
            api_version: API_VERSION.to_string(),
        })
    }

    pub fn with_base_urls(mut self, live: impl Into<String>, sandbox: impl Into<String>) -> Self {
        self.live_url = live.into();
        self.sandbox_url = sandbox.into();
        self
    }

    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    fn base_url(&self, settings: &GatewaySettings) -> &str {
        if settings.use_sandbox {
            &self.sandbox_url
        } else {
            &self.live_url
        }
    }

    /// `{base}/{collection}/{id}`, with `id` percent-encoded as one segment.
    fn resource_url(
        &self,
        settings: &GatewaySettings,
        collection: &str,
        id: &str,
    ) -> Result<Url, ApiError> {
        let base = self.base_url(settings);
        let invalid = |message: String| ApiError::InvalidUrl {
            url: base.to_string(),
            message,
        };
        let mut url = Url::parse(base).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| invalid("cannot be a base".to_string()))?
            .pop_if_empty()
            .push(collection)
            .push(id);
        Ok(url)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        settings: &GatewaySettings,
        collection: &str,
        id: &str,
    ) -> Result<T, ApiError> {
        let token = settings
            .access_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::MissingAccessToken(settings.name.clone()))?;
        let url = self.resource_url(settings, collection, id)?;

        let resp = self
            .http
            .get(url)
            .bearer_auth(token)
            .header("GoCardless-Version", &self.api_version)
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = resp.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(format!("{collection}/{id}: {e}")))
    }
}

#[async_trait]
impl GoCardlessApi for HttpGoCardlessClient {
    async fn get_payout(&self, settings: &GatewaySettings, id: &str) -> Result<Payout, ApiError> {
        let envelope: PayoutEnvelope = self.get(settings, "payouts", id).await?;
        Ok(envelope.payouts)
    }

    async fn get_creditor_bank_account(
        &self,
        settings: &GatewaySettings,
        id: &str,
    ) -> Result<CreditorBankAccount, ApiError> {
        let envelope: CreditorBankAccountEnvelope = self
            .get(settings, "creditor_bank_accounts", id)
            .await?;
        Ok(envelope.creditor_bank_accounts)
    }
}
