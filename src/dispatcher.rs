use crate::error::{HandlerError, Result, WebhookError};
use crate::handlers::{self, EventOutcome, LedgerIntegration};
use crate::secrets::SecretCache;
use crate::store::{ErrorLog, RecordStore, SettingsStore};
use crate::types::{Event, EventBatch};
use crate::verification;
use std::sync::Arc;

const BATCH_LOG_TITLE: &str = "GoCardless Webhook";
const EVENT_ERROR_TITLE: &str = "GoCardless Webhook Event Error";
const PAYOUT_ERROR_TITLE: &str = "GoCardless Payout Journal Creation Error";

/// Per-batch counts, mostly for logs and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub applied: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Empty body, nothing was done.
    Empty,
    Processed(BatchSummary),
}

/// Everything the processor needs from the record store.
pub trait Backend: RecordStore + SettingsStore + ErrorLog {}

impl<T: RecordStore + SettingsStore + ErrorLog> Backend for T {}

/// Authenticates a delivery and applies each of its events.
#[derive(Clone)]
pub struct WebhookProcessor {
    secrets: Arc<SecretCache>,
    store: Arc<dyn Backend>,
    ledger: Option<LedgerIntegration>,
}

impl WebhookProcessor {
    /// `ledger` is `None` when the deployment has no accounting module;
    /// payout events are then ignored.
    pub fn new(
        secrets: Arc<SecretCache>,
        store: Arc<dyn Backend>,
        ledger: Option<LedgerIntegration>,
    ) -> Self {
        Self {
            secrets,
            store,
            ledger,
        }
    }

    pub async fn handle_request(&self, body: &[u8], signature: Option<&str>) -> Result<Outcome> {
        if body.is_empty() {
            return Ok(Outcome::Empty);
        }

        let secrets = self.secrets.get().await?;
        if !verification::authenticate(body, signature, secrets.iter()) {
            tracing::warn!(
                signature_present = signature.is_some_and(|s| !s.is_empty()),
                "webhook signature rejected"
            );
            return Err(WebhookError::Unauthenticated);
        }

        let batch: EventBatch = serde_json::from_slice(body)?;
        tracing::info!(events = batch.events.len(), "processing webhook batch");

        let mut summary = BatchSummary::default();
        for event in &batch.events {
            match self.dispatch(event).await {
                Ok(EventOutcome::Applied) => summary.applied += 1,
                Ok(EventOutcome::Skipped(reason)) => {
                    tracing::debug!(
                        event_id = event.body().id.as_deref().unwrap_or(""),
                        resource_type = event.resource_type(),
                        reason,
                        "event skipped"
                    );
                    summary.skipped += 1;
                }
                Err(err) => {
                    summary.failed += 1;
                    self.report_failure(event, &err).await;
                }
            }
        }

        let raw = String::from_utf8_lossy(body);
        if let Err(err) = self.store.log_error(BATCH_LOG_TITLE, &raw).await {
            tracing::warn!(error = %err, "failed to record webhook batch");
        }

        tracing::info!(
            applied = summary.applied,
            skipped = summary.skipped,
            failed = summary.failed,
            "webhook batch processed"
        );
        Ok(Outcome::Processed(summary))
    }

    async fn dispatch(&self, event: &Event) -> Result<EventOutcome, HandlerError> {
        match event {
            Event::Mandate(body) => handlers::apply_mandate_event(&*self.store, body).await,
            Event::PaymentRequestPayment(body) => {
                handlers::apply_payment_event(&*self.store, body).await
            }
            Event::Payout(body) => match &self.ledger {
                Some(ledger) => {
                    handlers::materialize_payout_journal(&*self.store, ledger, body)
                        .await
                        .map(|_| EventOutcome::Applied)
                }
                None => Ok(EventOutcome::Skipped("ledger integration not installed")),
            },
            Event::Unknown { .. } => Ok(EventOutcome::Skipped("unhandled resource type")),
        }
    }

    async fn report_failure(&self, event: &Event, err: &HandlerError) {
        let body = event.body();
        tracing::error!(
            event_id = body.id.as_deref().unwrap_or(""),
            resource_type = event.resource_type(),
            action = %body.action,
            error = %err,
            "webhook event failed"
        );

        let title = match event {
            Event::Payout(_) => PAYOUT_ERROR_TITLE,
            _ => EVENT_ERROR_TITLE,
        };
        let detail = format!("{err}\n\n{body:#?}");
        if let Err(log_err) = self.store.log_error(title, &detail).await {
            tracing::warn!(error = %log_err, "failed to record event failure");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::{GatewaySettings, PaymentRequest, PaymentRequestStatus};
    use chrono::Utc;
    use serde_json::json;

    const SECRET: &str = "whsec_test";

    async fn setup(ledger: bool) -> (Arc<MemoryStore>, WebhookProcessor) {
        let store = Arc::new(MemoryStore::new());
        let secrets = Arc::new(SecretCache::new(store.clone()));
        store
            .save_settings(
                GatewaySettings {
                    name: "Main".into(),
                    webhooks_secret: Some(SECRET.into()),
                    access_token: None,
                    use_sandbox: false,
                    fees_account: None,
                    created_at: Utc::now(),
                },
                &secrets,
            )
            .await
            .unwrap();

        let ledger = ledger.then(|| LedgerIntegration {
            ledger: store.clone(),
            api: Arc::new(
                crate::client::HttpGoCardlessClient::new(std::time::Duration::from_secs(1))
                    .unwrap()
                    .with_base_urls("http://127.0.0.1:9", "http://127.0.0.1:9"),
            ),
        });
        let processor = WebhookProcessor::new(secrets, store.clone(), ledger);
        (store, processor)
    }

    fn signed(body: &serde_json::Value) -> (Vec<u8>, String) {
        let bytes = serde_json::to_vec(body).unwrap();
        let sig = verification::sign(SECRET, &bytes);
        (bytes, sig)
    }

    #[tokio::test]
    async fn test_empty_body_is_noop() {
        let (store, processor) = setup(false).await;
        let outcome = processor.handle_request(b"", None).await.unwrap();
        assert_eq!(outcome, Outcome::Empty);
        assert!(store.error_log().await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_signature_processes_nothing() {
        let (store, processor) = setup(false).await;
        store.insert_mandate("MD001", true).await.unwrap();
        let (body, _) = signed(&json!({"events": [
            {"resource_type": "mandates", "action": "active", "links": {"mandate": "MD001"}}
        ]}));

        let err = processor.handle_request(&body, None).await.unwrap_err();

        assert!(matches!(err, WebhookError::Unauthenticated));
        assert!(store.mandate("MD001").await.unwrap().disabled);
        assert!(store.error_log().await.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_payload() {
        let (store, processor) = setup(false).await;
        for body in [json!({"not_events": []}), json!({"events": "nope"})] {
            let (bytes, sig) = signed(&body);
            let err = processor.handle_request(&bytes, Some(&sig)).await.unwrap_err();
            assert!(matches!(err, WebhookError::MalformedPayload(_)));
        }

        let raw = b"not json";
        let sig = verification::sign(SECRET, raw);
        let err = processor.handle_request(raw, Some(&sig)).await.unwrap_err();
        assert!(matches!(err, WebhookError::MalformedPayload(_)));
        assert!(store.error_log().await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_event_skipped_and_batch_logged() {
        let (store, processor) = setup(false).await;
        store.insert_mandate("MD001", true).await.unwrap();
        let (body, sig) = signed(&json!({"events": [
            {"resource_type": "unknown_future_type", "action": "created", "links": {"thing": "X"}},
            {"resource_type": "mandates", "action": "active", "links": {"mandate": "MD001"}}
        ]}));

        let outcome = processor.handle_request(&body, Some(&sig)).await.unwrap();

        assert_eq!(
            outcome,
            Outcome::Processed(BatchSummary {
                applied: 1,
                skipped: 1,
                failed: 0
            })
        );
        assert!(!store.mandate("MD001").await.unwrap().disabled);
        let log = store.error_log().await;
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].title, "GoCardless Webhook");
        assert!(log[0].detail.contains("unknown_future_type"));
    }

    #[tokio::test]
    async fn test_failing_event_does_not_stop_batch() {
        let (store, processor) = setup(false).await;
        store.insert_mandate("MD002", false).await.unwrap();
        store
            .insert_payment_request(PaymentRequest {
                name: "PR001".into(),
                status: PaymentRequestStatus::Initiated,
                failed_reason: None,
            })
            .await
            .unwrap();
        let (body, sig) = signed(&json!({"events": [
            {"resource_type": "mandates", "action": "active", "links": {"mandate": "MD404"}},
            {"resource_type": "mandates", "action": "failed", "links": {"mandate": "MD002"}},
            {"resource_type": "payments", "action": "confirmed", "links": {"payment": "PM1"},
             "resource_metadata": {"reference_doctype": "Payment Request", "reference_document": "PR001"}}
        ]}));

        let outcome = processor.handle_request(&body, Some(&sig)).await.unwrap();

        assert_eq!(
            outcome,
            Outcome::Processed(BatchSummary {
                applied: 2,
                skipped: 0,
                failed: 1
            })
        );
        assert!(store.mandate("MD002").await.unwrap().disabled);
        assert_eq!(
            store.payment_request("PR001").await.unwrap().status,
            PaymentRequestStatus::Paid
        );
        let titles: Vec<_> = store.error_log().await.into_iter().map(|e| e.title).collect();
        assert_eq!(titles, vec![EVENT_ERROR_TITLE, BATCH_LOG_TITLE]);
    }

    #[tokio::test]
    async fn test_payout_skipped_without_ledger() {
        let (store, processor) = setup(false).await;
        let (body, sig) = signed(&json!({"events": [
            {"resource_type": "payouts", "action": "paid", "links": {"payout": "PO001"}}
        ]}));

        let outcome = processor.handle_request(&body, Some(&sig)).await.unwrap();

        assert_eq!(
            outcome,
            Outcome::Processed(BatchSummary {
                applied: 0,
                skipped: 1,
                failed: 0
            })
        );
        assert!(store.journal_entries().await.is_empty());
    }

    #[tokio::test]
    async fn test_payout_failure_is_logged_not_raised() {
        let (store, processor) = setup(true).await;
        let (body, sig) = signed(&json!({"events": [
            {"resource_type": "payouts", "action": "paid", "links": {"payout": "PO001"}}
        ]}));

        let outcome = processor.handle_request(&body, Some(&sig)).await.unwrap();

        assert!(matches!(outcome, Outcome::Processed(BatchSummary { failed: 1, .. })));
        let titles: Vec<_> = store.error_log().await.into_iter().map(|e| e.title).collect();
        assert_eq!(titles, vec![PAYOUT_ERROR_TITLE, BATCH_LOG_TITLE]);
    }
}
