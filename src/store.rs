//! Record store seams and the JSON-file-backed store used by the binary.

use crate::error::StoreError;
use crate::secrets::SecretCache;
use crate::types::{
    BankAccount, Comment, DocStatus, ErrorLogEntry, GatewaySettings, JournalEntry, Mandate,
    PaymentGateway, PaymentGatewayAccount, PaymentRequest, PaymentRequestStatus,
};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use uuid::Uuid;

const RECORDS_FILE: &str = "records.json";
const RECORDS_TMP_FILE: &str = "records.json.tmp";
const MAX_ERROR_LOG_ENTRIES: usize = 500;

/// Read access to gateway settings.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// The `webhooks_secret` field of every settings record, live and sandbox.
    async fn webhook_secrets(&self) -> Result<Vec<Option<String>>, StoreError>;

    /// Most recently created settings record with `use_sandbox` off.
    async fn live_settings(&self) -> Result<Option<GatewaySettings>, StoreError>;

    /// Name of the payment gateway controlled by the given settings record.
    async fn payment_gateway_for(&self, controller: &str) -> Result<Option<String>, StoreError>;

    /// Internal payment account linked to a payment gateway.
    async fn payment_account_for(&self, gateway: &str) -> Result<Option<String>, StoreError>;
}

/// Mandate and payment request mutations driven by webhook events.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn set_mandate_disabled(&self, mandate: &str, disabled: bool) -> Result<(), StoreError>;

    async fn payment_request(&self, name: &str) -> Result<PaymentRequest, StoreError>;

    /// Direct status write, no side effects.
    async fn set_payment_request_status(
        &self,
        name: &str,
        status: PaymentRequestStatus,
    ) -> Result<(), StoreError>;

    /// Canonical "paid" transition of the payment request.
    async fn mark_paid(&self, name: &str) -> Result<(), StoreError>;

    /// Canonical "cancelled" transition of the payment request.
    async fn mark_cancelled(&self, name: &str) -> Result<(), StoreError>;

    /// Whether payment requests carry a `failed_reason` field. Older schemas
    /// do not.
    fn supports_failed_reason(&self) -> bool;

    async fn set_failed_reason(&self, name: &str, reason: &str) -> Result<(), StoreError>;

    async fn add_comment(&self, comment: Comment) -> Result<(), StoreError>;
}

/// Accounting ledger. Only present when the deployment has one.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Most recently created bank account whose number ends with `suffix`.
    async fn bank_account_by_suffix(&self, suffix: &str)
        -> Result<Option<BankAccount>, StoreError>;

    /// Validate and store a draft entry, returning its name.
    async fn insert_journal_entry(&self, entry: JournalEntry) -> Result<String, StoreError>;

    async fn submit_journal_entry(&self, name: &str) -> Result<(), StoreError>;
}

/// Persistent error log, read after the fact when debugging deliveries.
#[async_trait]
pub trait ErrorLog: Send + Sync {
    async fn log_error(&self, title: &str, detail: &str) -> Result<(), StoreError>;
}

/// A recorded change of a single field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub doctype: String,
    pub name: String,
    pub field: String,
    pub old: String,
    pub new: String,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Records {
    #[serde(default)]
    settings: Vec<GatewaySettings>,
    #[serde(default)]
    payment_gateways: Vec<PaymentGateway>,
    #[serde(default)]
    payment_gateway_accounts: Vec<PaymentGatewayAccount>,
    #[serde(default)]
    mandates: HashMap<String, Mandate>,
    #[serde(default)]
    payment_requests: HashMap<String, PaymentRequest>,
    #[serde(default)]
    bank_accounts: Vec<BankAccount>,
    #[serde(default)]
    journal_entries: Vec<JournalEntry>,
    #[serde(default)]
    comments: Vec<Comment>,
    #[serde(default)]
    versions: Vec<Version>,
    #[serde(default)]
    error_log: Vec<ErrorLogEntry>,
}

/// In-memory store, optionally mirrored to `records.json` in a data dir
/// after every mutation. A mutation only becomes visible once it is on disk.
pub struct MemoryStore {
    records: RwLock<Records>,
    data_dir: Option<PathBuf>,
    failed_reason_field: bool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Records::default()),
            data_dir: None,
            failed_reason_field: true,
        }
    }

    /// Load `records.json` from `data_dir` if present and persist there.
    pub fn open(data_dir: PathBuf) -> Result<Self, StoreError> {
        let path = data_dir.join(RECORDS_FILE);
        let records = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            Records::default()
        };

        Ok(Self {
            records: RwLock::new(records),
            data_dir: Some(data_dir),
            failed_reason_field: true,
        })
    }

    /// Model a payment request schema without `failed_reason`.
    pub fn without_failed_reason_field(mut self) -> Self {
        self.failed_reason_field = false;
        self
    }

    /// Apply `change` to a staged copy, persist it, then publish it.
    ///
    /// On any error the in-memory records are left untouched.
    async fn mutate<T, F>(&self, change: F) -> Result<T, StoreError>
    where
        T: Send,
        F: FnOnce(&mut Records) -> Result<T, StoreError> + Send,
    {
        let mut records = self.records.write().await;
        let Some(dir) = &self.data_dir else {
            return change(&mut *records);
        };

        let mut staged = records.clone();
        let out = change(&mut staged)?;
        persist(dir, &staged).await?;
        *records = staged;
        Ok(out)
    }

    /// Insert or replace a settings record, then drop the cached secrets.
    pub async fn save_settings(
        &self,
        settings: GatewaySettings,
        secrets: &SecretCache,
    ) -> Result<(), StoreError> {
        self.mutate(|records| {
            records.settings.retain(|s| s.name != settings.name);
            records.settings.push(settings);
            Ok(())
        })
        .await?;
        secrets.invalidate().await;
        Ok(())
    }

    /// Register a payment gateway for a settings record and its payment account.
    pub async fn insert_payment_gateway(
        &self,
        gateway: PaymentGateway,
        payment_account: impl Into<String>,
    ) -> Result<(), StoreError> {
        let account = PaymentGatewayAccount {
            payment_gateway: gateway.name.clone(),
            payment_account: payment_account.into(),
        };
        self.mutate(|records| {
            records.payment_gateway_accounts.push(account);
            records.payment_gateways.push(gateway);
            Ok(())
        })
        .await
    }

    pub async fn insert_mandate(&self, mandate: &str, disabled: bool) -> Result<(), StoreError> {
        self.mutate(|records| {
            records.mandates.insert(
                mandate.to_string(),
                Mandate {
                    mandate: mandate.to_string(),
                    disabled,
                },
            );
            Ok(())
        })
        .await
    }

    pub async fn insert_payment_request(&self, request: PaymentRequest) -> Result<(), StoreError> {
        self.mutate(|records| {
            records
                .payment_requests
                .insert(request.name.clone(), request);
            Ok(())
        })
        .await
    }

    pub async fn insert_bank_account(&self, account: BankAccount) -> Result<(), StoreError> {
        self.mutate(|records| {
            records.bank_accounts.push(account);
            Ok(())
        })
        .await
    }

    pub async fn mandate(&self, mandate: &str) -> Option<Mandate> {
        self.records.read().await.mandates.get(mandate).cloned()
    }

    pub async fn comments(&self) -> Vec<Comment> {
        self.records.read().await.comments.clone()
    }

    pub async fn versions(&self) -> Vec<Version> {
        self.records.read().await.versions.clone()
    }

    pub async fn journal_entries(&self) -> Vec<JournalEntry> {
        self.records.read().await.journal_entries.clone()
    }

    pub async fn error_log(&self) -> Vec<ErrorLogEntry> {
        self.records.read().await.error_log.clone()
    }

    async fn transition(
        &self,
        name: &str,
        status: PaymentRequestStatus,
    ) -> Result<(), StoreError> {
        self.mutate(|records| {
            let request = records
                .payment_requests
                .get_mut(name)
                .ok_or_else(|| StoreError::not_found("Payment Request", name))?;
            let old = request.status;
            request.status = status;
            records.versions.push(Version {
                doctype: "Payment Request".to_string(),
                name: name.to_string(),
                field: "status".to_string(),
                old: format!("{old:?}"),
                new: format!("{status:?}"),
            });
            Ok(())
        })
        .await
    }
}

/// Write through a temp file and rename, so a crash never leaves a
/// truncated `records.json` behind.
async fn persist(dir: &Path, records: &Records) -> Result<(), StoreError> {
    let content = serde_json::to_vec_pretty(records)?;
    tokio::fs::create_dir_all(dir).await?;
    let tmp = dir.join(RECORDS_TMP_FILE);
    tokio::fs::write(&tmp, content).await?;
    tokio::fs::rename(&tmp, dir.join(RECORDS_FILE)).await?;
    Ok(())
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn webhook_secrets(&self) -> Result<Vec<Option<String>>, StoreError> {
        let records = self.records.read().await;
        Ok(records
            .settings
            .iter()
            .map(|s| s.webhooks_secret.clone())
            .collect())
    }

    async fn live_settings(&self) -> Result<Option<GatewaySettings>, StoreError> {
        let records = self.records.read().await;
        Ok(records
            .settings
            .iter()
            .filter(|s| !s.use_sandbox)
            .max_by_key(|s| s.created_at)
            .cloned())
    }

    async fn payment_gateway_for(&self, controller: &str) -> Result<Option<String>, StoreError> {
        let records = self.records.read().await;
        Ok(records
            .payment_gateways
            .iter()
            .find(|g| g.gateway_controller == controller)
            .map(|g| g.name.clone()))
    }

    async fn payment_account_for(&self, gateway: &str) -> Result<Option<String>, StoreError> {
        let records = self.records.read().await;
        Ok(records
            .payment_gateway_accounts
            .iter()
            .find(|a| a.payment_gateway == gateway)
            .map(|a| a.payment_account.clone()))
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn set_mandate_disabled(&self, mandate: &str, disabled: bool) -> Result<(), StoreError> {
        self.mutate(|records| {
            let record = records
                .mandates
                .get_mut(mandate)
                .ok_or_else(|| StoreError::not_found("GoCardless Mandate", mandate))?;
            record.disabled = disabled;
            Ok(())
        })
        .await
    }

    async fn payment_request(&self, name: &str) -> Result<PaymentRequest, StoreError> {
        self.records
            .read()
            .await
            .payment_requests
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::not_found("Payment Request", name))
    }

    async fn set_payment_request_status(
        &self,
        name: &str,
        status: PaymentRequestStatus,
    ) -> Result<(), StoreError> {
        self.transition(name, status).await
    }

    async fn mark_paid(&self, name: &str) -> Result<(), StoreError> {
        self.transition(name, PaymentRequestStatus::Paid).await
    }

    async fn mark_cancelled(&self, name: &str) -> Result<(), StoreError> {
        self.transition(name, PaymentRequestStatus::Cancelled).await
    }

    fn supports_failed_reason(&self) -> bool {
        self.failed_reason_field
    }

    async fn set_failed_reason(&self, name: &str, reason: &str) -> Result<(), StoreError> {
        if !self.failed_reason_field {
            return Err(StoreError::Validation(
                "Payment Request has no failed_reason field".to_string(),
            ));
        }
        self.mutate(|records| {
            let request = records
                .payment_requests
                .get_mut(name)
                .ok_or_else(|| StoreError::not_found("Payment Request", name))?;
            request.failed_reason = Some(reason.to_string());
            Ok(())
        })
        .await
    }

    async fn add_comment(&self, comment: Comment) -> Result<(), StoreError> {
        self.mutate(|records| {
            records.comments.push(comment);
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn bank_account_by_suffix(
        &self,
        suffix: &str,
    ) -> Result<Option<BankAccount>, StoreError> {
        let records = self.records.read().await;
        Ok(records
            .bank_accounts
            .iter()
            .filter(|a| a.bank_account_no.ends_with(suffix))
            .max_by_key(|a| a.created_at)
            .cloned())
    }

    async fn insert_journal_entry(&self, mut entry: JournalEntry) -> Result<String, StoreError> {
        if entry.accounts.is_empty() {
            return Err(StoreError::Validation(
                "Journal Entry has no accounts".to_string(),
            ));
        }
        if !entry.is_balanced() {
            return Err(StoreError::Validation(format!(
                "Total debit {:.2} must equal total credit {:.2}",
                entry.total_debit(),
                entry.total_credit()
            )));
        }

        let name = format!("ACC-JV-{}", &Uuid::new_v4().to_string()[..8]);
        entry.name = Some(name.clone());
        entry.docstatus = DocStatus::Draft;

        self.mutate(|records| {
            records.journal_entries.push(entry);
            Ok(())
        })
        .await?;
        Ok(name)
    }

    async fn submit_journal_entry(&self, name: &str) -> Result<(), StoreError> {
        self.mutate(|records| {
            let entry = records
                .journal_entries
                .iter_mut()
                .find(|e| e.name.as_deref() == Some(name))
                .ok_or_else(|| StoreError::not_found("Journal Entry", name))?;
            entry.docstatus = DocStatus::Submitted;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl ErrorLog for MemoryStore {
    async fn log_error(&self, title: &str, detail: &str) -> Result<(), StoreError> {
        let entry = ErrorLogEntry {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            detail: detail.to_string(),
            logged_at: Utc::now(),
        };
        self.mutate(|records| {
            if records.error_log.len() >= MAX_ERROR_LOG_ENTRIES {
                records.error_log.remove(0);
            }
            records.error_log.push(entry);
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn settings(name: &str, secret: Option<&str>, sandbox: bool, age_days: i64) -> GatewaySettings {
        GatewaySettings {
            name: name.to_string(),
            webhooks_secret: secret.map(str::to_string),
            access_token: None,
            use_sandbox: sandbox,
            fees_account: None,
            created_at: Utc::now() - Duration::days(age_days),
        }
    }

    #[tokio::test]
    async fn test_live_settings_prefers_newest_non_sandbox() {
        let store = MemoryStore::new();
        let cache = SecretCache::new(std::sync::Arc::new(MemoryStore::new()));
        store.save_settings(settings("old", None, false, 10), &cache).await.unwrap();
        store.save_settings(settings("new", None, false, 1), &cache).await.unwrap();
        store.save_settings(settings("sandbox", None, true, 0), &cache).await.unwrap();

        let live = store.live_settings().await.unwrap().unwrap();
        assert_eq!(live.name, "new");
    }

    #[tokio::test]
    async fn test_bank_account_suffix_match_takes_newest() {
        let store = MemoryStore::new();
        for (name, number, age) in [("A", "GB00111112345678", 5), ("B", "GB00999912345678", 1), ("C", "GB0000000000011", 0)] {
            store
                .insert_bank_account(BankAccount {
                    name: name.to_string(),
                    bank_account_no: number.to_string(),
                    account: format!("{name} - Bank"),
                    created_at: Utc::now() - Duration::days(age),
                })
                .await
                .unwrap();
        }

        let found = store.bank_account_by_suffix("78").await.unwrap().unwrap();
        assert_eq!(found.name, "B");
        assert!(store.bank_account_by_suffix("42").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unbalanced_journal_is_rejected() {
        let store = MemoryStore::new();
        let entry = JournalEntry {
            name: None,
            voucher_type: "Journal Entry".to_string(),
            posting_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            cheque_date: NaiveDate::from_ymd_opt(2024, 2, 28).unwrap(),
            cheque_no: "REF".to_string(),
            accounts: vec![
                crate::types::JournalLine::debit("Bank", 10.0),
                crate::types::JournalLine::credit("Clearing", 12.0),
            ],
            docstatus: DocStatus::Draft,
        };

        let err = store.insert_journal_entry(entry).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert!(store.journal_entries().await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_mandate_is_not_found() {
        let store = MemoryStore::new();
        let err = store.set_mandate_disabled("MD404", true).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = MemoryStore::open(dir.path().to_path_buf()).unwrap();
            store.insert_mandate("MD001", false).await.unwrap();
            store.set_mandate_disabled("MD001", true).await.unwrap();
        }

        assert!(!dir.path().join(RECORDS_TMP_FILE).exists());

        let reopened = MemoryStore::open(dir.path().to_path_buf()).unwrap();
        assert_eq!(
            reopened.mandate("MD001").await,
            Some(Mandate {
                mandate: "MD001".to_string(),
                disabled: true
            })
        );
    }

    fn balanced_entry() -> JournalEntry {
        JournalEntry {
            name: None,
            voucher_type: "Journal Entry".to_string(),
            posting_date: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
            cheque_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            cheque_no: "REF".to_string(),
            accounts: vec![
                crate::types::JournalLine::debit("Bank", 100.0),
                crate::types::JournalLine::credit("Clearing", 100.0),
            ],
            docstatus: DocStatus::Draft,
        }
    }

    #[tokio::test]
    async fn test_failed_write_leaves_journal_untouched() {
        // A regular file where the data dir should be.
        let not_a_dir = tempfile::NamedTempFile::new().unwrap();
        let store = MemoryStore::open(not_a_dir.path().to_path_buf()).unwrap();

        let err = store.insert_journal_entry(balanced_entry()).await.unwrap_err();

        assert!(matches!(err, StoreError::Io(_)));
        assert!(store.journal_entries().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_write_rolls_back_mandate_change() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::open(dir.path().to_path_buf()).unwrap();
        store.insert_mandate("MD001", false).await.unwrap();

        // Replace records.json with a non-empty directory so the rename fails.
        let records = dir.path().join(RECORDS_FILE);
        std::fs::remove_file(&records).unwrap();
        std::fs::create_dir(&records).unwrap();
        std::fs::write(records.join("keep"), b"x").unwrap();

        assert!(store.set_mandate_disabled("MD001", true).await.is_err());
        assert!(!store.mandate("MD001").await.unwrap().disabled);
    }
}
