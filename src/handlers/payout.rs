use crate::client::GoCardlessApi;
use crate::error::HandlerError;
use crate::store::{LedgerStore, SettingsStore};
use crate::types::{DocStatus, EventBody, JournalEntry, JournalLine, Payout};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::sync::Arc;

/// Ledger plus the API needed to look payouts up. Absent when the
/// deployment has no accounting module.
#[derive(Clone)]
pub struct LedgerIntegration {
    pub ledger: Arc<dyn LedgerStore>,
    pub api: Arc<dyn GoCardlessApi>,
}

/// Accounts a payout journal is booked against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayoutAccounts {
    /// Bank ledger account the payout lands in.
    pub deposit: String,
    pub fees: String,
    /// Clearing account payments were collected into.
    pub payment: String,
}

fn minor_to_major(amount: i64) -> f64 {
    amount as f64 / 100.0
}

/// Calendar date of a GoCardless timestamp, in the timestamp's own offset.
pub fn parse_created_date(value: &str) -> Result<NaiveDate, HandlerError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.date_naive());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(dt.date());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|e| HandlerError::InvalidTimestamp {
        value: value.to_string(),
        message: e.to_string(),
    })
}

/// Three-line entry: bank debit, fees debit, clearing credit of the gross.
pub fn build_payout_journal(
    payout: &Payout,
    accounts: &PayoutAccounts,
) -> Result<JournalEntry, HandlerError> {
    let amount = minor_to_major(payout.amount);
    let fees = minor_to_major(payout.deducted_fees);

    Ok(JournalEntry {
        name: None,
        voucher_type: "Journal Entry".to_string(),
        posting_date: payout.arrival_date,
        cheque_date: parse_created_date(&payout.created_at)?,
        cheque_no: payout.reference.clone().unwrap_or_else(|| payout.id.clone()),
        accounts: vec![
            JournalLine::debit(&accounts.deposit, amount),
            JournalLine::debit(&accounts.fees, fees),
            JournalLine::credit(&accounts.payment, amount + fees),
        ],
        docstatus: DocStatus::Draft,
    })
}

fn config_error(message: impl Into<String>) -> HandlerError {
    HandlerError::Config(message.into())
}

/// Book a paid-out payout into the ledger and submit it. Returns the
/// journal entry name.
pub async fn materialize_payout_journal<S: SettingsStore + ?Sized>(
    settings_store: &S,
    integration: &LedgerIntegration,
    event: &EventBody,
) -> Result<String, HandlerError> {
    let payout_id = event
        .link(|l| l.payout.as_ref())
        .ok_or(HandlerError::MissingReference("links.payout"))?;

    let settings = settings_store
        .live_settings()
        .await?
        .ok_or_else(|| config_error("no live GoCardless settings"))?;
    let gateway = settings_store
        .payment_gateway_for(&settings.name)
        .await?
        .ok_or_else(|| config_error(format!("no payment gateway for {}", settings.name)))?;
    let payment_account = settings_store
        .payment_account_for(&gateway)
        .await?
        .ok_or_else(|| config_error(format!("no payment account for gateway {gateway}")))?;
    let fees_account = settings
        .fees_account
        .clone()
        .filter(|a| !a.is_empty())
        .ok_or_else(|| config_error(format!("no fees account on {}", settings.name)))?;

    let payout = integration.api.get_payout(&settings, payout_id).await?;
    let creditor_account_id = payout
        .links
        .creditor_bank_account
        .as_deref()
        .ok_or(HandlerError::MissingReference("payout links.creditor_bank_account"))?;
    let ending = integration
        .api
        .get_creditor_bank_account(&settings, creditor_account_id)
        .await?
        .account_number_ending
        .filter(|e| !e.is_empty())
        .ok_or(HandlerError::MissingReference("account_number_ending"))?;

    let bank_account = integration
        .ledger
        .bank_account_by_suffix(&ending)
        .await?
        .ok_or_else(|| config_error(format!("no bank account ending in {ending}")))?;

    let accounts = PayoutAccounts {
        deposit: bank_account.account,
        fees: fees_account,
        payment: payment_account,
    };
    let entry = build_payout_journal(&payout, &accounts)?;
    let posting_date = entry.posting_date;

    let name = integration.ledger.insert_journal_entry(entry).await?;
    integration.ledger.submit_journal_entry(&name).await?;

    tracing::info!(
        payout = %payout.id,
        journal_entry = %name,
        posting_date = %posting_date,
        amount = payout.amount,
        deducted_fees = payout.deducted_fees,
        "payout journal submitted"
    );
    Ok(name)
}
