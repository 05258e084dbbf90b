use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ─── Webhook wire types ─────────────────────────────────────────────────────

/// Body of a GoCardless webhook delivery.
#[derive(Debug, Clone, Deserialize)]
pub struct EventBatch {
    pub events: Vec<Event>,
}

/// The `links` object of an event. Only the roles this service acts on are
/// named; GoCardless sends many more.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLinks {
    #[serde(default)]
    pub mandate: Option<String>,
    #[serde(default)]
    pub payment: Option<String>,
    #[serde(default)]
    pub payout: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDetails {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub cause: Option<String>,
    #[serde(default)]
    pub origin: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMetadata {
    #[serde(default)]
    pub reference_doctype: Option<String>,
    #[serde(default)]
    pub reference_document: Option<String>,
}

/// Fields shared by every event kind once decoded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventBody {
    pub id: Option<String>,
    pub action: String,
    /// Normalized to a list whichever shape the sender used.
    pub links: Vec<EventLinks>,
    pub details: EventDetails,
    pub resource_metadata: ResourceMetadata,
}

impl EventBody {
    /// First non-empty value of a link role across all link entries.
    pub fn link(&self, role: impl Fn(&EventLinks) -> Option<&String>) -> Option<&str> {
        self.links
            .iter()
            .filter_map(|l| role(l))
            .map(String::as_str)
            .find(|s| !s.is_empty())
    }
}

/// A webhook event, routed by resource type when it is decoded.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawEvent")]
pub enum Event {
    Mandate(EventBody),
    /// A payment created for a local Payment Request.
    PaymentRequestPayment(EventBody),
    Payout(EventBody),
    /// Any resource type (or payment target) this service does not act on.
    Unknown {
        resource_type: Option<String>,
        body: EventBody,
    },
}

impl Event {
    pub fn body(&self) -> &EventBody {
        match self {
            Event::Mandate(body)
            | Event::PaymentRequestPayment(body)
            | Event::Payout(body)
            | Event::Unknown { body, .. } => body,
        }
    }

    pub fn resource_type(&self) -> &str {
        match self {
            Event::Mandate(_) => "mandates",
            Event::PaymentRequestPayment(_) => "payments",
            Event::Payout(_) => "payouts",
            Event::Unknown { resource_type, .. } => resource_type.as_deref().unwrap_or(""),
        }
    }
}

/// GoCardless sends `links` either as an object or as a list of objects.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<EventLinks>),
    One(EventLinks),
}

#[derive(Debug, Clone, Deserialize)]
struct RawEvent {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    resource_type: Option<String>,
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    links: Option<OneOrMany>,
    #[serde(default)]
    details: Option<EventDetails>,
    #[serde(default)]
    resource_metadata: Option<ResourceMetadata>,
}

const PAYMENT_REQUEST_DOCTYPE: &str = "Payment Request";

impl From<RawEvent> for Event {
    fn from(raw: RawEvent) -> Self {
        let links = match raw.links {
            Some(OneOrMany::One(link)) => vec![link],
            Some(OneOrMany::Many(links)) => links,
            None => Vec::new(),
        };
        let body = EventBody {
            id: raw.id,
            action: raw.action.unwrap_or_default(),
            links,
            details: raw.details.unwrap_or_default(),
            resource_metadata: raw.resource_metadata.unwrap_or_default(),
        };

        match raw.resource_type.as_deref() {
            Some("mandates") => Event::Mandate(body),
            Some("payments")
                if body.resource_metadata.reference_doctype.as_deref()
                    == Some(PAYMENT_REQUEST_DOCTYPE) =>
            {
                Event::PaymentRequestPayment(body)
            }
            Some("payouts") => Event::Payout(body),
            _ => Event::Unknown {
                resource_type: raw.resource_type,
                body,
            },
        }
    }
}

// ─── Local records ──────────────────────────────────────────────────────────

/// GoCardless gateway settings. One record per connected account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySettings {
    pub name: String,
    #[serde(default)]
    pub webhooks_secret: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub use_sandbox: bool,
    #[serde(default)]
    pub fees_account: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentGateway {
    pub name: String,
    pub gateway_controller: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentGatewayAccount {
    pub payment_gateway: String,
    pub payment_account: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mandate {
    pub mandate: String,
    #[serde(default)]
    pub disabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentRequestStatus {
    Draft,
    Initiated,
    Paid,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub name: String,
    pub status: PaymentRequestStatus,
    #[serde(default)]
    pub failed_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankAccount {
    pub name: String,
    pub bank_account_no: String,
    /// Ledger account deposits land in.
    pub account: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub reference_doctype: String,
    pub reference_name: String,
    pub comment_type: String,
    pub content: String,
    pub comment_by: String,
    pub comment_email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorLogEntry {
    pub id: String,
    pub title: String,
    pub detail: String,
    pub logged_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalLine {
    pub account: String,
    pub debit: f64,
    pub credit: f64,
    pub debit_in_account_currency: f64,
    pub credit_in_account_currency: f64,
}

impl JournalLine {
    pub fn debit(account: impl Into<String>, amount: f64) -> Self {
        Self {
            account: account.into(),
            debit: amount,
            credit: 0.0,
            debit_in_account_currency: amount,
            credit_in_account_currency: 0.0,
        }
    }

    pub fn credit(account: impl Into<String>, amount: f64) -> Self {
        Self {
            account: account.into(),
            debit: 0.0,
            credit: amount,
            debit_in_account_currency: 0.0,
            credit_in_account_currency: amount,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocStatus {
    Draft,
    Submitted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    #[serde(default)]
    pub name: Option<String>,
    pub voucher_type: String,
    pub posting_date: NaiveDate,
    pub cheque_date: NaiveDate,
    pub cheque_no: String,
    pub accounts: Vec<JournalLine>,
    pub docstatus: DocStatus,
}

const BALANCE_TOLERANCE: f64 = 0.005;

impl JournalEntry {
    pub fn total_debit(&self) -> f64 {
        self.accounts.iter().map(|l| l.debit).sum()
    }

    pub fn total_credit(&self) -> f64 {
        self.accounts.iter().map(|l| l.credit).sum()
    }

    pub fn is_balanced(&self) -> bool {
        (self.total_debit() - self.total_credit()).abs() < BALANCE_TOLERANCE
    }
}

// ─── GoCardless API resources ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PayoutLinks {
    #[serde(default)]
    pub creditor_bank_account: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Payout {
    pub id: String,
    /// Minor currency units.
    pub amount: i64,
    /// Minor currency units.
    pub deducted_fees: i64,
    pub created_at: String,
    pub arrival_date: NaiveDate,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub links: PayoutLinks,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreditorBankAccount {
    pub id: String,
    #[serde(default)]
    pub account_number_ending: Option<String>,
}
