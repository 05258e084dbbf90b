//! Per resource type state transitions.

pub mod mandate;
pub mod payment_request;
pub mod payout;

pub use mandate::apply_mandate_event;
pub use payment_request::apply_payment_event;
pub use payout::{materialize_payout_journal, LedgerIntegration};

/// What a handler did with one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Applied,
    /// Nothing to do; the reason is logged.
    Skipped(&'static str),
}
