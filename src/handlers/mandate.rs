use super::EventOutcome;
use crate::error::HandlerError;
use crate::store::RecordStore;
use crate::types::EventBody;

/// Mandate actions that leave the mandate usable.
const ENABLING_ACTIONS: [&str; 4] = [
    "pending_customer_approval",
    "pending_submission",
    "submitted",
    "active",
];

/// Any action outside the enabling set disables the mandate, including ones
/// GoCardless adds later.
pub fn disables_mandate(action: &str) -> bool {
    !ENABLING_ACTIONS.contains(&action)
}

pub async fn apply_mandate_event<S: RecordStore + ?Sized>(
    store: &S,
    event: &EventBody,
) -> Result<EventOutcome, HandlerError> {
    let mandates: Vec<&str> = event
        .links
        .iter()
        .filter_map(|l| l.mandate.as_deref())
        .filter(|m| !m.is_empty())
        .collect();
    if mandates.is_empty() {
        return Ok(EventOutcome::Skipped("no mandate link"));
    }

    let disabled = disables_mandate(&event.action);
    for mandate in mandates {
        store.set_mandate_disabled(mandate, disabled).await?;
        tracing::info!(mandate, action = %event.action, disabled, "mandate status updated");
    }

    Ok(EventOutcome::Applied)
}
