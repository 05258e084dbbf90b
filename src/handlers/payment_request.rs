use super::EventOutcome;
use crate::error::HandlerError;
use crate::store::RecordStore;
use crate::types::{Comment, EventBody, PaymentRequestStatus};

const COMMENT_BY: &str = "GoCardless";
const COMMENT_EMAIL: &str = "help@gocardless.com";
const DASHBOARD_PAYMENTS_URL: &str = "https://manage.gocardless.com/payments";

/// First character upper-cased, the rest lower-cased.
fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// HTML comment describing the event for the payment request timeline.
pub fn event_comment(event: &EventBody) -> String {
    let mut comment = String::new();
    if !event.action.is_empty() {
        comment.push_str(&format!(
            "<strong>GoCardless Event: <em>{}</em></strong>",
            capitalize(&event.action)
        ));
    }
    if let Some(description) = event.details.description.as_deref().filter(|d| !d.is_empty()) {
        comment.push_str(&format!("<br>{description}"));
    }
    let payment = event
        .links
        .first()
        .and_then(|l| l.payment.as_deref())
        .filter(|p| !p.is_empty());
    if let Some(payment) = payment {
        comment.push_str(&format!(
            "<br><a href='{DASHBOARD_PAYMENTS_URL}/{payment}'>View Payment</a>"
        ));
    }
    comment
}

pub async fn apply_payment_event<S: RecordStore + ?Sized>(
    store: &S,
    event: &EventBody,
) -> Result<EventOutcome, HandlerError> {
    let Some(name) = event
        .resource_metadata
        .reference_document
        .as_deref()
        .filter(|d| !d.is_empty())
    else {
        return Ok(EventOutcome::Skipped("no reference_document"));
    };

    let request = store.payment_request(name).await?;

    let comment = event_comment(event);
    if !comment.is_empty() {
        store
            .add_comment(Comment {
                reference_doctype: "Payment Request".to_string(),
                reference_name: name.to_string(),
                comment_type: "Info".to_string(),
                content: comment,
                comment_by: COMMENT_BY.to_string(),
                comment_email: COMMENT_EMAIL.to_string(),
            })
            .await?;
    }

    let status = request.status;
    match event.action.as_str() {
        "submitted" if status != PaymentRequestStatus::Initiated => {
            store
                .set_payment_request_status(name, PaymentRequestStatus::Initiated)
                .await?;
        }
        "confirmed" if status != PaymentRequestStatus::Paid => {
            store.mark_paid(name).await?;
        }
        "cancelled" if status != PaymentRequestStatus::Cancelled => {
            store.mark_cancelled(name).await?;
        }
        "failed" if status != PaymentRequestStatus::Failed => {
            store
                .set_payment_request_status(name, PaymentRequestStatus::Failed)
                .await?;
            if let Some(reason) = event.details.description.as_deref() {
                if store.supports_failed_reason() {
                    store.set_failed_reason(name, reason).await?;
                }
            }
        }
        action => {
            tracing::debug!(payment_request = name, action, ?status, "no status change");
            return Ok(EventOutcome::Applied);
        }
    }

    tracing::info!(payment_request = name, action = %event.action, from = ?status, "payment request status updated");
    Ok(EventOutcome::Applied)
}
