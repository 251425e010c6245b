use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use common::error::{AppError, Res};
use db::{models::subscription::Subscription, store::Store};
use serde_json::Value;
use stripe::{Event, EventObject, EventType, Webhook};
use uuid::Uuid;

use crate::dtos::pay::PaymentConfirmed;

/// Creates an event for the webhook based on the request payload and signature.
/// Requires a webhook secret key.
pub fn construct_event(payload: &str, signature: &str, webhook_secret: &str) -> Res<Event> {
    match Webhook::construct_event(payload, signature, webhook_secret) {
        Ok(event) => Ok(event),
        Err(e) => {
            log::warn!("Rejected webhook payload: {}", e);
            Err(AppError::BadRequest(format!("Webhook Error: {}", e)))
        }
    }
}

/// Reads the purchase out of a completed checkout session.
///
/// The checkout is created with `owner_id`, `plan_id` and `duration_key` in its
/// metadata; `amount_total` is in cents.
pub fn payment_from_session(session: &Value) -> Res<PaymentConfirmed> {
    let metadata = &session["metadata"];
    let field = |name: &str| {
        metadata[name]
            .as_str()
            .ok_or_else(|| AppError::BadRequest(format!("Checkout metadata is missing '{}'", name)))
    };
    let parse_id = |name: &str| {
        field(name).and_then(|raw| {
            Uuid::parse_str(raw).map_err(|_| {
                AppError::BadRequest(format!("Checkout metadata '{}' is not a uuid", name))
            })
        })
    };

    Ok(PaymentConfirmed {
        owner_id: parse_id("owner_id")?,
        plan_id: parse_id("plan_id")?,
        duration_key: field("duration_key")?.to_string(),
        amount_charged: session["amount_total"]
            .as_i64()
            .map(|cents| BigDecimal::new(cents.into(), 2)),
    })
}

/// Processes the webhook event.
///
/// # Returns
///
/// The subscription created for a completed checkout, `None` for events that
/// do not confirm a purchase.
pub async fn process_webhook_event(
    store: &dyn Store,
    event: Event,
    now: DateTime<Utc>,
) -> Res<Option<Subscription>> {
    log::info!("Processing webhook event: {}", event.type_);

    match event.type_ {
        EventType::CheckoutSessionCompleted => {
            if let EventObject::CheckoutSession(session) = event.data.object {
                log::info!("Checkout session completed: {}", session.id);
                let session = serde_json::to_value(&session).map_err(|e| {
                    AppError::Internal(format!("Unreadable checkout session: {}", e))
                })?;
                let payment = payment_from_session(&session)?;
                let subscription = super::sub::create_from_payment(store, payment, now).await?;
                return Ok(Some(subscription));
            }
            Ok(None)
        }
        _ => {
            log::info!("Unhandled event type: {}", event.type_);
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use serde_json::json;

    use super::*;

    #[test]
    fn completed_session_becomes_payment() {
        let owner = Uuid::new_v4();
        let plan = Uuid::new_v4();
        let session = json!({
            "id": "cs_test_1",
            "amount_total": 1999,
            "metadata": {
                "owner_id": owner.to_string(),
                "plan_id": plan.to_string(),
                "duration_key": "2-hours"
            }
        });

        let payment = payment_from_session(&session).unwrap();
        assert_eq!(payment.owner_id, owner);
        assert_eq!(payment.plan_id, plan);
        assert_eq!(payment.duration_key, "2-hours");
        assert_eq!(payment.amount_charged, Some(BigDecimal::from_str("19.99").unwrap()));
    }

    #[test]
    fn missing_metadata_is_bad_request() {
        let session = json!({ "id": "cs_test_2", "metadata": { "plan_id": "nope" } });
        assert!(matches!(
            payment_from_session(&session),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn unsigned_payload_is_rejected() {
        assert!(matches!(
            construct_event("{}", "t=1,v1=deadbeef", "whsec_test"),
            Err(AppError::BadRequest(_))
        ));
    }
}
