use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthUser;
use crate::models::{Event, Payment, PaymentStatus};
use crate::services::issuance::{self, IssuanceOutcome};
use crate::services::paystack::GatewayStatus;
use crate::services::reminders;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;

const SIGNATURE_HEADER: &str = "x-paystack-signature";

#[derive(Debug, Deserialize, Validate)]
pub struct InitializePaymentRequest {
    pub event_id: Uuid,
    #[validate(range(min = 1, max = 10))]
    pub quantity: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    pub reference: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    event: String,
    data: WebhookData,
}

#[derive(Debug, Deserialize)]
struct WebhookData {
    reference: String,
}

pub async fn initialize_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<InitializePaymentRequest>,
) -> Result<Response, AppError> {
    req.validate()
        .map_err(|e| AppError::ValidationError(e.to_string()))?;
    let quantity = req.quantity.unwrap_or(1);

    let event: Event =
        sqlx::query_as("SELECT * FROM events WHERE id = $1 AND is_published = true")
            .bind(req.event_id)
            .fetch_optional(&state.db)
            .await?
            .ok_or_else(|| {
                AppError::NotFound("Event not found or not published".to_string())
            })?;

    // Advisory precheck; the authoritative guard is the conditional update at
    // issuance time
    if event.tickets_sold + quantity > event.tickets_total {
        return Err(AppError::Conflict(
            "Not enough tickets available".to_string(),
        ));
    }

    let amount = event.price * Decimal::from(quantity);
    let reference = generate_reference();
    let metadata = json!({
        "event_id": event.id,
        "user_id": user.id,
        "quantity": quantity,
    });

    let initialized = state
        .gateway
        .initialize(&user.email, to_minor_units(amount)?, &reference, metadata)
        .await?;
    ensure_reference_echo(&reference, &initialized.reference)?;

    let payment: Payment = sqlx::query_as(
        "INSERT INTO payments
            (reference, user_id, event_id, quantity, unit_price, amount,
             currency, access_code, authorization_url)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
         RETURNING *",
    )
    .bind(&reference)
    .bind(user.id)
    .bind(event.id)
    .bind(quantity)
    .bind(event.price)
    .bind(amount)
    .bind(&event.currency)
    .bind(&initialized.access_code)
    .bind(&initialized.authorization_url)
    .fetch_one(&state.db)
    .await?;

    tracing::info!(reference = %payment.reference, event_id = %event.id, quantity, "Payment initialized");

    Ok(success(
        json!({
            "authorization_url": initialized.authorization_url,
            "access_code": initialized.access_code,
            "reference": payment.reference,
            "amount": payment.amount,
            "currency": payment.currency,
        }),
        "Payment initialized",
    )
    .into_response())
}

pub async fn verify_payment(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> Result<Response, AppError> {
    let reference = query
        .reference
        .filter(|r| !r.is_empty())
        .ok_or_else(|| AppError::ValidationError("Payment reference required".to_string()))?;

    let verification = state.gateway.verify(&reference).await?;

    match verification.status {
        GatewayStatus::Success => {
            let outcome = issuance::issue_for_reference(
                &state.db,
                &state.config.ticket_secret,
                &reference,
                verification.transaction_id.as_deref(),
            )
            .await?;

            if outcome.newly_issued {
                notify_purchase(&state, &outcome).await;
            }

            Ok(success(
                json!({
                    "reference": outcome.payment.reference,
                    "tickets": outcome.tickets,
                }),
                "Payment verified and tickets issued",
            )
            .into_response())
        }
        GatewayStatus::Failed => {
            issuance::mark_failed(&state.db, &reference).await?;
            Err(AppError::ValidationError(
                "Payment verification failed".to_string(),
            ))
        }
        GatewayStatus::Pending => Err(AppError::ValidationError(
            "Payment has not completed yet".to_string(),
        )),
    }
}

/// Gateway callback. The signature is checked over the raw body before the
/// payload is trusted, and the charge status is re-verified against the
/// gateway rather than taken from the webhook itself. Processing is
/// idempotent, so redelivery of the same event is harmless.
pub async fn paystack_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::AuthError("Missing webhook signature".to_string()))?;

    if !state.gateway.verify_webhook_signature(&body, signature) {
        return Err(AppError::AuthError("Invalid webhook signature".to_string()));
    }

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|_| AppError::ValidationError("Malformed webhook payload".to_string()))?;
    let reference = event.data.reference;

    match event.event.as_str() {
        "charge.success" => match state.gateway.verify(&reference).await {
            Ok(verification) if verification.status == GatewayStatus::Success => {
                match issuance::issue_for_reference(
                    &state.db,
                    &state.config.ticket_secret,
                    &reference,
                    verification.transaction_id.as_deref(),
                )
                .await
                {
                    Ok(outcome) if outcome.newly_issued => notify_purchase(&state, &outcome).await,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!(reference, error = %e, "Webhook issuance failed");
                    }
                }
            }
            Ok(verification) => {
                tracing::warn!(
                    reference,
                    status = ?verification.status,
                    "Webhook claimed success but gateway disagrees"
                );
            }
            Err(e) => {
                tracing::error!(reference, error = %e, "Webhook re-verification failed");
            }
        },
        "charge.failed" => {
            if issuance::mark_failed(&state.db, &reference).await? {
                tracing::info!(reference, "Payment marked failed via webhook");
            }
        }
        other => {
            tracing::debug!(event = other, "Ignoring unhandled webhook event");
        }
    }

    Ok(success(json!({ "received": true }), "Webhook processed").into_response())
}

/// Post-issuance side effects. All failures here are logged and swallowed;
/// the tickets are already committed.
async fn notify_purchase(state: &AppState, outcome: &IssuanceOutcome) {
    let event = &outcome.event;

    if let Err(e) =
        reminders::create_attendee_reminder(&state.db, event, outcome.payment.user_id).await
    {
        tracing::error!(event_id = %event.id, error = %e, "Failed to create attendee reminder");
    }

    match user_email(state, outcome.payment.user_id).await {
        Ok(Some(email)) => {
            let html = format!(
                "<h1>Ticket Purchase Successful</h1>\
                 <p>Your ticket{} for {} ha{} been purchased successfully.</p>",
                if outcome.payment.quantity > 1 { "s" } else { "" },
                event.title,
                if outcome.payment.quantity > 1 { "ve" } else { "s" },
            );
            if let Err(e) = state
                .mailer
                .send(&email, "Ticket Purchase Successful", html)
                .await
            {
                tracing::error!(error = %e, "Failed to email attendee about purchase");
            }
        }
        Ok(None) => {}
        Err(e) => tracing::error!(error = %e, "Failed to look up attendee email"),
    }

    match user_email(state, event.organizer_id).await {
        Ok(Some(email)) => {
            let html = format!(
                "<h1>New Ticket Sale</h1>\
                 <p>{} ticket(s) sold for your event {}.</p>",
                outcome.payment.quantity, event.title,
            );
            if let Err(e) = state.mailer.send(&email, "New Ticket Sale", html).await {
                tracing::error!(error = %e, "Failed to email organizer about sale");
            }
        }
        Ok(None) => {}
        Err(e) => tracing::error!(error = %e, "Failed to look up organizer email"),
    }
}

#[derive(Debug, Serialize, FromRow)]
pub struct EventPayment {
    pub id: Uuid,
    pub reference: String,
    pub event_id: Uuid,
    pub event_title: String,
    pub attendee_name: String,
    pub attendee_email: String,
    pub quantity: i32,
    pub amount: Decimal,
    pub currency: String,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

/// Payments across all of the caller's events, newest first.
pub async fn event_payments(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Response, AppError> {
    user.require_organizer()?;

    let payments: Vec<EventPayment> = sqlx::query_as(
        "SELECT p.id, p.reference, p.event_id, e.title AS event_title,
                u.name AS attendee_name, u.email AS attendee_email,
                p.quantity, p.amount, p.currency, p.status, p.created_at
         FROM payments p
         JOIN events e ON e.id = p.event_id
         JOIN users u ON u.id = p.user_id
         WHERE e.organizer_id = $1
         ORDER BY p.created_at DESC",
    )
    .bind(user.id)
    .fetch_all(&state.db)
    .await?;

    Ok(success(payments, "Payments fetched").into_response())
}

async fn user_email(state: &AppState, user_id: Uuid) -> Result<Option<String>, AppError> {
    let row: Option<(String,)> = sqlx::query_as("SELECT email FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(&state.db)
        .await?;
    Ok(row.map(|(email,)| email))
}

fn generate_reference() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(char::from)
        .collect();
    format!("EVT-{}-{}", Utc::now().timestamp_millis(), suffix.to_lowercase())
}

/// The gateway echoes back the reference it was given; a mismatch means the
/// persisted payment row would not match the transaction being authorized.
fn ensure_reference_echo(submitted: &str, echoed: &str) -> Result<(), AppError> {
    if submitted != echoed {
        tracing::error!(submitted, echoed, "Gateway echoed a different payment reference");
        return Err(AppError::ExternalServiceError(
            "Payment gateway returned a mismatched reference".to_string(),
        ));
    }
    Ok(())
}

fn to_minor_units(amount: Decimal) -> Result<i64, AppError> {
    (amount * Decimal::from(100))
        .round_dp(0)
        .to_i64()
        .ok_or_else(|| AppError::ValidationError("Amount out of range".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_has_expected_shape() {
        let reference = generate_reference();
        assert!(reference.starts_with("EVT-"));
        assert_eq!(reference.split('-').count(), 3);
    }

    #[test]
    fn references_are_unique() {
        let a = generate_reference();
        let b = generate_reference();
        assert_ne!(a, b);
    }

    #[test]
    fn amount_converts_to_minor_units() {
        assert_eq!(to_minor_units(Decimal::new(500000, 2)).unwrap(), 500000);
        assert_eq!(to_minor_units(Decimal::new(1250, 2)).unwrap(), 1250);
        assert_eq!(to_minor_units(Decimal::from(25)).unwrap(), 2500);
    }

    #[test]
    fn matching_reference_echo_is_accepted() {
        assert!(ensure_reference_echo("EVT-1-abc", "EVT-1-abc").is_ok());
    }

    #[test]
    fn mismatched_reference_echo_is_rejected() {
        let err = ensure_reference_echo("EVT-1-abc", "EVT-2-xyz").unwrap_err();
        assert!(matches!(err, AppError::ExternalServiceError(_)));
    }

    #[test]
    fn quantity_bounds_are_enforced() {
        let too_many = InitializePaymentRequest {
            event_id: Uuid::new_v4(),
            quantity: Some(11),
        };
        assert!(too_many.validate().is_err());

        let default_quantity = InitializePaymentRequest {
            event_id: Uuid::new_v4(),
            quantity: None,
        };
        assert!(default_quantity.validate().is_ok());
    }
}
