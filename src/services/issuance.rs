use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Event, Payment, PaymentStatus, Ticket};
use crate::services::qr;
use crate::utils::error::AppError;

// The WHERE clauses of these three statements carry the concurrency
// guarantees: a payment is claimed at most once, inventory never exceeds
// capacity, and only a pending payment can fail.
const CLAIM_PAYMENT_SQL: &str = "UPDATE payments
         SET status = 'success',
             tickets_issued = true,
             transaction_id = COALESCE($2, transaction_id),
             paid_at = now(),
             updated_at = now()
         WHERE reference = $1 AND status = 'pending' AND tickets_issued = false
         RETURNING *";

const RESERVE_INVENTORY_SQL: &str = "UPDATE events
         SET tickets_sold = tickets_sold + $2, updated_at = now()
         WHERE id = $1 AND tickets_sold + $2 <= tickets_total
         RETURNING *";

const MARK_FAILED_SQL: &str = "UPDATE payments SET status = 'failed', updated_at = now()
         WHERE reference = $1 AND status = 'pending'";

/// Result of settling a payment reference. `newly_issued` is false when the
/// reference had already been processed and the stored tickets are returned
/// instead.
#[derive(Debug)]
pub struct IssuanceOutcome {
    pub payment: Payment,
    pub event: Event,
    pub tickets: Vec<Ticket>,
    pub newly_issued: bool,
}

/// Converts a gateway-verified successful payment into tickets.
///
/// The whole sequence runs in one database transaction. The payment row is
/// claimed with a compare-and-set on (status, tickets_issued), so a webhook
/// and a polling client racing on the same reference produce exactly one
/// issuance. The inventory increment is a single conditional update that
/// cannot push `tickets_sold` past `tickets_total`.
pub async fn issue_for_reference(
    db: &PgPool,
    ticket_secret: &str,
    reference: &str,
    transaction_id: Option<&str>,
) -> Result<IssuanceOutcome, AppError> {
    let mut tx = db.begin().await?;

    let claimed: Option<Payment> = sqlx::query_as(CLAIM_PAYMENT_SQL)
        .bind(reference)
        .bind(transaction_id)
        .fetch_optional(&mut *tx)
        .await?;

    let Some(payment) = claimed else {
        tx.rollback().await?;
        return already_settled(db, reference).await;
    };

    let updated_event: Option<Event> = sqlx::query_as(RESERVE_INVENTORY_SQL)
        .bind(payment.event_id)
        .bind(payment.quantity)
        .fetch_optional(&mut *tx)
        .await?;

    let Some(event) = updated_event else {
        tx.rollback().await?;
        // The claim above rolled back with the transaction, so the payment is
        // pending again; settle it as failed.
        mark_failed(db, reference).await?;
        tracing::warn!(reference, "Issuance rejected, not enough tickets available");
        return Err(AppError::Conflict("Not enough tickets available".to_string()));
    };

    let issued_at_base = Utc::now().timestamp_millis();
    let mut tickets = Vec::with_capacity(payment.quantity as usize);

    for unit in 0..payment.quantity {
        let ticket_id = Uuid::new_v4();
        let issued_at_ms = unit_issued_at(issued_at_base, unit);
        let payload = qr::build_payload(
            ticket_secret,
            ticket_id,
            payment.event_id,
            payment.user_id,
            issued_at_ms,
        );
        let payload_json = serde_json::to_string(&payload).map_err(|e| {
            AppError::InternalServerError(format!("Failed to serialize QR payload: {e}"))
        })?;
        let qr_image = qr::render_data_url(&payload_json)?;

        let ticket: Ticket = sqlx::query_as(
            "INSERT INTO tickets (id, event_id, user_id, payment_id, qr_payload, qr_hash, qr_image)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING *",
        )
        .bind(ticket_id)
        .bind(payment.event_id)
        .bind(payment.user_id)
        .bind(payment.id)
        .bind(&payload_json)
        .bind(&payload.token)
        .bind(&qr_image)
        .fetch_one(&mut *tx)
        .await?;

        tickets.push(ticket);
    }

    tx.commit().await?;

    tracing::info!(
        reference,
        event_id = %event.id,
        quantity = payment.quantity,
        "Tickets issued"
    );

    Ok(IssuanceOutcome {
        payment,
        event,
        tickets,
        newly_issued: true,
    })
}

/// CAS pending → failed; returns whether this call performed the transition.
pub async fn mark_failed(db: &PgPool, reference: &str) -> Result<bool, AppError> {
    let result = sqlx::query(MARK_FAILED_SQL)
        .bind(reference)
        .execute(db)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Resolves a reference whose CAS claim did not match: either it was settled
/// before (idempotent success), it terminally failed, or it never existed.
async fn already_settled(db: &PgPool, reference: &str) -> Result<IssuanceOutcome, AppError> {
    let payment: Payment = sqlx::query_as("SELECT * FROM payments WHERE reference = $1")
        .bind(reference)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Payment not found".to_string()))?;

    if payment.status == PaymentStatus::Success && payment.tickets_issued {
        let event: Event = sqlx::query_as("SELECT * FROM events WHERE id = $1")
            .bind(payment.event_id)
            .fetch_one(db)
            .await?;
        let tickets: Vec<Ticket> =
            sqlx::query_as("SELECT * FROM tickets WHERE payment_id = $1 ORDER BY issued_at")
                .bind(payment.id)
                .fetch_all(db)
                .await?;

        tracing::info!(reference, "Reference already settled, returning issued tickets");
        return Ok(IssuanceOutcome {
            payment,
            event,
            tickets,
            newly_issued: false,
        });
    }

    match payment.status {
        // A concurrent settlement holds the claim but has not committed yet
        PaymentStatus::Pending => Err(AppError::Conflict(
            "Payment is still being processed".to_string(),
        )),
        _ => Err(AppError::Conflict(
            "Payment is not in a payable state".to_string(),
        )),
    }
}

fn unit_issued_at(base_ms: i64, unit: i32) -> i64 {
    // Distinct per unit so tokens within one purchase never collide
    base_ms + i64::from(unit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::qr;

    #[test]
    fn units_of_one_purchase_get_distinct_tokens() {
        let secret = "ticket-secret";
        let event = Uuid::new_v4();
        let user = Uuid::new_v4();
        let base = 1_700_000_000_000;

        let first = qr::build_payload(secret, Uuid::new_v4(), event, user, unit_issued_at(base, 0));
        let second = qr::build_payload(secret, Uuid::new_v4(), event, user, unit_issued_at(base, 1));

        assert_ne!(first.token, second.token);
    }

    // The guard predicates below are what make issuance exactly-once and
    // oversell-free; dropping any of them must fail loudly.

    #[test]
    fn payment_claim_requires_pending_and_unissued() {
        assert!(CLAIM_PAYMENT_SQL.contains("status = 'pending'"));
        assert!(CLAIM_PAYMENT_SQL.contains("tickets_issued = false"));
        assert!(CLAIM_PAYMENT_SQL.contains("RETURNING *"));
    }

    #[test]
    fn inventory_reservation_cannot_exceed_capacity() {
        assert!(RESERVE_INVENTORY_SQL.contains("tickets_sold + $2 <= tickets_total"));
        assert!(RESERVE_INVENTORY_SQL.contains("tickets_sold = tickets_sold + $2"));
    }

    #[test]
    fn failure_transition_only_leaves_pending() {
        assert!(MARK_FAILED_SQL.contains("status = 'failed'"));
        assert!(MARK_FAILED_SQL.contains("WHERE reference = $1 AND status = 'pending'"));
    }
}
