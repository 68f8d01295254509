use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::models::{Event, Ticket};
use crate::services::qr;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub qr_data: String,
}

// The scanned guard makes consuming a ticket a one-way transition even when
// two scanners race on the same code.
const SCAN_TICKET_SQL: &str = "UPDATE tickets SET scanned = true, scanned_at = now(), scanned_by = $2
         WHERE id = $1 AND scanned = false
         RETURNING *";

pub async fn list_my_tickets(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Response, AppError> {
    let tickets: Vec<Ticket> =
        sqlx::query_as("SELECT * FROM tickets WHERE user_id = $1 ORDER BY issued_at DESC")
            .bind(user.id)
            .fetch_all(&state.db)
            .await?;

    Ok(success(tickets, "Tickets fetched").into_response())
}

pub async fn get_ticket(
    State(state): State<AppState>,
    user: AuthUser,
    Path(ticket_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let ticket: Ticket = sqlx::query_as("SELECT * FROM tickets WHERE id = $1")
        .bind(ticket_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Ticket not found".to_string()))?;

    if ticket.user_id != user.id {
        let event: Event = sqlx::query_as("SELECT * FROM events WHERE id = $1")
            .bind(ticket.event_id)
            .fetch_one(&state.db)
            .await?;
        if event.organizer_id != user.id {
            return Err(AppError::Forbidden(
                "Not authorized to view this ticket".to_string(),
            ));
        }
    }

    Ok(success(ticket, "Ticket fetched").into_response())
}

/// Validates and consumes a ticket's entry privilege. The scanned flag is a
/// one-way transition taken with a conditional update; a second scan of the
/// same ticket is rejected and leaves the scan metadata untouched.
pub async fn scan_ticket(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<ScanRequest>,
) -> Result<Response, AppError> {
    if req.qr_data.is_empty() {
        return Err(AppError::ValidationError(
            "QR code data required".to_string(),
        ));
    }

    let payload = qr::parse_payload(&req.qr_data)?;

    let ticket: Ticket = sqlx::query_as("SELECT * FROM tickets WHERE id = $1")
        .bind(payload.ticket_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Ticket not found".to_string()))?;

    let event: Event = sqlx::query_as("SELECT * FROM events WHERE id = $1")
        .bind(ticket.event_id)
        .fetch_one(&state.db)
        .await?;

    if event.organizer_id != user.id {
        return Err(AppError::Forbidden(
            "Not authorized to scan tickets for this event".to_string(),
        ));
    }

    if !qr::validate_payload(&state.config.ticket_secret, &payload, &ticket.qr_hash) {
        return Err(AppError::ValidationError("Invalid QR code".to_string()));
    }

    let scanned: Option<Ticket> = sqlx::query_as(SCAN_TICKET_SQL)
        .bind(ticket.id)
        .bind(user.id)
        .fetch_optional(&state.db)
        .await?;

    let ticket = scanned.ok_or_else(|| {
        tracing::info!(ticket_id = %ticket.id, "Rejected repeat scan");
        AppError::Conflict("Ticket already scanned".to_string())
    })?;

    tracing::info!(ticket_id = %ticket.id, scanned_by = %user.id, "Ticket scanned");

    Ok(success(
        json!({
            "ticket_id": ticket.id,
            "event": event.title,
            "scanned_at": ticket.scanned_at,
        }),
        "Ticket validated successfully",
    )
    .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_is_a_one_way_transition() {
        assert!(SCAN_TICKET_SQL.contains("scanned = true"));
        assert!(SCAN_TICKET_SQL.contains("WHERE id = $1 AND scanned = false"));
    }
}
