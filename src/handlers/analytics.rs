use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::models::Event;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;

#[derive(Debug, FromRow)]
struct TicketStats {
    total: i64,
    scanned: i64,
}

#[derive(Debug, FromRow)]
struct RevenueStats {
    revenue: Decimal,
    payments: i64,
}

pub async fn event_analytics(
    State(state): State<AppState>,
    user: AuthUser,
    Path(event_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let event: Event = sqlx::query_as("SELECT * FROM events WHERE id = $1")
        .bind(event_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Event not found".to_string()))?;

    if event.organizer_id != user.id {
        return Err(AppError::Forbidden(
            "Not authorized to view analytics for this event".to_string(),
        ));
    }

    let tickets: TicketStats = sqlx::query_as(
        "SELECT COUNT(*) AS total, COUNT(*) FILTER (WHERE scanned) AS scanned
         FROM tickets WHERE event_id = $1",
    )
    .bind(event_id)
    .fetch_one(&state.db)
    .await?;

    let revenue: RevenueStats = sqlx::query_as(
        "SELECT COALESCE(SUM(amount), 0) AS revenue, COUNT(*) AS payments
         FROM payments WHERE event_id = $1 AND status = 'success'",
    )
    .bind(event_id)
    .fetch_one(&state.db)
    .await?;

    Ok(success(
        json!({
            "event": {
                "id": event.id,
                "title": event.title,
                "tickets_total": event.tickets_total,
                "tickets_sold": event.tickets_sold,
            },
            "analytics": {
                "tickets": {
                    "total": tickets.total,
                    "scanned": tickets.scanned,
                    "attendance_rate": percentage(tickets.scanned, tickets.total),
                },
                "revenue": {
                    "total": revenue.revenue,
                    "currency": event.currency,
                    "successful_payments": revenue.payments,
                },
                "summary": {
                    "tickets_available": event.tickets_available(),
                    "sold_out_percentage": percentage(
                        i64::from(event.tickets_sold),
                        i64::from(event.tickets_total),
                    ),
                },
            },
        }),
        "Analytics fetched",
    )
    .into_response())
}

#[derive(Debug, FromRow)]
struct OrganizerStats {
    events: i64,
    published_events: i64,
    tickets_sold: i64,
    revenue: Decimal,
}

/// Roll-up across all of the caller's events.
pub async fn organizer_analytics(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Response, AppError> {
    let stats: OrganizerStats = sqlx::query_as(
        "SELECT COUNT(*) AS events,
                COUNT(*) FILTER (WHERE is_published) AS published_events,
                COALESCE(SUM(tickets_sold), 0) AS tickets_sold,
                COALESCE((SELECT SUM(p.amount)
                          FROM payments p
                          JOIN events e2 ON e2.id = p.event_id
                          WHERE e2.organizer_id = $1 AND p.status = 'success'), 0) AS revenue
         FROM events WHERE organizer_id = $1",
    )
    .bind(user.id)
    .fetch_one(&state.db)
    .await?;

    Ok(success(
        json!({
            "events": stats.events,
            "published_events": stats.published_events,
            "tickets_sold": stats.tickets_sold,
            "revenue": stats.revenue,
        }),
        "Analytics fetched",
    )
    .into_response())
}

fn percentage(part: i64, whole: i64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    ((part as f64 / whole as f64) * 10_000.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_is_rounded_to_two_places() {
        assert_eq!(percentage(1, 3), 33.33);
        assert_eq!(percentage(2, 3), 66.67);
        assert_eq!(percentage(5, 5), 100.0);
    }

    #[test]
    fn empty_event_has_zero_rates() {
        assert_eq!(percentage(0, 0), 0.0);
    }
}
