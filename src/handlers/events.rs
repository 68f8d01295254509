use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{AuthUser, MaybeAuthUser};
use crate::models::Event;
use crate::services::reminders;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateEventRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    pub description: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub category: Option<String>,
    #[validate(length(min = 1, max = 200))]
    pub venue: String,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    #[validate(length(min = 1, max = 100))]
    pub country: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub price: Decimal,
    #[validate(length(min = 3, max = 3))]
    pub currency: Option<String>,
    #[validate(range(min = 1))]
    pub tickets_total: i32,
    pub reminder_hours: Option<Vec<i32>>,
    pub is_published: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateEventRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    pub description: Option<String>,
    #[validate(length(min = 1, max = 200))]
    pub venue: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub city: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub country: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub price: Option<Decimal>,
    #[validate(range(min = 1))]
    pub tickets_total: Option<i32>,
    pub reminder_hours: Option<Vec<i32>>,
    pub is_published: Option<bool>,
}

fn validate_schedule(
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
) -> Result<(), AppError> {
    if let Some(end) = end_time {
        if end <= start_time {
            return Err(AppError::ValidationError(
                "end_time must be after start_time".to_string(),
            ));
        }
    }
    Ok(())
}

fn validate_price(price: Decimal) -> Result<(), AppError> {
    if price < Decimal::ZERO {
        return Err(AppError::ValidationError(
            "price cannot be negative".to_string(),
        ));
    }
    Ok(())
}

pub async fn create_event(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CreateEventRequest>,
) -> Result<Response, AppError> {
    user.require_organizer()?;
    req.validate()
        .map_err(|e| AppError::ValidationError(e.to_string()))?;
    validate_schedule(req.start_time, req.end_time)?;
    validate_price(req.price)?;

    let event: Event = sqlx::query_as(
        "INSERT INTO events
            (organizer_id, title, description, category, venue, city, country,
             start_time, end_time, price, currency, tickets_total,
             reminder_hours, is_published)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
         RETURNING *",
    )
    .bind(user.id)
    .bind(req.title.trim())
    .bind(&req.description)
    .bind(req.category.as_deref().unwrap_or("other"))
    .bind(&req.venue)
    .bind(&req.city)
    .bind(&req.country)
    .bind(req.start_time)
    .bind(req.end_time)
    .bind(req.price)
    .bind(req.currency.as_deref().unwrap_or("NGN"))
    .bind(req.tickets_total)
    .bind(req.reminder_hours.unwrap_or_else(|| vec![24]))
    .bind(req.is_published.unwrap_or(false))
    .fetch_one(&state.db)
    .await?;

    let seeded = reminders::create_event_reminders(&state.db, &event).await?;

    tracing::info!(
        event_id = %event.id,
        organizer_id = %user.id,
        reminders = seeded.len(),
        "Event created"
    );

    Ok(created(event, "Event created").into_response())
}

pub async fn list_events(State(state): State<AppState>) -> Result<Response, AppError> {
    let events: Vec<Event> =
        sqlx::query_as("SELECT * FROM events WHERE is_published = true ORDER BY created_at DESC")
            .fetch_all(&state.db)
            .await?;

    Ok(success(events, "Events fetched").into_response())
}

pub async fn get_event(
    State(state): State<AppState>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    Path(event_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let event: Event = sqlx::query_as("SELECT * FROM events WHERE id = $1")
        .bind(event_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Event not found".to_string()))?;

    // Unpublished events are only visible to their organizer
    let is_owner = viewer.map(|v| v.id == event.organizer_id).unwrap_or(false);
    if !event.is_published && !is_owner {
        return Err(AppError::NotFound("Event not found".to_string()));
    }

    Ok(success(event, "Event fetched").into_response())
}

pub async fn update_event(
    State(state): State<AppState>,
    user: AuthUser,
    Path(event_id): Path<Uuid>,
    Json(req): Json<UpdateEventRequest>,
) -> Result<Response, AppError> {
    user.require_organizer()?;
    req.validate()
        .map_err(|e| AppError::ValidationError(e.to_string()))?;
    if let Some(price) = req.price {
        validate_price(price)?;
    }

    let existing: Event = sqlx::query_as("SELECT * FROM events WHERE id = $1")
        .bind(event_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Event not found".to_string()))?;

    if existing.organizer_id != user.id {
        return Err(AppError::Forbidden(
            "Only the event's organizer can update it".to_string(),
        ));
    }

    validate_schedule(
        req.start_time.unwrap_or(existing.start_time),
        req.end_time.or(existing.end_time),
    )?;

    // The sold-count guard rides in the statement so a concurrent sale cannot
    // slip the capacity below what is already sold
    let updated: Option<Event> = sqlx::query_as(
        "UPDATE events SET
            title = COALESCE($3, title),
            description = COALESCE($4, description),
            venue = COALESCE($5, venue),
            city = COALESCE($6, city),
            country = COALESCE($7, country),
            start_time = COALESCE($8, start_time),
            end_time = COALESCE($9, end_time),
            price = COALESCE($10, price),
            tickets_total = COALESCE($11, tickets_total),
            reminder_hours = COALESCE($12, reminder_hours),
            is_published = COALESCE($13, is_published),
            updated_at = now()
         WHERE id = $1 AND organizer_id = $2
           AND COALESCE($11, tickets_total) >= tickets_sold
         RETURNING *",
    )
    .bind(event_id)
    .bind(user.id)
    .bind(req.title.as_deref().map(str::trim))
    .bind(&req.description)
    .bind(&req.venue)
    .bind(&req.city)
    .bind(&req.country)
    .bind(req.start_time)
    .bind(req.end_time)
    .bind(req.price)
    .bind(req.tickets_total)
    .bind(&req.reminder_hours)
    .bind(req.is_published)
    .fetch_optional(&state.db)
    .await?;

    let event = updated.ok_or_else(|| {
        AppError::Conflict("tickets_total cannot drop below tickets already sold".to_string())
    })?;

    Ok(success(event, "Event updated").into_response())
}

/// All of the caller's own events, published or not.
pub async fn list_my_events(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Response, AppError> {
    user.require_organizer()?;

    let events: Vec<Event> =
        sqlx::query_as("SELECT * FROM events WHERE organizer_id = $1 ORDER BY created_at DESC")
            .bind(user.id)
            .fetch_all(&state.db)
            .await?;

    Ok(success(events, "Events fetched").into_response())
}

/// Deleting is refused once the event has any payment activity; sold tickets
/// must stay resolvable.
pub async fn delete_event(
    State(state): State<AppState>,
    user: AuthUser,
    Path(event_id): Path<Uuid>,
) -> Result<Response, AppError> {
    user.require_organizer()?;

    let existing: Event = sqlx::query_as("SELECT * FROM events WHERE id = $1")
        .bind(event_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Event not found".to_string()))?;

    if existing.organizer_id != user.id {
        return Err(AppError::Forbidden(
            "Only the event's organizer can delete it".to_string(),
        ));
    }

    let mut tx = state.db.begin().await?;

    sqlx::query("DELETE FROM reminders WHERE event_id = $1")
        .bind(event_id)
        .execute(&mut *tx)
        .await?;

    let result = sqlx::query(
        "DELETE FROM events
         WHERE id = $1
           AND NOT EXISTS (SELECT 1 FROM payments WHERE event_id = $1)",
    )
    .bind(event_id)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        tx.rollback().await?;
        return Err(AppError::Conflict(
            "Cannot delete an event with payment activity".to_string(),
        ));
    }

    tx.commit().await?;

    tracing::info!(event_id = %event_id, organizer_id = %user.id, "Event deleted");

    Ok(success(serde_json::Value::Null, "Event deleted").into_response())
}

#[derive(Debug, Serialize, FromRow)]
pub struct AttendeeTicket {
    pub ticket_id: Uuid,
    pub attendee_name: String,
    pub attendee_email: String,
    pub scanned: bool,
    pub scanned_at: Option<DateTime<Utc>>,
}

/// Ticket holders for one event, for the organizer's door list.
pub async fn event_attendees(
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
            "Not authorized to view attendees for this event".to_string(),
        ));
    }

    let attendees: Vec<AttendeeTicket> = sqlx::query_as(
        "SELECT t.id AS ticket_id, u.name AS attendee_name, u.email AS attendee_email,
                t.scanned, t.scanned_at
         FROM tickets t
         JOIN users u ON u.id = t.user_id
         WHERE t.event_id = $1
         ORDER BY t.issued_at",
    )
    .bind(event_id)
    .fetch_all(&state.db)
    .await?;

    Ok(success(attendees, "Attendees fetched").into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn schedule_with_end_before_start_is_rejected() {
        let start = Utc::now() + Duration::days(7);
        assert!(validate_schedule(start, Some(start - Duration::hours(1))).is_err());
        assert!(validate_schedule(start, Some(start + Duration::hours(2))).is_ok());
        assert!(validate_schedule(start, None).is_ok());
    }

    #[test]
    fn negative_price_is_rejected() {
        assert!(validate_price(Decimal::new(-100, 2)).is_err());
        assert!(validate_price(Decimal::ZERO).is_ok());
        assert!(validate_price(Decimal::new(5000, 2)).is_ok());
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let req = CreateEventRequest {
            title: "Concert".to_string(),
            description: None,
            category: None,
            venue: "Hall".to_string(),
            city: "Lagos".to_string(),
            country: "NG".to_string(),
            start_time: Utc::now(),
            end_time: None,
            price: Decimal::new(5000, 2),
            currency: None,
            tickets_total: 0,
            reminder_hours: None,
            is_published: None,
        };
        assert!(req.validate().is_err());
    }
}
