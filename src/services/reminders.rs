use chrono::{DateTime, Duration, Utc};
use sqlx::{FromRow, PgPool};
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use uuid::Uuid;

use crate::models::{Event, Reminder};
use crate::services::email::EmailService;
use crate::utils::error::AppError;

/// Attendees get a single reminder this long before the event starts.
const ATTENDEE_REMINDER_HOURS: i64 = 24;

/// Computes the reminder instants for the configured intervals, dropping any
/// that already lie in the past.
pub fn reminder_times(
    start_time: DateTime<Utc>,
    hours_before: &[i32],
    now: DateTime<Utc>,
) -> Vec<DateTime<Utc>> {
    hours_before
        .iter()
        .map(|hours| start_time - Duration::hours(i64::from(*hours)))
        .filter(|remind_at| *remind_at > now)
        .collect()
}

/// Seeds the organizer's reminders when an event is created.
pub async fn create_event_reminders(db: &PgPool, event: &Event) -> Result<Vec<Reminder>, AppError> {
    let subject = format!("Event Reminder: {}", event.title);
    let body = format!(
        "<h1>Reminder: {}</h1><p>Your event starts at {}.</p>",
        event.title, event.start_time
    );

    let mut reminders = Vec::new();
    for remind_at in reminder_times(event.start_time, &event.reminder_hours, Utc::now()) {
        let reminder: Reminder = sqlx::query_as(
            "INSERT INTO reminders (user_id, event_id, remind_at, subject, body)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING *",
        )
        .bind(event.organizer_id)
        .bind(event.id)
        .bind(remind_at)
        .bind(&subject)
        .bind(&body)
        .fetch_one(db)
        .await?;
        reminders.push(reminder);
    }

    Ok(reminders)
}

/// Seeds the attendee's reminder when their tickets are issued. Returns None
/// when the event is already less than a day away.
pub async fn create_attendee_reminder(
    db: &PgPool,
    event: &Event,
    user_id: Uuid,
) -> Result<Option<Reminder>, AppError> {
    let remind_at = event.start_time - Duration::hours(ATTENDEE_REMINDER_HOURS);
    if remind_at <= Utc::now() {
        return Ok(None);
    }

    let subject = format!("Event Reminder: {}", event.title);
    let body = format!(
        "<h1>Reminder: {}</h1><p>Starts at {} at {}, {}.</p>",
        event.title, event.start_time, event.venue, event.city
    );

    let reminder: Reminder = sqlx::query_as(
        "INSERT INTO reminders (user_id, event_id, remind_at, subject, body)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING *",
    )
    .bind(user_id)
    .bind(event.id)
    .bind(remind_at)
    .bind(&subject)
    .bind(&body)
    .fetch_one(db)
    .await?;

    Ok(Some(reminder))
}

#[derive(Debug, FromRow)]
struct DueReminder {
    id: Uuid,
    subject: String,
    body: String,
    email: String,
    is_published: bool,
}

/// One reminder tick: deliver everything due and unsent. A failed delivery is
/// logged and left unsent, so the next tick picks it up again.
pub async fn run_due_reminders(db: &PgPool, mailer: &EmailService) -> Result<usize, AppError> {
    let due: Vec<DueReminder> = sqlx::query_as(
        "SELECT r.id, r.subject, r.body, u.email, e.is_published
         FROM reminders r
         JOIN users u ON u.id = r.user_id
         JOIN events e ON e.id = r.event_id
         WHERE r.remind_at <= now() AND r.sent = false
         ORDER BY r.remind_at",
    )
    .fetch_all(db)
    .await?;

    // Every failure below is scoped to its own row; one bad reminder must not
    // starve the rest of the tick.
    let mut delivered = 0;
    for reminder in due {
        if !reminder.is_published {
            // Event was unpublished after scheduling; retire the reminder
            if let Err(e) = mark_sent(db, reminder.id).await {
                tracing::error!(reminder_id = %reminder.id, error = %e, "Failed to retire reminder");
            }
            continue;
        }

        match mailer
            .send(&reminder.email, &reminder.subject, reminder.body.clone())
            .await
        {
            Ok(()) => {
                delivered += 1;
                tracing::info!(reminder_id = %reminder.id, to = %reminder.email, "Reminder sent");
                if let Err(e) = mark_sent(db, reminder.id).await {
                    tracing::error!(
                        reminder_id = %reminder.id,
                        error = %e,
                        "Delivered reminder not marked sent, next tick will repeat it"
                    );
                }
            }
            Err(e) => {
                tracing::error!(reminder_id = %reminder.id, error = %e, "Failed to send reminder");
            }
        }
    }

    Ok(delivered)
}

async fn mark_sent(db: &PgPool, reminder_id: Uuid) -> Result<(), AppError> {
    sqlx::query("UPDATE reminders SET sent = true WHERE id = $1")
        .bind(reminder_id)
        .execute(db)
        .await?;
    Ok(())
}

/// Starts the periodic reminder job. The default schedule fires hourly.
pub async fn start_scheduler(
    db: PgPool,
    mailer: EmailService,
    cron: &str,
) -> Result<JobScheduler, JobSchedulerError> {
    let sched = JobScheduler::new().await?;

    sched
        .add(Job::new_async(cron, move |_uuid, _lock| {
            let db = db.clone();
            let mailer = mailer.clone();

            Box::pin(async move {
                match run_due_reminders(&db, &mailer).await {
                    Ok(count) if count > 0 => {
                        tracing::info!(count, "Reminder tick delivered reminders");
                    }
                    Ok(_) => {}
                    Err(err) => {
                        tracing::error!(error = %err, "Reminder tick failed");
                    }
                }
            })
        })?)
        .await?;

    sched.start().await?;

    Ok(sched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn computes_one_instant_per_interval() {
        let start = Utc.with_ymd_and_hms(2030, 6, 1, 18, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2030, 5, 1, 0, 0, 0).unwrap();

        let times = reminder_times(start, &[24, 48], now);

        assert_eq!(times.len(), 2);
        assert_eq!(times[0], start - Duration::hours(24));
        assert_eq!(times[1], start - Duration::hours(48));
    }

    #[test]
    fn past_intervals_are_dropped() {
        let start = Utc.with_ymd_and_hms(2030, 6, 1, 18, 0, 0).unwrap();
        let now = start - Duration::hours(10);

        let times = reminder_times(start, &[24, 4], now);

        assert_eq!(times.len(), 1);
        assert_eq!(times[0], start - Duration::hours(4));
    }

    #[test]
    fn no_intervals_means_no_reminders() {
        let start = Utc.with_ymd_and_hms(2030, 6, 1, 18, 0, 0).unwrap();
        assert!(reminder_times(start, &[], Utc::now()).is_empty());
    }
}
