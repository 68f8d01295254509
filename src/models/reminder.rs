use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A scheduled email. `sent` is flipped exactly once by the scheduler; an
/// unsent row whose delivery failed is picked up again on the next tick.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Reminder {
    pub id: Uuid,
    pub user_id: Uuid,
    pub event_id: Uuid,
    pub remind_at: DateTime<Utc>,
    pub sent: bool,
    pub subject: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}
