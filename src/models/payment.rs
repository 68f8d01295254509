use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Lifecycle of one payment attempt. `Pending` transitions exactly once to
/// `Success` or `Failed`; `Refunded` is a further terminal state after
/// `Success`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
    Refunded,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub reference: String,
    pub user_id: Uuid,
    pub event_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub amount: Decimal,
    pub currency: String,
    pub status: PaymentStatus,
    pub tickets_issued: bool,
    pub access_code: Option<String>,
    pub authorization_url: Option<String>,
    pub transaction_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
