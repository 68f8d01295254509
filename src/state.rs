use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::services::email::EmailService;
use crate::services::paystack::PaymentGateway;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<Config>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub mailer: EmailService,
}
