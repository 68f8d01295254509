use std::env;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::apply_security_headers;

const DEV_SECRET: &str = "dev-secret-change-me-0123456789abcdef";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_expiration_hours: i64,
    pub ticket_secret: String,
    pub paystack_secret_key: String,
    pub paystack_base_url: String,
    pub frontend_url: String,
    pub reminder_cron: String,
    pub smtp: SmtpConfig,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/eventful".to_string()),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3001),
            jwt_secret: secret_from_env("JWT_SECRET"),
            jwt_expiration_hours: env::var("JWT_EXPIRATION_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(72),
            ticket_secret: secret_from_env("TICKET_SECRET"),
            paystack_secret_key: secret_from_env("PAYSTACK_SECRET_KEY"),
            paystack_base_url: env::var("PAYSTACK_BASE_URL")
                .unwrap_or_else(|_| "https://api.paystack.co".to_string()),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            // Hourly, at the top of the hour
            reminder_cron: env::var("REMINDER_CRON").unwrap_or_else(|_| "0 0 * * * *".to_string()),
            smtp: SmtpConfig {
                host: env::var("EMAIL_HOST").unwrap_or_else(|_| "localhost".to_string()),
                port: env::var("EMAIL_PORT")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(587),
                username: env::var("EMAIL_USER").unwrap_or_default(),
                password: env::var("EMAIL_PASS").unwrap_or_default(),
                from: env::var("EMAIL_FROM")
                    .unwrap_or_else(|_| "Eventful <noreply@eventful.local>".to_string()),
            },
        }
    }
}

fn secret_from_env(key: &str) -> String {
    match env::var(key) {
        Ok(value) if !value.is_empty() => value,
        _ => {
            tracing::warn!("{} not set, falling back to development secret", key);
            DEV_SECRET.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        // Only read unset keys so the test is independent of the environment
        std::env::remove_var("REMINDER_CRON");
        let config = Config::from_env();
        assert_eq!(config.reminder_cron, "0 0 * * * *");
        assert!(config.jwt_expiration_hours > 0);
    }
}
