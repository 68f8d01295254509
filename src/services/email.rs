use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::SmtpConfig;
use crate::utils::error::AppError;

/// SMTP email sender. Delivery failures are surfaced to the caller, which is
/// expected to log and move on; nothing in this domain retries an email
/// inline.
#[derive(Clone)]
pub struct EmailService {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    skip_sending: bool,
}

impl EmailService {
    pub fn new(config: &SmtpConfig) -> Result<Self, AppError> {
        let mailer = if config.username.is_empty() || config.password.is_empty() {
            tracing::info!(
                smtp_host = %config.host,
                smtp_port = config.port,
                "SMTP credentials not configured, using unauthenticated connection"
            );
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
                .port(config.port)
                .build()
        } else {
            let credentials =
                Credentials::new(config.username.clone(), config.password.clone());
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| {
                    AppError::InternalServerError(format!("Invalid SMTP relay config: {e}"))
                })?
                .port(config.port)
                .credentials(credentials)
                .build()
        };

        let from = config
            .from
            .parse()
            .map_err(|e| AppError::InternalServerError(format!("Invalid from address: {e}")))?;

        Ok(Self {
            mailer,
            from,
            skip_sending: false,
        })
    }

    /// Sender that logs instead of talking SMTP; for tests.
    pub fn disabled() -> Self {
        Self {
            mailer: AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous("localhost")
                .port(1025)
                .build(),
            from: Mailbox::new(None, "noreply@eventful.local".parse().expect("static address")),
            skip_sending: true,
        }
    }

    pub async fn send(&self, to: &str, subject: &str, html: String) -> Result<(), AppError> {
        if self.skip_sending {
            tracing::info!(to, subject, "Email sending disabled, skipping delivery");
            return Ok(());
        }

        let to: Mailbox = to
            .parse()
            .map_err(|e| AppError::ValidationError(format!("Invalid recipient address: {e}")))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html)
            .map_err(|e| AppError::InternalServerError(format!("Failed to build email: {e}")))?;

        self.mailer.send(message).await.map_err(|e| {
            AppError::ExternalServiceError(format!("Failed to deliver email: {e}"))
        })?;

        Ok(())
    }
}
