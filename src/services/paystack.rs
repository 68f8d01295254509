use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha512;

use crate::config::Config;
use crate::utils::error::AppError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome reported by the gateway for one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayStatus {
    Success,
    Failed,
    Pending,
}

#[derive(Debug, Clone)]
pub struct InitializedTransaction {
    pub authorization_url: String,
    pub access_code: String,
    pub reference: String,
}

#[derive(Debug, Clone)]
pub struct GatewayVerification {
    pub status: GatewayStatus,
    pub transaction_id: Option<String>,
}

/// Remote payment API, treated as an untrusted network boundary. Status must
/// always be re-checked server-side through `verify`, even when a webhook
/// already reported it.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initialize(
        &self,
        email: &str,
        amount_minor: i64,
        reference: &str,
        metadata: Value,
    ) -> Result<InitializedTransaction, AppError>;

    async fn verify(&self, reference: &str) -> Result<GatewayVerification, AppError>;

    fn verify_webhook_signature(&self, payload: &[u8], signature_hex: &str) -> bool;
}

pub struct PaystackClient {
    http: reqwest::Client,
    base_url: String,
    secret_key: String,
    callback_url: String,
}

#[derive(Deserialize)]
struct Envelope<T> {
    status: bool,
    message: String,
    data: Option<T>,
}

#[derive(Deserialize)]
struct InitializeData {
    authorization_url: String,
    access_code: String,
    reference: String,
}

#[derive(Deserialize)]
struct VerifyData {
    status: String,
    id: Option<i64>,
}

impl PaystackClient {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| {
                AppError::InternalServerError(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            http,
            base_url: config.paystack_base_url.clone(),
            secret_key: config.paystack_secret_key.clone(),
            callback_url: format!("{}/payment/verify", config.frontend_url),
        })
    }
}

pub fn map_gateway_status(status: &str) -> GatewayStatus {
    match status {
        "success" => GatewayStatus::Success,
        "failed" | "abandoned" | "reversed" => GatewayStatus::Failed,
        _ => GatewayStatus::Pending,
    }
}

#[async_trait]
impl PaymentGateway for PaystackClient {
    async fn initialize(
        &self,
        email: &str,
        amount_minor: i64,
        reference: &str,
        metadata: Value,
    ) -> Result<InitializedTransaction, AppError> {
        let body = json!({
            "email": email,
            "amount": amount_minor,
            "reference": reference,
            "metadata": metadata,
            "callback_url": self.callback_url,
        });

        let response = self
            .http
            .post(format!("{}/transaction/initialize", self.base_url))
            .bearer_auth(&self.secret_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Paystack initialization request failed");
                AppError::ExternalServiceError("Failed to initialize payment".to_string())
            })?;

        let envelope: Envelope<InitializeData> = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "Unreadable Paystack initialization response");
            AppError::ExternalServiceError("Failed to initialize payment".to_string())
        })?;

        match envelope.data {
            Some(data) if envelope.status => Ok(InitializedTransaction {
                authorization_url: data.authorization_url,
                access_code: data.access_code,
                reference: data.reference,
            }),
            _ => {
                tracing::error!(message = %envelope.message, "Paystack rejected initialization");
                Err(AppError::ExternalServiceError(
                    "Failed to initialize payment".to_string(),
                ))
            }
        }
    }

    async fn verify(&self, reference: &str) -> Result<GatewayVerification, AppError> {
        let url = format!("{}/transaction/verify/{}", self.base_url, reference);

        // Transport failures get exactly one retry before surfacing
        let mut last_error = None;
        for attempt in 0..2 {
            match self
                .http
                .get(&url)
                .bearer_auth(&self.secret_key)
                .send()
                .await
            {
                Ok(response) => {
                    let envelope: Envelope<VerifyData> = response.json().await.map_err(|e| {
                        tracing::error!(error = %e, "Unreadable Paystack verification response");
                        AppError::ExternalServiceError("Failed to verify payment".to_string())
                    })?;

                    let data = envelope.data.ok_or_else(|| {
                        tracing::error!(message = %envelope.message, "Paystack verification carried no data");
                        AppError::ExternalServiceError("Failed to verify payment".to_string())
                    })?;

                    return Ok(GatewayVerification {
                        status: map_gateway_status(&data.status),
                        transaction_id: data.id.map(|id| id.to_string()),
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, attempt, reference, "Paystack verification attempt failed");
                    last_error = Some(e);
                }
            }
        }

        tracing::error!(reference, error = ?last_error, "Paystack verification exhausted retries");
        Err(AppError::ExternalServiceError(
            "Failed to verify payment".to_string(),
        ))
    }

    fn verify_webhook_signature(&self, payload: &[u8], signature_hex: &str) -> bool {
        verify_signature(&self.secret_key, payload, signature_hex)
    }
}

pub fn verify_signature(secret: &str, payload: &[u8], signature_hex: &str) -> bool {
    let Ok(signature) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha512>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&signature).is_ok()
}

pub fn sign_payload(secret: &str, payload: &[u8]) -> Result<String, AppError> {
    let mut mac = Hmac::<Sha512>::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::InternalServerError(format!("Invalid webhook secret: {e}")))?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "sk_test_0123456789";

    #[test]
    fn webhook_signature_round_trip() {
        let payload = br#"{"event":"charge.success","data":{"reference":"EVT-1"}}"#;
        let signature = sign_payload(SECRET, payload).unwrap();
        assert!(verify_signature(SECRET, payload, &signature));
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let payload = br#"{"event":"charge.success","data":{"reference":"EVT-1"}}"#;
        let tampered = br#"{"event":"charge.success","data":{"reference":"EVT-2"}}"#;
        let signature = sign_payload(SECRET, payload).unwrap();
        assert!(!verify_signature(SECRET, tampered, &signature));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let payload = b"payload";
        let signature = sign_payload(SECRET, payload).unwrap();
        assert!(!verify_signature("sk_test_other", payload, &signature));
    }

    #[test]
    fn garbage_signature_is_rejected() {
        assert!(!verify_signature(SECRET, b"payload", "not-hex"));
        assert!(!verify_signature(SECRET, b"payload", ""));
    }

    #[test]
    fn status_mapping() {
        assert_eq!(map_gateway_status("success"), GatewayStatus::Success);
        assert_eq!(map_gateway_status("failed"), GatewayStatus::Failed);
        assert_eq!(map_gateway_status("abandoned"), GatewayStatus::Failed);
        assert_eq!(map_gateway_status("ongoing"), GatewayStatus::Pending);
    }
}
