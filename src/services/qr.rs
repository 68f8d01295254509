use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use qrcode::render::svg;
use qrcode::{EcLevel, QrCode};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use crate::utils::error::AppError;

/// Contents of a ticket's QR code. The `token` binds the event, the attendee
/// and the issuance instant with a server-side key, so a payload altered
/// offline fails validation at the gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QrPayload {
    pub ticket_id: Uuid,
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub issued_at: i64,
    pub token: String,
}

pub fn ticket_token(secret: &str, event_id: Uuid, user_id: Uuid, issued_at_ms: i64) -> String {
    // HMAC-SHA256 accepts keys of any length, so this cannot fail
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(format!("{event_id}:{user_id}:{issued_at_ms}").as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

pub fn build_payload(
    secret: &str,
    ticket_id: Uuid,
    event_id: Uuid,
    user_id: Uuid,
    issued_at_ms: i64,
) -> QrPayload {
    QrPayload {
        ticket_id,
        event_id,
        user_id,
        issued_at: issued_at_ms,
        token: ticket_token(secret, event_id, user_id, issued_at_ms),
    }
}

/// Recomputes the token from the payload's own fields and compares it to the
/// hash stored at issuance time.
pub fn validate_payload(secret: &str, payload: &QrPayload, stored_hash: &str) -> bool {
    let recomputed = ticket_token(secret, payload.event_id, payload.user_id, payload.issued_at);
    recomputed == stored_hash && payload.token == stored_hash
}

pub fn parse_payload(qr_data: &str) -> Result<QrPayload, AppError> {
    serde_json::from_str(qr_data)
        .map_err(|_| AppError::ValidationError("Invalid QR code format".to_string()))
}

/// Renders the payload as an SVG data URL suitable for embedding directly in
/// an `<img>` tag.
pub fn render_data_url(payload_json: &str) -> Result<String, AppError> {
    let code = QrCode::with_error_correction_level(payload_json.as_bytes(), EcLevel::H)
        .map_err(|e| AppError::InternalServerError(format!("Failed to encode QR code: {e}")))?;

    let image = code
        .render::<svg::Color>()
        .min_dimensions(256, 256)
        .build();

    Ok(format!(
        "data:image/svg+xml;base64,{}",
        STANDARD.encode(image)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "ticket-secret-for-tests";

    fn sample_payload() -> QrPayload {
        build_payload(
            SECRET,
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            1_700_000_000_000,
        )
    }

    #[test]
    fn token_is_deterministic() {
        let event = Uuid::new_v4();
        let user = Uuid::new_v4();
        assert_eq!(
            ticket_token(SECRET, event, user, 42),
            ticket_token(SECRET, event, user, 42)
        );
    }

    #[test]
    fn stored_hash_round_trip() {
        let payload = sample_payload();
        assert!(validate_payload(SECRET, &payload, &payload.token));
    }

    #[test]
    fn tampered_attendee_fails_validation() {
        let mut payload = sample_payload();
        let stored = payload.token.clone();
        payload.user_id = Uuid::new_v4();
        assert!(!validate_payload(SECRET, &payload, &stored));
    }

    #[test]
    fn tampered_timestamp_fails_validation() {
        let mut payload = sample_payload();
        let stored = payload.token.clone();
        payload.issued_at += 1;
        assert!(!validate_payload(SECRET, &payload, &stored));
    }

    #[test]
    fn token_forged_without_key_fails_validation() {
        let payload = sample_payload();
        let forged = build_payload(
            "some-other-key",
            payload.ticket_id,
            payload.event_id,
            payload.user_id,
            payload.issued_at,
        );
        assert!(!validate_payload(SECRET, &forged, &payload.token));
    }

    #[test]
    fn payload_json_round_trip() {
        let payload = sample_payload();
        let json = serde_json::to_string(&payload).unwrap();
        let parsed = parse_payload(&json).unwrap();
        assert_eq!(parsed.ticket_id, payload.ticket_id);
        assert_eq!(parsed.token, payload.token);
    }

    #[test]
    fn malformed_qr_data_is_rejected() {
        assert!(parse_payload("not json at all").is_err());
    }

    #[test]
    fn renders_svg_data_url() {
        let payload = sample_payload();
        let json = serde_json::to_string(&payload).unwrap();
        let url = render_data_url(&json).unwrap();
        assert!(url.starts_with("data:image/svg+xml;base64,"));
    }
}
