use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::UserRole;
use crate::utils::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub role: UserRole,
    pub exp: i64,
}

pub fn issue_token(
    user_id: Uuid,
    email: &str,
    role: UserRole,
    secret: &str,
    expiration_hours: i64,
) -> Result<String, AppError> {
    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        role,
        exp: (Utc::now() + Duration::hours(expiration_hours)).timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::InternalServerError(format!("Failed to sign token: {e}")))
}

pub fn validate_token(token: &str, secret: &str) -> Result<Claims, AppError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::AuthError("Invalid or expired token".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-0123456789abcdef";

    #[test]
    fn issue_then_validate_round_trip() {
        let user_id = Uuid::new_v4();
        let token = issue_token(user_id, "ada@example.com", UserRole::Organizer, SECRET, 1).unwrap();
        let claims = validate_token(&token, SECRET).unwrap();

        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.email, "ada@example.com");
        assert_eq!(claims.role, UserRole::Organizer);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token =
            issue_token(Uuid::new_v4(), "a@b.com", UserRole::Attendee, SECRET, 1).unwrap();
        assert!(validate_token(&token, "another-secret-entirely").is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let token =
            issue_token(Uuid::new_v4(), "a@b.com", UserRole::Attendee, SECRET, -2).unwrap();
        assert!(validate_token(&token, SECRET).is_err());
    }
}
