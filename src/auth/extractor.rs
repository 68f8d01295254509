use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::auth::jwt;
use crate::models::UserRole;
use crate::state::AppState;
use crate::utils::error::AppError;

/// Authenticated principal, extracted from a `Bearer` token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub role: UserRole,
}

impl AuthUser {
    /// Guards organizer-only operations.
    pub fn require_organizer(&self) -> Result<(), AppError> {
        if self.role != UserRole::Organizer {
            return Err(AppError::Forbidden(
                "This action requires an organizer account".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::AuthError("Missing authorization header".to_string()))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::AuthError("Expected a bearer token".to_string()))?;

        let claims = jwt::validate_token(token, &state.config.jwt_secret)?;

        Ok(AuthUser {
            id: claims.sub,
            email: claims.email,
            role: claims.role,
        })
    }
}

/// Like [`AuthUser`] but never rejects; used by endpoints that are public but
/// show more to an authenticated owner.
pub struct MaybeAuthUser(pub Option<AuthUser>);

#[async_trait]
impl FromRequestParts<AppState> for MaybeAuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self(AuthUser::from_request_parts(parts, state).await.ok()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(role: UserRole) -> AuthUser {
        AuthUser {
            id: Uuid::new_v4(),
            email: "ada@example.com".to_string(),
            role,
        }
    }

    #[test]
    fn organizer_passes_role_guard() {
        assert!(principal(UserRole::Organizer).require_organizer().is_ok());
    }

    #[test]
    fn attendee_fails_role_guard() {
        let err = principal(UserRole::Attendee).require_organizer().unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }
}
