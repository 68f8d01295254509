use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::auth::{hash_password, jwt, verify_password, AuthUser};
use crate::models::{User, UserPublic, UserRole};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    pub role: UserRole,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: Option<String>,
}

#[derive(Serialize)]
struct AuthPayload {
    user: UserPublic,
    token: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Response, AppError> {
    req.validate()
        .map_err(|e| AppError::ValidationError(e.to_string()))?;

    let email = req.email.trim().to_lowercase();
    let password_hash = hash_password(&req.password)?;

    let user: User = sqlx::query_as(
        "INSERT INTO users (name, email, password_hash, role)
         VALUES ($1, $2, $3, $4)
         RETURNING *",
    )
    .bind(req.name.trim())
    .bind(&email)
    .bind(&password_hash)
    .bind(req.role)
    .fetch_one(&state.db)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Conflict("An account with this email already exists".to_string())
        }
        _ => AppError::DatabaseError(e),
    })?;

    let token = jwt::issue_token(
        user.id,
        &user.email,
        user.role,
        &state.config.jwt_secret,
        state.config.jwt_expiration_hours,
    )?;

    tracing::info!(user_id = %user.id, role = ?user.role, "User registered");

    Ok(created(
        AuthPayload {
            user: user.into(),
            token,
        },
        "Registration successful",
    )
    .into_response())
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Response, AppError> {
    req.validate()
        .map_err(|e| AppError::ValidationError(e.to_string()))?;

    let email = req.email.trim().to_lowercase();

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = $1")
        .bind(&email)
        .fetch_optional(&state.db)
        .await?;

    // Same rejection whether the account or the password is wrong
    let user = user.ok_or_else(|| AppError::AuthError("Invalid credentials".to_string()))?;
    if !verify_password(&req.password, &user.password_hash)? {
        return Err(AppError::AuthError("Invalid credentials".to_string()));
    }

    let token = jwt::issue_token(
        user.id,
        &user.email,
        user.role,
        &state.config.jwt_secret,
        state.config.jwt_expiration_hours,
    )?;

    Ok(success(
        AuthPayload {
            user: user.into(),
            token,
        },
        "Login successful",
    )
    .into_response())
}

pub async fn profile(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Response, AppError> {
    let user: User = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(user.id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(success(UserPublic::from(user), "Profile fetched").into_response())
}

/// Role and password are deliberately not updatable through this endpoint.
pub async fn update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Response, AppError> {
    req.validate()
        .map_err(|e| AppError::ValidationError(e.to_string()))?;

    let updated: User = sqlx::query_as(
        "UPDATE users SET name = COALESCE($2, name), updated_at = now()
         WHERE id = $1
         RETURNING *",
    )
    .bind(user.id)
    .bind(req.name.as_deref().map(str::trim))
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(success(UserPublic::from(updated), "Profile updated").into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_password() {
        let req = RegisterRequest {
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            password: "short".to_string(),
            role: UserRole::Attendee,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn rejects_malformed_email() {
        let req = RegisterRequest {
            name: "Ada".to_string(),
            email: "not-an-email".to_string(),
            password: "long enough password".to_string(),
            role: UserRole::Attendee,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn accepts_valid_registration() {
        let req = RegisterRequest {
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            password: "long enough password".to_string(),
            role: UserRole::Organizer,
        };
        assert!(req.validate().is_ok());
    }
}
