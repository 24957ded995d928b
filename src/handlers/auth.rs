use axum::{extract::State, http::StatusCode, Extension, Json};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{
    middleware::AuthUser,
    password::{hash_password, verify_password},
    token::{generate_token, hash_token},
};
use crate::error::{AppError, AppResult};
use crate::models::user::{User, UserProfile};
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 8, max = 128, message = "Password must be 8-128 characters"))]
    pub password: String,

    #[serde(default)]
    pub full_name: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserProfile,
}

/// Mint an opaque token and persist its hash. The raw token is returned to
/// the client once and never stored.
async fn issue_token(db: &PgPool, user_id: Uuid) -> AppResult<String> {
    let raw = generate_token();

    sqlx::query("INSERT INTO auth_tokens (id, user_id, token_hash) VALUES ($1, $2, $3)")
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(hash_token(&raw))
        .execute(db)
        .await?;

    Ok(raw)
}

pub async fn signup(
    State(state): State<AppState>,
    Json(body): Json<SignupRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    body.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let existing = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE email = $1")
        .bind(&body.email)
        .fetch_one(&state.db)
        .await?;

    if existing > 0 {
        return Err(AppError::Conflict("Email already registered".into()));
    }

    let pwd_hash = hash_password(&body.password)?;

    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (id, email, password_hash, full_name)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&body.email)
    .bind(&pwd_hash)
    .bind(&body.full_name)
    .fetch_one(&state.db)
    .await?;

    let token = issue_token(&state.db, user.id).await?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            user: user.into(),
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(&body.email)
        .fetch_optional(&state.db)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    if !verify_password(&body.password, &user.password_hash)? {
        return Err(AppError::InvalidCredentials);
    }

    let token = issue_token(&state.db, user.id).await?;

    Ok(Json(AuthResponse {
        token,
        user: user.into(),
    }))
}

/// Invalidates exactly the token the request authenticated with.
pub async fn logout(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<StatusCode> {
    sqlx::query("DELETE FROM auth_tokens WHERE token_hash = $1")
        .bind(&auth_user.token_hash)
        .execute(&state.db)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn me(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<UserProfile>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(auth_user.id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(AppError::NotFound("User not found".into()))?;

    Ok(Json(user.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signup_request_rejects_bad_email() {
        let body = SignupRequest {
            email: "not-an-email".into(),
            password: "long enough password".into(),
            full_name: "Test".into(),
        };
        assert!(body.validate().is_err());
    }

    #[test]
    fn test_signup_request_rejects_short_password() {
        let body = SignupRequest {
            email: "student@example.com".into(),
            password: "short".into(),
            full_name: String::new(),
        };
        assert!(body.validate().is_err());
    }

    #[test]
    fn test_signup_request_accepts_valid_input() {
        let body = SignupRequest {
            email: "student@example.com".into(),
            password: "a perfectly fine password".into(),
            full_name: "Test Student".into(),
        };
        assert!(body.validate().is_ok());
    }
}
