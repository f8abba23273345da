use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use validator::Validate;

use crate::middleware::AuthUser;
use crate::models::{UpdateUser, UserView};
use crate::services::TokenResponse;
use crate::startup::AppState;
use crate::utils::{hash_password, verify_password, Password, ValidatedJson};

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 64))]
    pub username: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    #[serde(flatten)]
    pub token: TokenResponse,
    pub user: UserView,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1))]
    pub current_password: String,
    #[validate(length(min = 8, max = 128))]
    pub new_password: String,
}

/// Exchange username and password for an access token.
#[tracing::instrument(skip(state, request), fields(username = %request.username))]
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let invalid = || AppError::Unauthorized(anyhow::anyhow!("Invalid username or password"));

    let user = state
        .db
        .get_user_by_username(request.username.trim())
        .await?
        .ok_or_else(invalid)?;

    verify_password(&Password::new(request.password), &user.password_hash).map_err(|_| {
        tracing::warn!(user_id = user.id, "Failed login attempt");
        invalid()
    })?;

    let token = state.jwt.issue(&user)?;
    tracing::info!(user_id = user.id, "User logged in");

    Ok(Json(LoginResponse {
        token,
        user: user.into(),
    }))
}

/// Current user.
pub async fn me(user: AuthUser) -> Json<UserView> {
    Json(user.0.into())
}

/// Change the caller's own password.
#[tracing::instrument(skip(state, user, request), fields(user_id = user.id()))]
pub async fn change_password(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(request): ValidatedJson<ChangePasswordRequest>,
) -> Result<StatusCode, AppError> {
    verify_password(
        &Password::new(request.current_password),
        &user.0.password_hash,
    )
    .map_err(|_| AppError::BadRequest(anyhow::anyhow!("Current password is incorrect")))?;

    let password_hash = hash_password(&Password::new(request.new_password))?;
    state
        .db
        .update_user(
            user.id(),
            &UpdateUser {
                password_hash: Some(password_hash),
                ..Default::default()
            },
        )
        .await?;

    tracing::info!(user_id = user.id(), "Password changed");
    Ok(StatusCode::NO_CONTENT)
}
