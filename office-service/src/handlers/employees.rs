//! Employee administration and dashboard aggregates. Admin only.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use service_core::error::AppError;
use std::collections::HashMap;
use validator::Validate;

use crate::middleware::AdminUser;
use crate::models::{CreateUser, Role, UpdateUser, UserView};
use crate::services::{AuthorityStats, DashboardStats};
use crate::startup::AppState;
use crate::utils::{hash_password, Password, ValidatedJson};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateEmployeeRequest {
    #[validate(length(min = 3, max = 64))]
    pub username: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub permissions: HashMap<String, bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateEmployeeRequest {
    #[validate(length(min = 3, max = 64))]
    pub username: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 8, max = 128))]
    pub password: Option<String>,
    pub role: Option<Role>,
    pub permissions: Option<HashMap<String, bool>>,
}

pub async fn list_employees(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Vec<UserView>>, AppError> {
    let users = state.db.list_users().await?;
    Ok(Json(users.into_iter().map(UserView::from).collect()))
}

#[tracing::instrument(skip(state, admin, request), fields(admin_id = admin.0.id()))]
pub async fn create_employee(
    State(state): State<AppState>,
    admin: AdminUser,
    ValidatedJson(request): ValidatedJson<CreateEmployeeRequest>,
) -> Result<(StatusCode, Json<UserView>), AppError> {
    let password_hash = hash_password(&Password::new(request.password))?;

    let user = state
        .db
        .create_user(&CreateUser {
            username: request.username.trim().to_string(),
            email: request.email.trim().to_lowercase(),
            password_hash,
            role: request.role.unwrap_or(Role::Staff),
            permissions: request.permissions,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(user.into())))
}

#[tracing::instrument(skip(state, _admin, request))]
pub async fn update_employee(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(user_id): Path<i64>,
    ValidatedJson(request): ValidatedJson<UpdateEmployeeRequest>,
) -> Result<Json<UserView>, AppError> {
    let password_hash = request
        .password
        .map(|password| hash_password(&Password::new(password)))
        .transpose()?;

    let user = state
        .db
        .update_user(
            user_id,
            &UpdateUser {
                username: request.username.map(|u| u.trim().to_string()),
                email: request.email.map(|e| e.trim().to_lowercase()),
                password_hash,
                role: request.role,
                permissions: request.permissions,
            },
        )
        .await?;

    Ok(Json(user.into()))
}

#[tracing::instrument(skip(state, admin))]
pub async fn delete_employee(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(user_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    if admin.0.id() == user_id {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "You cannot delete your own account"
        )));
    }

    state.db.delete_user(user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn dashboard_stats(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<DashboardStats>, AppError> {
    Ok(Json(state.db.dashboard_stats().await?))
}

pub async fn stats_by_authority(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Vec<AuthorityStats>>, AppError> {
    Ok(Json(
        state
            .db
            .stats_by_authority(&state.config.catalog.authorities)
            .await?,
    ))
}
