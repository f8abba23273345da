use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use service_core::error::AppError;

use crate::models::{User, PERMISSION_MANAGE_CATALOG};
use crate::startup::AppState;

/// Authenticated staff member, loaded fresh from the database so role and
/// permission changes apply immediately.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl AuthUser {
    pub fn id(&self) -> i64 {
        self.0.id
    }

    pub fn is_admin(&self) -> bool {
        self.0.is_admin()
    }

    /// True for admins and holders of the given permission flag.
    pub fn has_permission(&self, permission: &str) -> bool {
        self.is_admin()
            || self
                .0
                .permissions()
                .get(permission)
                .copied()
                .unwrap_or(false)
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden(anyhow::anyhow!(
                "This action requires an administrator"
            )))
        }
    }

    pub fn require_catalog_access(&self) -> Result<(), AppError> {
        if self.has_permission(PERMISSION_MANAGE_CATALOG) {
            Ok(())
        } else {
            Err(AppError::Forbidden(anyhow::anyhow!(
                "This action requires the '{}' permission",
                PERMISSION_MANAGE_CATALOG
            )))
        }
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| {
                AppError::Unauthorized(anyhow::anyhow!(
                    "Missing or invalid Authorization header"
                ))
            })?;

        let claims = state.jwt.validate(token)?;

        let user = state.db.get_user(claims.sub).await?.ok_or_else(|| {
            tracing::warn!(user_id = claims.sub, "Token for unknown user");
            AppError::Unauthorized(anyhow::anyhow!("User no longer exists"))
        })?;

        Ok(AuthUser(user))
    }
}

/// Authenticated administrator. Staff get 403.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

#[axum::async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        user.require_admin()?;
        Ok(AdminUser(user))
    }
}
