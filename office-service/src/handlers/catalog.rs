//! Authorities and managed transactions.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use service_core::error::AppError;
use validator::Validate;

use crate::middleware::{AdminUser, AuthUser};
use crate::models::{
    round2, CollectFee, CreateManagedTransaction, ListManagedFilter, ManagedStatus,
    ManagedTransaction, UpdateManagedTransaction,
};
use crate::services::Collection;
use crate::startup::AppState;
use crate::utils::ValidatedJson;

#[derive(Debug, Deserialize)]
pub struct ListManagedQuery {
    pub authority: Option<String>,
    pub status: Option<ManagedStatus>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateManagedRequest {
    #[validate(length(min = 1, max = 200))]
    pub authority: String,
    #[validate(length(min = 1, max = 200))]
    pub service: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[serde(default)]
    pub fee: Decimal,
    pub status: Option<ManagedStatus>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateManagedRequest {
    #[validate(length(min = 1, max = 200))]
    pub service: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    pub fee: Option<Decimal>,
    pub status: Option<ManagedStatus>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CollectRequest {
    pub amount: Option<Decimal>,
    #[validate(length(max = 32))]
    pub method: Option<String>,
    #[validate(length(max = 128))]
    pub reference: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
}

fn validate_fee(fee: Option<Decimal>) -> Result<Option<Decimal>, AppError> {
    match fee {
        Some(fee) if fee < Decimal::ZERO => Err(AppError::BadRequest(anyhow::anyhow!(
            "fee cannot be negative"
        ))),
        other => Ok(other.map(round2)),
    }
}

/// Known authorities.
pub async fn list_authorities(
    State(state): State<AppState>,
    _user: AuthUser,
) -> Json<Vec<String>> {
    Json(state.config.catalog.authorities.clone())
}

pub async fn list_managed_transactions(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(query): Query<ListManagedQuery>,
) -> Result<Json<Vec<ManagedTransaction>>, AppError> {
    let transactions = state
        .db
        .list_managed_transactions(&ListManagedFilter {
            authority: query.authority,
            status: query.status,
        })
        .await?;

    Ok(Json(transactions))
}

#[tracing::instrument(skip(state, user, request), fields(user_id = user.id()))]
pub async fn create_managed_transaction(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(request): ValidatedJson<CreateManagedRequest>,
) -> Result<(StatusCode, Json<ManagedTransaction>), AppError> {
    user.require_catalog_access()?;

    let authority = request.authority.trim().to_string();
    if !state.config.catalog.is_known_authority(&authority) {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Unknown authority '{}'",
            authority
        )));
    }

    let fee = validate_fee(Some(request.fee))?.unwrap_or_default();

    let transaction = state
        .db
        .create_managed_transaction(&CreateManagedTransaction {
            authority,
            service: request.service.trim().to_string(),
            description: request.description,
            fee,
            status: request.status.unwrap_or(ManagedStatus::Active),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(transaction)))
}

pub async fn get_managed_transaction(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(transaction_id): Path<i64>,
) -> Result<Json<ManagedTransaction>, AppError> {
    state
        .db
        .get_managed_transaction(transaction_id)
        .await?
        .map(Json)
        .ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!(
                "Managed transaction {} not found",
                transaction_id
            ))
        })
}

#[tracing::instrument(skip(state, user, request), fields(user_id = user.id()))]
pub async fn update_managed_transaction(
    State(state): State<AppState>,
    user: AuthUser,
    Path(transaction_id): Path<i64>,
    ValidatedJson(request): ValidatedJson<UpdateManagedRequest>,
) -> Result<Json<ManagedTransaction>, AppError> {
    user.require_catalog_access()?;

    let transaction = state
        .db
        .update_managed_transaction(
            transaction_id,
            &UpdateManagedTransaction {
                service: request.service.map(|s| s.trim().to_string()),
                description: request.description,
                fee: validate_fee(request.fee)?,
                status: request.status,
            },
        )
        .await?;

    Ok(Json(transaction))
}

#[tracing::instrument(skip(state, user), fields(user_id = user.id()))]
pub async fn delete_managed_transaction(
    State(state): State<AppState>,
    user: AuthUser,
    Path(transaction_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    user.require_catalog_access()?;
    state.db.delete_managed_transaction(transaction_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Collect the fee of a finished transaction into the income ledger.
/// Responds 201 on the first collection and 200 when the ledger row was
/// corrected.
#[tracing::instrument(skip(state, admin, request), fields(admin_id = admin.0.id()))]
pub async fn collect_managed_fee(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(transaction_id): Path<i64>,
    ValidatedJson(request): ValidatedJson<CollectRequest>,
) -> Result<(StatusCode, Json<Collection>), AppError> {
    let collection = state
        .db
        .collect_managed_fee(
            transaction_id,
            &CollectFee {
                amount: request.amount,
                method: request.method,
                reference: request.reference,
                description: request.description,
            },
        )
        .await?;

    let status = if collection.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok((status, Json(collection)))
}
