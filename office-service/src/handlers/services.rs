//! Service catalog endpoints.
//!
//! Reads are open to every authenticated user. Mutations need an admin or
//! the `manage_catalog` permission.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use validator::Validate;

use crate::middleware::AuthUser;
use crate::models::{CreateService, GovFeeType, Service, UpdateService};
use crate::services::{price_line, LineBreakdown, ServicePricing};
use crate::startup::AppState;
use crate::utils::ValidatedJson;

#[derive(Debug, Deserialize)]
pub struct ListServicesQuery {
    pub authority: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateServiceRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 1, max = 200))]
    pub authority: String,
    pub office_fee: Decimal,
    pub gov_fee_type: GovFeeType,
    #[serde(default)]
    pub gov_fee_value: Decimal,
    #[serde(default = "default_vat_applicable")]
    pub vat_applicable: bool,
}

fn default_vat_applicable() -> bool {
    true
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateServiceRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 200))]
    pub authority: Option<String>,
    pub office_fee: Option<Decimal>,
    pub gov_fee_type: Option<GovFeeType>,
    pub gov_fee_value: Option<Decimal>,
    pub vat_applicable: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct QuoteRequest {
    #[serde(default = "default_qty")]
    #[validate(range(min = 1, max = 10000))]
    pub qty: i64,
    pub gov_fee_override: Option<Decimal>,
}

fn default_qty() -> i64 {
    1
}

/// Price preview for a service.
#[derive(Debug, Serialize)]
pub struct QuoteResponse {
    pub service_id: i64,
    pub vat_rate: Decimal,
    #[serde(flatten)]
    pub breakdown: LineBreakdown,
}

fn ensure_known_authority(state: &AppState, authority: &str) -> Result<(), AppError> {
    if state.config.catalog.is_known_authority(authority) {
        Ok(())
    } else {
        Err(AppError::BadRequest(anyhow::anyhow!(
            "Unknown authority '{}'",
            authority
        )))
    }
}

fn ensure_non_negative(field: &str, value: Option<Decimal>) -> Result<(), AppError> {
    match value {
        Some(v) if v < Decimal::ZERO => Err(AppError::BadRequest(anyhow::anyhow!(
            "{} cannot be negative",
            field
        ))),
        _ => Ok(()),
    }
}

async fn load_service(state: &AppState, service_id: i64) -> Result<Service, AppError> {
    state
        .db
        .get_service(service_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Service {} not found", service_id)))
}

pub async fn list_services(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(query): Query<ListServicesQuery>,
) -> Result<Json<Vec<Service>>, AppError> {
    Ok(Json(
        state.db.list_services(query.authority.as_deref()).await?,
    ))
}

#[tracing::instrument(skip(state, user, request), fields(user_id = user.id()))]
pub async fn create_service(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(request): ValidatedJson<CreateServiceRequest>,
) -> Result<(StatusCode, Json<Service>), AppError> {
    user.require_catalog_access()?;

    let authority = request.authority.trim().to_string();
    ensure_known_authority(&state, &authority)?;
    ensure_non_negative("office_fee", Some(request.office_fee))?;
    ensure_non_negative("gov_fee_value", Some(request.gov_fee_value))?;

    let service = state
        .db
        .create_service(
            &CreateService {
                name: request.name.trim().to_string(),
                authority,
                office_fee: request.office_fee,
                gov_fee_type: request.gov_fee_type,
                gov_fee_value: request.gov_fee_value,
                vat_applicable: request.vat_applicable,
            }
            .normalized(),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(service)))
}

pub async fn get_service(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(service_id): Path<i64>,
) -> Result<Json<Service>, AppError> {
    Ok(Json(load_service(&state, service_id).await?))
}

#[tracing::instrument(skip(state, user, request), fields(user_id = user.id()))]
pub async fn update_service(
    State(state): State<AppState>,
    user: AuthUser,
    Path(service_id): Path<i64>,
    ValidatedJson(request): ValidatedJson<UpdateServiceRequest>,
) -> Result<Json<Service>, AppError> {
    user.require_catalog_access()?;

    let authority = request.authority.map(|a| a.trim().to_string());
    if let Some(authority) = &authority {
        ensure_known_authority(&state, authority)?;
    }
    ensure_non_negative("office_fee", request.office_fee)?;
    ensure_non_negative("gov_fee_value", request.gov_fee_value)?;

    let service = state
        .db
        .update_service(
            service_id,
            &UpdateService {
                name: request.name.map(|n| n.trim().to_string()),
                authority,
                office_fee: request.office_fee.map(crate::models::round2),
                gov_fee_type: request.gov_fee_type,
                gov_fee_value: request.gov_fee_value.map(crate::models::round2),
                vat_applicable: request.vat_applicable,
            },
        )
        .await?;

    Ok(Json(service))
}

#[tracing::instrument(skip(state, user), fields(user_id = user.id()))]
pub async fn delete_service(
    State(state): State<AppState>,
    user: AuthUser,
    Path(service_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    user.require_catalog_access()?;
    state.db.delete_service(service_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Price one line of a service without persisting anything.
pub async fn quote_service(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(service_id): Path<i64>,
    ValidatedJson(request): ValidatedJson<QuoteRequest>,
) -> Result<Json<QuoteResponse>, AppError> {
    let service = load_service(&state, service_id).await?;
    let vat_rate = state.config.pricing.vat_rate;

    let breakdown = price_line(
        &ServicePricing::from(&service),
        request.qty,
        request.gov_fee_override,
        vat_rate,
    )?;

    Ok(Json(QuoteResponse {
        service_id,
        vat_rate,
        breakdown,
    }))
}
