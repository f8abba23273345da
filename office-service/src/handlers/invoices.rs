//! Invoice and payment endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use validator::Validate;

use crate::middleware::AuthUser;
use crate::models::{
    CreateInvoice, CreatePayment, Invoice, InvoiceDetail, InvoiceLineRequest, InvoicePayment,
    InvoiceStatus, ListInvoicesFilter,
};
use crate::services::{metrics, PaymentOutcome};
use crate::startup::AppState;
use crate::utils::ValidatedJson;

#[derive(Debug, Deserialize)]
pub struct ListInvoicesQuery {
    pub status: Option<InvoiceStatus>,
    pub customer_id: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct InvoiceItemRequest {
    pub service_id: i64,
    #[serde(default = "default_qty")]
    #[validate(range(max = 10000))]
    pub qty: i64,
    /// Total government fee of the line, for variable-fee services.
    pub gov_fee_override: Option<Decimal>,
}

fn default_qty() -> i64 {
    1
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateInvoiceRequest {
    pub customer_id: i64,
    pub ticket_id: Option<i64>,
    pub due_date: Option<NaiveDate>,
    #[validate(length(max = 4000))]
    pub notes: Option<String>,
    #[validate(length(min = 1, max = 200))]
    pub items: Vec<InvoiceItemRequest>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePaymentRequest {
    pub amount: Decimal,
    #[validate(length(max = 32))]
    pub method: Option<String>,
    #[validate(length(max = 128))]
    pub reference: Option<String>,
}

pub async fn list_invoices(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(query): Query<ListInvoicesQuery>,
) -> Result<Json<Vec<Invoice>>, AppError> {
    let invoices = state
        .db
        .list_invoices(&ListInvoicesFilter {
            status: query.status,
            customer_id: query.customer_id,
        })
        .await?;

    Ok(Json(invoices))
}

/// Create an invoice from catalog services. Totals are fixed at creation.
#[tracing::instrument(skip(state, user, request), fields(user_id = user.id(), customer_id = request.customer_id))]
pub async fn create_invoice(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(request): ValidatedJson<CreateInvoiceRequest>,
) -> Result<(StatusCode, Json<InvoiceDetail>), AppError> {
    for item in &request.items {
        item.validate()?;
    }

    let input = CreateInvoice {
        customer_id: request.customer_id,
        ticket_id: request.ticket_id,
        due_date: request.due_date,
        notes: request.notes,
        lines: request
            .items
            .into_iter()
            .map(|item| InvoiceLineRequest {
                service_id: item.service_id,
                qty: item.qty,
                gov_fee_override: item.gov_fee_override,
            })
            .collect(),
    };

    let detail = state
        .db
        .create_invoice(&input, state.config.pricing.vat_rate)
        .await?;

    Ok((StatusCode::CREATED, Json(detail)))
}

pub async fn get_invoice(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(invoice_id): Path<i64>,
) -> Result<Json<InvoiceDetail>, AppError> {
    Ok(Json(state.db.get_invoice_detail(invoice_id).await?))
}

pub async fn list_payments(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(invoice_id): Path<i64>,
) -> Result<Json<Vec<InvoicePayment>>, AppError> {
    if state.db.get_invoice(invoice_id).await?.is_none() {
        return Err(AppError::NotFound(anyhow::anyhow!(
            "Invoice {} not found",
            invoice_id
        )));
    }

    Ok(Json(state.db.list_payments(invoice_id).await?))
}

#[tracing::instrument(skip(state, user, request), fields(user_id = user.id(), amount = %request.amount))]
pub async fn record_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(invoice_id): Path<i64>,
    ValidatedJson(request): ValidatedJson<CreatePaymentRequest>,
) -> Result<(StatusCode, Json<PaymentOutcome>), AppError> {
    let outcome = state
        .db
        .record_payment(&CreatePayment {
            invoice_id,
            amount: request.amount,
            method: request.method,
            reference: request.reference,
        })
        .await?;

    metrics::record_payment(&outcome.invoice.status);

    Ok((StatusCode::CREATED, Json(outcome)))
}
