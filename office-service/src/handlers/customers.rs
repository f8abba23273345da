use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use validator::Validate;

use crate::middleware::AuthUser;
use crate::models::{
    CreateContact, CreateCustomer, Customer, CustomerContact, CustomerNote, Invoice, ListInvoicesFilter, ListTicketsFilter,
    Ticket, UpdateCustomer,
};
use crate::startup::AppState;
use crate::utils::ValidatedJson;

#[derive(Debug, Deserialize)]
pub struct ListCustomersQuery {
    /// Matches name, national ID or phone.
    pub q: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCustomerRequest {
    #[validate(length(min = 1, max = 200))]
    pub full_name: String,
    #[validate(length(max = 64))]
    pub national_id: Option<String>,
    #[validate(length(max = 32))]
    pub phone: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCustomerRequest {
    #[validate(length(min = 1, max = 200))]
    pub full_name: Option<String>,
    #[validate(length(max = 64))]
    pub national_id: Option<String>,
    #[validate(length(max = 32))]
    pub phone: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateNoteRequest {
    #[validate(length(min = 1, max = 4000))]
    pub content: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateContactRequest {
    #[serde(default = "default_contact_kind")]
    #[validate(length(min = 1, max = 32))]
    pub kind: String,
    #[validate(length(min = 1, max = 200))]
    pub value: String,
    #[serde(default)]
    pub is_primary: bool,
}

fn default_contact_kind() -> String {
    "phone".to_string()
}

/// Tickets and invoices of one customer.
#[derive(Debug, Serialize)]
pub struct CustomerHistory {
    pub customer: Customer,
    pub tickets: Vec<Ticket>,
    pub invoices: Vec<Invoice>,
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

async fn load_customer(state: &AppState, customer_id: i64) -> Result<Customer, AppError> {
    state
        .db
        .get_customer(customer_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Customer {} not found", customer_id)))
}

pub async fn list_customers(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(query): Query<ListCustomersQuery>,
) -> Result<Json<Vec<Customer>>, AppError> {
    let q = blank_to_none(query.q);
    Ok(Json(state.db.list_customers(q.as_deref()).await?))
}

#[tracing::instrument(skip(state, user, request), fields(user_id = user.id()))]
pub async fn create_customer(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(request): ValidatedJson<CreateCustomerRequest>,
) -> Result<(StatusCode, Json<Customer>), AppError> {
    let customer = state
        .db
        .create_customer(&CreateCustomer {
            full_name: request.full_name.trim().to_string(),
            national_id: blank_to_none(request.national_id),
            phone: blank_to_none(request.phone),
            email: blank_to_none(request.email),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(customer)))
}

pub async fn get_customer(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(customer_id): Path<i64>,
) -> Result<Json<Customer>, AppError> {
    Ok(Json(load_customer(&state, customer_id).await?))
}

#[tracing::instrument(skip(state, _user, request))]
pub async fn update_customer(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(customer_id): Path<i64>,
    ValidatedJson(request): ValidatedJson<UpdateCustomerRequest>,
) -> Result<Json<Customer>, AppError> {
    let customer = state
        .db
        .update_customer(
            customer_id,
            &UpdateCustomer {
                full_name: request.full_name.map(|n| n.trim().to_string()),
                national_id: blank_to_none(request.national_id),
                phone: blank_to_none(request.phone),
                email: blank_to_none(request.email),
            },
        )
        .await?;

    Ok(Json(customer))
}

/// Customers with invoices cannot be deleted.
#[tracing::instrument(skip(state, _user))]
pub async fn delete_customer(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(customer_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    state.db.delete_customer(customer_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_notes(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(customer_id): Path<i64>,
) -> Result<Json<Vec<CustomerNote>>, AppError> {
    load_customer(&state, customer_id).await?;
    Ok(Json(state.db.list_customer_notes(customer_id).await?))
}

#[tracing::instrument(skip(state, user, request), fields(user_id = user.id()))]
pub async fn add_note(
    State(state): State<AppState>,
    user: AuthUser,
    Path(customer_id): Path<i64>,
    ValidatedJson(request): ValidatedJson<CreateNoteRequest>,
) -> Result<(StatusCode, Json<CustomerNote>), AppError> {
    let note = state
        .db
        .add_customer_note(customer_id, request.content.trim(), user.id())
        .await?;

    Ok((StatusCode::CREATED, Json(note)))
}

pub async fn list_contacts(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(customer_id): Path<i64>,
) -> Result<Json<Vec<CustomerContact>>, AppError> {
    load_customer(&state, customer_id).await?;
    Ok(Json(state.db.list_customer_contacts(customer_id).await?))
}

#[tracing::instrument(skip(state, user, request), fields(user_id = user.id()))]
pub async fn add_contact(
    State(state): State<AppState>,
    user: AuthUser,
    Path(customer_id): Path<i64>,
    ValidatedJson(request): ValidatedJson<CreateContactRequest>,
) -> Result<(StatusCode, Json<CustomerContact>), AppError> {
    let value = request.value.trim();
    if value.is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Contact value cannot be blank"
        )));
    }

    let contact = state
        .db
        .add_customer_contact(&CreateContact {
            customer_id,
            kind: request.kind.trim().to_lowercase(),
            value: value.to_string(),
            is_primary: request.is_primary,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(contact)))
}

pub async fn customer_history(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(customer_id): Path<i64>,
) -> Result<Json<CustomerHistory>, AppError> {
    let customer = load_customer(&state, customer_id).await?;

    let tickets = state
        .db
        .list_tickets(&ListTicketsFilter {
            customer_id: Some(customer_id),
            ..Default::default()
        })
        .await?;

    let invoices = state
        .db
        .list_invoices(&ListInvoicesFilter {
            customer_id: Some(customer_id),
            ..Default::default()
        })
        .await?;

    Ok(Json(CustomerHistory {
        customer,
        tickets,
        invoices,
    }))
}
