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
use crate::models::{CreateTicket, ListTicketsFilter, Ticket, TicketStatus};
use crate::services::TicketStatusChange;
use crate::startup::AppState;
use crate::utils::ValidatedJson;

#[derive(Debug, Deserialize)]
pub struct ListTicketsQuery {
    pub status: Option<TicketStatus>,
    pub customer_id: Option<i64>,
    pub assigned_to: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTicketRequest {
    pub customer_id: i64,
    pub service_id: i64,
    #[validate(length(max = 4000))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateStatusRequest {
    pub status: TicketStatus,
    /// Amount received on completion.
    pub amount: Option<Decimal>,
    #[validate(length(max = 32))]
    pub method: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AssignRequest {
    pub user_id: i64,
}

async fn load_ticket(state: &AppState, ticket_id: i64) -> Result<Ticket, AppError> {
    state
        .db
        .get_ticket(ticket_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Ticket {} not found", ticket_id)))
}

pub async fn list_tickets(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(query): Query<ListTicketsQuery>,
) -> Result<Json<Vec<Ticket>>, AppError> {
    let tickets = state
        .db
        .list_tickets(&ListTicketsFilter {
            status: query.status,
            customer_id: query.customer_id,
            assigned_to: query.assigned_to,
        })
        .await?;

    Ok(Json(tickets))
}

#[tracing::instrument(skip(state, user, request), fields(user_id = user.id()))]
pub async fn create_ticket(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(request): ValidatedJson<CreateTicketRequest>,
) -> Result<(StatusCode, Json<Ticket>), AppError> {
    let ticket = state
        .db
        .create_ticket(&CreateTicket {
            customer_id: request.customer_id,
            service_id: request.service_id,
            notes: request.notes,
            created_by: user.id(),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(ticket)))
}

pub async fn get_ticket(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(ticket_id): Path<i64>,
) -> Result<Json<Ticket>, AppError> {
    Ok(Json(load_ticket(&state, ticket_id).await?))
}

/// Change a ticket's status. Allowed for admins and the ticket's creator.
#[tracing::instrument(skip(state, user, request), fields(user_id = user.id(), status = request.status.as_str()))]
pub async fn update_ticket_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(ticket_id): Path<i64>,
    ValidatedJson(request): ValidatedJson<UpdateStatusRequest>,
) -> Result<Json<TicketStatusChange>, AppError> {
    let ticket = load_ticket(&state, ticket_id).await?;
    if !user.is_admin() && ticket.created_by != Some(user.id()) {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Only an administrator or the ticket's creator can change its status"
        )));
    }

    if matches!(request.amount, Some(amount) if amount < Decimal::ZERO) {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "amount cannot be negative"
        )));
    }

    let change = state
        .db
        .update_ticket_status(ticket_id, request.status, request.amount, request.method)
        .await?;

    Ok(Json(change))
}

#[tracing::instrument(skip(state, _admin, request))]
pub async fn assign_ticket(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(ticket_id): Path<i64>,
    ValidatedJson(request): ValidatedJson<AssignRequest>,
) -> Result<Json<Ticket>, AppError> {
    let ticket = state.db.assign_ticket(ticket_id, request.user_id).await?;
    Ok(Json(ticket))
}
