//! Ticket model: a customer's request for a service.

use super::money::money_column;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

/// Ticket status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    New,
    InProgress,
    Completed,
    Cancelled,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::New => "new",
            TicketStatus::InProgress => "in_progress",
            TicketStatus::Completed => "completed",
            TicketStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(TicketStatus::New),
            "in_progress" => Some(TicketStatus::InProgress),
            "completed" => Some(TicketStatus::Completed),
            "cancelled" => Some(TicketStatus::Cancelled),
            _ => None,
        }
    }
}

/// Ticket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: i64,
    pub customer_id: i64,
    pub service_id: i64,
    pub status: String,
    pub notes: Option<String>,
    pub assigned_to: Option<i64>,
    pub created_by: Option<i64>,
    pub paid_amount: Decimal,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, SqliteRow> for Ticket {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            customer_id: row.try_get("customer_id")?,
            service_id: row.try_get("service_id")?,
            status: row.try_get("status")?,
            notes: row.try_get("notes")?,
            assigned_to: row.try_get("assigned_to")?,
            created_by: row.try_get("created_by")?,
            paid_amount: money_column(row, "paid_amount")?,
            paid_at: row.try_get("paid_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Filter parameters for listing tickets.
#[derive(Debug, Clone, Default)]
pub struct ListTicketsFilter {
    pub status: Option<TicketStatus>,
    pub customer_id: Option<i64>,
    pub assigned_to: Option<i64>,
}

/// Input for opening a ticket.
#[derive(Debug, Clone)]
pub struct CreateTicket {
    pub customer_id: i64,
    pub service_id: i64,
    pub notes: Option<String>,
    pub created_by: i64,
}
