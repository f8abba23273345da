//! Managed transaction model: a catalog entry billed once when finished.

use super::money::money_column;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

/// Lifecycle status of a managed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagedStatus {
    Active,
    Pending,
    Finished,
}

impl ManagedStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ManagedStatus::Active => "active",
            ManagedStatus::Pending => "pending",
            ManagedStatus::Finished => "finished",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "pending" => ManagedStatus::Pending,
            "finished" => ManagedStatus::Finished,
            _ => ManagedStatus::Active,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(ManagedStatus::Active),
            "pending" => Some(ManagedStatus::Pending),
            "finished" => Some(ManagedStatus::Finished),
            _ => None,
        }
    }
}

/// Managed transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagedTransaction {
    pub id: i64,
    pub authority: String,
    pub service: String,
    pub description: Option<String>,
    pub fee: Decimal,
    pub status: String,
    pub is_paid: bool,
    pub paid_amount: Decimal,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ManagedTransaction {
    pub fn status(&self) -> ManagedStatus {
        ManagedStatus::from_string(&self.status)
    }
}

impl<'r> FromRow<'r, SqliteRow> for ManagedTransaction {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            authority: row.try_get("authority")?,
            service: row.try_get("service")?,
            description: row.try_get("description")?,
            fee: money_column(row, "fee")?,
            status: row.try_get("status")?,
            is_paid: row.try_get("is_paid")?,
            paid_amount: money_column(row, "paid_amount")?,
            paid_at: row.try_get("paid_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Filter parameters for listing managed transactions.
#[derive(Debug, Clone, Default)]
pub struct ListManagedFilter {
    pub authority: Option<String>,
    pub status: Option<ManagedStatus>,
}

/// Input for creating a managed transaction.
#[derive(Debug, Clone)]
pub struct CreateManagedTransaction {
    pub authority: String,
    pub service: String,
    pub description: Option<String>,
    pub fee: Decimal,
    pub status: ManagedStatus,
}

/// Input for updating a managed transaction.
#[derive(Debug, Clone, Default)]
pub struct UpdateManagedTransaction {
    pub service: Option<String>,
    pub description: Option<String>,
    pub fee: Option<Decimal>,
    pub status: Option<ManagedStatus>,
}

/// Operator input for collecting a managed transaction's fee.
#[derive(Debug, Clone, Default)]
pub struct CollectFee {
    /// Overrides the catalog fee when positive.
    pub amount: Option<Decimal>,
    pub method: Option<String>,
    pub reference: Option<String>,
    pub description: Option<String>,
}
