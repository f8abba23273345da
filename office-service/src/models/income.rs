//! Income ledger model.

use super::money::money_column;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

/// Entity that produced a ledger row. Together with the source id it
/// identifies at most one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncomeSource {
    ManagedTransaction,
    Invoice,
    Ticket,
}

impl IncomeSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncomeSource::ManagedTransaction => "managed_transaction",
            IncomeSource::Invoice => "invoice",
            IncomeSource::Ticket => "ticket",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "managed_transaction" => Some(IncomeSource::ManagedTransaction),
            "invoice" => Some(IncomeSource::Invoice),
            "ticket" => Some(IncomeSource::Ticket),
            _ => None,
        }
    }
}

/// Money actually collected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Income {
    pub id: i64,
    pub source: String,
    pub source_id: i64,
    pub amount: Decimal,
    pub method: Option<String>,
    pub reference: Option<String>,
    pub description: Option<String>,
    pub received_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, SqliteRow> for Income {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            source: row.try_get("source")?,
            source_id: row.try_get("source_id")?,
            amount: money_column(row, "amount")?,
            method: row.try_get("method")?,
            reference: row.try_get("reference")?,
            description: row.try_get("description")?,
            received_at: row.try_get("received_at")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Ledger write for one source.
#[derive(Debug, Clone)]
pub struct IncomeEntry {
    pub source: IncomeSource,
    pub source_id: i64,
    pub amount: Decimal,
    pub method: Option<String>,
    pub reference: Option<String>,
    pub description: Option<String>,
    pub received_at: DateTime<Utc>,
}

/// Filter parameters for listing income.
#[derive(Debug, Clone, Default)]
pub struct ListIncomeFilter {
    pub source: Option<IncomeSource>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}
