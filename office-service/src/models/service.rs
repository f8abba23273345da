//! Government service catalog model.

use super::money::{money_column, round2};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

/// How the government fee of a service is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GovFeeType {
    /// `gov_fee_value` per unit.
    Fixed,
    /// Entered by the operator for each sale.
    Variable,
}

impl GovFeeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GovFeeType::Fixed => "fixed",
            GovFeeType::Variable => "variable",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "variable" => GovFeeType::Variable,
            _ => GovFeeType::Fixed,
        }
    }
}

/// A service the office sells on behalf of an authority.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: i64,
    pub name: String,
    pub authority: String,
    pub office_fee: Decimal,
    pub gov_fee_type: GovFeeType,
    pub gov_fee_value: Decimal,
    pub vat_applicable: bool,
    pub created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, SqliteRow> for Service {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let gov_fee_type: String = row.try_get("gov_fee_type")?;
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            authority: row.try_get("authority")?,
            office_fee: money_column(row, "office_fee")?,
            gov_fee_type: GovFeeType::from_string(&gov_fee_type),
            gov_fee_value: money_column(row, "gov_fee_value")?,
            vat_applicable: row.try_get("vat_applicable")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Input for creating a service.
#[derive(Debug, Clone)]
pub struct CreateService {
    pub name: String,
    pub authority: String,
    pub office_fee: Decimal,
    pub gov_fee_type: GovFeeType,
    pub gov_fee_value: Decimal,
    pub vat_applicable: bool,
}

impl CreateService {
    /// Normalize amounts to currency precision.
    pub fn normalized(mut self) -> Self {
        self.office_fee = round2(self.office_fee);
        self.gov_fee_value = round2(self.gov_fee_value);
        self
    }
}

/// Input for updating a service.
#[derive(Debug, Clone, Default)]
pub struct UpdateService {
    pub name: Option<String>,
    pub authority: Option<String>,
    pub office_fee: Option<Decimal>,
    pub gov_fee_type: Option<GovFeeType>,
    pub gov_fee_value: Option<Decimal>,
    pub vat_applicable: Option<bool>,
}
