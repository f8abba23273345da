use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;

use crate::middleware::AdminUser;
use crate::models::{round2, Income, IncomeSource, ListIncomeFilter};
use crate::startup::AppState;

#[derive(Debug, Deserialize)]
pub struct ListIncomesQuery {
    pub source: Option<IncomeSource>,
    /// First day included.
    pub from: Option<NaiveDate>,
    /// Last day included.
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct IncomeReport {
    pub incomes: Vec<Income>,
    pub count: usize,
    pub total: Decimal,
}

/// Ledger rows for a day range, with their total. Admin only.
pub async fn list_incomes(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<ListIncomesQuery>,
) -> Result<Json<IncomeReport>, AppError> {
    if let (Some(from), Some(to)) = (query.from, query.to) {
        if from > to {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "'from' must not be after 'to'"
            )));
        }
    }

    let filter = ListIncomeFilter {
        source: query.source,
        from: query.from.map(|day| day.and_time(chrono::NaiveTime::MIN).and_utc()),
        to: query
            .to
            .and_then(|day| day.checked_add_days(Days::new(1)))
            .map(|day| day.and_time(chrono::NaiveTime::MIN).and_utc()),
    };

    let incomes = state.db.list_incomes(&filter).await?;
    let total = round2(
        incomes
            .iter()
            .fold(Decimal::ZERO, |acc, income| acc.saturating_add(income.amount)),
    );

    Ok(Json(IncomeReport {
        count: incomes.len(),
        total,
        incomes,
    }))
}
