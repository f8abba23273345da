//! Income ledger writes.
//!
//! The ledger holds at most one row per `(source, source_id)`. Writes go
//! through [`upsert_income`], which must run on the connection of the
//! transaction that also updates the source entity.

use crate::models::{money_to_column, round2, Income, IncomeEntry, ManagedTransaction};
use rust_decimal::Decimal;
use serde::Serialize;
use service_core::error::AppError;
use sqlx::SqliteConnection;
use tracing::{info, instrument};

/// Result of a ledger write.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerWrite {
    pub income: Income,
    /// False when an existing row was corrected in place.
    pub created: bool,
}

/// Result of collecting a managed transaction's fee.
#[derive(Debug, Clone, Serialize)]
pub struct Collection {
    pub transaction: ManagedTransaction,
    pub income: Income,
    pub created: bool,
}

/// Amount to collect: the operator's amount when positive, otherwise the
/// catalog fee. Both are compared after rounding to cents. Fails when neither
/// yields a positive amount.
pub fn resolve_collection_amount(
    requested: Option<Decimal>,
    catalog_fee: Decimal,
) -> Result<Decimal, AppError> {
    let amount = requested
        .map(round2)
        .filter(|amount| *amount > Decimal::ZERO)
        .unwrap_or_else(|| round2(catalog_fee));

    if amount <= Decimal::ZERO {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Collected amount must be greater than zero"
        )));
    }

    Ok(amount)
}

/// Insert the ledger row for a source, or update the existing one.
#[instrument(skip(conn, entry), fields(source = entry.source.as_str(), source_id = entry.source_id))]
pub async fn upsert_income(
    conn: &mut SqliteConnection,
    entry: &IncomeEntry,
) -> Result<LedgerWrite, AppError> {
    let existing: Option<i64> =
        sqlx::query_scalar("SELECT id FROM incomes WHERE source = ?1 AND source_id = ?2")
            .bind(entry.source.as_str())
            .bind(entry.source_id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to look up income: {}", e))
            })?;

    let income = sqlx::query_as::<_, Income>(
        r#"
        INSERT INTO incomes (source, source_id, amount, method, reference, description, received_at, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
        ON CONFLICT (source, source_id) DO UPDATE SET
            amount = excluded.amount,
            method = excluded.method,
            reference = excluded.reference,
            description = excluded.description,
            received_at = excluded.received_at
        RETURNING id, source, source_id, amount, method, reference, description, received_at, created_at
        "#,
    )
    .bind(entry.source.as_str())
    .bind(entry.source_id)
    .bind(money_to_column(entry.amount))
    .bind(&entry.method)
    .bind(&entry.reference)
    .bind(&entry.description)
    .bind(entry.received_at)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to record income: {}", e)))?;

    let created = existing.is_none();
    info!(
        income_id = income.id,
        amount = %income.amount,
        created = created,
        "Income recorded"
    );

    Ok(LedgerWrite { income, created })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn positive_request_overrides_catalog_fee() {
        let amount = resolve_collection_amount(Some(d("30")), d("25.00")).unwrap();
        assert_eq!(amount.to_string(), "30.00");
    }

    #[test]
    fn missing_or_non_positive_request_falls_back_to_fee() {
        assert_eq!(
            resolve_collection_amount(None, d("25.00")).unwrap().to_string(),
            "25.00"
        );
        assert_eq!(
            resolve_collection_amount(Some(d("0")), d("25.00"))
                .unwrap()
                .to_string(),
            "25.00"
        );
        assert_eq!(
            resolve_collection_amount(Some(d("-5")), d("25.00"))
                .unwrap()
                .to_string(),
            "25.00"
        );
    }

    #[test]
    fn sub_cent_request_falls_back_to_fee() {
        assert_eq!(
            resolve_collection_amount(Some(d("0.001")), d("25.00"))
                .unwrap()
                .to_string(),
            "25.00"
        );
    }

    #[test]
    fn amounts_rounding_to_zero_are_rejected() {
        assert!(matches!(
            resolve_collection_amount(Some(d("0.004")), d("0.001")),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn zero_fee_without_amount_is_rejected() {
        assert!(matches!(
            resolve_collection_amount(None, d("0.00")),
            Err(AppError::BadRequest(_))
        ));
    }
}
