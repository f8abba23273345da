//! Fixed-point currency helpers.
//!
//! Money is persisted as TEXT holding a two-decimal string, because SQLite has
//! no exact numeric type. Every amount read from or written to the database
//! passes through these helpers.

use rust_decimal::{Decimal, RoundingStrategy};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::str::FromStr;

/// Round to two decimals, half away from zero, and pin the scale to two digits.
pub fn round2(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}

/// Zero with a two-digit scale (`0.00`).
pub fn zero() -> Decimal {
    round2(Decimal::ZERO)
}

/// Encode an amount for a TEXT money column.
pub fn money_to_column(value: Decimal) -> String {
    round2(value).to_string()
}

/// Decode a TEXT money column.
pub fn money_column(row: &SqliteRow, column: &str) -> Result<Decimal, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    Decimal::from_str(raw.trim())
        .map(round2)
        .map_err(|e| sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: Box::new(e),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn round2_rounds_half_away_from_zero() {
        assert_eq!(round2(d("0.125")).to_string(), "0.13");
        assert_eq!(round2(d("-0.125")).to_string(), "-0.13");
        assert_eq!(round2(d("0.124")).to_string(), "0.12");
    }

    #[test]
    fn round2_pins_scale_to_two_digits() {
        assert_eq!(round2(d("25")).to_string(), "25.00");
        assert_eq!(round2(Decimal::ZERO).to_string(), "0.00");
        assert_eq!(zero().to_string(), "0.00");
    }

    #[test]
    fn money_to_column_is_two_decimal_text() {
        assert_eq!(money_to_column(d("13.1")), "13.10");
        assert_eq!(money_to_column(d("3.005")), "3.01");
    }
}
