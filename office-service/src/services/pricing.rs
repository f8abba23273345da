//! Fee and VAT calculation for invoice lines.
//!
//! Every amount is quantized to two decimals with half-away-from-zero
//! rounding at each step, so an invoice's grand total always equals the sum
//! of its rounded components.

use crate::models::{round2, zero, GovFeeType, Service};
use rust_decimal::Decimal;
use serde::Serialize;
use service_core::error::AppError;
use thiserror::Error;

/// Pricing validation failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PricingError {
    #[error("Quantity must be at least 1, got {0}")]
    InvalidQuantity(i64),

    #[error("A government fee is required for variable-fee services")]
    MissingGovFee,

    #[error("Government fee cannot be negative")]
    NegativeGovFee,

    #[error("Office fee cannot be negative")]
    NegativeOfficeFee,

    #[error("VAT rate cannot be negative")]
    NegativeVatRate,

    #[error("Amount is too large")]
    AmountOverflow,
}

impl From<PricingError> for AppError {
    fn from(err: PricingError) -> Self {
        AppError::BadRequest(anyhow::anyhow!(err))
    }
}

/// Fee parameters of a catalog service.
#[derive(Debug, Clone, Copy)]
pub struct ServicePricing {
    pub office_fee: Decimal,
    pub gov_fee_type: GovFeeType,
    pub gov_fee_value: Decimal,
    pub vat_applicable: bool,
}

impl From<&Service> for ServicePricing {
    fn from(service: &Service) -> Self {
        Self {
            office_fee: service.office_fee,
            gov_fee_type: service.gov_fee_type,
            gov_fee_value: service.gov_fee_value,
            vat_applicable: service.vat_applicable,
        }
    }
}

/// Computed amounts for one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LineBreakdown {
    pub qty: i64,
    pub office_fee_total: Decimal,
    pub gov_fee_total: Decimal,
    pub vat_amount: Decimal,
    pub line_total: Decimal,
}

/// Price a single line.
///
/// For variable-fee services the override is the line's total government
/// fee and is not multiplied by `qty`. Fixed-fee services ignore it.
pub fn price_line(
    pricing: &ServicePricing,
    qty: i64,
    gov_fee_override: Option<Decimal>,
    vat_rate: Decimal,
) -> Result<LineBreakdown, PricingError> {
    if qty < 1 {
        return Err(PricingError::InvalidQuantity(qty));
    }
    if vat_rate < Decimal::ZERO {
        return Err(PricingError::NegativeVatRate);
    }
    if pricing.office_fee < Decimal::ZERO {
        return Err(PricingError::NegativeOfficeFee);
    }

    let quantity = Decimal::from(qty);
    let office_fee_total = round2(checked_mul(pricing.office_fee, quantity)?);

    let gov_fee_total = match pricing.gov_fee_type {
        GovFeeType::Fixed => {
            if pricing.gov_fee_value < Decimal::ZERO {
                return Err(PricingError::NegativeGovFee);
            }
            round2(checked_mul(pricing.gov_fee_value, quantity)?)
        }
        GovFeeType::Variable => {
            let fee = gov_fee_override.ok_or(PricingError::MissingGovFee)?;
            if fee < Decimal::ZERO {
                return Err(PricingError::NegativeGovFee);
            }
            round2(fee)
        }
    };

    let vat_amount = if pricing.vat_applicable {
        round2(checked_mul(office_fee_total, vat_rate)?)
    } else {
        zero()
    };

    Ok(LineBreakdown {
        qty,
        office_fee_total,
        gov_fee_total,
        vat_amount,
        line_total: round2(checked_add(
            checked_add(office_fee_total, vat_amount)?,
            gov_fee_total,
        )?),
    })
}

fn checked_mul(a: Decimal, b: Decimal) -> Result<Decimal, PricingError> {
    a.checked_mul(b).ok_or(PricingError::AmountOverflow)
}

fn checked_add(a: Decimal, b: Decimal) -> Result<Decimal, PricingError> {
    a.checked_add(b).ok_or(PricingError::AmountOverflow)
}

/// Running totals for an invoice being assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PricingTotals {
    pub office_fee_total: Decimal,
    pub gov_fee_total: Decimal,
    pub vat_amount: Decimal,
    pub grand_total: Decimal,
}

impl Default for PricingTotals {
    fn default() -> Self {
        Self {
            office_fee_total: zero(),
            gov_fee_total: zero(),
            vat_amount: zero(),
            grand_total: zero(),
        }
    }
}

impl PricingTotals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Price a line and add it to the totals. The totals are untouched when
    /// the line is rejected.
    pub fn add_line(
        &mut self,
        pricing: &ServicePricing,
        qty: i64,
        gov_fee_override: Option<Decimal>,
        vat_rate: Decimal,
    ) -> Result<LineBreakdown, PricingError> {
        let line = price_line(pricing, qty, gov_fee_override, vat_rate)?;

        let totals = Self {
            office_fee_total: round2(checked_add(self.office_fee_total, line.office_fee_total)?),
            gov_fee_total: round2(checked_add(self.gov_fee_total, line.gov_fee_total)?),
            vat_amount: round2(checked_add(self.vat_amount, line.vat_amount)?),
            grand_total: round2(checked_add(self.grand_total, line.line_total)?),
        };
        *self = totals;

        Ok(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn fixed(office: &str, gov: &str, vat: bool) -> ServicePricing {
        ServicePricing {
            office_fee: d(office),
            gov_fee_type: GovFeeType::Fixed,
            gov_fee_value: d(gov),
            vat_applicable: vat,
        }
    }

    fn variable(office: &str, vat: bool) -> ServicePricing {
        ServicePricing {
            office_fee: d(office),
            gov_fee_type: GovFeeType::Variable,
            gov_fee_value: Decimal::ZERO,
            vat_applicable: vat,
        }
    }

    #[test]
    fn fixed_fee_line_with_vat() {
        let line = price_line(&fixed("3.00", "10.00", true), 1, None, d("0.05")).unwrap();

        assert_eq!(line.office_fee_total.to_string(), "3.00");
        assert_eq!(line.gov_fee_total.to_string(), "10.00");
        assert_eq!(line.vat_amount.to_string(), "0.15");
        assert_eq!(line.line_total.to_string(), "13.15");
    }

    #[test]
    fn fixed_fee_scales_with_quantity_and_ignores_override() {
        let line = price_line(&fixed("2.50", "4.00", false), 3, Some(d("99")), d("0.05")).unwrap();

        assert_eq!(line.office_fee_total.to_string(), "7.50");
        assert_eq!(line.gov_fee_total.to_string(), "12.00");
        assert_eq!(line.vat_amount.to_string(), "0.00");
        assert_eq!(line.line_total.to_string(), "19.50");
    }

    #[test]
    fn variable_fee_override_is_not_multiplied() {
        let line = price_line(&variable("5.00", true), 2, Some(d("7.255")), d("0.05")).unwrap();

        assert_eq!(line.office_fee_total.to_string(), "10.00");
        assert_eq!(line.gov_fee_total.to_string(), "7.26");
        assert_eq!(line.vat_amount.to_string(), "0.50");
        assert_eq!(line.line_total.to_string(), "17.76");
    }

    #[test]
    fn vat_rounds_half_away_from_zero() {
        // 2.50 * 0.05 = 0.125
        let line = price_line(&fixed("2.50", "0", true), 1, None, d("0.05")).unwrap();
        assert_eq!(line.vat_amount.to_string(), "0.13");
    }

    #[test]
    fn variable_fee_without_override_is_rejected() {
        let err = price_line(&variable("5.00", false), 1, None, d("0.05")).unwrap_err();
        assert_eq!(err, PricingError::MissingGovFee);
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let err = price_line(&fixed("3.00", "10.00", true), 0, None, d("0.05")).unwrap_err();
        assert_eq!(err, PricingError::InvalidQuantity(0));
    }

    #[test]
    fn negative_amounts_are_rejected() {
        assert_eq!(
            price_line(&variable("5.00", false), 1, Some(d("-1")), d("0.05")).unwrap_err(),
            PricingError::NegativeGovFee
        );
        assert_eq!(
            price_line(&fixed("-1.00", "1.00", false), 1, None, d("0.05")).unwrap_err(),
            PricingError::NegativeOfficeFee
        );
        assert_eq!(
            price_line(&fixed("1.00", "1.00", false), 1, None, d("-0.05")).unwrap_err(),
            PricingError::NegativeVatRate
        );
    }

    #[test]
    fn oversized_line_is_an_error() {
        let pricing = fixed("100000000000000.00", "0", true);
        assert_eq!(
            price_line(&pricing, i64::MAX, None, d("0.05")).unwrap_err(),
            PricingError::AmountOverflow
        );
    }

    #[test]
    fn overflowing_totals_are_rejected_and_left_untouched() {
        let mut totals = PricingTotals::new();
        let big = fixed("50000000000000000000000000000", "0", false);
        totals.add_line(&big, 1, None, d("0.05")).unwrap();
        let before = totals;

        assert_eq!(
            totals.add_line(&big, 1, None, d("0.05")).unwrap_err(),
            PricingError::AmountOverflow
        );
        assert_eq!(totals, before);
    }

    #[test]
    fn totals_accumulate_lines() {
        let mut totals = PricingTotals::new();
        totals
            .add_line(&fixed("3.00", "10.00", true), 1, None, d("0.05"))
            .unwrap();
        totals
            .add_line(&variable("4.10", true), 3, Some(d("20.00")), d("0.05"))
            .unwrap();
        totals
            .add_line(&fixed("1.99", "0.50", false), 2, None, d("0.05"))
            .unwrap();

        assert_eq!(totals.office_fee_total.to_string(), "19.28");
        assert_eq!(totals.gov_fee_total.to_string(), "31.00");
        assert_eq!(totals.vat_amount.to_string(), "0.77");
        assert_eq!(
            totals.grand_total,
            totals.office_fee_total + totals.gov_fee_total + totals.vat_amount
        );
    }

    #[test]
    fn rejected_line_leaves_totals_untouched() {
        let mut totals = PricingTotals::new();
        totals
            .add_line(&fixed("3.00", "10.00", true), 1, None, d("0.05"))
            .unwrap();
        let before = totals;

        assert!(totals
            .add_line(&variable("5.00", false), 1, None, d("0.05"))
            .is_err());
        assert_eq!(totals, before);
    }
}
