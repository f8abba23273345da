//! Invoice, invoice item and invoice payment models.

use super::money::{money_column, round2, zero};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

/// Invoice status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Unpaid,
    Partial,
    Paid,
    Overdue,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Unpaid => "unpaid",
            InvoiceStatus::Partial => "partial",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "partial" => InvoiceStatus::Partial,
            "paid" => InvoiceStatus::Paid,
            "overdue" => InvoiceStatus::Overdue,
            _ => InvoiceStatus::Unpaid,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unpaid" => Some(InvoiceStatus::Unpaid),
            "partial" => Some(InvoiceStatus::Partial),
            "paid" => Some(InvoiceStatus::Paid),
            "overdue" => Some(InvoiceStatus::Overdue),
            _ => None,
        }
    }

    /// Status implied by the amount paid so far.
    ///
    /// `Paid` wins over everything else, including an elapsed due date, and a
    /// paid invoice stays paid: payments are positive and append-only, so
    /// `total_paid` never decreases.
    pub fn derive(
        grand_total: Decimal,
        total_paid: Decimal,
        due_date: Option<NaiveDate>,
        today: NaiveDate,
    ) -> Self {
        if total_paid >= grand_total {
            InvoiceStatus::Paid
        } else if due_date.is_some_and(|due| due < today) {
            InvoiceStatus::Overdue
        } else if total_paid > Decimal::ZERO {
            InvoiceStatus::Partial
        } else {
            InvoiceStatus::Unpaid
        }
    }
}

/// Invoice header. Totals are fixed when the invoice is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: i64,
    pub customer_id: i64,
    pub ticket_id: Option<i64>,
    pub subtotal_office_fee: Decimal,
    pub total_gov_fees: Decimal,
    pub vat_amount: Decimal,
    pub grand_total: Decimal,
    pub status: String,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, SqliteRow> for Invoice {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            customer_id: row.try_get("customer_id")?,
            ticket_id: row.try_get("ticket_id")?,
            subtotal_office_fee: money_column(row, "subtotal_office_fee")?,
            total_gov_fees: money_column(row, "total_gov_fees")?,
            vat_amount: money_column(row, "vat_amount")?,
            grand_total: money_column(row, "grand_total")?,
            status: row.try_get("status")?,
            due_date: row.try_get("due_date")?,
            notes: row.try_get("notes")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// One service sold on an invoice. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceItem {
    pub id: i64,
    pub invoice_id: i64,
    pub service_id: i64,
    pub qty: i64,
    pub office_fee: Decimal,
    pub gov_fee: Decimal,
    pub vat_amount: Decimal,
    pub line_total: Decimal,
}

impl<'r> FromRow<'r, SqliteRow> for InvoiceItem {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            invoice_id: row.try_get("invoice_id")?,
            service_id: row.try_get("service_id")?,
            qty: row.try_get("qty")?,
            office_fee: money_column(row, "office_fee")?,
            gov_fee: money_column(row, "gov_fee")?,
            vat_amount: money_column(row, "vat_amount")?,
            line_total: money_column(row, "line_total")?,
        })
    }
}

/// Payment recorded against an invoice. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoicePayment {
    pub id: i64,
    pub invoice_id: i64,
    pub amount: Decimal,
    pub method: Option<String>,
    pub reference: Option<String>,
    pub paid_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, SqliteRow> for InvoicePayment {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            invoice_id: row.try_get("invoice_id")?,
            amount: money_column(row, "amount")?,
            method: row.try_get("method")?,
            reference: row.try_get("reference")?,
            paid_at: row.try_get("paid_at")?,
        })
    }
}

/// Payment position of an invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentPosition {
    pub total_paid: Decimal,
    /// Amount still owed; zero once paid.
    pub balance_due: Decimal,
    /// Surplus from overpayment. Reported only, never refunded.
    pub credit_balance: Decimal,
}

impl PaymentPosition {
    pub fn new(grand_total: Decimal, total_paid: Decimal) -> Self {
        let total_paid = round2(total_paid);
        let difference = grand_total - total_paid;
        Self {
            total_paid,
            balance_due: if difference > Decimal::ZERO {
                round2(difference)
            } else {
                zero()
            },
            credit_balance: if difference < Decimal::ZERO {
                round2(-difference)
            } else {
                zero()
            },
        }
    }
}

/// Invoice with its lines, payments and payment position.
#[derive(Debug, Clone, Serialize)]
pub struct InvoiceDetail {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub items: Vec<InvoiceItem>,
    pub payments: Vec<InvoicePayment>,
    #[serde(flatten)]
    pub position: PaymentPosition,
}

/// Filter parameters for listing invoices.
#[derive(Debug, Clone, Default)]
pub struct ListInvoicesFilter {
    pub status: Option<InvoiceStatus>,
    pub customer_id: Option<i64>,
}

/// Requested line on a new invoice.
#[derive(Debug, Clone)]
pub struct InvoiceLineRequest {
    pub service_id: i64,
    pub qty: i64,
    pub gov_fee_override: Option<Decimal>,
}

/// Input for creating an invoice.
#[derive(Debug, Clone)]
pub struct CreateInvoice {
    pub customer_id: i64,
    pub ticket_id: Option<i64>,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub lines: Vec<InvoiceLineRequest>,
}

/// Input for recording a payment.
#[derive(Debug, Clone)]
pub struct CreatePayment {
    pub invoice_id: i64,
    pub amount: Decimal,
    pub method: Option<String>,
    pub reference: Option<String>,
}
