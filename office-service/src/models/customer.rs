//! Customer model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Customer of the office.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Customer {
    pub id: i64,
    pub full_name: String,
    pub national_id: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Free-text note attached to a customer.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CustomerNote {
    pub id: i64,
    pub customer_id: i64,
    pub content: String,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Contact channel of a customer (phone, email, messenger handle, ...).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CustomerContact {
    pub id: i64,
    pub customer_id: i64,
    pub kind: String,
    pub value: String,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for adding a contact. A primary contact demotes the others.
#[derive(Debug, Clone)]
pub struct CreateContact {
    pub customer_id: i64,
    pub kind: String,
    pub value: String,
    pub is_primary: bool,
}

/// Input for creating a customer.
#[derive(Debug, Clone)]
pub struct CreateCustomer {
    pub full_name: String,
    pub national_id: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

/// Input for updating a customer.
#[derive(Debug, Clone, Default)]
pub struct UpdateCustomer {
    pub full_name: Option<String>,
    pub national_id: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}
