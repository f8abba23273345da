//! Database service for office-service.

use crate::models::{
    money_to_column, round2, zero, CollectFee, CreateContact, CreateCustomer, CreateInvoice,
    CreateManagedTransaction, CreatePayment, CreateService, CreateTask, CreateTicket, CreateUser,
    Customer, CustomerContact, CustomerNote, Income, IncomeEntry, IncomeSource, Invoice, InvoiceDetail,
    InvoiceItem, InvoicePayment, InvoiceStatus, ListIncomeFilter, ListInvoicesFilter,
    ListManagedFilter, ListTasksFilter, ListTicketsFilter, ManagedStatus, ManagedTransaction,
    PaymentPosition, Service, Task, Ticket, TicketStatus, UpdateCustomer,
    UpdateManagedTransaction, UpdateService, UpdateTask, UpdateUser, User,
};
use crate::services::ledger::{self, Collection, LedgerWrite};
use crate::services::metrics::{record_collection, record_invoice_created, DB_QUERY_DURATION};
use crate::services::pricing::{LineBreakdown, PricingTotals, ServicePricing};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use service_core::error::AppError;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, instrument, warn};

const USER_COLUMNS: &str = "id, username, email, password_hash, role, permissions, created_at";

/// Outcome of recording an invoice payment.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentOutcome {
    pub payment: InvoicePayment,
    pub invoice: Invoice,
    pub position: PaymentPosition,
}

/// Outcome of a ticket status change.
#[derive(Debug, Clone, Serialize)]
pub struct TicketStatusChange {
    pub ticket: Ticket,
    pub income: Option<Income>,
}

/// Admin dashboard counters.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    pub employees: i64,
    pub customers: i64,
    pub tickets_total: i64,
    pub tickets_open: i64,
    pub invoices_total: i64,
    pub invoices_outstanding: i64,
    pub income_total: Decimal,
    pub outstanding_balance: Decimal,
}

/// Managed transactions grouped by authority.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorityStats {
    pub authority: String,
    pub total: i64,
    pub active: i64,
    pub pending: i64,
    pub finished: i64,
    pub paid: i64,
    pub collected: Decimal,
}

fn db_error(context: &'static str) -> impl FnOnce(sqlx::Error) -> AppError {
    move |e| AppError::DatabaseError(anyhow::anyhow!("{}: {}", context, e))
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

/// SQLite reports `ON DELETE RESTRICT` as SQLITE_CONSTRAINT_TRIGGER (1811)
/// rather than SQLITE_CONSTRAINT_FOREIGNKEY (787).
fn is_foreign_key_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db_err)
        if db_err.is_foreign_key_violation() || db_err.code().as_deref() == Some("1811"))
}

fn sum_amounts<'a>(amounts: impl IntoIterator<Item = &'a Decimal>) -> Decimal {
    round2(
        amounts
            .into_iter()
            .fold(Decimal::ZERO, |acc, amount| acc.saturating_add(*amount)),
    )
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection pool, creating the file if needed.
    #[instrument(skip(database_url), fields(service = "office-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to SQLite"
        );

        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Invalid DATABASE_URL: {}", e)))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect_with(options)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("SQLite connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // User Operations
    // -------------------------------------------------------------------------

    /// Count user accounts.
    #[instrument(skip(self))]
    pub async fn count_users(&self) -> Result<i64, AppError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
            .map_err(db_error("Failed to count users"))
    }

    /// Create a user account.
    #[instrument(skip(self, input), fields(username = %input.username))]
    pub async fn create_user(&self, input: &CreateUser) -> Result<User, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_user"])
            .start_timer();

        let permissions = serde_json::to_string(&input.permissions)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!(e)))?;

        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (username, email, password_hash, role, permissions, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&input.username)
        .bind(&input.email)
        .bind(&input.password_hash)
        .bind(input.role.as_str())
        .bind(permissions)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(anyhow::anyhow!(
                    "Username or email already in use: {}",
                    input.username
                ))
            } else {
                AppError::DatabaseError(anyhow::anyhow!("Failed to create user: {}", e))
            }
        })?;

        timer.observe_duration();

        info!(user_id = user.id, role = %user.role, "User created");

        Ok(user)
    }

    /// Get a user by ID.
    #[instrument(skip(self))]
    pub async fn get_user(&self, user_id: i64) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to get user"))
    }

    /// Get a user by username.
    #[instrument(skip(self))]
    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = ?1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to get user"))
    }

    /// List users by username.
    #[instrument(skip(self))]
    pub async fn list_users(&self) -> Result<Vec<User>, AppError> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY username"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list users"))
    }

    /// Update a user account.
    #[instrument(skip(self, input))]
    pub async fn update_user(&self, user_id: i64, input: &UpdateUser) -> Result<User, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_user"])
            .start_timer();

        let permissions = input
            .permissions
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| AppError::InternalError(anyhow::anyhow!(e)))?;

        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET username = COALESCE(?2, username),
                email = COALESCE(?3, email),
                password_hash = COALESCE(?4, password_hash),
                role = COALESCE(?5, role),
                permissions = COALESCE(?6, permissions)
            WHERE id = ?1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(&input.username)
        .bind(&input.email)
        .bind(&input.password_hash)
        .bind(input.role.map(|r| r.as_str()))
        .bind(permissions)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(anyhow::anyhow!("Username or email already in use"))
            } else {
                AppError::DatabaseError(anyhow::anyhow!("Failed to update user: {}", e))
            }
        })?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User {} not found", user_id)))?;

        timer.observe_duration();

        info!(user_id = user.id, "User updated");

        Ok(user)
    }

    /// Delete a user account.
    #[instrument(skip(self))]
    pub async fn delete_user(&self, user_id: i64) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to delete user"))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "User {} not found",
                user_id
            )));
        }

        info!(user_id = user_id, "User deleted");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Customer Operations
    // -------------------------------------------------------------------------

    /// Create a customer.
    #[instrument(skip(self, input))]
    pub async fn create_customer(&self, input: &CreateCustomer) -> Result<Customer, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_customer"])
            .start_timer();

        let customer = sqlx::query_as::<_, Customer>(
            r#"
            INSERT INTO customers (full_name, national_id, phone, email, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            RETURNING id, full_name, national_id, phone, email, created_at
            "#,
        )
        .bind(&input.full_name)
        .bind(&input.national_id)
        .bind(&input.phone)
        .bind(&input.email)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(anyhow::anyhow!(
                    "A customer with national id '{}' already exists",
                    input.national_id.as_deref().unwrap_or_default()
                ))
            } else {
                AppError::DatabaseError(anyhow::anyhow!("Failed to create customer: {}", e))
            }
        })?;

        timer.observe_duration();

        info!(customer_id = customer.id, "Customer created");

        Ok(customer)
    }

    /// Get a customer by ID.
    #[instrument(skip(self))]
    pub async fn get_customer(&self, customer_id: i64) -> Result<Option<Customer>, AppError> {
        sqlx::query_as::<_, Customer>(
            "SELECT id, full_name, national_id, phone, email, created_at FROM customers WHERE id = ?1",
        )
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to get customer"))
    }

    /// List customers, optionally matching name, national id or phone.
    #[instrument(skip(self))]
    pub async fn list_customers(&self, query: Option<&str>) -> Result<Vec<Customer>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_customers"])
            .start_timer();

        let pattern = query
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(|q| format!("%{}%", q));

        let customers = sqlx::query_as::<_, Customer>(
            r#"
            SELECT id, full_name, national_id, phone, email, created_at
            FROM customers
            WHERE ?1 IS NULL
               OR full_name LIKE ?1
               OR national_id LIKE ?1
               OR phone LIKE ?1
            ORDER BY full_name
            "#,
        )
        .bind(pattern)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list customers"))?;

        timer.observe_duration();

        Ok(customers)
    }

    /// Update a customer.
    #[instrument(skip(self, input))]
    pub async fn update_customer(
        &self,
        customer_id: i64,
        input: &UpdateCustomer,
    ) -> Result<Customer, AppError> {
        let customer = sqlx::query_as::<_, Customer>(
            r#"
            UPDATE customers
            SET full_name = COALESCE(?2, full_name),
                national_id = COALESCE(?3, national_id),
                phone = COALESCE(?4, phone),
                email = COALESCE(?5, email)
            WHERE id = ?1
            RETURNING id, full_name, national_id, phone, email, created_at
            "#,
        )
        .bind(customer_id)
        .bind(&input.full_name)
        .bind(&input.national_id)
        .bind(&input.phone)
        .bind(&input.email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(anyhow::anyhow!("National id already belongs to a customer"))
            } else {
                AppError::DatabaseError(anyhow::anyhow!("Failed to update customer: {}", e))
            }
        })?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Customer {} not found", customer_id)))?;

        info!(customer_id = customer.id, "Customer updated");

        Ok(customer)
    }

    /// Delete a customer. Customers with invoices cannot be deleted.
    #[instrument(skip(self))]
    pub async fn delete_customer(&self, customer_id: i64) -> Result<(), AppError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))?;

        let invoices: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM invoices WHERE customer_id = ?1")
            .bind(customer_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(db_error("Failed to check customer invoices"))?;

        if invoices > 0 {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Customer {} has invoices and cannot be deleted",
                customer_id
            )));
        }

        let result = sqlx::query("DELETE FROM customers WHERE id = ?1")
            .bind(customer_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    AppError::Conflict(anyhow::anyhow!(
                        "Customer {} has invoices and cannot be deleted",
                        customer_id
                    ))
                } else {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to delete customer: {}", e))
                }
            })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Customer {} not found",
                customer_id
            )));
        }

        tx.commit()
            .await
            .map_err(db_error("Failed to commit customer deletion"))?;

        info!(customer_id = customer_id, "Customer deleted");
        Ok(())
    }

    /// Attach a note to a customer.
    #[instrument(skip(self, content))]
    pub async fn add_customer_note(
        &self,
        customer_id: i64,
        content: &str,
        created_by: i64,
    ) -> Result<CustomerNote, AppError> {
        let note = sqlx::query_as::<_, CustomerNote>(
            r#"
            INSERT INTO customer_notes (customer_id, content, created_by, created_at)
            VALUES (?1, ?2, ?3, ?4)
            RETURNING id, customer_id, content, created_by, created_at
            "#,
        )
        .bind(customer_id)
        .bind(content)
        .bind(created_by)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                AppError::NotFound(anyhow::anyhow!("Customer {} not found", customer_id))
            } else {
                AppError::DatabaseError(anyhow::anyhow!("Failed to add note: {}", e))
            }
        })?;

        info!(customer_id = customer_id, note_id = note.id, "Customer note added");

        Ok(note)
    }

    /// List a customer's notes, newest first.
    #[instrument(skip(self))]
    pub async fn list_customer_notes(
        &self,
        customer_id: i64,
    ) -> Result<Vec<CustomerNote>, AppError> {
        sqlx::query_as::<_, CustomerNote>(
            r#"
            SELECT id, customer_id, content, created_by, created_at
            FROM customer_notes
            WHERE customer_id = ?1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list notes"))
    }

    /// Add a contact channel to a customer. A new primary contact demotes the
    /// customer's other contacts in the same transaction.
    #[instrument(skip(self, input), fields(customer_id = input.customer_id, kind = %input.kind))]
    pub async fn add_customer_contact(
        &self,
        input: &CreateContact,
    ) -> Result<CustomerContact, AppError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))?;

        if input.is_primary {
            sqlx::query("UPDATE customer_contacts SET is_primary = 0 WHERE customer_id = ?1")
                .bind(input.customer_id)
                .execute(&mut *tx)
                .await
                .map_err(db_error("Failed to demote contacts"))?;
        }

        let contact = sqlx::query_as::<_, CustomerContact>(
            r#"
            INSERT INTO customer_contacts (customer_id, kind, value, is_primary, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            RETURNING id, customer_id, kind, value, is_primary, created_at
            "#,
        )
        .bind(input.customer_id)
        .bind(&input.kind)
        .bind(&input.value)
        .bind(input.is_primary)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                AppError::NotFound(anyhow::anyhow!("Customer {} not found", input.customer_id))
            } else {
                AppError::DatabaseError(anyhow::anyhow!("Failed to add contact: {}", e))
            }
        })?;

        tx.commit()
            .await
            .map_err(db_error("Failed to commit contact"))?;

        info!(contact_id = contact.id, is_primary = contact.is_primary, "Customer contact added");

        Ok(contact)
    }

    /// List a customer's contacts, primary first, then newest first.
    #[instrument(skip(self))]
    pub async fn list_customer_contacts(
        &self,
        customer_id: i64,
    ) -> Result<Vec<CustomerContact>, AppError> {
        sqlx::query_as::<_, CustomerContact>(
            r#"
            SELECT id, customer_id, kind, value, is_primary, created_at
            FROM customer_contacts
            WHERE customer_id = ?1
            ORDER BY is_primary DESC, id DESC
            "#,
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list contacts"))
    }

    // -------------------------------------------------------------------------
    // Service Catalog Operations
    // -------------------------------------------------------------------------

    /// Create a catalog service.
    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_service(&self, input: &CreateService) -> Result<Service, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_service"])
            .start_timer();

        let service = sqlx::query_as::<_, Service>(
            r#"
            INSERT INTO services (name, authority, office_fee, gov_fee_type, gov_fee_value, vat_applicable, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            RETURNING id, name, authority, office_fee, gov_fee_type, gov_fee_value, vat_applicable, created_at
            "#,
        )
        .bind(&input.name)
        .bind(&input.authority)
        .bind(money_to_column(input.office_fee))
        .bind(input.gov_fee_type.as_str())
        .bind(money_to_column(input.gov_fee_value))
        .bind(input.vat_applicable)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("Failed to create service"))?;

        timer.observe_duration();

        info!(service_id = service.id, authority = %service.authority, "Service created");

        Ok(service)
    }

    /// Get a catalog service by ID.
    #[instrument(skip(self))]
    pub async fn get_service(&self, service_id: i64) -> Result<Option<Service>, AppError> {
        fetch_service(&self.pool, service_id).await
    }

    /// List catalog services, optionally for one authority.
    #[instrument(skip(self))]
    pub async fn list_services(&self, authority: Option<&str>) -> Result<Vec<Service>, AppError> {
        sqlx::query_as::<_, Service>(
            r#"
            SELECT id, name, authority, office_fee, gov_fee_type, gov_fee_value, vat_applicable, created_at
            FROM services
            WHERE ?1 IS NULL OR authority = ?1
            ORDER BY authority, name
            "#,
        )
        .bind(authority)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list services"))
    }

    /// Update a catalog service. Existing invoice items keep their amounts.
    #[instrument(skip(self, input))]
    pub async fn update_service(
        &self,
        service_id: i64,
        input: &UpdateService,
    ) -> Result<Service, AppError> {
        let service = sqlx::query_as::<_, Service>(
            r#"
            UPDATE services
            SET name = COALESCE(?2, name),
                authority = COALESCE(?3, authority),
                office_fee = COALESCE(?4, office_fee),
                gov_fee_type = COALESCE(?5, gov_fee_type),
                gov_fee_value = COALESCE(?6, gov_fee_value),
                vat_applicable = COALESCE(?7, vat_applicable)
            WHERE id = ?1
            RETURNING id, name, authority, office_fee, gov_fee_type, gov_fee_value, vat_applicable, created_at
            "#,
        )
        .bind(service_id)
        .bind(&input.name)
        .bind(&input.authority)
        .bind(input.office_fee.map(money_to_column))
        .bind(input.gov_fee_type.map(|t| t.as_str()))
        .bind(input.gov_fee_value.map(money_to_column))
        .bind(input.vat_applicable)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to update service"))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Service {} not found", service_id)))?;

        info!(service_id = service.id, "Service updated");

        Ok(service)
    }

    /// Delete a catalog service that no invoice or ticket references.
    #[instrument(skip(self))]
    pub async fn delete_service(&self, service_id: i64) -> Result<(), AppError> {
        let references: i64 = sqlx::query_scalar(
            r#"
            SELECT (SELECT COUNT(*) FROM invoice_items WHERE service_id = ?1)
                 + (SELECT COUNT(*) FROM tickets WHERE service_id = ?1)
            "#,
        )
        .bind(service_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("Failed to check service references"))?;

        if references > 0 {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Service {} is referenced by invoices or tickets",
                service_id
            )));
        }

        let result = sqlx::query("DELETE FROM services WHERE id = ?1")
            .bind(service_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    AppError::Conflict(anyhow::anyhow!(
                        "Service {} is referenced by invoices or tickets",
                        service_id
                    ))
                } else {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to delete service: {}", e))
                }
            })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Service {} not found",
                service_id
            )));
        }

        info!(service_id = service_id, "Service deleted");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Ticket Operations
    // -------------------------------------------------------------------------

    /// Open a ticket.
    #[instrument(skip(self, input), fields(customer_id = input.customer_id, service_id = input.service_id))]
    pub async fn create_ticket(&self, input: &CreateTicket) -> Result<Ticket, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_ticket"])
            .start_timer();

        let now = Utc::now();
        let ticket = sqlx::query_as::<_, Ticket>(
            r#"
            INSERT INTO tickets (customer_id, service_id, status, notes, created_by, created_at, updated_at)
            VALUES (?1, ?2, 'new', ?3, ?4, ?5, ?5)
            RETURNING id, customer_id, service_id, status, notes, assigned_to, created_by,
                paid_amount, paid_at, created_at, updated_at
            "#,
        )
        .bind(input.customer_id)
        .bind(input.service_id)
        .bind(&input.notes)
        .bind(input.created_by)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                AppError::BadRequest(anyhow::anyhow!("Unknown customer or service"))
            } else {
                AppError::DatabaseError(anyhow::anyhow!("Failed to create ticket: {}", e))
            }
        })?;

        timer.observe_duration();

        info!(ticket_id = ticket.id, "Ticket created");

        Ok(ticket)
    }

    /// Get a ticket by ID.
    #[instrument(skip(self))]
    pub async fn get_ticket(&self, ticket_id: i64) -> Result<Option<Ticket>, AppError> {
        fetch_ticket(&self.pool, ticket_id).await
    }

    /// List tickets, newest first.
    #[instrument(skip(self))]
    pub async fn list_tickets(&self, filter: &ListTicketsFilter) -> Result<Vec<Ticket>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_tickets"])
            .start_timer();

        let tickets = sqlx::query_as::<_, Ticket>(
            r#"
            SELECT id, customer_id, service_id, status, notes, assigned_to, created_by,
                paid_amount, paid_at, created_at, updated_at
            FROM tickets
            WHERE (?1 IS NULL OR status = ?1)
              AND (?2 IS NULL OR customer_id = ?2)
              AND (?3 IS NULL OR assigned_to = ?3)
            ORDER BY id DESC
            "#,
        )
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.customer_id)
        .bind(filter.assigned_to)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list tickets"))?;

        timer.observe_duration();

        Ok(tickets)
    }

    /// Assign a ticket to a staff member.
    #[instrument(skip(self))]
    pub async fn assign_ticket(&self, ticket_id: i64, user_id: i64) -> Result<Ticket, AppError> {
        let ticket = sqlx::query_as::<_, Ticket>(
            r#"
            UPDATE tickets
            SET assigned_to = ?2, updated_at = ?3
            WHERE id = ?1
            RETURNING id, customer_id, service_id, status, notes, assigned_to, created_by,
                paid_amount, paid_at, created_at, updated_at
            "#,
        )
        .bind(ticket_id)
        .bind(user_id)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                AppError::BadRequest(anyhow::anyhow!("Unknown employee {}", user_id))
            } else {
                AppError::DatabaseError(anyhow::anyhow!("Failed to assign ticket: {}", e))
            }
        })?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Ticket {} not found", ticket_id)))?;

        info!(ticket_id = ticket_id, assigned_to = user_id, "Ticket assigned");

        Ok(ticket)
    }

    /// Change a ticket's status. Completing with a positive amount records
    /// the amount on the ticket and in the income ledger, atomically.
    #[instrument(skip(self, method))]
    pub async fn update_ticket_status(
        &self,
        ticket_id: i64,
        status: TicketStatus,
        amount: Option<Decimal>,
        method: Option<String>,
    ) -> Result<TicketStatusChange, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_ticket_status"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))?;

        let now = Utc::now();
        let paid = amount
            .map(round2)
            .filter(|amount| status == TicketStatus::Completed && *amount > Decimal::ZERO);

        let ticket = match paid {
            Some(amount) => sqlx::query_as::<_, Ticket>(
                r#"
                UPDATE tickets
                SET status = ?2, paid_amount = ?3, paid_at = ?4, updated_at = ?4
                WHERE id = ?1
                RETURNING id, customer_id, service_id, status, notes, assigned_to, created_by,
                    paid_amount, paid_at, created_at, updated_at
                "#,
            )
            .bind(ticket_id)
            .bind(status.as_str())
            .bind(money_to_column(amount))
            .bind(now)
            .fetch_optional(&mut *tx)
            .await,
            None => sqlx::query_as::<_, Ticket>(
                r#"
                UPDATE tickets
                SET status = ?2, updated_at = ?3
                WHERE id = ?1
                RETURNING id, customer_id, service_id, status, notes, assigned_to, created_by,
                    paid_amount, paid_at, created_at, updated_at
                "#,
            )
            .bind(ticket_id)
            .bind(status.as_str())
            .bind(now)
            .fetch_optional(&mut *tx)
            .await,
        }
        .map_err(db_error("Failed to update ticket"))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Ticket {} not found", ticket_id)))?;

        let income = match paid {
            Some(amount) => {
                let entry = IncomeEntry {
                    source: IncomeSource::Ticket,
                    source_id: ticket.id,
                    amount,
                    method,
                    reference: None,
                    description: Some(format!("Ticket #{}", ticket.id)),
                    received_at: now,
                };
                Some(ledger::upsert_income(&mut *tx, &entry).await?.income)
            }
            None => None,
        };

        tx.commit()
            .await
            .map_err(db_error("Failed to commit ticket status"))?;

        timer.observe_duration();

        info!(ticket_id = ticket.id, status = %ticket.status, "Ticket status updated");

        Ok(TicketStatusChange { ticket, income })
    }

    // -------------------------------------------------------------------------
    // Invoice Operations
    // -------------------------------------------------------------------------

    /// Price every requested line and store the invoice with its items in
    /// one transaction.
    #[instrument(skip(self, input), fields(customer_id = input.customer_id, lines = input.lines.len()))]
    pub async fn create_invoice(
        &self,
        input: &CreateInvoice,
        vat_rate: Decimal,
    ) -> Result<InvoiceDetail, AppError> {
        if input.lines.is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "An invoice needs at least one item"
            )));
        }

        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_invoice"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))?;

        let customer_exists: Option<i64> =
            sqlx::query_scalar("SELECT id FROM customers WHERE id = ?1")
                .bind(input.customer_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_error("Failed to get customer"))?;
        if customer_exists.is_none() {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Customer {} not found",
                input.customer_id
            )));
        }

        if let Some(ticket_id) = input.ticket_id {
            let ticket = fetch_ticket(&mut *tx, ticket_id)
                .await?
                .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Ticket {} not found", ticket_id)))?;
            if ticket.customer_id != input.customer_id {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Ticket {} belongs to another customer",
                    ticket_id
                )));
            }
        }

        let mut totals = PricingTotals::new();
        let mut lines: Vec<(i64, LineBreakdown)> = Vec::with_capacity(input.lines.len());
        for line in &input.lines {
            let service = fetch_service(&mut *tx, line.service_id)
                .await?
                .ok_or_else(|| {
                    AppError::NotFound(anyhow::anyhow!("Service {} not found", line.service_id))
                })?;
            let breakdown = totals.add_line(
                &ServicePricing::from(&service),
                line.qty,
                line.gov_fee_override,
                vat_rate,
            )?;
            lines.push((service.id, breakdown));
        }

        let now = Utc::now();
        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            INSERT INTO invoices (customer_id, ticket_id, subtotal_office_fee, total_gov_fees, vat_amount,
                grand_total, status, due_date, notes, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
            RETURNING id, customer_id, ticket_id, subtotal_office_fee, total_gov_fees, vat_amount,
                grand_total, status, due_date, notes, created_at, updated_at
            "#,
        )
        .bind(input.customer_id)
        .bind(input.ticket_id)
        .bind(money_to_column(totals.office_fee_total))
        .bind(money_to_column(totals.gov_fee_total))
        .bind(money_to_column(totals.vat_amount))
        .bind(money_to_column(totals.grand_total))
        .bind(InvoiceStatus::Unpaid.as_str())
        .bind(input.due_date)
        .bind(&input.notes)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error("Failed to create invoice"))?;

        let mut items = Vec::with_capacity(lines.len());
        for (service_id, line) in &lines {
            let item = sqlx::query_as::<_, InvoiceItem>(
                r#"
                INSERT INTO invoice_items (invoice_id, service_id, qty, office_fee, gov_fee, vat_amount, line_total)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                RETURNING id, invoice_id, service_id, qty, office_fee, gov_fee, vat_amount, line_total
                "#,
            )
            .bind(invoice.id)
            .bind(service_id)
            .bind(line.qty)
            .bind(money_to_column(line.office_fee_total))
            .bind(money_to_column(line.gov_fee_total))
            .bind(money_to_column(line.vat_amount))
            .bind(money_to_column(line.line_total))
            .fetch_one(&mut *tx)
            .await
            .map_err(db_error("Failed to create invoice item"))?;
            items.push(item);
        }

        tx.commit()
            .await
            .map_err(db_error("Failed to commit invoice"))?;

        timer.observe_duration();
        record_invoice_created(&invoice.status);

        info!(
            invoice_id = invoice.id,
            grand_total = %invoice.grand_total,
            items = items.len(),
            "Invoice created"
        );

        let position = PaymentPosition::new(invoice.grand_total, zero());
        Ok(InvoiceDetail {
            invoice,
            items,
            payments: Vec::new(),
            position,
        })
    }

    /// Get an invoice by ID.
    #[instrument(skip(self))]
    pub async fn get_invoice(&self, invoice_id: i64) -> Result<Option<Invoice>, AppError> {
        fetch_invoice(&self.pool, invoice_id).await
    }

    /// Get an invoice with its items, payments and payment position.
    #[instrument(skip(self))]
    pub async fn get_invoice_detail(&self, invoice_id: i64) -> Result<InvoiceDetail, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice_detail"])
            .start_timer();

        let invoice = fetch_invoice(&self.pool, invoice_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice {} not found", invoice_id)))?;

        let items = sqlx::query_as::<_, InvoiceItem>(
            r#"
            SELECT id, invoice_id, service_id, qty, office_fee, gov_fee, vat_amount, line_total
            FROM invoice_items
            WHERE invoice_id = ?1
            ORDER BY id
            "#,
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list invoice items"))?;

        let payments = fetch_payments(&self.pool, invoice_id).await?;

        timer.observe_duration();

        let position = PaymentPosition::new(
            invoice.grand_total,
            sum_amounts(payments.iter().map(|p| &p.amount)),
        );

        Ok(InvoiceDetail {
            invoice,
            items,
            payments,
            position,
        })
    }

    /// List payments of an invoice in the order they were received.
    #[instrument(skip(self))]
    pub async fn list_payments(&self, invoice_id: i64) -> Result<Vec<InvoicePayment>, AppError> {
        fetch_payments(&self.pool, invoice_id).await
    }

    /// Mark unpaid and partially paid invoices past their due date as
    /// overdue. Returns the number of invoices changed.
    #[instrument(skip(self))]
    pub async fn mark_overdue(&self, today: NaiveDate) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE invoices
            SET status = 'overdue', updated_at = ?2
            WHERE status IN ('unpaid', 'partial')
              AND due_date IS NOT NULL
              AND due_date < ?1
            "#,
        )
        .bind(today)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to mark overdue invoices"))?;

        if result.rows_affected() > 0 {
            info!(count = result.rows_affected(), "Invoices marked overdue");
        }

        Ok(result.rows_affected())
    }

    /// List invoices, newest first, after sweeping overdue ones.
    #[instrument(skip(self))]
    pub async fn list_invoices(
        &self,
        filter: &ListInvoicesFilter,
    ) -> Result<Vec<Invoice>, AppError> {
        self.mark_overdue(Utc::now().date_naive()).await?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_invoices"])
            .start_timer();

        let invoices = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT id, customer_id, ticket_id, subtotal_office_fee, total_gov_fees, vat_amount,
                grand_total, status, due_date, notes, created_at, updated_at
            FROM invoices
            WHERE (?1 IS NULL OR status = ?1)
              AND (?2 IS NULL OR customer_id = ?2)
            ORDER BY id DESC
            "#,
        )
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.customer_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list invoices"))?;

        timer.observe_duration();

        Ok(invoices)
    }

    /// Record a payment, re-derive the invoice status and refresh the
    /// invoice's ledger row, all in one transaction.
    #[instrument(skip(self, input), fields(invoice_id = input.invoice_id, amount = %input.amount))]
    pub async fn record_payment(&self, input: &CreatePayment) -> Result<PaymentOutcome, AppError> {
        let amount = round2(input.amount);
        if amount <= Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Payment amount must be greater than zero"
            )));
        }

        let timer = DB_QUERY_DURATION
            .with_label_values(&["record_payment"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))?;

        sqlx::query("UPDATE invoices SET updated_at = updated_at WHERE id = ?1")
            .bind(input.invoice_id)
            .execute(&mut *tx)
            .await
            .map_err(db_error("Failed to lock invoice"))?;

        let invoice = fetch_invoice(&mut *tx, input.invoice_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("Invoice {} not found", input.invoice_id))
            })?;

        let now = Utc::now();
        let payment = sqlx::query_as::<_, InvoicePayment>(
            r#"
            INSERT INTO invoice_payments (invoice_id, amount, method, reference, paid_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            RETURNING id, invoice_id, amount, method, reference, paid_at
            "#,
        )
        .bind(invoice.id)
        .bind(money_to_column(amount))
        .bind(&input.method)
        .bind(&input.reference)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error("Failed to record payment"))?;

        let payments = fetch_payments(&mut *tx, invoice.id).await?;
        let total_paid = sum_amounts(payments.iter().map(|p| &p.amount));

        let status = if InvoiceStatus::from_string(&invoice.status) == InvoiceStatus::Paid {
            InvoiceStatus::Paid
        } else {
            InvoiceStatus::derive(
                invoice.grand_total,
                total_paid,
                invoice.due_date,
                now.date_naive(),
            )
        };

        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            UPDATE invoices
            SET status = ?2, updated_at = ?3
            WHERE id = ?1
            RETURNING id, customer_id, ticket_id, subtotal_office_fee, total_gov_fees, vat_amount,
                grand_total, status, due_date, notes, created_at, updated_at
            "#,
        )
        .bind(invoice.id)
        .bind(status.as_str())
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error("Failed to update invoice status"))?;

        let entry = IncomeEntry {
            source: IncomeSource::Invoice,
            source_id: invoice.id,
            amount: total_paid,
            method: input.method.clone(),
            reference: input.reference.clone(),
            description: Some(format!("Invoice #{}", invoice.id)),
            received_at: now,
        };
        ledger::upsert_income(&mut *tx, &entry).await?;

        tx.commit()
            .await
            .map_err(db_error("Failed to commit payment"))?;

        timer.observe_duration();

        let position = PaymentPosition::new(invoice.grand_total, total_paid);
        if position.credit_balance > Decimal::ZERO {
            warn!(
                invoice_id = invoice.id,
                credit_balance = %position.credit_balance,
                "Invoice overpaid"
            );
        }

        info!(
            invoice_id = invoice.id,
            payment_id = payment.id,
            total_paid = %total_paid,
            status = %invoice.status,
            "Payment recorded"
        );

        Ok(PaymentOutcome {
            payment,
            invoice,
            position,
        })
    }

    // -------------------------------------------------------------------------
    // Managed Transaction Operations
    // -------------------------------------------------------------------------

    /// Create a managed transaction.
    #[instrument(skip(self, input), fields(authority = %input.authority))]
    pub async fn create_managed_transaction(
        &self,
        input: &CreateManagedTransaction,
    ) -> Result<ManagedTransaction, AppError> {
        let now = Utc::now();
        let transaction = sqlx::query_as::<_, ManagedTransaction>(
            r#"
            INSERT INTO managed_transactions (authority, service, description, fee, status, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
            RETURNING id, authority, service, description, fee, status, is_paid, paid_amount, paid_at,
                created_at, updated_at
            "#,
        )
        .bind(&input.authority)
        .bind(&input.service)
        .bind(&input.description)
        .bind(money_to_column(input.fee))
        .bind(input.status.as_str())
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("Failed to create managed transaction"))?;

        info!(transaction_id = transaction.id, "Managed transaction created");

        Ok(transaction)
    }

    /// Get a managed transaction by ID.
    #[instrument(skip(self))]
    pub async fn get_managed_transaction(
        &self,
        transaction_id: i64,
    ) -> Result<Option<ManagedTransaction>, AppError> {
        fetch_managed(&self.pool, transaction_id).await
    }

    /// List managed transactions.
    #[instrument(skip(self))]
    pub async fn list_managed_transactions(
        &self,
        filter: &ListManagedFilter,
    ) -> Result<Vec<ManagedTransaction>, AppError> {
        sqlx::query_as::<_, ManagedTransaction>(
            r#"
            SELECT id, authority, service, description, fee, status, is_paid, paid_amount, paid_at,
                created_at, updated_at
            FROM managed_transactions
            WHERE (?1 IS NULL OR authority = ?1)
              AND (?2 IS NULL OR status = ?2)
            ORDER BY id DESC
            "#,
        )
        .bind(&filter.authority)
        .bind(filter.status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list managed transactions"))
    }

    /// Update a managed transaction.
    #[instrument(skip(self, input))]
    pub async fn update_managed_transaction(
        &self,
        transaction_id: i64,
        input: &UpdateManagedTransaction,
    ) -> Result<ManagedTransaction, AppError> {
        let transaction = sqlx::query_as::<_, ManagedTransaction>(
            r#"
            UPDATE managed_transactions
            SET service = COALESCE(?2, service),
                description = COALESCE(?3, description),
                fee = COALESCE(?4, fee),
                status = COALESCE(?5, status),
                updated_at = ?6
            WHERE id = ?1
            RETURNING id, authority, service, description, fee, status, is_paid, paid_amount, paid_at,
                created_at, updated_at
            "#,
        )
        .bind(transaction_id)
        .bind(&input.service)
        .bind(&input.description)
        .bind(input.fee.map(money_to_column))
        .bind(input.status.map(|s| s.as_str()))
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to update managed transaction"))?
        .ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!(
                "Managed transaction {} not found",
                transaction_id
            ))
        })?;

        info!(transaction_id = transaction.id, status = %transaction.status, "Managed transaction updated");

        Ok(transaction)
    }

    /// Delete a managed transaction. Its ledger row, if any, is kept.
    #[instrument(skip(self))]
    pub async fn delete_managed_transaction(&self, transaction_id: i64) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM managed_transactions WHERE id = ?1")
            .bind(transaction_id)
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to delete managed transaction"))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Managed transaction {} not found",
                transaction_id
            )));
        }

        info!(transaction_id = transaction_id, "Managed transaction deleted");
        Ok(())
    }

    /// Collect the fee of a finished managed transaction into the income
    /// ledger. Repeating the collection corrects the existing ledger row.
    #[instrument(skip(self, input))]
    pub async fn collect_managed_fee(
        &self,
        transaction_id: i64,
        input: &CollectFee,
    ) -> Result<Collection, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["collect_managed_fee"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))?;

        // Writing first takes SQLite's write lock, so concurrent collections of
        // one transaction run one after the other instead of failing with BUSY.
        sqlx::query("UPDATE managed_transactions SET updated_at = updated_at WHERE id = ?1")
            .bind(transaction_id)
            .execute(&mut *tx)
            .await
            .map_err(db_error("Failed to lock managed transaction"))?;

        let transaction = fetch_managed(&mut *tx, transaction_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!(
                    "Managed transaction {} not found",
                    transaction_id
                ))
            })?;

        if transaction.status() != ManagedStatus::Finished {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Only finished transactions can be collected (status is '{}')",
                transaction.status
            )));
        }

        let amount = ledger::resolve_collection_amount(input.amount, transaction.fee)?;
        let now = Utc::now();

        let entry = IncomeEntry {
            source: IncomeSource::ManagedTransaction,
            source_id: transaction.id,
            amount,
            method: input.method.clone(),
            reference: input.reference.clone(),
            description: input
                .description
                .clone()
                .or_else(|| Some(format!("{} - {}", transaction.authority, transaction.service))),
            received_at: now,
        };
        let LedgerWrite { income, created } = ledger::upsert_income(&mut *tx, &entry).await?;

        let transaction = sqlx::query_as::<_, ManagedTransaction>(
            r#"
            UPDATE managed_transactions
            SET is_paid = 1, paid_amount = ?2, paid_at = ?3, updated_at = ?3
            WHERE id = ?1
            RETURNING id, authority, service, description, fee, status, is_paid, paid_amount, paid_at,
                created_at, updated_at
            "#,
        )
        .bind(transaction.id)
        .bind(money_to_column(amount))
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error("Failed to mark transaction paid"))?;

        tx.commit()
            .await
            .map_err(db_error("Failed to commit collection"))?;

        timer.observe_duration();
        record_collection(created);

        info!(
            transaction_id = transaction.id,
            income_id = income.id,
            amount = %amount,
            created = created,
            "Fee collected"
        );

        Ok(Collection {
            transaction,
            income,
            created,
        })
    }

    // -------------------------------------------------------------------------
    // Income Operations
    // -------------------------------------------------------------------------

    /// List ledger rows, newest first.
    #[instrument(skip(self))]
    pub async fn list_incomes(&self, filter: &ListIncomeFilter) -> Result<Vec<Income>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_incomes"])
            .start_timer();

        let incomes = sqlx::query_as::<_, Income>(
            r#"
            SELECT id, source, source_id, amount, method, reference, description, received_at, created_at
            FROM incomes
            WHERE (?1 IS NULL OR source = ?1)
              AND (?2 IS NULL OR received_at >= ?2)
              AND (?3 IS NULL OR received_at < ?3)
            ORDER BY received_at DESC, id DESC
            "#,
        )
        .bind(filter.source.map(|s| s.as_str()))
        .bind(filter.from)
        .bind(filter.to)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list incomes"))?;

        timer.observe_duration();

        Ok(incomes)
    }

    /// Get the ledger row of a source, if any.
    #[instrument(skip(self))]
    pub async fn get_income_for_source(
        &self,
        source: IncomeSource,
        source_id: i64,
    ) -> Result<Option<Income>, AppError> {
        sqlx::query_as::<_, Income>(
            r#"
            SELECT id, source, source_id, amount, method, reference, description, received_at, created_at
            FROM incomes
            WHERE source = ?1 AND source_id = ?2
            "#,
        )
        .bind(source.as_str())
        .bind(source_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to get income"))
    }

    // -------------------------------------------------------------------------
    // Task Operations
    // -------------------------------------------------------------------------

    /// Create a task.
    #[instrument(skip(self, input), fields(creator_id = input.creator_id))]
    pub async fn create_task(&self, input: &CreateTask) -> Result<Task, AppError> {
        let now = Utc::now();
        let task = sqlx::query_as::<_, Task>(
            r#"
            INSERT INTO tasks (title, description, status, priority, due_date, assignee_id, creator_id,
                ticket_id, customer_id, created_at, updated_at)
            VALUES (?1, ?2, 'todo', ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
            RETURNING id, title, description, status, priority, due_date, assignee_id, creator_id,
                ticket_id, customer_id, created_at, updated_at
            "#,
        )
        .bind(&input.title)
        .bind(&input.description)
        .bind(input.priority.as_str())
        .bind(input.due_date)
        .bind(input.assignee_id)
        .bind(input.creator_id)
        .bind(input.ticket_id)
        .bind(input.customer_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                AppError::BadRequest(anyhow::anyhow!("Unknown assignee, ticket or customer"))
            } else {
                AppError::DatabaseError(anyhow::anyhow!("Failed to create task: {}", e))
            }
        })?;

        info!(task_id = task.id, "Task created");

        Ok(task)
    }

    /// Get a task by ID.
    #[instrument(skip(self))]
    pub async fn get_task(&self, task_id: i64) -> Result<Option<Task>, AppError> {
        sqlx::query_as::<_, Task>(
            r#"
            SELECT id, title, description, status, priority, due_date, assignee_id, creator_id,
                ticket_id, customer_id, created_at, updated_at
            FROM tasks
            WHERE id = ?1
            "#,
        )
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to get task"))
    }

    /// List tasks, soonest due first.
    #[instrument(skip(self))]
    pub async fn list_tasks(&self, filter: &ListTasksFilter) -> Result<Vec<Task>, AppError> {
        sqlx::query_as::<_, Task>(
            r#"
            SELECT id, title, description, status, priority, due_date, assignee_id, creator_id,
                ticket_id, customer_id, created_at, updated_at
            FROM tasks
            WHERE (?1 IS NULL OR assignee_id = ?1)
              AND (?2 IS NULL OR status = ?2)
            ORDER BY due_date IS NULL, due_date, id DESC
            "#,
        )
        .bind(filter.assignee_id)
        .bind(filter.status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list tasks"))
    }

    /// Update a task.
    #[instrument(skip(self, input))]
    pub async fn update_task(&self, task_id: i64, input: &UpdateTask) -> Result<Task, AppError> {
        let task = sqlx::query_as::<_, Task>(
            r#"
            UPDATE tasks
            SET title = COALESCE(?2, title),
                description = COALESCE(?3, description),
                status = COALESCE(?4, status),
                priority = COALESCE(?5, priority),
                due_date = COALESCE(?6, due_date),
                assignee_id = COALESCE(?7, assignee_id),
                updated_at = ?8
            WHERE id = ?1
            RETURNING id, title, description, status, priority, due_date, assignee_id, creator_id,
                ticket_id, customer_id, created_at, updated_at
            "#,
        )
        .bind(task_id)
        .bind(&input.title)
        .bind(&input.description)
        .bind(input.status.map(|s| s.as_str()))
        .bind(input.priority.map(|p| p.as_str()))
        .bind(input.due_date)
        .bind(input.assignee_id)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                AppError::BadRequest(anyhow::anyhow!("Unknown assignee"))
            } else {
                AppError::DatabaseError(anyhow::anyhow!("Failed to update task: {}", e))
            }
        })?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Task {} not found", task_id)))?;

        info!(task_id = task.id, status = %task.status, "Task updated");

        Ok(task)
    }

    /// Delete a task.
    #[instrument(skip(self))]
    pub async fn delete_task(&self, task_id: i64) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ?1")
            .bind(task_id)
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to delete task"))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Task {} not found",
                task_id
            )));
        }

        info!(task_id = task_id, "Task deleted");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Dashboard Operations
    // -------------------------------------------------------------------------

    /// Aggregate counters for the admin dashboard.
    #[instrument(skip(self))]
    pub async fn dashboard_stats(&self) -> Result<DashboardStats, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["dashboard_stats"])
            .start_timer();

        let (employees, customers, tickets_total, tickets_open, invoices_total): (
            i64,
            i64,
            i64,
            i64,
            i64,
        ) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM users),
                (SELECT COUNT(*) FROM customers),
                (SELECT COUNT(*) FROM tickets),
                (SELECT COUNT(*) FROM tickets WHERE status IN ('new', 'in_progress')),
                (SELECT COUNT(*) FROM invoices)
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("Failed to count records"))?;

        let incomes = self.list_incomes(&ListIncomeFilter::default()).await?;
        let income_total = sum_amounts(incomes.iter().map(|i| &i.amount));

        let open_invoices = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT id, customer_id, ticket_id, subtotal_office_fee, total_gov_fees, vat_amount,
                grand_total, status, due_date, notes, created_at, updated_at
            FROM invoices
            WHERE status != 'paid'
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list open invoices"))?;

        let mut outstanding_balance = zero();
        for invoice in &open_invoices {
            let payments = fetch_payments(&self.pool, invoice.id).await?;
            let position = PaymentPosition::new(
                invoice.grand_total,
                sum_amounts(payments.iter().map(|p| &p.amount)),
            );
            outstanding_balance = round2(outstanding_balance + position.balance_due);
        }

        timer.observe_duration();

        Ok(DashboardStats {
            employees,
            customers,
            tickets_total,
            tickets_open,
            invoices_total,
            invoices_outstanding: open_invoices.len() as i64,
            income_total,
            outstanding_balance,
        })
    }

    /// Managed transactions per authority, including authorities from
    /// `known_authorities` that have none.
    #[instrument(skip(self, known_authorities))]
    pub async fn stats_by_authority(
        &self,
        known_authorities: &[String],
    ) -> Result<Vec<AuthorityStats>, AppError> {
        let transactions = self
            .list_managed_transactions(&ListManagedFilter::default())
            .await?;

        let mut by_authority: BTreeMap<String, AuthorityStats> = known_authorities
            .iter()
            .map(|authority| (authority.clone(), AuthorityStats::empty(authority)))
            .collect();

        for transaction in &transactions {
            let stats = by_authority
                .entry(transaction.authority.clone())
                .or_insert_with(|| AuthorityStats::empty(&transaction.authority));
            stats.total += 1;
            match transaction.status() {
                ManagedStatus::Active => stats.active += 1,
                ManagedStatus::Pending => stats.pending += 1,
                ManagedStatus::Finished => stats.finished += 1,
            }
            if transaction.is_paid {
                stats.paid += 1;
                stats.collected = round2(stats.collected + transaction.paid_amount);
            }
        }

        Ok(by_authority.into_values().collect())
    }
}

impl AuthorityStats {
    fn empty(authority: &str) -> Self {
        Self {
            authority: authority.to_string(),
            total: 0,
            active: 0,
            pending: 0,
            finished: 0,
            paid: 0,
            collected: zero(),
        }
    }
}

// -----------------------------------------------------------------------------
// Row fetchers usable on the pool or inside a transaction
// -----------------------------------------------------------------------------

async fn fetch_service<'e, E>(executor: E, service_id: i64) -> Result<Option<Service>, AppError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query_as::<_, Service>(
        r#"
        SELECT id, name, authority, office_fee, gov_fee_type, gov_fee_value, vat_applicable, created_at
        FROM services
        WHERE id = ?1
        "#,
    )
    .bind(service_id)
    .fetch_optional(executor)
    .await
    .map_err(db_error("Failed to get service"))
}

async fn fetch_ticket<'e, E>(executor: E, ticket_id: i64) -> Result<Option<Ticket>, AppError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query_as::<_, Ticket>(
        r#"
        SELECT id, customer_id, service_id, status, notes, assigned_to, created_by,
            paid_amount, paid_at, created_at, updated_at
        FROM tickets
        WHERE id = ?1
        "#,
    )
    .bind(ticket_id)
    .fetch_optional(executor)
    .await
    .map_err(db_error("Failed to get ticket"))
}

async fn fetch_invoice<'e, E>(executor: E, invoice_id: i64) -> Result<Option<Invoice>, AppError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query_as::<_, Invoice>(
        r#"
        SELECT id, customer_id, ticket_id, subtotal_office_fee, total_gov_fees, vat_amount,
            grand_total, status, due_date, notes, created_at, updated_at
        FROM invoices
        WHERE id = ?1
        "#,
    )
    .bind(invoice_id)
    .fetch_optional(executor)
    .await
    .map_err(db_error("Failed to get invoice"))
}

async fn fetch_payments<'e, E>(
    executor: E,
    invoice_id: i64,
) -> Result<Vec<InvoicePayment>, AppError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query_as::<_, InvoicePayment>(
        r#"
        SELECT id, invoice_id, amount, method, reference, paid_at
        FROM invoice_payments
        WHERE invoice_id = ?1
        ORDER BY paid_at, id
        "#,
    )
    .bind(invoice_id)
    .fetch_all(executor)
    .await
    .map_err(db_error("Failed to list payments"))
}

async fn fetch_managed<'e, E>(
    executor: E,
    transaction_id: i64,
) -> Result<Option<ManagedTransaction>, AppError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query_as::<_, ManagedTransaction>(
        r#"
        SELECT id, authority, service, description, fee, status, is_paid, paid_amount, paid_at,
            created_at, updated_at
        FROM managed_transactions
        WHERE id = ?1
        "#,
    )
    .bind(transaction_id)
    .fetch_optional(executor)
    .await
    .map_err(db_error("Failed to get managed transaction"))
}
