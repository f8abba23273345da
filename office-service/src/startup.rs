//! Application startup and lifecycle management.

use crate::config::{BootstrapConfig, OfficeConfig};
use crate::handlers::{
    self, auth, catalog, customers, employees, incomes, invoices, services, tasks, tickets,
};
use crate::middleware::track_http_metrics;
use crate::models::{CreateUser, Role};
use crate::services::{init_metrics, Database, JwtService};
use crate::utils::{hash_password, Password};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{request_id_middleware, security_headers_middleware};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: OfficeConfig,
    pub db: Arc<Database>,
    pub jwt: JwtService,
}

/// Application container for managing server lifecycle.
pub struct Application {
    http_port: u16,
    http_listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: OfficeConfig) -> Result<Self, AppError> {
        init_metrics();

        let db = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to open SQLite database");
            e
        })?;

        db.run_migrations().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to run migrations");
            e
        })?;

        bootstrap_admin(&db, &config.bootstrap).await?;

        let state = AppState {
            jwt: JwtService::new(&config.auth),
            db: Arc::new(db),
            config: config.clone(),
        };

        let http_addr = config.common.bind_address();
        let http_listener = TcpListener::bind(&http_addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %http_addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let http_port = http_listener.local_addr()?.port();

        tracing::info!(http_port = http_port, "Office service listener bound");

        Ok(Self {
            http_port,
            http_listener,
            state,
        })
    }

    /// Get the HTTP port the server is listening on.
    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    /// Get a reference to the database.
    pub fn db(&self) -> &Database {
        &self.state.db
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = router(self.state);

        tracing::info!(
            service = "office-service",
            version = env!("CARGO_PKG_VERSION"),
            http_port = self.http_port,
            "Service ready to accept connections"
        );

        axum::serve(self.http_listener, router).await.map_err(|e| {
            tracing::error!(error = %e, "HTTP server error");
            std::io::Error::other(format!("HTTP server error: {}", e))
        })
    }
}

/// Create the initial administrator when there are no users yet and a
/// bootstrap password is configured.
async fn bootstrap_admin(db: &Database, bootstrap: &BootstrapConfig) -> Result<(), AppError> {
    let Some(password) = bootstrap.admin_password.as_deref() else {
        return Ok(());
    };

    if db.count_users().await? > 0 {
        return Ok(());
    }

    let password_hash = hash_password(&Password::new(password))?;
    let admin = db
        .create_user(&CreateUser {
            username: bootstrap.admin_username.clone(),
            email: bootstrap.admin_email.clone(),
            password_hash,
            role: Role::Admin,
            permissions: HashMap::new(),
        })
        .await?;

    tracing::info!(user_id = admin.id, username = %admin.username, "Bootstrap administrator created");
    Ok(())
}

/// Build the HTTP router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_handler))
        // Auth
        .route("/auth/login", post(auth::login))
        .route("/auth/me", get(auth::me))
        .route("/auth/password", post(auth::change_password))
        // Administration
        .route(
            "/admin/employees",
            get(employees::list_employees).post(employees::create_employee),
        )
        .route(
            "/admin/employees/:id",
            axum::routing::patch(employees::update_employee).delete(employees::delete_employee),
        )
        .route("/admin/stats", get(employees::dashboard_stats))
        .route("/admin/stats/by-authority", get(employees::stats_by_authority))
        // Customers
        .route(
            "/customers",
            get(customers::list_customers).post(customers::create_customer),
        )
        .route(
            "/customers/:id",
            get(customers::get_customer)
                .patch(customers::update_customer)
                .delete(customers::delete_customer),
        )
        .route(
            "/customers/:id/notes",
            get(customers::list_notes).post(customers::add_note),
        )
        .route(
            "/customers/:id/contacts",
            get(customers::list_contacts).post(customers::add_contact),
        )
        .route("/customers/:id/history", get(customers::customer_history))
        // Service catalog
        .route(
            "/services",
            get(services::list_services).post(services::create_service),
        )
        .route(
            "/services/:id",
            get(services::get_service)
                .patch(services::update_service)
                .delete(services::delete_service),
        )
        .route("/services/:id/quote", post(services::quote_service))
        .route("/catalog/authorities", get(catalog::list_authorities))
        .route(
            "/managed-transactions",
            get(catalog::list_managed_transactions).post(catalog::create_managed_transaction),
        )
        .route(
            "/managed-transactions/:id",
            get(catalog::get_managed_transaction)
                .patch(catalog::update_managed_transaction)
                .delete(catalog::delete_managed_transaction),
        )
        .route(
            "/managed-transactions/:id/collect",
            post(catalog::collect_managed_fee),
        )
        // Tickets
        .route(
            "/tickets",
            get(tickets::list_tickets).post(tickets::create_ticket),
        )
        .route("/tickets/:id", get(tickets::get_ticket))
        .route("/tickets/:id/status", post(tickets::update_ticket_status))
        .route("/tickets/:id/assign", post(tickets::assign_ticket))
        // Invoices
        .route(
            "/invoices",
            get(invoices::list_invoices).post(invoices::create_invoice),
        )
        .route("/invoices/:id", get(invoices::get_invoice))
        .route(
            "/invoices/:id/payments",
            get(invoices::list_payments).post(invoices::record_payment),
        )
        .route("/incomes", get(incomes::list_incomes))
        // Tasks
        .route("/tasks", get(tasks::list_tasks).post(tasks::create_task))
        .route(
            "/tasks/:id",
            get(tasks::get_task)
                .patch(tasks::update_task)
                .delete(tasks::delete_task),
        )
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(track_http_metrics))
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}
