//! Prometheus metrics for office-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

/// Counter for HTTP requests by route and status.
pub static HTTP_REQUESTS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "office_http_requests_total",
        "Total number of HTTP requests",
        &["method", "route", "status"]
    )
    .expect("Failed to register HTTP_REQUESTS")
});

/// Histogram for database query duration by operation.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "office_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Counter for invoices created.
pub static INVOICES: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "office_invoices_total",
        "Total number of invoices created",
        &["status"]
    )
    .expect("Failed to register INVOICES")
});

/// Counter for invoice payments by resulting invoice status.
pub static PAYMENTS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "office_payments_total",
        "Total number of invoice payments recorded",
        &["invoice_status"]
    )
    .expect("Failed to register PAYMENTS")
});

/// Counter for managed-transaction fee collections.
pub static COLLECTIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "office_collections_total",
        "Total number of fee collections into the income ledger",
        &["outcome"]
    )
    .expect("Failed to register COLLECTIONS")
});

/// Counter for errors.
pub static ERRORS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "office_errors_total",
        "Total number of errors",
        &["error_type"]
    )
    .expect("Failed to register ERRORS")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&HTTP_REQUESTS);
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&INVOICES);
    Lazy::force(&PAYMENTS);
    Lazy::force(&COLLECTIONS);
    Lazy::force(&ERRORS);
}

/// Get all metrics as Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, route: &str, status: u16) {
    HTTP_REQUESTS
        .with_label_values(&[method, route, &status.to_string()])
        .inc();
}

/// Record an error.
pub fn record_error(error_type: &str) {
    ERRORS.with_label_values(&[error_type]).inc();
}

/// Record a newly created invoice.
pub fn record_invoice_created(status: &str) {
    INVOICES.with_label_values(&[status]).inc();
}

/// Record a payment and the invoice status it produced.
pub fn record_payment(invoice_status: &str) {
    PAYMENTS.with_label_values(&[invoice_status]).inc();
}

/// Record a fee collection; `created` is false when an existing ledger row
/// was corrected.
pub fn record_collection(created: bool) {
    let outcome = if created { "created" } else { "corrected" };
    COLLECTIONS.with_label_values(&[outcome]).inc();
}
