//! Services module for office-service.

pub mod database;
pub mod jwt;
pub mod ledger;
pub mod metrics;
pub mod pricing;

pub use database::{
    AuthorityStats, DashboardStats, Database, PaymentOutcome, TicketStatusChange,
};
pub use jwt::{AccessTokenClaims, JwtService, TokenResponse};
pub use ledger::{Collection, LedgerWrite};
pub use metrics::{get_metrics, init_metrics, record_error, record_http_request};
pub use pricing::{price_line, LineBreakdown, PricingError, PricingTotals, ServicePricing};
