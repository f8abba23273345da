pub mod auth;
pub mod metrics;

pub use auth::{AdminUser, AuthUser};
pub use metrics::track_http_metrics;
