use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};

use crate::services::{record_error, record_http_request};

/// Count requests by method, matched route and status. Unmatched paths are
/// grouped so arbitrary URLs cannot inflate label cardinality.
pub async fn track_http_metrics(req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(req).await;
    let status = response.status();

    record_http_request(&method, &route, status.as_u16());
    if status.is_server_error() {
        record_error("http_5xx");
    }

    response
}
