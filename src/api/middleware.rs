//! API Middleware
//!
//! CORS for the storefront widget and request logging.

use std::time::Duration;

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderName, Method, Request},
    middleware::Next,
    response::Response,
};
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

/// CORS for `/api/*`: the tracking endpoint is called from arbitrary
/// storefront origins, so the policy is permissive.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-api-key"),
        ])
        .max_age(Duration::from_secs(86400))
}

/// Correlation id from the X-Correlation-Id header, or a fresh one.
fn correlation_id(headers: &HeaderMap) -> Uuid {
    headers
        .get("X-Correlation-Id")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4)
}

/// Request logging middleware
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let correlation_id = correlation_id(request.headers());

    let start = std::time::Instant::now();

    tracing::info!(
        method = %method,
        uri = %uri,
        correlation_id = %correlation_id,
        "Incoming request"
    );

    let response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status();

    tracing::info!(
        method = %method,
        uri = %uri,
        status = %status,
        duration_ms = %duration.as_millis(),
        correlation_id = %correlation_id,
        "Request completed"
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correlation_id_from_header() {
        let id = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert("X-Correlation-Id", id.to_string().parse().unwrap());

        assert_eq!(correlation_id(&headers), id);
    }

    #[test]
    fn test_correlation_id_generated_when_absent_or_invalid() {
        let headers = HeaderMap::new();
        let generated = correlation_id(&headers);
        assert!(!generated.is_nil());

        let mut headers = HeaderMap::new();
        headers.insert("X-Correlation-Id", "not-a-uuid".parse().unwrap());
        let generated = correlation_id(&headers);
        assert!(!generated.is_nil());
    }
}
