// CORS and request logging middleware

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};

/// Create CORS middleware layer
///
/// The queue number is shown on clinic display pages served from other
/// origins, so every origin, method and header is allowed.
/// OPTIONS preflight requests are answered by the layer itself.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Log one line per request with a short id, status and latency
pub async fn log_requests(request: Request<Body>, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string()[..8].to_string();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    tracing::debug!("[{}] {} {}", request_id, method, path);

    let response = next.run(request).await;
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    let status = response.status();

    if status.is_server_error() {
        tracing::warn!(
            "[{}] {} {} -> {} ({:.1}ms)",
            request_id,
            method,
            path,
            status.as_u16(),
            latency_ms
        );
    } else {
        tracing::info!(
            "[{}] {} {} -> {} ({:.1}ms)",
            request_id,
            method,
            path,
            status.as_u16(),
            latency_ms
        );
    }

    response
}
