use axum::{
    body::Bytes,
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::{Local, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;

use crate::auth::TokenManager;
use crate::config::Config;
use crate::error::ApiError;
use crate::fetcher::QueueFetcher;
use crate::metrics::MetricsCollector;
use crate::models::queue::{QueueParams, QueueResponse};

/// Application version from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub token_manager: Arc<TokenManager>,
    pub fetcher: Arc<QueueFetcher>,
    pub metrics: Arc<MetricsCollector>,
}

/// Keeps `active_requests` balanced even when a handler bails out early
struct RequestGuard {
    metrics: Arc<MetricsCollector>,
    start_time: Instant,
}

impl RequestGuard {
    fn new(metrics: Arc<MetricsCollector>) -> Self {
        metrics.record_request_start();
        Self {
            metrics,
            start_time: Instant::now(),
        }
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        let latency_ms = self.start_time.elapsed().as_secs_f64() * 1000.0;
        self.metrics.record_request_end(latency_ms);
    }
}

/// Health check routes (no upstream calls)
pub fn health_routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Queue number routes
pub fn queue_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/queue", get(queue_get_handler).post(queue_post_handler))
        .with_state(state)
}

/// GET / - Simple liveness probe
async fn root_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "Protege queue gateway is running",
        "version": VERSION
    }))
}

/// GET /health - Detailed health check
///
/// Reports whether a usable token is cached plus request counters.
/// Never triggers a login.
async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let token_cached = state.token_manager.cached_credential().await.is_some();

    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "version": VERSION,
        "tokenCached": token_cached,
        "metrics": state.metrics.snapshot()
    }))
}

/// GET /api/queue?registerno=..&visitdate=..
async fn queue_get_handler(
    State(state): State<AppState>,
    Query(params): Query<QueueParams>,
) -> Result<Json<QueueResponse>, ApiError> {
    let _guard = RequestGuard::new(state.metrics.clone());
    handle_queue_request(&state, params).await
}

/// POST /api/queue with an optional JSON body
///
/// An empty body means "all defaults". Parsed by hand so a malformed body
/// comes back in the local error shape rather than axum's rejection text.
async fn queue_post_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<QueueResponse>, ApiError> {
    let _guard = RequestGuard::new(state.metrics.clone());

    let params = if body.iter().all(u8::is_ascii_whitespace) {
        QueueParams::default()
    } else {
        match serde_json::from_slice::<QueueParams>(&body) {
            Ok(params) => params,
            Err(e) => {
                let err = ApiError::ValidationError(format!("Invalid JSON body: {}", e));
                state.metrics.record_error(err.error_type());
                return Err(err);
            }
        }
    };

    handle_queue_request(&state, params).await
}

async fn handle_queue_request(
    state: &AppState,
    params: QueueParams,
) -> Result<Json<QueueResponse>, ApiError> {
    let query = params
        .into_query(&state.config.default_register_no, Local::now().date_naive())
        .map_err(|e| {
            state.metrics.record_error(e.error_type());
            e
        })?;

    tracing::info!(
        register_no = %query.register_no,
        visit_date = %query.visit_date,
        "Queue number requested"
    );

    match state.fetcher.fetch_queue_number(&query).await {
        Ok(result) => Ok(Json(QueueResponse::from(result))),
        Err(e) => {
            tracing::error!(error_type = e.error_type(), "Queue lookup failed: {}", e);
            state.metrics.record_error(e.error_type());
            Err(e)
        }
    }
}
