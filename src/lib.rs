// Protege Queue Gateway - Library root

pub mod auth;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod http_client;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod routes;

use axum::Router;

/// Build the application with all routes and middleware
pub fn build_app(state: routes::AppState) -> Router {
    Router::new()
        .merge(routes::health_routes(state.clone()))
        .merge(routes::queue_routes(state))
        // Outermost first on the way in: logging, then CORS
        .layer(middleware::cors_layer())
        .layer(axum::middleware::from_fn(middleware::log_requests))
}
