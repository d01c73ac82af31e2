// Integration tests for Protege Queue Gateway
//
// These tests drive the full HTTP stack (routing, middleware, request parsing,
// response formatting) against a mocked Protege upstream.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use mockito::{Matcher, Mock, ServerGuard};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use protege_queue_gateway::{
    auth::{LoginCredentials, TokenManager, LOGIN_PATH},
    build_app,
    config::Config,
    fetcher::QueueFetcher,
    http_client::ProtegeHttpClient,
    metrics::MetricsCollector,
    models::protege::QUEUE_LOOKUP_PATH,
    routes::AppState,
};

// ==================================================================================================
// Test Helpers
// ==================================================================================================

/// Create application state pointing at `base_url`
fn create_test_app_state(base_url: &str) -> AppState {
    let config = Arc::new(Config {
        server_host: "127.0.0.1".to_string(),
        server_port: 8080,
        protege_base_url: base_url.to_string(),
        credentials: LoginCredentials::new("clinic", "s3cret"),
        default_register_no: "4215".to_string(),
        token_ttl_secs: 86400,
        http_max_connections: 8,
        http_connect_timeout: 2,
        http_request_timeout: 5,
        log_level: "info".to_string(),
    });

    let metrics = Arc::new(MetricsCollector::new());
    let http = Arc::new(
        ProtegeHttpClient::new(base_url, 8, 2, 5).expect("Failed to create HTTP client"),
    );
    let token_manager = Arc::new(
        TokenManager::new(
            http.clone(),
            config.credentials.clone(),
            config.token_ttl_secs,
            metrics.clone(),
        )
        .expect("Failed to create token manager"),
    );
    let fetcher = Arc::new(QueueFetcher::new(http, token_manager.clone(), metrics.clone()));

    AppState {
        config,
        token_manager,
        fetcher,
        metrics,
    }
}

fn build_test_app(state: AppState) -> Router {
    build_app(state)
}

async fn parse_json_body(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Failed to read body");
    serde_json::from_slice(&bytes).expect("Failed to parse JSON")
}

async fn login_mock(server: &mut ServerGuard, hits: usize) -> Mock {
    server
        .mock("POST", LOGIN_PATH)
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("username".into(), "clinic".into()),
            Matcher::UrlEncoded("password".into(), "s3cret".into()),
        ]))
        .with_status(200)
        .with_body(r#"{"access_token":"tok-abc","token_type":"bearer"}"#)
        .expect(hits)
        .create_async()
        .await
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

// ==================================================================================================
// Queue Endpoint
// ==================================================================================================

#[tokio::test]
async fn test_get_queue_with_explicit_params() {
    let mut server = mockito::Server::new_async().await;
    let login = login_mock(&mut server, 1).await;
    let lookup = server
        .mock("POST", QUEUE_LOOKUP_PATH)
        .match_header("authorization", "Bearer tok-abc")
        .match_body(Matcher::Json(json!({
            "registerno": "9001",
            "visitdate": "2025-03-07"
        })))
        .with_status(200)
        .with_body(r#"{"data":[{"queuno":12},{"queuno":11}]}"#)
        .create_async()
        .await;

    let app = build_test_app(create_test_app_state(&server.url()));
    let response = app
        .oneshot(get("/api/queue?registerno=9001&visitdate=2025-03-07"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(parse_json_body(response.into_body()).await, json!({"queueNo": 12}));
    login.assert_async().await;
    lookup.assert_async().await;
}

#[tokio::test]
async fn test_get_queue_uses_default_register() {
    let mut server = mockito::Server::new_async().await;
    let _login = login_mock(&mut server, 1).await;
    let lookup = server
        .mock("POST", QUEUE_LOOKUP_PATH)
        .match_body(Matcher::PartialJson(json!({"registerno": "4215"})))
        .with_status(200)
        .with_body(r#"{"data":[]}"#)
        .create_async()
        .await;

    let app = build_test_app(create_test_app_state(&server.url()));
    let response = app.oneshot(get("/api/queue")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(parse_json_body(response.into_body()).await, json!({"queueNo": 0}));
    lookup.assert_async().await;
}

#[tokio::test]
async fn test_post_queue_with_numeric_registerno() {
    let mut server = mockito::Server::new_async().await;
    let _login = login_mock(&mut server, 1).await;
    let lookup = server
        .mock("POST", QUEUE_LOOKUP_PATH)
        .match_body(Matcher::Json(json!({
            "registerno": "77",
            "visitdate": "2024-12-31"
        })))
        .with_status(200)
        .with_body(r#"{"data":[{"queuno":"5"}]}"#)
        .create_async()
        .await;

    let app = build_test_app(create_test_app_state(&server.url()));
    let request = Request::builder()
        .method("POST")
        .uri("/api/queue")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"registerno": 77, "visitdate": "2024-12-31"}"#))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(parse_json_body(response.into_body()).await, json!({"queueNo": 5}));
    lookup.assert_async().await;
}

#[tokio::test]
async fn test_post_queue_empty_body_uses_defaults() {
    let mut server = mockito::Server::new_async().await;
    let _login = login_mock(&mut server, 1).await;
    let lookup = server
        .mock("POST", QUEUE_LOOKUP_PATH)
        .match_body(Matcher::PartialJson(json!({"registerno": "4215"})))
        .with_status(200)
        .with_body(r#"{"data":[{"queuno":2}]}"#)
        .create_async()
        .await;

    let app = build_test_app(create_test_app_state(&server.url()));
    let request = Request::builder()
        .method("POST")
        .uri("/api/queue")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(parse_json_body(response.into_body()).await, json!({"queueNo": 2}));
    lookup.assert_async().await;
}

// ==================================================================================================
// Token Lifecycle
// ==================================================================================================

#[tokio::test]
async fn test_token_reused_across_requests() {
    let mut server = mockito::Server::new_async().await;
    let login = login_mock(&mut server, 1).await;
    let lookup = server
        .mock("POST", QUEUE_LOOKUP_PATH)
        .with_status(200)
        .with_body(r#"{"data":[{"queuno":1}]}"#)
        .expect(3)
        .create_async()
        .await;

    let app = build_test_app(create_test_app_state(&server.url()));
    for _ in 0..3 {
        let response = app.clone().oneshot(get("/api/queue")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    login.assert_async().await;
    lookup.assert_async().await;
}

#[tokio::test]
async fn test_concurrent_requests_share_one_login() {
    let mut server = mockito::Server::new_async().await;
    let login = login_mock(&mut server, 1).await;
    let lookup = server
        .mock("POST", QUEUE_LOOKUP_PATH)
        .with_status(200)
        .with_body(r#"{"data":[{"queuno":9}]}"#)
        .expect(10)
        .create_async()
        .await;

    let app = build_test_app(create_test_app_state(&server.url()));
    let responses = futures::future::join_all(
        (0..10).map(|_| app.clone().oneshot(get("/api/queue"))),
    )
    .await;

    for response in responses {
        assert_eq!(response.unwrap().status(), StatusCode::OK);
    }
    login.assert_async().await;
    lookup.assert_async().await;
}

#[tokio::test]
async fn test_unauthorized_lookup_relogs_and_retries_once() {
    let mut server = mockito::Server::new_async().await;
    let login = login_mock(&mut server, 2).await;
    // Mocks with unmet expectations are matched first, in creation order
    let rejected = server
        .mock("POST", QUEUE_LOOKUP_PATH)
        .with_status(401)
        .with_body(r#"{"detail":"Token expired"}"#)
        .expect(1)
        .create_async()
        .await;
    let accepted = server
        .mock("POST", QUEUE_LOOKUP_PATH)
        .with_status(200)
        .with_body(r#"{"data":[{"queuno":21}]}"#)
        .expect(1)
        .create_async()
        .await;

    let state = create_test_app_state(&server.url());
    let metrics = state.metrics.clone();
    let app = build_test_app(state);
    let response = app.oneshot(get("/api/queue")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(parse_json_body(response.into_body()).await, json!({"queueNo": 21}));
    assert_eq!(metrics.snapshot().unauthorized_retries, 1);
    login.assert_async().await;
    rejected.assert_async().await;
    accepted.assert_async().await;
}

#[tokio::test]
async fn test_persistent_unauthorized_is_reported_as_401() {
    let mut server = mockito::Server::new_async().await;
    let _login = login_mock(&mut server, 2).await;
    let rejected = server
        .mock("POST", QUEUE_LOOKUP_PATH)
        .with_status(401)
        .with_body(r#"{"detail":"internal-token-detail"}"#)
        .expect(2)
        .create_async()
        .await;

    let app = build_test_app(create_test_app_state(&server.url()));
    let response = app.oneshot(get("/api/queue")).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = parse_json_body(response.into_body()).await;
    assert_eq!(body["type"], "upstream_error");
    assert!(!body.to_string().contains("internal-token-detail"));
    rejected.assert_async().await;
}

#[tokio::test]
async fn test_login_rejected_is_auth_error() {
    let mut server = mockito::Server::new_async().await;
    let _login = server
        .mock("POST", LOGIN_PATH)
        .with_status(401)
        .with_body(r#"{"detail":"Incorrect username or password"}"#)
        .create_async()
        .await;
    let lookup = server
        .mock("POST", QUEUE_LOOKUP_PATH)
        .expect(0)
        .create_async()
        .await;

    let state = create_test_app_state(&server.url());
    let metrics = state.metrics.clone();
    let app = build_test_app(state);
    let response = app.oneshot(get("/api/queue")).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = parse_json_body(response.into_body()).await;
    assert_eq!(body["type"], "auth_error");
    assert_eq!(metrics.snapshot().errors_by_type.get("auth_error"), Some(&1));
    lookup.assert_async().await;
}

// ==================================================================================================
// Errors
// ==================================================================================================

#[tokio::test]
async fn test_upstream_server_error_is_relayed() {
    let mut server = mockito::Server::new_async().await;
    let _login = login_mock(&mut server, 1).await;
    let lookup = server
        .mock("POST", QUEUE_LOOKUP_PATH)
        .with_status(503)
        .with_body("Service Unavailable")
        .expect(1)
        .create_async()
        .await;

    let app = build_test_app(create_test_app_state(&server.url()));
    let response = app.oneshot(get("/api/queue")).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = parse_json_body(response.into_body()).await;
    assert_eq!(body["type"], "upstream_error");
    assert!(body["error"].as_str().unwrap().contains("503"));
    lookup.assert_async().await;
}

#[tokio::test]
async fn test_invalid_visitdate_is_400() {
    let app = build_test_app(create_test_app_state("http://127.0.0.1:1"));
    let response = app
        .oneshot(get("/api/queue?visitdate=2025-02-30"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = parse_json_body(response.into_body()).await;
    assert_eq!(body["type"], "validation_error");
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_unreachable_upstream_is_network_error() {
    let app = build_test_app(create_test_app_state("http://127.0.0.1:1"));
    let response = app.oneshot(get("/api/queue")).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = parse_json_body(response.into_body()).await;
    assert_eq!(body["type"], "network_error");
}

// ==================================================================================================
// Health and CORS
// ==================================================================================================

#[tokio::test]
async fn test_health_reports_cached_token_after_lookup() {
    let mut server = mockito::Server::new_async().await;
    let _login = login_mock(&mut server, 1).await;
    let _lookup = server
        .mock("POST", QUEUE_LOOKUP_PATH)
        .with_status(200)
        .with_body(r#"{"data":[{"queuno":3}]}"#)
        .create_async()
        .await;

    let app = build_test_app(create_test_app_state(&server.url()));

    let response = app.clone().oneshot(get("/health")).await.unwrap();
    let body = parse_json_body(response.into_body()).await;
    assert_eq!(body["tokenCached"], false);

    let response = app.clone().oneshot(get("/api/queue")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = parse_json_body(response.into_body()).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["tokenCached"], true);
    assert_eq!(body["metrics"]["logins"], 1);
    assert_eq!(body["metrics"]["totalRequests"], 1);
}

#[tokio::test]
async fn test_cors_preflight_on_queue_endpoint() {
    let app = build_test_app(create_test_app_state("http://127.0.0.1:1"));
    let request = Request::builder()
        .method("OPTIONS")
        .uri("/api/queue")
        .header("origin", "https://display.clinic.example")
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "content-type")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("access-control-allow-origin").unwrap(),
        "*"
    );
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let app = build_test_app(create_test_app_state("http://127.0.0.1:1"));
    let response = app.oneshot(get("/api/unknown")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
