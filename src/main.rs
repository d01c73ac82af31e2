use anyhow::Result;
use std::sync::Arc;

use protege_queue_gateway::{
    auth::TokenManager, build_app, config, fetcher::QueueFetcher, http_client::ProtegeHttpClient,
    metrics::MetricsCollector, routes::AppState,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Check if interactive setup is needed (no .env and missing credentials)
    if config::needs_interactive_setup() {
        let interactive_config = config::run_interactive_setup()?;

        // Set environment variables from interactive config so Config::load() can use them
        std::env::set_var("API_USERNAME", &interactive_config.api_username);
        std::env::set_var("API_PASSWORD", &interactive_config.api_password);
        std::env::set_var("DEFAULT_REGISTER_NO", &interactive_config.default_register_no);
        std::env::set_var("SERVER_PORT", &interactive_config.server_port);
    }

    // Load configuration first (for log level)
    let config = config::Config::load()?;
    config.validate()?;

    // Initialize logging with a configured level
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("Protege queue gateway starting...");
    tracing::info!(
        "Server configured: {}:{}",
        config.server_host,
        config.server_port
    );

    let metrics = Arc::new(MetricsCollector::new());

    let http_client = Arc::new(ProtegeHttpClient::new(
        &config.protege_base_url,
        config.http_max_connections,
        config.http_connect_timeout,
        config.http_request_timeout,
    )?);
    tracing::info!("HTTP client initialized for {}", config.protege_base_url);

    let token_manager = Arc::new(TokenManager::new(
        http_client.clone(),
        config.credentials.clone(),
        config.token_ttl_secs,
        metrics.clone(),
    )?);

    // Warm the token cache; a failure here is not fatal
    match token_manager.get_token(false).await {
        Ok(credential) => {
            tracing::info!(
                "Authentication successful (token expires {})",
                credential.expires_at.to_rfc3339()
            );
        }
        Err(e) => {
            tracing::error!("Authentication failed: {}", e);
            tracing::warn!("Server will start; login is retried on the first queue request");
        }
    }

    let fetcher = Arc::new(QueueFetcher::new(
        http_client.clone(),
        token_manager.clone(),
        metrics.clone(),
    ));

    let app_state = AppState {
        config: Arc::new(config.clone()),
        token_manager,
        fetcher,
        metrics,
    };

    let app = build_app(app_state);

    // Bind to configured host and port
    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    print_startup_banner(&config);

    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");

    Ok(())
}

/// Print startup banner
fn print_startup_banner(config: &config::Config) {
    let banner = r#"
╔═══════════════════════════════════════════════════════════╗
║                                                           ║
║                  Protege Queue Gateway                    ║
║                                                           ║
║      Current queue number for clinic display screens      ║
║                                                           ║
╚═══════════════════════════════════════════════════════════╝
"#;

    println!("{}", banner);
    println!("  Version:      {}", env!("CARGO_PKG_VERSION"));
    println!(
        "  Server:       http://{}:{}",
        config.server_host, config.server_port
    );
    println!("  Protege:      {}", config.protege_base_url);
    println!("  Register:     {}", config.default_register_no);
    println!("  Token TTL:    {}s", config.token_ttl_secs);
    println!("  Log Level:    {}", config.log_level);
    println!();
}

/// Handle graceful shutdown signal
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown...");
        },
    }
}
