use anyhow::{Context, Result};
use clap::Parser;
use dialoguer::{Confirm, Input, Password};
use std::io::Write;

use crate::auth::{LoginCredentials, MAX_TOKEN_TTL_SECS};

/// Upstream used by the clinic deployment
pub const DEFAULT_PROTEGE_BASE_URL: &str = "http://protege.powerapi.powersoft.asia";

/// Protege Queue Gateway
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Server host address
    #[arg(short = 'H', long, env = "SERVER_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Server port
    #[arg(short, long, env = "SERVER_PORT", default_value = "8000")]
    pub port: u16,

    /// Base URL of the Protege API
    #[arg(short = 'u', long, env = "PROTEGE_BASE_URL", default_value = DEFAULT_PROTEGE_BASE_URL)]
    pub base_url: String,

    /// Protege login username
    #[arg(long, env = "API_USERNAME", hide_env_values = true)]
    pub username: Option<String>,

    /// Protege login password
    #[arg(long, env = "API_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Register number used when a request does not name one
    #[arg(short = 'r', long, env = "DEFAULT_REGISTER_NO", default_value = "4215")]
    pub register_no: String,

    /// Lifetime of a Protege token in seconds
    #[arg(long, env = "TOKEN_TTL_SECS", default_value = "86400")]
    pub token_ttl: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// HTTP connect timeout in seconds
    #[arg(long, env = "HTTP_CONNECT_TIMEOUT", default_value = "5")]
    pub http_connect_timeout: u64,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "10")]
    pub http_timeout: u64,
}

#[derive(Clone, Debug)]
pub struct Config {
    // Server settings
    pub server_host: String,
    pub server_port: u16,

    // Protege upstream
    pub protege_base_url: String,
    pub credentials: LoginCredentials,
    pub default_register_no: String,
    pub token_ttl_secs: u64,

    // HTTP client
    pub http_max_connections: usize,
    pub http_connect_timeout: u64,
    pub http_request_timeout: u64,

    // Logging
    pub log_level: String,
}

impl Config {
    /// Load configuration from all sources with priority: CLI > ENV > .env > defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let args = CliArgs::parse();

        let credentials = resolve_login_credentials(
            args.username,
            args.password,
            std::env::var("API_TOKEN").ok(),
        )?;

        let config = Config {
            server_host: args.host,
            server_port: args.port,

            protege_base_url: normalize_base_url(&args.base_url),
            credentials,
            default_register_no: args.register_no.trim().to_string(),
            token_ttl_secs: args.token_ttl,

            http_max_connections: std::env::var("HTTP_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(20),
            http_connect_timeout: args.http_connect_timeout,
            http_request_timeout: args.http_timeout,

            log_level: args.log_level,
        };

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let url = reqwest::Url::parse(&self.protege_base_url)
            .with_context(|| format!("PROTEGE_BASE_URL is not a valid URL: {}", self.protege_base_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("PROTEGE_BASE_URL must be http or https: {}", self.protege_base_url);
        }

        if self.credentials.username.trim().is_empty() || self.credentials.password.is_empty() {
            anyhow::bail!("API_USERNAME and API_PASSWORD must not be empty");
        }

        if self.default_register_no.is_empty() {
            anyhow::bail!("DEFAULT_REGISTER_NO must not be empty");
        }

        if self.token_ttl_secs == 0 || self.token_ttl_secs > MAX_TOKEN_TTL_SECS {
            anyhow::bail!(
                "TOKEN_TTL_SECS must be between 1 and {} seconds",
                MAX_TOKEN_TTL_SECS
            );
        }

        if self.http_request_timeout == 0 || self.http_connect_timeout == 0 {
            anyhow::bail!("HTTP timeouts must be greater than zero");
        }

        Ok(())
    }
}

/// Pick the login credentials, refusing the static-token mode.
///
/// Only username/password login is supported. A stray `API_TOKEN` would
/// suggest the deployment expects the other mode, so it is rejected rather
/// than ignored.
fn resolve_login_credentials(
    username: Option<String>,
    password: Option<String>,
    static_token: Option<String>,
) -> Result<LoginCredentials> {
    if static_token.is_some_and(|t| !t.is_empty()) {
        anyhow::bail!(
            "API_TOKEN is not supported; configure API_USERNAME and API_PASSWORD and unset API_TOKEN"
        );
    }

    let username = username
        .filter(|u| !u.trim().is_empty())
        .context("API_USERNAME is required (use --username or set API_USERNAME env var)")?;
    let password = password
        .filter(|p| !p.is_empty())
        .context("API_PASSWORD is required (use --password or set API_PASSWORD env var)")?;

    Ok(LoginCredentials::new(username.trim(), password))
}

/// Strip trailing slashes so endpoint paths can be appended directly
fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}


// === Interactive Setup ===

/// Check if interactive setup is needed (no .env file and missing credentials)
pub fn needs_interactive_setup() -> bool {
    let env_file_exists = std::path::Path::new(".env").exists();

    let has_username = std::env::var("API_USERNAME").is_ok();
    let has_password = std::env::var("API_PASSWORD").is_ok();

    !env_file_exists && (!has_username || !has_password)
}

/// Run interactive setup to collect required configuration
pub fn run_interactive_setup() -> Result<InteractiveConfig> {
    println!();
    println!("Protege Queue Gateway - First Time Setup");
    println!();
    println!("No configuration found. Let's set up your gateway.");
    println!();

    let api_username: String = Input::new()
        .with_prompt("Protege username (API_USERNAME)")
        .interact_text()
        .context("Failed to read API_USERNAME")?;

    if api_username.trim().is_empty() {
        anyhow::bail!("API_USERNAME cannot be empty");
    }

    let api_password: String = Password::new()
        .with_prompt("Protege password (API_PASSWORD)")
        .interact()
        .context("Failed to read API_PASSWORD")?;

    if api_password.is_empty() {
        anyhow::bail!("API_PASSWORD cannot be empty");
    }

    println!();
    let default_register_no: String = Input::new()
        .with_prompt("Default register number")
        .default("4215".to_string())
        .interact_text()
        .context("Failed to read register number")?;

    println!();
    let server_port: String = Input::new()
        .with_prompt("Server port")
        .default("8000".to_string())
        .interact_text()
        .context("Failed to read server port")?;

    let config = InteractiveConfig {
        api_username: api_username.trim().to_string(),
        api_password,
        default_register_no,
        server_port,
    };

    println!();
    let save_to_env = Confirm::new()
        .with_prompt("Save configuration to .env file?")
        .default(true)
        .interact()
        .context("Failed to read save confirmation")?;

    if save_to_env {
        save_env_file(&config)?;
        println!();
        println!("Configuration saved to .env file");
    }

    println!();
    println!("Setup complete! Starting gateway...");
    println!();

    Ok(config)
}

/// Configuration collected from interactive setup
#[derive(Clone)]
pub struct InteractiveConfig {
    pub api_username: String,
    pub api_password: String,
    pub default_register_no: String,
    pub server_port: String,
}

/// Save configuration to .env file
fn save_env_file(config: &InteractiveConfig) -> Result<()> {
    let env_content = format!(
        r#"# Protege Queue Gateway Configuration
# Generated by interactive setup

# Protege login (required)
API_USERNAME={}
API_PASSWORD={}

# Protege API location
PROTEGE_BASE_URL={}

# Register used when a request does not name one
DEFAULT_REGISTER_NO={}

# Server settings
SERVER_HOST=0.0.0.0
SERVER_PORT={}

# Logging (trace, debug, info, warn, error)
LOG_LEVEL=info
"#,
        config.api_username,
        config.api_password,
        DEFAULT_PROTEGE_BASE_URL,
        config.default_register_no,
        config.server_port,
    );

    let mut file = std::fs::File::create(".env").context("Failed to create .env file")?;
    file.write_all(env_content.as_bytes())
        .context("Failed to write .env file")?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(".env", std::fs::Permissions::from_mode(0o600))
            .context("Failed to restrict .env permissions")?;
    }

    Ok(())
}
