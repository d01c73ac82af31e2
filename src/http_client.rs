use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder, StatusCode};
use std::time::Duration;

use crate::error::ApiError;

/// Status and raw body of an upstream reply
#[derive(Debug, Clone)]
pub struct UpstreamReply {
    pub status: StatusCode,
    pub body: String,
}

/// HTTP client for the Protege API
///
/// Holds one pooled `reqwest::Client` shared by the login and queue-lookup
/// calls. Transport failures are classified and surfaced as
/// `ApiError::NetworkError`; nothing here retries.
pub struct ProtegeHttpClient {
    /// Shared HTTP client with connection pooling
    client: Client,

    /// Base URL without trailing slash
    base_url: String,
}

impl ProtegeHttpClient {
    /// Create a new HTTP client
    pub fn new(
        base_url: &str,
        max_connections: usize,
        connect_timeout: u64,
        request_timeout: u64,
    ) -> Result<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(max_connections)
            .connect_timeout(Duration::from_secs(connect_timeout))
            .timeout(Duration::from_secs(request_timeout))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Absolute URL for an upstream path such as `/auth/`
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Get the underlying HTTP client
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Send a request and read the whole body, whatever the status.
    ///
    /// Status interpretation is left to the caller.
    pub async fn send(&self, request: RequestBuilder) -> Result<UpstreamReply, ApiError> {
        let request = request
            .build()
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("Failed to build request: {}", e)))?;

        let method = request.method().clone();
        let url = request.url().clone();
        tracing::debug!(method = %method, url = %url, "Sending HTTP request");

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| network_error(e, url.as_str()))?;

        let status = response.status();
        tracing::debug!(status = %status, "Received HTTP response");

        let body = response
            .text()
            .await
            .map_err(|e| network_error(e, url.as_str()))?;

        if !status.is_success() {
            tracing::warn!(status = %status, url = %url, "Received error response");
        }

        Ok(UpstreamReply { status, body })
    }
}

/// Categorize a reqwest failure for logs
fn error_kind(e: &reqwest::Error) -> &'static str {
    if e.is_timeout() {
        "timeout"
    } else if e.is_connect() {
        "connection_failed"
    } else if e.is_request() {
        "request_error"
    } else if e.is_body() {
        "body_error"
    } else if e.is_decode() {
        "decode_error"
    } else {
        "unknown"
    }
}

fn network_error(e: reqwest::Error, url: &str) -> ApiError {
    let kind = error_kind(&e);

    tracing::warn!(
        error_kind = kind,
        error = %e,
        url = %url,
        "HTTP request error"
    );

    ApiError::NetworkError(format!("{} (kind: {})", e, kind))
}
