// Protege login round-trip

use chrono::{Duration, Utc};

use super::types::{Credential, LoginCredentials, LoginForm, LoginResponse};
use crate::error::ApiError;
use crate::http_client::ProtegeHttpClient;

/// Login endpoint, relative to the Protege base URL
pub const LOGIN_PATH: &str = "/auth/";

/// Exchange username/password for a bearer token.
///
/// Protege does not report a lifetime, so the credential expires `ttl` from now.
pub async fn login(
    http: &ProtegeHttpClient,
    creds: &LoginCredentials,
    ttl: Duration,
) -> Result<Credential, ApiError> {
    tracing::info!("Logging in to Protege...");

    let form = LoginForm {
        username: &creds.username,
        password: &creds.password,
    };

    let reply = http
        .send(http.client().post(http.endpoint(LOGIN_PATH)).form(&form))
        .await?;

    let status = reply.status.as_u16();
    if !reply.status.is_success() {
        tracing::error!(
            status = status,
            body = %reply.body,
            "Protege login failed"
        );
        return Err(ApiError::AuthError {
            status,
            body: reply.body,
        });
    }

    let data: LoginResponse = match serde_json::from_str(&reply.body) {
        Ok(data) => data,
        Err(e) => {
            tracing::error!(
                error = %e,
                body = %reply.body,
                "Failed to parse Protege login response"
            );
            return Err(ApiError::AuthError {
                status,
                body: reply.body,
            });
        }
    };

    if data.access_token.trim().is_empty() {
        tracing::error!("Protege login response does not contain access_token");
        return Err(ApiError::AuthError {
            status,
            body: reply.body,
        });
    }

    let expires_at = Utc::now().checked_add_signed(ttl).ok_or_else(|| {
        ApiError::ConfigError("Token TTL overflows the calendar".to_string())
    })?;
    tracing::info!("Protege token acquired, expires: {}", expires_at.to_rfc3339());

    Ok(Credential::new(data.access_token, expires_at))
}
