use chrono::Duration;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use super::login;
use super::types::{Credential, LoginCredentials};
use crate::error::ApiError;
use crate::http_client::ProtegeHttpClient;
use crate::metrics::MetricsCollector;

/// Longest accepted token lifetime (one year)
pub const MAX_TOKEN_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// Cached credential plus a counter bumped on every store and invalidation.
///
/// The counter lets a refresh detect that the cache changed underneath it.
#[derive(Default)]
struct TokenCache {
    credential: Option<Credential>,
    generation: u64,
}

/// Token manager
///
/// Owns the single cached Protege credential. Logins are serialized behind
/// `refresh_guard`, so at most one login round-trip is in flight and callers
/// queued behind it reuse its result.
pub struct TokenManager {
    /// Shared Protege HTTP client
    http: Arc<ProtegeHttpClient>,

    /// Login username/password
    credentials: LoginCredentials,

    /// Lifetime assigned to each new token
    token_ttl: Duration,

    /// Current credential
    cache: RwLock<TokenCache>,

    /// Held for the duration of a login round-trip
    refresh_guard: Mutex<()>,

    metrics: Arc<MetricsCollector>,
}

impl TokenManager {
    pub fn new(
        http: Arc<ProtegeHttpClient>,
        credentials: LoginCredentials,
        token_ttl_secs: u64,
        metrics: Arc<MetricsCollector>,
    ) -> Result<Self, ApiError> {
        if credentials.username.trim().is_empty() || credentials.password.is_empty() {
            return Err(ApiError::ConfigError(
                "Protege username and password must be configured".to_string(),
            ));
        }

        let token_ttl = Some(token_ttl_secs)
            .filter(|secs| (1..=MAX_TOKEN_TTL_SECS).contains(secs))
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(Duration::try_seconds)
            .ok_or_else(|| {
                ApiError::ConfigError(format!(
                    "Token TTL must be between 1 and {} seconds",
                    MAX_TOKEN_TTL_SECS
                ))
            })?;

        Ok(Self {
            http,
            credentials,
            token_ttl,
            cache: RwLock::new(TokenCache::default()),
            refresh_guard: Mutex::new(()),
            metrics,
        })
    }

    /// Get a usable token, logging in if the cache is empty, expired, or
    /// `force_refresh` is set.
    ///
    /// The cache-hit path performs no I/O and no writes.
    pub async fn get_token(&self, force_refresh: bool) -> Result<Credential, ApiError> {
        let observed = {
            let cache = self.cache.read().await;
            if !force_refresh {
                if let Some(credential) = cache.credential.as_ref().filter(|c| c.is_valid()) {
                    return Ok(credential.clone());
                }
            }
            cache.generation
        };

        let _guard = self.refresh_guard.lock().await;

        let started = {
            let cache = self.cache.read().await;
            if cache.generation != observed {
                if let Some(credential) = cache.credential.as_ref().filter(|c| c.is_valid()) {
                    tracing::debug!("Reusing token refreshed by a concurrent request");
                    return Ok(credential.clone());
                }
            }
            cache.generation
        };

        tracing::debug!(force_refresh, "Refreshing Protege token...");
        self.metrics.record_login();
        let credential = login::login(&self.http, &self.credentials, self.token_ttl).await?;

        if !self.store_if_current(credential.clone(), started).await {
            tracing::warn!("Token cache was invalidated during login; new token not cached");
        }

        Ok(credential)
    }

    /// Drop the cached credential. Idempotent.
    pub async fn invalidate(&self) {
        let mut cache = self.cache.write().await;
        if cache.credential.take().is_some() {
            tracing::info!("Cached Protege token invalidated");
        }
        cache.generation += 1;
    }

    /// Currently cached credential, if still valid. Never logs in.
    pub async fn cached_credential(&self) -> Option<Credential> {
        let cache = self.cache.read().await;
        cache.credential.as_ref().filter(|c| c.is_valid()).cloned()
    }

    /// Store a fresh credential unless the cache changed since `started`
    async fn store_if_current(&self, credential: Credential, started: u64) -> bool {
        let mut cache = self.cache.write().await;
        if cache.generation != started {
            return false;
        }
        cache.credential = Some(credential);
        cache.generation += 1;
        true
    }
}
