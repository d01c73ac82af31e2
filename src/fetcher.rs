// Queue lookup against Protege with a single re-login on 401

use std::sync::Arc;

use crate::auth::{Credential, TokenManager};
use crate::error::ApiError;
use crate::http_client::ProtegeHttpClient;
use crate::metrics::MetricsCollector;
use crate::models::protege::{QueueLookupRequest, QueueLookupResponse, QUEUE_LOOKUP_PATH};
use crate::models::queue::{QueueQuery, QueueResult};

/// Steps of one `fetch_queue_number` call.
///
/// `Retrying` is only reachable from a `TokenFetched` whose `retried` flag is
/// false, so at most one re-login happens per call.
enum FetchState {
    Init,
    TokenFetched { credential: Credential, retried: bool },
    Retrying,
    Done(QueueResult),
    Failed(ApiError),
}

/// Fetches the current queue number from Protege
pub struct QueueFetcher {
    http: Arc<ProtegeHttpClient>,
    token_manager: Arc<TokenManager>,
    metrics: Arc<MetricsCollector>,
}

impl QueueFetcher {
    pub fn new(
        http: Arc<ProtegeHttpClient>,
        token_manager: Arc<TokenManager>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            http,
            token_manager,
            metrics,
        }
    }

    /// Look up the last called queue number for `query`.
    ///
    /// A 401 invalidates the cached token and the lookup is repeated once with
    /// a freshly issued one. Other failures are returned as-is.
    pub async fn fetch_queue_number(&self, query: &QueueQuery) -> Result<QueueResult, ApiError> {
        let payload = QueueLookupRequest::from(query);
        let mut state = FetchState::Init;

        loop {
            state = match state {
                FetchState::Init => match self.token_manager.get_token(false).await {
                    Ok(credential) => FetchState::TokenFetched {
                        credential,
                        retried: false,
                    },
                    Err(e) => FetchState::Failed(e),
                },

                FetchState::TokenFetched {
                    credential,
                    retried,
                } => match self.lookup(&credential, &payload).await {
                    Ok(result) => FetchState::Done(result),
                    Err(ApiError::UpstreamError { status: 401, .. }) if !retried => {
                        FetchState::Retrying
                    }
                    Err(e) => FetchState::Failed(e),
                },

                FetchState::Retrying => {
                    tracing::warn!("Received 401 from Protege, refreshing token and retrying...");
                    self.metrics.record_unauthorized_retry();
                    self.token_manager.invalidate().await;

                    match self.token_manager.get_token(true).await {
                        Ok(credential) => FetchState::TokenFetched {
                            credential,
                            retried: true,
                        },
                        Err(e) => FetchState::Failed(e),
                    }
                }

                FetchState::Done(result) => {
                    tracing::debug!(
                        register_no = %query.register_no,
                        visit_date = %query.visit_date,
                        queue_number = result.queue_number,
                        "Queue lookup complete"
                    );
                    return Ok(result);
                }

                FetchState::Failed(e) => return Err(e),
            };
        }
    }

    /// One lookup round-trip
    async fn lookup(
        &self,
        credential: &Credential,
        payload: &QueueLookupRequest,
    ) -> Result<QueueResult, ApiError> {
        self.metrics.record_upstream_lookup();

        let request = self
            .http
            .client()
            .post(self.http.endpoint(QUEUE_LOOKUP_PATH))
            .header("Authorization", credential.bearer())
            .json(payload);

        let reply = self.http.send(request).await?;

        if !reply.status.is_success() {
            return Err(ApiError::UpstreamError {
                status: reply.status.as_u16(),
                body: reply.body,
            });
        }

        match QueueLookupResponse::parse(&reply.body) {
            Ok(data) => Ok(QueueResult {
                queue_number: data.queue_number(),
            }),
            Err(e) => {
                tracing::error!(
                    error = %e,
                    body = %reply.body,
                    "Failed to parse Protege queue response"
                );
                Err(ApiError::UpstreamError {
                    status: reply.status.as_u16(),
                    body: reply.body,
                })
            }
        }
    }
}
