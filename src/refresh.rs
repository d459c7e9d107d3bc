use crate::connectivity::{is_offline, NetworkStateProvider};
use crate::error::ApiError;
use crate::retry::{with_retry_if, RetryConfig};
use crate::token::TokenStore;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

type RefreshFuture = Shared<BoxFuture<'static, Result<String, ApiError>>>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    access_token: String,
    refresh_token: String,
}

struct RefreshInner {
    http: reqwest::Client,
    refresh_url: String,
    tokens: TokenStore,
    network: Arc<dyn NetworkStateProvider>,
    retry: RetryConfig,
    in_flight: Mutex<Option<RefreshFuture>>,
}

/// Single-flight coordinator for session refresh.
///
/// At most one refresh network call is in flight at a time: concurrent
/// callers clone the same shared future and all observe its one outcome.
/// The slot is cleared once that future settles so a later call starts a
/// fresh attempt.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<RefreshInner>,
}

impl RefreshCoordinator {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        tokens: TokenStore,
        network: Arc<dyn NetworkStateProvider>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            inner: Arc::new(RefreshInner {
                http,
                refresh_url: format!("{}/users/refresh", base_url.trim_end_matches('/')),
                tokens,
                network,
                retry,
                in_flight: Mutex::new(None),
            }),
        }
    }

    /// Obtain a fresh access token, joining an in-flight refresh if one
    /// exists.
    pub async fn refresh(&self) -> Result<String, ApiError> {
        let fut = {
            let mut slot = self.inner.in_flight.lock().await;
            match slot.as_ref() {
                Some(existing) => {
                    debug!("joining in-flight token refresh");
                    existing.clone()
                }
                None => {
                    let inner = Arc::clone(&self.inner);
                    let fut = async move { run_refresh(inner).await }.boxed().shared();
                    *slot = Some(fut.clone());
                    fut
                }
            }
        };

        let result = fut.clone().await;

        // Clear the marker so the next call starts a new attempt. Guarded by
        // ptr_eq so a refresh that started after ours is never clobbered.
        let mut slot = self.inner.in_flight.lock().await;
        if slot.as_ref().is_some_and(|current| current.ptr_eq(&fut)) {
            *slot = None;
        }
        result
    }
}

async fn run_refresh(inner: Arc<RefreshInner>) -> Result<String, ApiError> {
    if is_offline(inner.network.as_ref()) {
        return Err(ApiError::Offline {
            method: "POST".to_string(),
            url: inner.refresh_url.clone(),
        });
    }

    // No refresh token held: nothing to exchange, the session is gone.
    let refresh_token = inner
        .tokens
        .refresh_token()
        .ok_or(ApiError::Auth { status: 401 })?;

    let pair = with_retry_if(
        &inner.retry,
        "token refresh",
        || attempt_refresh(&inner, &refresh_token),
        // Offline and terminal 401/403 cannot be helped by retrying.
        |e: &ApiError| !e.is_offline() && !e.is_terminal_auth() && e.is_retryable(),
    )
    .await?;

    inner
        .tokens
        .store_refreshed(&pair.access_token, &pair.refresh_token);
    debug!("token refresh succeeded");
    Ok(pair.access_token)
}

async fn attempt_refresh(
    inner: &RefreshInner,
    refresh_token: &str,
) -> Result<RefreshResponse, ApiError> {
    if is_offline(inner.network.as_ref()) {
        return Err(ApiError::Offline {
            method: "POST".to_string(),
            url: inner.refresh_url.clone(),
        });
    }

    let response = inner
        .http
        .post(&inner.refresh_url)
        .json(&serde_json::json!({ "refreshToken": refresh_token }))
        .send()
        .await
        .map_err(|e| classify_send_error(&e, &inner.refresh_url))?;

    let status = response.status();
    if status.as_u16() == 401 || status.as_u16() == 403 {
        warn!(url = %inner.refresh_url, status = status.as_u16(), "refresh rejected");
        return Err(ApiError::Auth {
            status: status.as_u16(),
        });
    }
    if !status.is_success() {
        // Auth endpoint: the body is never captured or logged.
        return Err(ApiError::Status {
            status: status.as_u16(),
            method: "POST".to_string(),
            url: inner.refresh_url.clone(),
            body: None,
        });
    }

    response.json::<RefreshResponse>().await.map_err(|e| ApiError::Decode {
        message: e.to_string(),
    })
}

fn classify_send_error(error: &reqwest::Error, url: &str) -> ApiError {
    if error.is_timeout() {
        ApiError::Timeout {
            method: "POST".to_string(),
            url: url.to_string(),
        }
    } else {
        ApiError::Transport {
            message: error.to_string(),
        }
    }
}
