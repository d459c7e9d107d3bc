use crate::config::Config;
use crate::connectivity::{is_offline, NetworkStateProvider};
use crate::error::ApiError;
use crate::refresh::RefreshCoordinator;
use crate::retry::RetryConfig;
use crate::token::TokenStore;
use reqwest::{Method, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// Routes whose 401s are never auto-retried and whose response bodies are
/// never logged or captured (credential hygiene).
const AUTH_ENDPOINTS: [&str; 4] = [
    "/users/login",
    "/users/register",
    "/users/refresh",
    "/users/logout",
];

/// Maximum captured error-body length.
const MAX_BODY_SNIPPET: usize = 2048;

/// Declarative description of an outbound request. Built once and replayed
/// when a 401 forces a refresh-and-resubmit, so the retried request is
/// byte-identical apart from the bearer header.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub json: Option<serde_json::Value>,
}

impl RequestSpec {
    pub fn new(method: Method, path: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            query: Vec::new(),
            headers: Vec::new(),
            json: None,
        }
    }

    pub fn query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn header(mut self, key: &str, value: &str) -> Self {
        self.headers.push((key.to_string(), value.to_string()));
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.json = Some(body);
        self
    }
}

/// Authenticated request client: the single gateway for all outbound HTTP.
///
/// Applies cross-cutting policy to every call: bearer injection, offline
/// short-circuiting, timeout classification, and 401-triggered single-flight
/// token refresh with a retry-once guard. Callers use it like an ordinary
/// HTTP client; the recovery behavior is transparent.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    tokens: TokenStore,
    network: Arc<dyn NetworkStateProvider>,
    refresh: RefreshCoordinator,
}

impl ApiClient {
    pub fn new(
        config: &Config,
        tokens: TokenStore,
        network: Arc<dyn NetworkStateProvider>,
    ) -> Result<Self, ApiError> {
        Self::with_options(
            &config.api_base_url,
            Duration::from_secs(config.request_timeout_secs),
            RetryConfig::new(
                config.refresh_max_attempts,
                Duration::from_millis(config.refresh_base_delay_ms),
            ),
            tokens,
            network,
        )
    }

    pub fn with_options(
        base_url: &str,
        timeout: Duration,
        refresh_retry: RetryConfig,
        tokens: TokenStore,
        network: Arc<dyn NetworkStateProvider>,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Transport {
                message: e.to_string(),
            })?;
        let base_url = base_url.trim_end_matches('/').to_string();
        let refresh = RefreshCoordinator::new(
            http.clone(),
            &base_url,
            tokens.clone(),
            Arc::clone(&network),
            refresh_retry,
        );
        Ok(Self {
            http,
            base_url,
            tokens,
            network,
            refresh,
        })
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub async fn get(&self, path: &str) -> Result<Response, ApiError> {
        self.send(RequestSpec::new(Method::GET, path)).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.get(path).await?;
        response.json().await.map_err(|e| ApiError::Decode {
            message: e.to_string(),
        })
    }

    pub async fn post_json<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Response, ApiError> {
        let value = serde_json::to_value(body).map_err(|e| ApiError::Decode {
            message: e.to_string(),
        })?;
        self.send(RequestSpec::new(Method::POST, path).json(value))
            .await
    }

    pub async fn put_json<B: Serialize>(&self, path: &str, body: &B) -> Result<Response, ApiError> {
        let value = serde_json::to_value(body).map_err(|e| ApiError::Decode {
            message: e.to_string(),
        })?;
        self.send(RequestSpec::new(Method::PUT, path).json(value))
            .await
    }

    pub async fn delete(&self, path: &str) -> Result<Response, ApiError> {
        self.send(RequestSpec::new(Method::DELETE, path)).await
    }

    /// Send a request with the full cross-cutting policy applied.
    pub async fn send(&self, spec: RequestSpec) -> Result<Response, ApiError> {
        let url = self.url_for(&spec.path);

        if is_offline(self.network.as_ref()) {
            debug!(method = %spec.method, url = %url, "request short-circuited: offline");
            return Err(ApiError::Offline {
                method: spec.method.to_string(),
                url,
            });
        }

        let auth_endpoint = is_auth_endpoint(&spec.path);
        let token = self.tokens.access_token();

        let original = match self
            .dispatch(&spec, &url, token.as_deref(), auth_endpoint)
            .await
        {
            Ok(response) => return Ok(response),
            Err(e) => e,
        };

        // 401 on a non-auth endpoint: refresh the session once and resubmit
        // the original request exactly once. Auth endpoints are excluded so
        // a rejected refresh can never trigger another refresh.
        if original.status() != Some(401) || auth_endpoint {
            return Err(original);
        }

        match self.refresh.refresh().await {
            Ok(new_token) => {
                debug!(method = %spec.method, url = %url, "resubmitting after token refresh");
                self.dispatch(&spec, &url, Some(&new_token), auth_endpoint)
                    .await
            }
            Err(e) if e.is_offline() => Err(e),
            Err(refresh_error) => {
                debug!("token refresh failed ({refresh_error}), clearing session");
                self.tokens.clear_tokens();
                Err(original)
            }
        }
    }

    async fn dispatch(
        &self,
        spec: &RequestSpec,
        url: &str,
        token: Option<&str>,
        auth_endpoint: bool,
    ) -> Result<Response, ApiError> {
        let mut request = self.http.request(spec.method.clone(), url);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if !spec.query.is_empty() {
            request = request.query(&spec.query);
        }
        for (key, value) in &spec.headers {
            request = request.header(key, value);
        }
        if let Some(body) = &spec.json {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.classify_send_error(&e, &spec.method, url))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = if auth_endpoint {
            None
        } else {
            response
                .text()
                .await
                .ok()
                .filter(|b| !b.is_empty())
                .map(|b| truncate(&b))
        };

        if status.as_u16() == 304 {
            // Expected outcome of a conditional fetch, not a failure.
            debug!(method = %spec.method, url = %url, "not modified");
        } else {
            match &body {
                Some(snippet) => {
                    error!(method = %spec.method, url = %url, status = status.as_u16(), body = %snippet, "request failed");
                }
                None => {
                    error!(method = %spec.method, url = %url, status = status.as_u16(), "request failed");
                }
            }
        }

        Err(ApiError::Status {
            status: status.as_u16(),
            method: spec.method.to_string(),
            url: url.to_string(),
            body,
        })
    }

    fn classify_send_error(&self, error: &reqwest::Error, method: &Method, url: &str) -> ApiError {
        if error.is_timeout() {
            error!(method = %method, url = %url, "request timed out");
            return ApiError::Timeout {
                method: method.to_string(),
                url: url.to_string(),
            };
        }
        // No response at all: if the probe now says offline, normalize.
        if is_offline(self.network.as_ref()) {
            return ApiError::Offline {
                method: method.to_string(),
                url: url.to_string(),
            };
        }
        error!(method = %method, url = %url, "transport failure: {error}");
        ApiError::Transport {
            message: error.to_string(),
        }
    }

    fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        }
    }
}

fn is_auth_endpoint(path: &str) -> bool {
    let path = path.split('?').next().unwrap_or(path);
    AUTH_ENDPOINTS.iter().any(|suffix| path.ends_with(suffix))
}

fn truncate(body: &str) -> String {
    if body.len() <= MAX_BODY_SNIPPET {
        return body.to_string();
    }
    let mut end = MAX_BODY_SNIPPET;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body[..end].to_string()
}
