use thiserror::Error;

/// Errors produced by the authenticated request client and the refresh
/// coordinator.
///
/// All variants are `Clone` so a single refresh outcome can be shared by
/// every caller waiting on the same in-flight refresh.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The connectivity probe reported no usable network. The request never
    /// reached the transport layer.
    #[error("offline: {method} {url}")]
    Offline { method: String, url: String },

    /// The request was aborted because the configured deadline elapsed.
    #[error("timeout: {method} {url}")]
    Timeout { method: String, url: String },

    /// 401/403 that cannot be recovered by refreshing the session.
    #[error("authentication failed with status {status}")]
    Auth { status: u16 },

    /// Any other non-2xx response. `body` is never captured for
    /// authentication endpoints.
    #[error("http {status}: {method} {url}")]
    Status {
        status: u16,
        method: String,
        url: String,
        body: Option<String>,
    },

    /// Transport-level failure with no HTTP response.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// The response arrived but its body could not be decoded.
    #[error("failed to decode response body: {message}")]
    Decode { message: String },
}

impl ApiError {
    pub fn is_offline(&self) -> bool {
        matches!(self, Self::Offline { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// 401/403 outcomes that retrying cannot help.
    pub fn is_terminal_auth(&self) -> bool {
        match self {
            Self::Auth { .. } => true,
            Self::Status { status, .. } => *status == 401 || *status == 403,
            _ => false,
        }
    }

    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Auth { status } | Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Transient failures worth another attempt: transport errors, timeouts,
    /// 429 and 5xx. Offline, terminal auth and other 4xx are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Transport { .. } | Self::Decode { .. } => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Offline { .. } | Self::Auth { .. } => false,
        }
    }
}

/// Errors produced by the translation subsystem.
#[derive(Debug, Error)]
pub enum I18nError {
    /// Conditional fetch confirmed the cached copy is current. A sentinel,
    /// not a user-facing failure.
    #[error("remote content not modified")]
    NotModified,

    /// The payload failed structural validation. Permanent by definition and
    /// never retried.
    #[error("invalid translation payload: {0}")]
    Validation(String),

    /// Durable cache failure. Callers treat this as a miss.
    #[error("cache failure: {0}")]
    Cache(String),

    #[error(transparent)]
    Network(#[from] ApiError),

    /// No compiled-in data exists for the requested pair.
    #[error("no bundled translations for {language}/{namespace}")]
    MissingBundle { language: String, namespace: String },
}

impl I18nError {
    /// Whether a remote fetch that produced this error should be retried.
    /// Validation failures and not-modified outcomes are final; network
    /// failures defer to [`ApiError::is_retryable`].
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(e) => e.is_retryable(),
            Self::NotModified | Self::Validation(_) | Self::Cache(_) | Self::MissingBundle { .. } => {
                false
            }
        }
    }
}

/// Errors from the durable key-value storage provider.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage value is not valid: {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_error(status: u16) -> ApiError {
        ApiError::Status {
            status,
            method: "GET".to_string(),
            url: "https://api.test/x".to_string(),
            body: None,
        }
    }

    #[test]
    fn test_offline_is_not_retryable() {
        let err = ApiError::Offline {
            method: "GET".to_string(),
            url: "https://api.test/x".to_string(),
        };
        assert!(err.is_offline());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_timeout_is_retryable() {
        let err = ApiError::Timeout {
            method: "GET".to_string(),
            url: "https://api.test/x".to_string(),
        };
        assert!(err.is_timeout());
        assert!(err.is_retryable());
    }

    #[test]
    fn test_terminal_auth_detection() {
        assert!(status_error(401).is_terminal_auth());
        assert!(status_error(403).is_terminal_auth());
        assert!(!status_error(404).is_terminal_auth());
        assert!(ApiError::Auth { status: 401 }.is_terminal_auth());
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(status_error(500).is_retryable());
        assert!(status_error(503).is_retryable());
        assert!(status_error(429).is_retryable());
        assert!(!status_error(400).is_retryable());
        assert!(!status_error(401).is_retryable());
        assert!(!status_error(404).is_retryable());
    }

    #[test]
    fn test_validation_never_retryable() {
        let err = I18nError::Validation("arrays are not allowed".to_string());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_not_modified_never_retryable() {
        assert!(!I18nError::NotModified.is_retryable());
    }

    #[test]
    fn test_network_error_defers_to_api_classification() {
        assert!(I18nError::Network(status_error(500)).is_retryable());
        assert!(!I18nError::Network(status_error(400)).is_retryable());
    }

    #[test]
    fn test_status_carried() {
        assert_eq!(status_error(502).status(), Some(502));
        assert_eq!(ApiError::Auth { status: 403 }.status(), Some(403));
        assert_eq!(
            ApiError::Transport {
                message: "boom".to_string()
            }
            .status(),
            None
        );
    }
}
