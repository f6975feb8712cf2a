//! Error types for turnwise.

pub mod classify;
pub mod unified;

pub use classify::{classify_error, is_transient_network_error, TRANSIENT_NETWORK_CODES};
pub use unified::{
    ClassifiedError, ErrorCategory, ErrorCode, ErrorDetails, ProviderErrorClass,
    DEFAULT_RATE_LIMIT_DELAY,
};

use thiserror::Error;

/// Status used for gateway errors that did not come from a rate limit.
pub const GATEWAY_STATUS: u16 = 502;

/// Status used for rate-limit gateway errors and turn-limit exhaustion.
pub const TOO_MANY_REQUESTS_STATUS: u16 = 429;

/// Primary error type for all turnwise operations.
#[derive(Error, Debug)]
pub enum TurnwiseError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("API error (status {status}): {message}")]
    Api {
        status: u16,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        details: Option<ErrorDetails>,
    },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Rate limited: retry after {retry_after_ms:?}ms")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Provider error: {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("Aborted: {0}")]
    Aborted(String),

    /// Uniform error surfaced once retrying has given up. Displays exactly
    /// the message of the error it replaced.
    #[error("{message}")]
    Gateway {
        status: u16,
        message: String,
        #[source]
        source: Option<Box<TurnwiseError>>,
    },

    /// Generic wrapper that keeps the underlying error reachable through
    /// `source()`.
    #[error("{message}")]
    Wrapped {
        message: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl TurnwiseError {
    /// Create an API error.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
            source: None,
            details: None,
        }
    }

    /// Create an API error with full details.
    pub fn api_with_details(status: u16, message: impl Into<String>, details: ErrorDetails) -> Self {
        Self::Api {
            status,
            message: message.into(),
            source: None,
            details: Some(details),
        }
    }

    /// Wrap an arbitrary error under a new message.
    pub fn wrap(
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Wrapped {
            message: message.into(),
            source: source.into(),
        }
    }

    /// Convert a final attempt failure into a gateway error that keeps the
    /// original message text.
    pub fn gateway(status: u16, original: TurnwiseError) -> Self {
        if let Self::Gateway { .. } = original {
            return original;
        }
        Self::Gateway {
            status,
            message: original.to_string(),
            source: Some(Box::new(original)),
        }
    }

    /// Gateway error with no underlying cause.
    pub fn gateway_message(status: u16, message: impl Into<String>) -> Self {
        Self::Gateway {
            status,
            message: message.into(),
            source: None,
        }
    }

    /// HTTP-like status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } | Self::Gateway { status, .. } => Some(*status),
            Self::RateLimited { .. } => Some(TOO_MANY_REQUESTS_STATUS),
            Self::Authentication(_) => Some(401),
            Self::Network(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether this is a gateway error.
    pub fn is_gateway(&self) -> bool {
        matches!(self, Self::Gateway { .. })
    }

    /// Status-based classification shared by adapters that have no
    /// provider-specific error vocabulary. `None` means the error is not a
    /// known provider error.
    pub fn provider_class(&self) -> Option<ProviderErrorClass> {
        match self {
            Self::RateLimited { retry_after_ms } => Some(ProviderErrorClass::rate_limit(
                retry_after_ms.map(std::time::Duration::from_millis),
            )),
            Self::Authentication(_)
            | Self::InvalidArgument(_)
            | Self::Configuration(_)
            | Self::UnsupportedOperation(_) => Some(ProviderErrorClass::unrecoverable()),
            Self::Timeout(_) | Self::Stream(_) => Some(ProviderErrorClass::retryable()),
            Self::Api { status, .. } => match status {
                429 => Some(ProviderErrorClass::rate_limit(None)),
                408 | 500..=599 => Some(ProviderErrorClass::retryable()),
                400 | 401 | 403 | 404 | 409 | 413 | 422 => {
                    Some(ProviderErrorClass::unrecoverable())
                }
                _ => None,
            },
            Self::Network(err) => match err.status().map(|s| s.as_u16()) {
                Some(429) => Some(ProviderErrorClass::rate_limit(None)),
                Some(500..=599) => Some(ProviderErrorClass::retryable()),
                Some(400..=499) => Some(ProviderErrorClass::unrecoverable()),
                None if err.is_builder() => Some(ProviderErrorClass::unrecoverable()),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Low-level transport failure with an optional OS-style error code such as
/// `ECONNRESET`.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct TransportError {
    pub code: Option<String>,
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        mut self,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, TurnwiseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_preserves_original_message() {
        let original = TurnwiseError::api(400, "bad request body");
        let expected = original.to_string();
        let gateway = TurnwiseError::gateway(GATEWAY_STATUS, original);
        assert_eq!(gateway.to_string(), expected);
        assert_eq!(gateway.status(), Some(GATEWAY_STATUS));
    }

    #[test]
    fn gateway_is_not_double_wrapped() {
        let inner = TurnwiseError::gateway_message(429, "slow down");
        let outer = TurnwiseError::gateway(GATEWAY_STATUS, inner);
        assert_eq!(outer.status(), Some(429));
        assert_eq!(outer.to_string(), "slow down");
    }

    #[test]
    fn gateway_keeps_original_as_source() {
        let gateway = TurnwiseError::gateway(GATEWAY_STATUS, TurnwiseError::Timeout(30));
        let source = std::error::Error::source(&gateway).expect("source");
        assert_eq!(source.to_string(), "Timeout after 30ms");
    }

    #[test]
    fn server_errors_are_retryable_provider_errors() {
        let class = TurnwiseError::api(503, "overloaded")
            .provider_class()
            .expect("known");
        assert_eq!(class.category, ErrorCategory::Retryable);
        assert!(class.retryable);
    }

    #[test]
    fn client_errors_are_unrecoverable() {
        for status in [400, 401, 403, 404, 409, 422] {
            let class = TurnwiseError::api(status, "nope")
                .provider_class()
                .expect("known");
            assert_eq!(class.category, ErrorCategory::Unrecoverable, "status {status}");
            assert!(!class.retryable);
        }
    }

    #[test]
    fn rate_limit_uses_retry_after_or_default_delay() {
        let hinted = TurnwiseError::RateLimited {
            retry_after_ms: Some(1500),
        }
        .provider_class()
        .expect("known");
        assert_eq!(hinted.category, ErrorCategory::RateLimit);
        assert!(!hinted.retryable);
        assert_eq!(
            hinted.suggested_delay,
            Some(std::time::Duration::from_millis(1500))
        );

        let bare = TurnwiseError::api(429, "too many")
            .provider_class()
            .expect("known");
        assert_eq!(bare.suggested_delay, Some(DEFAULT_RATE_LIMIT_DELAY));
    }

    #[test]
    fn unknown_errors_have_no_provider_class() {
        assert!(TurnwiseError::Provider {
            provider: "x".into(),
            message: "weird".into(),
        }
        .provider_class()
        .is_none());
        assert!(TurnwiseError::api(418, "teapot").provider_class().is_none());
    }

    #[test]
    fn transport_error_display_is_message() {
        let err = TransportError::with_code("ECONNRESET", "read ECONNRESET");
        assert_eq!(err.to_string(), "read ECONNRESET");
        assert_eq!(err.code.as_deref(), Some("ECONNRESET"));
    }
}
