//! Error classification vocabulary.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::Display;

use super::TurnwiseError;

/// Suggested wait before calling a rate-limited provider again when it gave
/// no hint of its own.
pub const DEFAULT_RATE_LIMIT_DELAY: Duration = Duration::from_secs(60);

/// Machine-readable error code parsed from provider error bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidApiKey,
    InsufficientQuota,
    RateLimitExceeded,
    ModelNotFound,
    InvalidRequest,
    ContentFiltered,
    ContextLengthExceeded,
    ServerError,
    ServiceUnavailable,
    Timeout,
    NetworkError,
    Unknown,
}

impl ErrorCode {
    /// Map a provider's string code onto the shared vocabulary.
    pub fn from_provider_code(code: &str) -> Self {
        match code {
            "invalid_api_key" => Self::InvalidApiKey,
            "insufficient_quota" => Self::InsufficientQuota,
            "rate_limit_exceeded" => Self::RateLimitExceeded,
            "model_not_found" => Self::ModelNotFound,
            "invalid_request_error" | "invalid_request" => Self::InvalidRequest,
            "content_filter" | "content_filtered" => Self::ContentFiltered,
            "context_length_exceeded" => Self::ContextLengthExceeded,
            "server_error" => Self::ServerError,
            "service_unavailable" => Self::ServiceUnavailable,
            "timeout" => Self::Timeout,
            _ => Self::Unknown,
        }
    }
}

/// Structured details returned by a provider API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: Option<ErrorCode>,
    pub provider_code: Option<String>,
    pub param: Option<String>,
    pub request_id: Option<String>,
}

/// Broad category that drives retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCategory {
    /// Provider asked us to slow down. Never retried inline.
    RateLimit,
    /// Transient failure.
    Retryable,
    /// Provider said not to retry.
    Unrecoverable,
    /// Nothing recognized the error.
    Unknown,
}

/// A provider adapter's verdict on an error it recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderErrorClass {
    pub category: ErrorCategory,
    pub retryable: bool,
    pub suggested_delay: Option<Duration>,
}

impl ProviderErrorClass {
    pub fn rate_limit(retry_after: Option<Duration>) -> Self {
        Self {
            category: ErrorCategory::RateLimit,
            retryable: false,
            suggested_delay: Some(retry_after.unwrap_or(DEFAULT_RATE_LIMIT_DELAY)),
        }
    }

    pub fn retryable() -> Self {
        Self {
            category: ErrorCategory::Retryable,
            retryable: true,
            suggested_delay: None,
        }
    }

    pub fn unrecoverable() -> Self {
        Self {
            category: ErrorCategory::Unrecoverable,
            retryable: false,
            suggested_delay: None,
        }
    }
}

/// Outcome of classifying one failed attempt.
#[derive(Debug, Clone, Copy)]
pub struct ClassifiedError<'a> {
    pub error: &'a TurnwiseError,
    pub category: ErrorCategory,
    pub should_retry: bool,
    pub suggested_delay: Option<Duration>,
}

impl ClassifiedError<'_> {
    /// Whether a classifier recognized the error.
    pub fn is_known(&self) -> bool {
        self.category != ErrorCategory::Unknown
    }
}
