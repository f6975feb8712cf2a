//! HTTP client construction, SSE parsing, and status mapping.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};

use crate::error::{ErrorCode, ErrorDetails, Result, TurnwiseError};

/// Request timeout applied to adapter-owned clients.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Build a reqwest client for an adapter.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .pool_max_idle_per_host(10)
        .build()
        .map_err(|e| TurnwiseError::Configuration(format!("failed to build HTTP client: {e}")))
}

/// Build default headers for a Bearer-token API.
pub fn bearer_headers(api_key: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Ok(val) = HeaderValue::from_str(&format!("Bearer {api_key}")) {
        headers.insert(AUTHORIZATION, val);
    }
    headers
}

/// Payload of an SSE `data:` line. Other fields and comments yield `None`.
pub fn sse_data(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("data:")?;
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}

/// Splits a byte stream into SSE lines. Bytes are held until a full line
/// arrives, so multi-byte characters cut by chunk boundaries decode intact.
#[derive(Debug, Default)]
pub struct SseLines {
    buf: Vec<u8>,
}

impl SseLines {
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Next complete line without its terminator.
    pub fn next_line(&mut self) -> Option<String> {
        let end = self.buf.iter().position(|b| *b == b'\n')?;
        let line: Vec<u8> = self.buf.drain(..=end).collect();
        let line = &line[..end];
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        Some(String::from_utf8_lossy(line).into_owned())
    }
}

/// Map a non-success HTTP status and body to an error.
pub fn status_to_error(status: u16, body: &str) -> TurnwiseError {
    match status {
        401 | 403 => TurnwiseError::Authentication(error_message(body)),
        429 => TurnwiseError::RateLimited {
            retry_after_ms: extract_retry_after(body),
        },
        _ => match extract_error_details(body) {
            Some(details) => TurnwiseError::api_with_details(status, error_message(body), details),
            None => TurnwiseError::api(status, error_message(body)),
        },
    }
}

fn error_object(body: &str) -> Option<serde_json::Value> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").cloned())
}

fn error_message(body: &str) -> String {
    error_object(body)
        .and_then(|e| e.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

fn extract_error_details(body: &str) -> Option<ErrorDetails> {
    let error = error_object(body)?;
    let provider_code = error
        .get("code")
        .and_then(|c| c.as_str())
        .or_else(|| error.get("type").and_then(|t| t.as_str()))
        .map(str::to_string);
    Some(ErrorDetails {
        code: provider_code.as_deref().map(ErrorCode::from_provider_code),
        provider_code,
        param: error.get("param").and_then(|p| p.as_str()).map(str::to_string),
        request_id: None,
    })
}

fn extract_retry_after(body: &str) -> Option<u64> {
    error_object(body)
        .and_then(|e| e.get("retry_after").and_then(|r| r.as_f64()))
        .map(|s| (s * 1000.0) as u64)
}
