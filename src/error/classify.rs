//! Error classification for retry decisions.
//!
//! Two tiers: the active provider adapter gets the first say, then a
//! provider-independent check looks for transient network failures anywhere
//! in the error's source chain. A transient match always wins.

use std::borrow::Cow;
use std::error::Error as StdError;
use std::io::ErrorKind;

use super::unified::{ClassifiedError, ErrorCategory};
use super::{TransportError, TurnwiseError};
use crate::provider::ProviderAdapter;

/// OS-style error codes treated as transient network failures.
pub const TRANSIENT_NETWORK_CODES: &[&str] = &[
    "ECONNRESET",
    "ECONNREFUSED",
    "ECONNABORTED",
    "ETIMEDOUT",
    "ESOCKETTIMEDOUT",
    "ENOTFOUND",
    "EAI_AGAIN",
    "EPIPE",
    "ENETRESET",
    "ENETUNREACH",
    "EHOSTUNREACH",
];

const TRANSIENT_MESSAGE_MARKERS: &[&str] = &["network", "socket hang up", "terminated"];

/// Classify a failed attempt.
pub fn classify_error<'a>(
    adapter: &dyn ProviderAdapter,
    error: &'a TurnwiseError,
) -> ClassifiedError<'a> {
    let transient = is_transient_network_error(error);
    match adapter.classify_error(error) {
        Some(_) if transient => retryable(error, None),
        Some(known) => ClassifiedError {
            error,
            category: known.category,
            should_retry: known.retryable,
            suggested_delay: known.suggested_delay,
        },
        None if transient => retryable(error, None),
        // Unknown errors get the benefit of the doubt; the policy ceiling
        // still bounds them.
        None => ClassifiedError {
            error,
            category: ErrorCategory::Unknown,
            should_retry: true,
            suggested_delay: None,
        },
    }
}

fn retryable(error: &TurnwiseError, suggested_delay: Option<std::time::Duration>) -> ClassifiedError<'_> {
    ClassifiedError {
        error,
        category: ErrorCategory::Retryable,
        should_retry: true,
        suggested_delay,
    }
}

/// Whether the error, or anything in its source chain, is a low-level
/// transient network failure.
pub fn is_transient_network_error(error: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(error);
    while let Some(err) = current {
        if matches_transient(err) {
            return true;
        }
        current = err.source();
    }
    false
}

fn matches_transient(err: &(dyn StdError + 'static)) -> bool {
    if let Some(transport) = err.downcast_ref::<TransportError>() {
        if transport
            .code
            .as_deref()
            .is_some_and(|code| TRANSIENT_NETWORK_CODES.contains(&code))
        {
            return true;
        }
    }
    if let Some(io) = err.downcast_ref::<std::io::Error>() {
        if matches!(
            io.kind(),
            ErrorKind::ConnectionReset
                | ErrorKind::ConnectionRefused
                | ErrorKind::ConnectionAborted
                | ErrorKind::TimedOut
                | ErrorKind::BrokenPipe
                | ErrorKind::NotConnected
        ) {
            return true;
        }
    }
    if let Some(http) = err.downcast_ref::<reqwest::Error>() {
        if http.is_connect() || http.is_timeout() {
            return true;
        }
    }
    marker_text(err).is_some_and(|text| {
        let text = text.to_lowercase();
        TRANSIENT_MESSAGE_MARKERS
            .iter()
            .any(|marker| text.contains(marker))
    })
}

/// Free-form text to scan for transient markers. Our own variants only offer
/// their inner message so a Display prefix like "Network error:" never
/// matches, and `reqwest` errors are judged by their flags alone.
fn marker_text<'a>(err: &'a (dyn StdError + 'static)) -> Option<Cow<'a, str>> {
    if let Some(own) = err.downcast_ref::<TurnwiseError>() {
        return match own {
            TurnwiseError::Stream(message)
            | TurnwiseError::Aborted(message)
            | TurnwiseError::Wrapped { message, .. }
            | TurnwiseError::Provider { message, .. } => Some(Cow::Borrowed(message.as_str())),
            _ => None,
        };
    }
    if err.is::<reqwest::Error>() {
        return None;
    }
    if let Some(transport) = err.downcast_ref::<TransportError>() {
        return Some(Cow::Borrowed(transport.message.as_str()));
    }
    Some(Cow::Owned(err.to_string()))
}
