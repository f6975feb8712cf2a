//! Retry with exponential backoff, driven by error classification.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{
    classify_error, ErrorCategory, Result, TurnwiseError, GATEWAY_STATUS,
    TOO_MANY_REQUESTS_STATUS,
};
use crate::hooks::{run_hook, ModelErrorContext, OperateHooks};
use crate::provider::ProviderAdapter;

/// Hard upper bound on retries, whatever the configured value.
pub const MAX_RETRIES_CEILING: u32 = 10;

/// Backoff calculator. Immutable once built and safe to share.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Multiplier applied per attempt.
    pub backoff_factor: f64,
    /// Retries allowed after the first attempt. Clamped to
    /// [`MAX_RETRIES_CEILING`].
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(32_000),
            backoff_factor: 2.0,
            max_retries: 3,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// `min(initial_delay * backoff_factor^attempt, max_delay)`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let max_ms = self.max_delay.as_millis() as f64;
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let raw = self.initial_delay.as_millis() as f64 * self.backoff_factor.powi(exponent);
        let capped = if raw.is_finite() { raw.min(max_ms) } else { max_ms };
        Duration::from_millis(capped.max(0.0).round() as u64)
    }

    pub fn effective_max_retries(&self) -> u32 {
        self.max_retries.min(MAX_RETRIES_CEILING)
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.effective_max_retries()
    }
}

/// Identifies the operation being retried, for hooks and logs.
#[derive(Debug, Clone)]
pub struct RetryContext {
    pub operation: &'static str,
    pub turn: u32,
    pub provider: String,
    pub model: String,
}

/// Drives one operation through its attempts.
pub struct RetryExecutor<'a> {
    policy: &'a RetryPolicy,
    adapter: &'a dyn ProviderAdapter,
    hooks: &'a OperateHooks,
}

impl<'a> RetryExecutor<'a> {
    pub fn new(
        policy: &'a RetryPolicy,
        adapter: &'a dyn ProviderAdapter,
        hooks: &'a OperateHooks,
    ) -> Self {
        Self {
            policy,
            adapter,
            hooks,
        }
    }

    /// Run `operation` until it succeeds or retrying is no longer allowed.
    ///
    /// Each attempt gets a fresh token, cancelled as soon as the attempt fails.
    /// The final failure surfaces as [`TurnwiseError::Gateway`] carrying the
    /// original message.
    pub async fn execute<F, Fut, T>(&self, ctx: &RetryContext, mut operation: F) -> Result<T>
    where
        F: FnMut(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            let token = CancellationToken::new();
            tracing::debug!(
                operation = ctx.operation,
                turn = ctx.turn,
                attempt,
                "starting attempt"
            );
            match operation(token.clone()).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    token.cancel();
                    let delay = self.handle_failure(ctx, err, attempt).await?;
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Decide what to do about a failed attempt.
    ///
    /// Returns the backoff to sleep before the next attempt, or the gateway
    /// error to surface. Runs the matching model error hook either way.
    pub async fn handle_failure(
        &self,
        ctx: &RetryContext,
        error: TurnwiseError,
        attempt: u32,
    ) -> Result<Duration> {
        let classified = classify_error(self.adapter, &error);
        let category = classified.category;

        if classified.should_retry && self.policy.should_retry(attempt) {
            let delay = self.policy.delay(attempt);
            tracing::warn!(
                operation = ctx.operation,
                provider = %ctx.provider,
                model = %ctx.model,
                turn = ctx.turn,
                attempt = attempt + 1,
                max_retries = self.policy.effective_max_retries(),
                category = %category,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retrying after error"
            );
            run_hook(
                "on_retryable_model_error",
                self.hooks.on_retryable_model_error.as_ref(),
                self.error_context(ctx, &error, category, attempt, Some(delay)),
            )
            .await;
            return Ok(delay);
        }

        if classified.is_known() && !classified.should_retry {
            tracing::warn!(
                operation = ctx.operation,
                provider = %ctx.provider,
                category = %category,
                error = %error,
                "Unrecoverable model error"
            );
        } else {
            tracing::warn!(
                operation = ctx.operation,
                provider = %ctx.provider,
                attempts = attempt + 1,
                error = %error,
                "Retries exhausted"
            );
        }
        run_hook(
            "on_unrecoverable_model_error",
            self.hooks.on_unrecoverable_model_error.as_ref(),
            self.error_context(ctx, &error, category, attempt, None),
        )
        .await;

        let status = if category == ErrorCategory::RateLimit {
            TOO_MANY_REQUESTS_STATUS
        } else {
            GATEWAY_STATUS
        };
        Err(TurnwiseError::gateway(status, error))
    }

    fn error_context(
        &self,
        ctx: &RetryContext,
        error: &TurnwiseError,
        category: ErrorCategory,
        attempt: u32,
        delay: Option<Duration>,
    ) -> ModelErrorContext {
        ModelErrorContext {
            turn: ctx.turn,
            attempt,
            category,
            message: error.to_string(),
            delay,
        }
    }
}
