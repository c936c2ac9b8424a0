//! Retry policy for upstream attempts.
//!
//! Semantics:
//! - Each attempt reports an [`AttemptError`] classification instead of a raw error.
//! - `Transient` failures (5xx, transport errors, per-request timeouts) are retried up to
//!   `max_retries` times with backoff and jitter, then surface as `UpstreamUnavailable`.
//! - `Throttled` (429) gets exactly one retry after `Retry-After` (clamped to
//!   `max_throttle_wait`) or `throttle_backoff`; a second 429 surfaces as `RateLimitExceeded`.
//! - `Fatal` errors return immediately.
//! - The sleeper controls how delays are applied; tests inject `InstantSleeper` or
//!   `TrackingSleeper`.
//!
//! Invariants:
//! - Total attempts never exceed `max_retries + 2`.
//! - Backoff is consulted once per transient retry, with retry index starting at 1.
//!
//! ```rust
//! use std::time::Duration;
//! use trialgate::retry::{AttemptError, RetryPolicy};
//! use trialgate::{InstantSleeper, Jitter, Operation};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let policy = RetryPolicy::builder()
//!     .max_retries(2)
//!     .with_jitter(Jitter::None)
//!     .with_sleeper(InstantSleeper)
//!     .build();
//! let result = policy
//!     .execute(Operation::SearchStudies, |attempt| async move {
//!         if attempt < 3 { Err(AttemptError::Transient("HTTP 503".into())) } else { Ok(attempt) }
//!     })
//!     .await;
//! assert_eq!(result.unwrap(), 3);
//! # });
//! ```

use crate::config::RetryConfig;
use crate::{Backoff, GatewayError, Jitter, Operation, Sleeper, TokioSleeper};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Outcome classification of a single failed attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptError {
    /// Worth retrying with backoff; carries a description of the failure.
    Transient(String),
    /// Upstream answered 429.
    Throttled { retry_after: Option<Duration> },
    /// Not retryable.
    Fatal(GatewayError),
}

/// Retry policy combining backoff, jitter, the throttle budget and a sleeper.
#[derive(Clone)]
pub struct RetryPolicy {
    max_retries: usize,
    backoff: Backoff,
    jitter: Jitter,
    throttle_backoff: Duration,
    max_throttle_wait: Duration,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("backoff", &self.backoff)
            .field("jitter", &self.jitter)
            .field("throttle_backoff", &self.throttle_backoff)
            .field("max_throttle_wait", &self.max_throttle_wait)
            .field("sleeper", &"<sleeper>")
            .finish()
    }
}

impl RetryPolicy {
    /// Construct a new builder with defaults.
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::new()
    }

    /// Policy described by `config`, sleeping through `sleeper`.
    pub fn from_config(
        config: &RetryConfig,
        sleeper: Arc<dyn Sleeper>,
    ) -> Result<Self, crate::ConfigError> {
        Ok(Self {
            max_retries: config.max_retries,
            backoff: config.backoff()?,
            jitter: config.jitter,
            throttle_backoff: config.throttle_backoff,
            max_throttle_wait: config.max_throttle_wait,
            sleeper,
        })
    }

    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    /// Run `attempt_fn` until it succeeds or the budget is spent. The closure receives the
    /// 1-based attempt number.
    pub async fn execute<T, Fut, Op>(
        &self,
        operation: Operation,
        mut attempt_fn: Op,
    ) -> Result<T, GatewayError>
    where
        Fut: Future<Output = Result<T, AttemptError>> + Send,
        Op: FnMut(usize) -> Fut + Send,
    {
        let mut attempts = 0usize;
        let mut retries = 0usize;
        let mut throttled = false;

        loop {
            attempts += 1;
            let delay = match attempt_fn(attempts).await {
                Ok(value) => return Ok(value),
                Err(AttemptError::Fatal(err)) => return Err(err),
                Err(AttemptError::Transient(reason)) => {
                    if retries >= self.max_retries {
                        return Err(GatewayError::UpstreamUnavailable {
                            operation,
                            attempts,
                            last_failure: reason,
                        });
                    }
                    retries += 1;
                    let delay = self.jitter.apply(self.backoff.delay(retries));
                    warn!(
                        %operation,
                        attempt = attempts,
                        retry = retries,
                        delay_ms = delay.as_millis() as u64,
                        failure = %reason,
                        "upstream attempt failed; retrying"
                    );
                    delay
                }
                Err(AttemptError::Throttled { retry_after }) => {
                    if throttled {
                        return Err(GatewayError::RateLimitExceeded {
                            operation,
                            attempts,
                            retry_after,
                        });
                    }
                    throttled = true;
                    let delay = retry_after
                        .map(|after| after.min(self.max_throttle_wait))
                        .unwrap_or(self.throttle_backoff);
                    warn!(
                        %operation,
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        retry_after_given = retry_after.is_some(),
                        "upstream throttled the request"
                    );
                    delay
                }
            };
            self.sleeper.sleep(delay).await;
        }
    }
}

/// Builder for [`RetryPolicy`]; defaults match [`RetryConfig::default`].
pub struct RetryPolicyBuilder {
    max_retries: usize,
    backoff: Backoff,
    jitter: Jitter,
    throttle_backoff: Duration,
    max_throttle_wait: Duration,
    sleeper: Arc<dyn Sleeper>,
}

impl RetryPolicyBuilder {
    pub fn new() -> Self {
        let defaults = RetryConfig::default();
        Self {
            max_retries: defaults.max_retries,
            backoff: Backoff::exponential(defaults.base_delay),
            jitter: defaults.jitter,
            throttle_backoff: defaults.throttle_backoff,
            max_throttle_wait: defaults.max_throttle_wait,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Retries after the initial attempt for transient failures.
    pub fn max_retries(mut self, retries: usize) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before the single 429 retry when upstream sends no `Retry-After`.
    pub fn throttle_backoff(mut self, delay: Duration) -> Self {
        self.throttle_backoff = delay;
        self
    }

    pub fn max_throttle_wait(mut self, limit: Duration) -> Self {
        self.max_throttle_wait = limit;
        self
    }

    pub fn with_sleeper<S>(mut self, sleeper: S) -> Self
    where
        S: Sleeper + 'static,
    {
        self.sleeper = Arc::new(sleeper);
        self
    }

    pub fn build(self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff: self.backoff,
            jitter: self.jitter,
            throttle_backoff: self.throttle_backoff,
            max_throttle_wait: self.max_throttle_wait,
            sleeper: self.sleeper,
        }
    }
}

impl Default for RetryPolicyBuilder {
    fn default() -> Self {
        Self::new()
    }
}
