//! Sends built queries upstream.
//!
//! Every attempt, retries included, is admitted by the rate limiter immediately before the
//! request goes out, so the sliding window counts exactly the requests upstream sees.
//!
//! Response classification:
//! - 2xx: decoded by target (page, single study, raw document); undecodable bodies are
//!   `MalformedResponse`.
//! - 429: throttled; one delayed retry, then `RateLimitExceeded`.
//! - other 4xx: `UpstreamRejected` with upstream's message, never retried.
//! - 5xx, transport failures, per-request timeouts: retried with backoff, then
//!   `UpstreamUnavailable`.

use crate::error::clip_message;
use crate::query::{QuerySpec, Target};
use crate::rate_limit::RateLimiter;
use crate::retry::{AttemptError, RetryPolicy};
use crate::study::{Study, Upstream, UpstreamPage};
use crate::transport::{RawResponse, Transport};
use crate::GatewayError;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct HttpDispatcher {
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
    request_timeout: Duration,
}

impl HttpDispatcher {
    pub fn new(transport: Arc<dyn Transport>, retry: RetryPolicy, request_timeout: Duration) -> Self {
        Self { transport, retry, request_timeout }
    }

    /// Issue `spec`, admitting each attempt through `limiter`.
    pub async fn send(&self, spec: &QuerySpec, limiter: &dyn RateLimiter) -> Result<Upstream, GatewayError> {
        let operation = spec.operation;
        let path = spec.target.path();
        let params = spec.to_params();
        let (path, params) = (path.as_str(), params.as_slice());

        self.retry
            .execute(operation, |attempt| async move {
                let waited = limiter.admit().await;
                debug!(
                    %operation,
                    attempt,
                    path,
                    waited_ms = waited.as_millis() as u64,
                    "dispatching upstream request"
                );
                let response =
                    match tokio::time::timeout(self.request_timeout, self.transport.get(path, params)).await {
                        Err(_) => {
                            return Err(AttemptError::Transient(format!(
                                "no response within {:?}",
                                self.request_timeout
                            )))
                        }
                        Ok(Err(err)) => return Err(AttemptError::Transient(err.to_string())),
                        Ok(Ok(response)) => response,
                    };
                debug!(%operation, attempt, status = response.status, bytes = response.body.len(), "upstream responded");
                classify(spec, response)
            })
            .await
    }
}

/// Map one raw response onto success or an attempt failure.
pub(crate) fn classify(spec: &QuerySpec, response: RawResponse) -> Result<Upstream, AttemptError> {
    let operation = spec.operation;
    match response.status {
        200..=299 => decode(&spec.target, &response.body)
            .map_err(|reason| AttemptError::Fatal(GatewayError::malformed(operation, reason))),
        429 => Err(AttemptError::Throttled { retry_after: response.retry_after }),
        500..=599 => Err(AttemptError::Transient(format!(
            "HTTP {}: {}",
            response.status,
            clip_message(&response.body)
        ))),
        status => Err(AttemptError::Fatal(GatewayError::UpstreamRejected {
            operation,
            status,
            message: upstream_message(&response.body),
        })),
    }
}

fn decode(target: &Target, body: &str) -> Result<Upstream, String> {
    let decoded = match target {
        Target::Studies => serde_json::from_str::<UpstreamPage>(body).map(Upstream::Page),
        Target::Study(_) => serde_json::from_str::<Study>(body).map(|s| Upstream::Study(Box::new(s))),
        _ => serde_json::from_str::<Value>(body).map(Upstream::Document),
    };
    decoded.map_err(|e| format!("{} (body: {})", e, clip_message(body)))
}

/// Upstream error bodies are usually `{"message": ...}`; fall back to the clipped body.
fn upstream_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(clip_message))
        .unwrap_or_else(|| clip_message(body))
}
