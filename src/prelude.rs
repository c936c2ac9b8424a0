//! Convenient re-exports for common trialgate types.
pub use crate::{
    assemble::{AggregatedResult, Payload, SimilarStudies},
    backoff::{Backoff, BackoffError, MAX_BACKOFF},
    config::{ConfigError, GatewayConfig, PagingConfig, RetryConfig, WindowConfig},
    error::{ErrorKind, ErrorReport, GatewayError},
    gateway::{Gateway, GatewayBuilder},
    jitter::Jitter,
    operation::Operation,
    query::{QuerySpec, ToolArgs},
    rate_limit::{Decision, RateLimiter, WindowSnapshot, WindowTracker},
    service::{GatewayService, ToolCall},
    transport::{RawResponse, Transport, TransportError},
};
