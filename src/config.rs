//! Gateway configuration.
//!
//! Defaults match the public registry: 100 requests per rolling 60 seconds, page size 100
//! (upstream maximum 1000), three retries for server errors and a 5 second fallback delay when a
//! 429 arrives without `Retry-After`.
//!
//! Configuration can be built in code, deserialized from JSON (durations in milliseconds), or read
//! from `TRIALGATE_*` environment variables via [`GatewayConfig::from_env`].

use crate::backoff::{Backoff, BackoffError};
use crate::jitter::Jitter;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Upstream refuses page sizes above this.
pub const UPSTREAM_MAX_PAGE_SIZE: u32 = 1000;
pub const DEFAULT_BASE_URL: &str = "https://clinicaltrials.gov/api/v2";

/// Configuration problems detected while building a gateway.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
    #[error("default page size {default} exceeds max page size {max}")]
    PageSizeOrder { default: u32, max: u32 },
    #[error("max page size {0} exceeds the upstream limit of 1000")]
    PageSizeLimit(u32),
    #[error("invalid base url `{url}`: {reason}")]
    BaseUrl { url: String, reason: String },
    #[error("environment variable {var}={value:?} is invalid: {reason}")]
    Env { var: String, value: String, reason: String },
    #[error("invalid retry backoff: {0}")]
    Backoff(#[from] BackoffError),
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to build http client: {0}")]
    HttpClient(String),
}

/// Sliding-window limits.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub max_requests: usize,
    #[serde(deserialize_with = "duration_ms::deserialize")]
    pub span: Duration,
    /// Floor on each admission sleep so waiters never spin.
    #[serde(deserialize_with = "duration_ms::deserialize")]
    pub min_wait: Duration,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            span: Duration::from_secs(60),
            min_wait: Duration::from_millis(100),
        }
    }
}

/// Upstream retry budget.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt for 5xx and transport failures.
    pub max_retries: usize,
    #[serde(deserialize_with = "duration_ms::deserialize")]
    pub base_delay: Duration,
    #[serde(deserialize_with = "duration_ms::deserialize")]
    pub max_delay: Duration,
    pub jitter: Jitter,
    /// Wait before the single 429 retry when upstream sends no `Retry-After`.
    #[serde(deserialize_with = "duration_ms::deserialize")]
    pub throttle_backoff: Duration,
    /// Ceiling on an upstream-provided `Retry-After`.
    #[serde(deserialize_with = "duration_ms::deserialize")]
    pub max_throttle_wait: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            jitter: Jitter::Equal,
            throttle_backoff: Duration::from_secs(5),
            max_throttle_wait: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    pub fn backoff(&self) -> Result<Backoff, BackoffError> {
        Backoff::exponential(self.base_delay).with_max(self.max_delay)
    }
}

/// Page sizes and the aggregation cap.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PagingConfig {
    pub default_page_size: u32,
    pub max_page_size: u32,
    /// Page size used while walking pages for aggregation operations.
    pub aggregate_page_size: u32,
    /// Hard cap on records fetched by one aggregation.
    pub max_aggregate_records: usize,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            default_page_size: 100,
            max_page_size: UPSTREAM_MAX_PAGE_SIZE,
            aggregate_page_size: UPSTREAM_MAX_PAGE_SIZE,
            max_aggregate_records: 1000,
        }
    }
}

/// Everything a [`Gateway`](crate::Gateway) needs.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub base_url: String,
    pub user_agent: String,
    /// Per-request network timeout; exceeding it counts as a transport failure.
    #[serde(deserialize_with = "duration_ms::deserialize")]
    pub request_timeout: Duration,
    /// Deadline applied to every `execute` call when set.
    #[serde(deserialize_with = "opt_duration_ms::deserialize")]
    pub call_timeout: Option<Duration>,
    pub window: WindowConfig,
    pub retry: RetryConfig,
    pub paging: PagingConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: format!("trialgate/{}", env!("CARGO_PKG_VERSION")),
            request_timeout: Duration::from_secs(30),
            call_timeout: None,
            window: WindowConfig::default(),
            retry: RetryConfig::default(),
            paging: PagingConfig::default(),
        }
    }
}

impl GatewayConfig {
    pub fn builder() -> GatewayConfigBuilder {
        GatewayConfigBuilder { config: GatewayConfig::default() }
    }

    /// Parse a JSON document; missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: GatewayConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `TRIALGATE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Like [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = GatewayConfig::default();
        if let Some(url) = lookup("TRIALGATE_BASE_URL") {
            config.base_url = url;
        }
        if let Some(agent) = lookup("TRIALGATE_USER_AGENT") {
            config.user_agent = agent;
        }
        if let Some(ms) = parse_env::<u64, _>(&lookup, "TRIALGATE_REQUEST_TIMEOUT_MS")? {
            config.request_timeout = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_env::<u64, _>(&lookup, "TRIALGATE_CALL_TIMEOUT_SECS")? {
            config.call_timeout = Some(Duration::from_secs(secs));
        }
        if let Some(max) = parse_env(&lookup, "TRIALGATE_MAX_REQUESTS")? {
            config.window.max_requests = max;
        }
        if let Some(secs) = parse_env::<u64, _>(&lookup, "TRIALGATE_WINDOW_SECS")? {
            config.window.span = Duration::from_secs(secs);
        }
        if let Some(retries) = parse_env(&lookup, "TRIALGATE_MAX_RETRIES")? {
            config.retry.max_retries = retries;
        }
        if let Some(size) = parse_env(&lookup, "TRIALGATE_PAGE_SIZE")? {
            config.paging.default_page_size = size;
        }
        if let Some(cap) = parse_env(&lookup, "TRIALGATE_MAX_AGGREGATE_RECORDS")? {
            config.paging.max_aggregate_records = cap;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        reqwest::Url::parse(&self.base_url).map_err(|e| ConfigError::BaseUrl {
            url: self.base_url.clone(),
            reason: e.to_string(),
        })?;
        if self.request_timeout.is_zero() {
            return Err(ConfigError::Zero { field: "request_timeout" });
        }
        if self.call_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::Zero { field: "call_timeout" });
        }
        if self.window.max_requests == 0 {
            return Err(ConfigError::Zero { field: "window.max_requests" });
        }
        if self.window.span.is_zero() {
            return Err(ConfigError::Zero { field: "window.span" });
        }
        if self.window.min_wait.is_zero() {
            return Err(ConfigError::Zero { field: "window.min_wait" });
        }
        let paging = &self.paging;
        if paging.default_page_size == 0 {
            return Err(ConfigError::Zero { field: "paging.default_page_size" });
        }
        if paging.aggregate_page_size == 0 {
            return Err(ConfigError::Zero { field: "paging.aggregate_page_size" });
        }
        if paging.max_aggregate_records == 0 {
            return Err(ConfigError::Zero { field: "paging.max_aggregate_records" });
        }
        if paging.max_page_size > UPSTREAM_MAX_PAGE_SIZE {
            return Err(ConfigError::PageSizeLimit(paging.max_page_size));
        }
        if paging.aggregate_page_size > paging.max_page_size {
            return Err(ConfigError::PageSizeLimit(paging.aggregate_page_size));
        }
        if paging.default_page_size > paging.max_page_size {
            return Err(ConfigError::PageSizeOrder {
                default: paging.default_page_size,
                max: paging.max_page_size,
            });
        }
        self.retry.backoff()?;
        Ok(())
    }
}

fn parse_env<T, F>(lookup: &F, var: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => value.trim().parse::<T>().map(Some).map_err(|e| ConfigError::Env {
            var: var.to_string(),
            value,
            reason: e.to_string(),
        }),
    }
}

/// Builder for [`GatewayConfig`]; `build` validates.
#[derive(Debug, Clone)]
pub struct GatewayConfigBuilder {
    config: GatewayConfig,
}

impl GatewayConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agent = agent.into();
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.config.call_timeout = Some(timeout);
        self
    }

    /// At most `max_requests` admissions within any trailing `span`.
    pub fn window(mut self, max_requests: usize, span: Duration) -> Self {
        self.config.window.max_requests = max_requests;
        self.config.window.span = span;
        self
    }

    pub fn max_retries(mut self, retries: usize) -> Self {
        self.config.retry.max_retries = retries;
        self
    }

    pub fn retry_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.config.retry.base_delay = base;
        self.config.retry.max_delay = max;
        self
    }

    pub fn jitter(mut self, jitter: Jitter) -> Self {
        self.config.retry.jitter = jitter;
        self
    }

    pub fn throttle_backoff(mut self, delay: Duration) -> Self {
        self.config.retry.throttle_backoff = delay;
        self
    }

    pub fn page_sizes(mut self, default: u32, aggregate: u32) -> Self {
        self.config.paging.default_page_size = default;
        self.config.paging.aggregate_page_size = aggregate;
        self
    }

    pub fn max_aggregate_records(mut self, cap: usize) -> Self {
        self.config.paging.max_aggregate_records = cap;
        self
    }

    pub fn build(self) -> Result<GatewayConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

mod opt_duration_ms {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(d).map(|ms| ms.map(Duration::from_millis))
    }
}
