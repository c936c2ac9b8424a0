//! The gateway facade: one entry point per tool call.
//!
//! A call goes through validation and query building, then one of three execution paths:
//! - single request: listings, lookups, catalog and field statistics documents;
//! - two-stage: `get_similar_studies` fetches the reference record, then lists matches;
//! - page walk: aggregations follow continuation tokens up to their record cap.
//!
//! Every upstream request, whichever path issued it, is admitted by the same shared
//! [`WindowTracker`]. Clones of a [`Gateway`] share that tracker.

use crate::assemble::{assemble_similar, assemble_single, walk_pages, AggregatedResult, Aggregation, PageSource};
use crate::clock::{Clock, TokioClock};
use crate::config::{ConfigError, GatewayConfig};
use crate::dispatcher::HttpDispatcher;
use crate::query::{similar_search, QueryBuilder, QuerySpec, ToolArgs};
use crate::rate_limit::{WindowSnapshot, WindowTracker};
use crate::retry::RetryPolicy;
use crate::sleeper::{Sleeper, TokioSleeper};
use crate::study::{Upstream, UpstreamPage};
use crate::timeout::TimeoutPolicy;
use crate::transport::{ReqwestTransport, Transport};
use crate::{GatewayError, Operation};
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// Rate-limited, validated access to the registry.
#[derive(Debug, Clone)]
pub struct Gateway {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    config: GatewayConfig,
    queries: QueryBuilder,
    limiter: Arc<WindowTracker>,
    dispatcher: HttpDispatcher,
    call_timeout: Option<TimeoutPolicy>,
}

impl Gateway {
    pub fn builder(config: GatewayConfig) -> GatewayBuilder {
        GatewayBuilder::new(config)
    }

    /// Gateway over the real registry with tokio time.
    pub fn from_config(config: GatewayConfig) -> Result<Self, ConfigError> {
        Self::builder(config).build()
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.inner.config
    }

    /// Current fill of the shared request window.
    pub fn window(&self) -> WindowSnapshot {
        self.inner.limiter.snapshot()
    }

    /// Run `operation` with `arguments` (a JSON object, or null for none).
    ///
    /// The configured call timeout, if any, applies.
    pub async fn execute(&self, operation: &str, arguments: Value) -> Result<AggregatedResult, GatewayError> {
        let operation: Operation = operation.parse()?;
        self.call(operation, arguments).await
    }

    /// Run with an explicit deadline covering admission waits, retries and every page.
    ///
    /// On expiry nothing further is sent; requests already admitted stay counted.
    pub async fn execute_with_timeout(
        &self,
        operation: &str,
        arguments: Value,
        limit: Duration,
    ) -> Result<AggregatedResult, GatewayError> {
        let operation: Operation = operation.parse()?;
        let policy = TimeoutPolicy::new(limit)
            .map_err(|e| GatewayError::invalid(operation, "timeout", e.to_string()))?;
        policy.execute(operation, self.run(operation, arguments)).await
    }

    /// Run until `cancel` resolves, whichever comes first.
    pub async fn execute_until<C>(
        &self,
        operation: &str,
        arguments: Value,
        cancel: C,
    ) -> Result<AggregatedResult, GatewayError>
    where
        C: Future<Output = ()>,
    {
        let operation: Operation = operation.parse()?;
        let started = Instant::now();
        tokio::select! {
            result = self.call(operation, arguments) => result,
            _ = cancel => {
                let elapsed = started.elapsed();
                warn!(%operation, elapsed_ms = elapsed.as_millis() as u64, "call cancelled");
                Err(GatewayError::Cancelled { operation, elapsed })
            }
        }
    }

    async fn call(&self, operation: Operation, arguments: Value) -> Result<AggregatedResult, GatewayError> {
        match self.inner.call_timeout {
            Some(policy) => policy.execute(operation, self.run(operation, arguments)).await,
            None => self.run(operation, arguments).await,
        }
    }

    async fn run(&self, operation: Operation, arguments: Value) -> Result<AggregatedResult, GatewayError> {
        let started = Instant::now();
        let outcome = self.inner.run(operation, arguments).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &outcome {
            Ok(result) => info!(
                %operation,
                elapsed_ms,
                results = result.results_shown,
                pages = result.pages_fetched,
                truncated = result.truncated,
                "operation completed"
            ),
            Err(err) => warn!(%operation, elapsed_ms, kind = ?err.kind(), error = %err, "operation failed"),
        }
        outcome
    }
}

impl Inner {
    async fn run(&self, operation: Operation, arguments: Value) -> Result<AggregatedResult, GatewayError> {
        let args = ToolArgs::from_value(operation, arguments)?;
        let spec = self.queries.build(operation, &args)?;
        let today = chrono::Utc::now().date_naive();

        if operation == Operation::GetSimilarStudies {
            return self.similar(&spec).await;
        }
        if operation.is_aggregation() {
            let cap = spec.record_limit.unwrap_or(self.config.paging.max_aggregate_records);
            let mut aggregation = Aggregation::for_spec(&spec, today);
            let walk = walk_pages(self, &spec, cap, |studies| aggregation.add_page(studies)).await?;
            return Ok(aggregation.finish(&spec, walk));
        }
        let upstream = self.send(&spec).await?;
        assemble_single(&spec, upstream, today)
    }

    async fn similar(&self, spec: &QuerySpec) -> Result<AggregatedResult, GatewayError> {
        let reference = match self.send(spec).await? {
            Upstream::Study(study) => study,
            other => return Err(unexpected(spec, &other)),
        };
        let Some(follow_up) = similar_search(spec, &reference) else {
            info!(operation = %spec.operation, "reference study has nothing to match on");
            return Ok(assemble_similar(spec, &reference, None));
        };
        let page = self.fetch_page(&follow_up).await?;
        Ok(assemble_similar(spec, &reference, Some((&follow_up, page))))
    }

    async fn send(&self, spec: &QuerySpec) -> Result<Upstream, GatewayError> {
        self.dispatcher.send(spec, self.limiter.as_ref()).await
    }
}

#[async_trait]
impl PageSource for Inner {
    async fn fetch_page(&self, spec: &QuerySpec) -> Result<UpstreamPage, GatewayError> {
        match self.send(spec).await? {
            Upstream::Page(page) => Ok(page),
            other => Err(unexpected(spec, &other)),
        }
    }
}

fn unexpected(spec: &QuerySpec, got: &Upstream) -> GatewayError {
    let shape = match got {
        Upstream::Page(_) => "a study listing",
        Upstream::Study(_) => "a single study",
        Upstream::Document(_) => "a raw document",
    };
    GatewayError::malformed(spec.operation, format!("expected a response for {}, got {}", spec.target.path(), shape))
}

/// Assembles a [`Gateway`]; the transport, clock and sleeper can be swapped for tests.
#[derive(Debug)]
pub struct GatewayBuilder {
    config: GatewayConfig,
    transport: Option<Arc<dyn Transport>>,
    clock: Option<Arc<dyn Clock>>,
    sleeper: Option<Arc<dyn Sleeper>>,
}

impl GatewayBuilder {
    pub fn new(config: GatewayConfig) -> Self {
        Self { config, transport: None, clock: None, sleeper: None }
    }

    pub fn transport<T>(mut self, transport: T) -> Self
    where
        T: Transport + 'static,
    {
        self.transport = Some(Arc::new(transport));
        self
    }

    pub fn shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn clock<C>(mut self, clock: C) -> Self
    where
        C: Clock + 'static,
    {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Used for window waits and retry delays alike.
    pub fn sleeper<S>(mut self, sleeper: S) -> Self
    where
        S: Sleeper + 'static,
    {
        self.sleeper = Some(Arc::new(sleeper));
        self
    }

    pub fn build(self) -> Result<Gateway, ConfigError> {
        self.config.validate()?;
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(&self.config)?),
        };
        let clock = self.clock.unwrap_or_else(|| Arc::new(TokioClock));
        let sleeper = self.sleeper.unwrap_or_else(|| Arc::new(TokioSleeper));

        let limiter = Arc::new(WindowTracker::with_parts(&self.config.window, clock, sleeper.clone()));
        let retry = RetryPolicy::from_config(&self.config.retry, sleeper)?;
        let dispatcher = HttpDispatcher::new(transport, retry, self.config.request_timeout);
        let call_timeout = self.config.call_timeout.map(TimeoutPolicy::new).transpose()?;

        info!(
            base_url = %self.config.base_url,
            max_requests = self.config.window.max_requests,
            span_ms = self.config.window.span.as_millis() as u64,
            "gateway ready"
        );
        Ok(Gateway {
            inner: Arc::new(Inner {
                queries: QueryBuilder::new(self.config.paging.clone()),
                config: self.config,
                limiter,
                dispatcher,
                call_timeout,
            }),
        })
    }
}
