//! `tower::Service` adapter so the gateway can sit in a tower stack or behind a tool server.

use crate::assemble::AggregatedResult;
use crate::{Gateway, GatewayError};
use serde::Deserialize;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tower_service::Service;

/// One tool invocation: operation name plus its JSON arguments.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ToolCall {
    #[serde(alias = "name")]
    pub operation: String,
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(operation: impl Into<String>, arguments: Value) -> Self {
        Self { operation: operation.into(), arguments }
    }
}

/// Always ready; admission control happens inside each call.
#[derive(Debug, Clone)]
pub struct GatewayService {
    gateway: Gateway,
}

impl GatewayService {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }
}

impl Gateway {
    pub fn into_service(self) -> GatewayService {
        GatewayService::new(self)
    }
}

impl Service<ToolCall> for GatewayService {
    type Response = AggregatedResult;
    type Error = GatewayError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ToolCall) -> Self::Future {
        let gateway = self.gateway.clone();
        Box::pin(async move { gateway.execute(&req.operation, req.arguments).await })
    }
}
