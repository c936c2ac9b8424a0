#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # trialgate
//!
//! A rate-limited query gateway for the ClinicalTrials.gov v2 registry API, built to sit behind
//! an agent tool server.
//!
//! ## Features
//!
//! - **24 named operations** validated up front: bad arguments never reach the network
//! - **Sliding-window admission**: at most 100 upstream requests in any rolling 60 seconds,
//!   shared by every caller of a gateway; callers wait instead of failing
//! - **Retry** for server errors with exponential backoff and jitter, plus one delayed retry
//!   on upstream 429s
//! - **Pagination** for aggregations with a hard record cap and a `truncated` flag
//! - **Deadlines and cancellation** that abandon admission waits without consuming slots
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use trialgate::{Gateway, GatewayConfig};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let gateway = Gateway::from_config(GatewayConfig::default())?;
//!     let result = gateway
//!         .execute("search_by_condition", json!({"condition": "asthma", "phase": "PHASE2"}))
//!         .await?;
//!     println!("{} studies", result.total_count);
//!     Ok(())
//! }
//! ```

pub mod assemble;
pub mod backoff;
pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod gateway;
pub mod jitter;
pub mod operation;
pub mod prelude;
pub mod query;
pub mod rate_limit;
pub mod retry;
pub mod service;
pub mod sleeper;
pub mod study;
pub mod timeout;
pub mod transport;

// Re-exports
pub use assemble::{AggregatedResult, Payload};
pub use backoff::Backoff;
pub use clock::{Clock, ManualClock, TokioClock};
pub use config::{ConfigError, GatewayConfig};
pub use error::{ErrorKind, ErrorReport, GatewayError};
pub use gateway::{Gateway, GatewayBuilder};
pub use jitter::Jitter;
pub use operation::Operation;
pub use query::{QuerySpec, ToolArgs};
pub use rate_limit::{Decision, RateLimiter, WindowTracker};
pub use retry::{AttemptError, RetryPolicy};
pub use service::{GatewayService, ToolCall};
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
pub use timeout::TimeoutPolicy;
pub use transport::{RawResponse, ReqwestTransport, Transport, TransportError};
