//! Deadline enforcement for whole gateway calls.

use crate::config::ConfigError;
use crate::{GatewayError, Operation};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct TimeoutPolicy {
    limit: Duration,
}

impl TimeoutPolicy {
    /// Rejects a zero limit.
    pub fn new(limit: Duration) -> Result<Self, ConfigError> {
        if limit.is_zero() {
            return Err(ConfigError::Zero { field: "timeout" });
        }
        Ok(Self { limit })
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    /// Drive `fut` until it finishes or the limit elapses. On timeout `fut` is dropped, which
    /// abandons any admission wait it was parked in.
    pub async fn execute<T, Fut>(&self, operation: Operation, fut: Fut) -> Result<T, GatewayError>
    where
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let start = Instant::now();
        match tokio::time::timeout(self.limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout {
                operation,
                elapsed: start.elapsed(),
                limit: self.limit,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_limit_is_rejected() {
        assert!(TimeoutPolicy::new(Duration::ZERO).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn fast_future_passes_through() {
        let policy = TimeoutPolicy::new(Duration::from_secs(1)).unwrap();
        let result = policy.execute(Operation::GetApiVersion, async { Ok::<_, GatewayError>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_future_times_out() {
        let policy = TimeoutPolicy::new(Duration::from_secs(5)).unwrap();
        let result = policy
            .execute(Operation::GetRecruitingStudies, async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok::<_, GatewayError>(())
            })
            .await;

        match result.unwrap_err() {
            GatewayError::Timeout { operation, elapsed, limit } => {
                assert_eq!(operation, Operation::GetRecruitingStudies);
                assert_eq!(limit, Duration::from_secs(5));
                assert!(elapsed >= Duration::from_secs(5));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn inner_errors_are_returned_unchanged() {
        let policy = TimeoutPolicy::new(Duration::from_secs(1)).unwrap();
        let err = GatewayError::invalid(Operation::SearchStudies, "query", "empty");
        let result = policy.execute(Operation::SearchStudies, async { Err::<(), _>(err.clone()) }).await;
        assert_eq!(result.unwrap_err(), err);
    }
}
