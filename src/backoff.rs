//! Backoff strategies for upstream retries.
//!
//! Attempt semantics: attempt index `0` is the initial call (no delay); retries start at
//! `attempt = 1`. Delays saturate at [`MAX_BACKOFF`].
//!
//! ```rust
//! use std::time::Duration;
//! use trialgate::Backoff;
//!
//! let backoff = Backoff::exponential(Duration::from_millis(500))
//!     .with_max(Duration::from_secs(8))
//!     .unwrap();
//! assert_eq!(backoff.delay(0), Duration::ZERO);
//! assert_eq!(backoff.delay(1), Duration::from_millis(500));
//! assert_eq!(backoff.delay(3), Duration::from_secs(2));
//! assert_eq!(backoff.delay(9), Duration::from_secs(8)); // capped
//! ```

use std::fmt;
use std::time::Duration;

/// Upper bound on any computed delay (1 hour).
pub const MAX_BACKOFF: Duration = Duration::from_secs(60 * 60);

/// Errors returned by backoff configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackoffError {
    ConstantDoesNotSupportMax,
    MaxMustBePositive,
    MaxLessThanBase { base: Duration, max: Duration },
}

impl fmt::Display for BackoffError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackoffError::ConstantDoesNotSupportMax => {
                write!(f, "with_max is only valid for exponential backoff")
            }
            BackoffError::MaxMustBePositive => write!(f, "max must be greater than zero"),
            BackoffError::MaxLessThanBase { base, max } => {
                write!(f, "max ({:?}) must be >= base ({:?})", max, base)
            }
        }
    }
}

impl std::error::Error for BackoffError {}

#[derive(Debug, Clone, PartialEq, Eq)]
enum BackoffKind {
    Constant { delay: Duration },
    Exponential { base: Duration, max: Option<Duration> },
}

/// Delay schedule between retry attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    kind: BackoffKind,
}

impl Backoff {
    /// Same delay before every retry.
    pub fn constant(delay: Duration) -> Self {
        Self { kind: BackoffKind::Constant { delay } }
    }

    /// `base * 2^(attempt - 1)`.
    pub fn exponential(base: Duration) -> Self {
        Self { kind: BackoffKind::Exponential { base, max: None } }
    }

    /// Cap an exponential backoff. Rejects constant backoff, a zero cap, and `max < base`.
    pub fn with_max(mut self, max: Duration) -> Result<Self, BackoffError> {
        if max.is_zero() {
            return Err(BackoffError::MaxMustBePositive);
        }
        match &mut self.kind {
            BackoffKind::Exponential { base, max: existing } => {
                if max < *base {
                    return Err(BackoffError::MaxLessThanBase { base: *base, max });
                }
                *existing = Some(max);
                Ok(self)
            }
            BackoffKind::Constant { .. } => Err(BackoffError::ConstantDoesNotSupportMax),
        }
    }

    /// Delay before `attempt` (0 = initial call, no delay).
    pub fn delay(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        match &self.kind {
            BackoffKind::Constant { delay } => (*delay).min(MAX_BACKOFF),
            BackoffKind::Exponential { base, max } => {
                let exponent = attempt.saturating_sub(1).min(u32::MAX as usize) as u32;
                let multiplier = 2u128.saturating_pow(exponent);
                let nanos = base.as_nanos().saturating_mul(multiplier);
                let delay = Duration::from_nanos(nanos.min(MAX_BACKOFF.as_nanos()) as u64);
                max.map(|m| delay.min(m)).unwrap_or(delay).min(MAX_BACKOFF)
            }
        }
    }
}
