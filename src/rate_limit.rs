//! Window tracking for outbound registry calls.
//!
//! - [`SlidingWindow`]: the bounded set of recent admission timestamps and the admission math.
//! - [`WindowTracker`]: the process-shared tracker. It holds the window behind one mutex, takes
//!   the lock only for the synchronous check-and-record step, and sleeps outside of it.
//! - [`RateLimiter`]: the seam the dispatcher admits through.
//!
//! Waiting callers are never rejected: a denied caller sleeps for the reported wait (at least
//! `min_wait`) and tries again. A caller dropped while sleeping has recorded nothing.

use crate::clock::{Clock, TokioClock};
use crate::config::WindowConfig;
use crate::sleeper::{Sleeper, TokioSleeper};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, trace};

pub mod window;
pub use window::SlidingWindow;

/// The decision returned by one admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The request may proceed now; its timestamp has been recorded.
    Allowed {
        /// Free slots left in the window after this admission.
        remaining: usize,
    },
    /// The window is full.
    Denied {
        /// Time until the oldest stamp ages out.
        wait: Duration,
    },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }
}

/// Point-in-time view of the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSnapshot {
    pub in_window: usize,
    pub capacity: usize,
    /// Zero when a slot is free.
    pub next_slot_in: Duration,
}

/// Admission interface used by the dispatcher before every upstream attempt.
#[async_trait::async_trait]
pub trait RateLimiter: Send + Sync {
    /// Non-blocking check-and-record.
    fn try_acquire(&self) -> Decision;

    /// Wait until admitted; returns how long the caller waited.
    async fn admit(&self) -> Duration;
}

/// Shared sliding-window tracker.
#[derive(Debug)]
pub struct WindowTracker {
    window: Mutex<SlidingWindow>,
    min_wait: Duration,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
}

impl WindowTracker {
    /// Tracker on tokio time.
    pub fn new(config: &WindowConfig) -> Self {
        Self::with_parts(config, Arc::new(TokioClock), Arc::new(TokioSleeper))
    }

    pub fn with_parts(
        config: &WindowConfig,
        clock: Arc<dyn Clock>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            window: Mutex::new(SlidingWindow::new(config.max_requests, config.span)),
            min_wait: config.min_wait,
            clock,
            sleeper,
        }
    }

    pub fn snapshot(&self) -> WindowSnapshot {
        let window = self.lock();
        let now = self.clock.now();
        WindowSnapshot {
            in_window: window.len_at(now),
            capacity: window.capacity(),
            next_slot_in: window.next_slot_in(now),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlidingWindow> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait::async_trait]
impl RateLimiter for WindowTracker {
    fn try_acquire(&self) -> Decision {
        let mut window = self.lock();
        // Read the clock under the lock so stored stamps stay ordered.
        let now = self.clock.now();
        window.try_admit(now)
    }

    async fn admit(&self) -> Duration {
        let started = self.clock.now();
        let mut rounds = 0u32;
        loop {
            match self.try_acquire() {
                Decision::Allowed { remaining } => {
                    let waited = self.clock.now().saturating_duration_since(started);
                    if rounds > 0 {
                        debug!(waited_ms = waited.as_millis() as u64, rounds, remaining, "admitted after waiting");
                    } else {
                        trace!(remaining, "admitted");
                    }
                    return waited;
                }
                Decision::Denied { wait } => {
                    rounds += 1;
                    let pause = wait.max(self.min_wait);
                    debug!(wait_ms = pause.as_millis() as u64, rounds, "request window full");
                    self.sleeper.sleep(pause).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn config(max_requests: usize) -> WindowConfig {
        WindowConfig { max_requests, span: Duration::from_secs(60), min_wait: Duration::from_millis(100) }
    }

    fn manual(max_requests: usize) -> (WindowTracker, ManualClock) {
        let clock = ManualClock::new();
        let tracker = WindowTracker::with_parts(
            &config(max_requests),
            Arc::new(clock.clone()),
            Arc::new(clock.clone()),
        );
        (tracker, clock)
    }

    #[tokio::test]
    async fn admits_immediately_with_room() {
        let (tracker, _clock) = manual(2);
        assert_eq!(tracker.admit().await, Duration::ZERO);
        assert_eq!(tracker.snapshot().in_window, 1);
    }

    #[tokio::test]
    async fn full_window_waits_for_oldest_to_age_out() {
        let (tracker, clock) = manual(2);
        tracker.admit().await;
        clock.advance(Duration::from_secs(20));
        tracker.admit().await;

        let waited = tracker.admit().await;
        assert_eq!(waited, Duration::from_secs(40));

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.in_window, 2);
        assert_eq!(snapshot.next_slot_in, Duration::from_secs(20));
    }

    #[tokio::test]
    async fn short_waits_are_rounded_up_to_min_wait() {
        let (tracker, clock) = manual(1);
        tracker.admit().await;
        clock.advance(Duration::from_millis(59_990));

        let waited = tracker.admit().await;
        assert_eq!(waited, Duration::from_millis(100));
    }

    #[test]
    fn try_acquire_reports_wait_without_recording() {
        let (tracker, _clock) = manual(1);
        assert!(tracker.try_acquire().is_allowed());
        assert_eq!(tracker.try_acquire(), Decision::Denied { wait: Duration::from_secs(60) });
        assert_eq!(tracker.snapshot().in_window, 1);
    }

    #[test]
    fn poisoned_lock_is_recovered() {
        let (tracker, _clock) = manual(3);
        let tracker = Arc::new(tracker);
        let poisoner = tracker.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.window.lock().unwrap();
            panic!("poison the window");
        })
        .join();
        assert!(tracker.try_acquire().is_allowed());
    }
}
