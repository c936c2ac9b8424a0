use crate::rate_limit::Decision;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Bounded, time-ordered set of admission timestamps.
///
/// Invariant: for any instant `t`, fewer than `capacity + 1` stored timestamps fall in
/// `(t - span, t]`. A timestamp exactly `span` old no longer counts.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    stamps: VecDeque<Instant>,
    capacity: usize,
    span: Duration,
}

impl SlidingWindow {
    pub fn new(capacity: usize, span: Duration) -> Self {
        Self { stamps: VecDeque::with_capacity(capacity.min(1024)), capacity, span }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn span(&self) -> Duration {
        self.span
    }

    /// Purge expired stamps, then either record `now` or report how long until the oldest
    /// stamp ages out.
    pub fn try_admit(&mut self, now: Instant) -> Decision {
        self.purge(now);
        if self.stamps.len() < self.capacity {
            self.stamps.push_back(now);
            return Decision::Allowed { remaining: self.capacity - self.stamps.len() };
        }
        Decision::Denied { wait: self.next_slot_in(now) }
    }

    /// Stamps still inside the window at `now`, without mutating.
    pub fn len_at(&self, now: Instant) -> usize {
        self.stamps.iter().filter(|&&stamp| !self.expired(stamp, now)).count()
    }

    /// Zero when a slot is free at `now`; otherwise the time until the oldest live stamp expires.
    pub fn next_slot_in(&self, now: Instant) -> Duration {
        if self.len_at(now) < self.capacity {
            return Duration::ZERO;
        }
        self.stamps
            .iter()
            .find(|&&stamp| !self.expired(stamp, now))
            .map(|&oldest| (oldest + self.span).saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }

    fn purge(&mut self, now: Instant) {
        while let Some(&oldest) = self.stamps.front() {
            if !self.expired(oldest, now) {
                break;
            }
            self.stamps.pop_front();
        }
    }

    fn expired(&self, stamp: Instant, now: Instant) -> bool {
        now.saturating_duration_since(stamp) >= self.span
    }
}
