use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use trialgate::config::WindowConfig;
use trialgate::{ManualClock, RateLimiter, WindowTracker};

fn window(max_requests: usize, span: Duration) -> WindowConfig {
    WindowConfig { max_requests, span, ..WindowConfig::default() }
}

#[tokio::test(start_paused = true)]
async fn any_window_span_holds_at_most_capacity() {
    let tracker = WindowTracker::new(&WindowConfig::default());
    let mut stamps = Vec::new();
    for _ in 0..250 {
        tracker.admit().await;
        stamps.push(Instant::now());
    }
    for pair in stamps.windows(101) {
        let span = pair[100].duration_since(pair[0]);
        assert!(span >= Duration::from_secs(60), "101 admissions within {:?}", span);
    }
}

#[tokio::test(start_paused = true)]
async fn concurrent_callers_share_one_window() {
    let tracker = Arc::new(WindowTracker::new(&window(10, Duration::from_secs(1))));
    let started = Instant::now();
    let mut handles = Vec::new();
    for _ in 0..25 {
        let tracker = tracker.clone();
        handles.push(tokio::spawn(async move {
            tracker.admit().await;
            Instant::now()
        }));
    }
    let mut admitted = Vec::new();
    for handle in handles {
        admitted.push(handle.await.unwrap());
    }
    admitted.sort();

    let immediate = admitted.iter().filter(|t| **t == started).count();
    assert_eq!(immediate, 10);
    for pair in admitted.windows(11) {
        assert!(pair[10].duration_since(pair[0]) >= Duration::from_secs(1));
    }
    assert!(admitted[24].duration_since(started) >= Duration::from_secs(2));
}

#[tokio::test]
async fn manual_clock_drives_waits_without_real_time() {
    let clock = ManualClock::new();
    let tracker = WindowTracker::with_parts(
        &window(2, Duration::from_secs(60)),
        Arc::new(clock.clone()),
        Arc::new(clock.clone()),
    );
    assert_eq!(tracker.admit().await, Duration::ZERO);
    assert_eq!(tracker.admit().await, Duration::ZERO);

    let waited = tracker.admit().await;
    assert_eq!(waited, Duration::from_secs(60));
    assert_eq!(tracker.snapshot().in_window, 1);
}

#[tokio::test]
async fn try_acquire_reports_the_wait() {
    let clock = ManualClock::new();
    let tracker = WindowTracker::with_parts(
        &window(1, Duration::from_secs(10)),
        Arc::new(clock.clone()),
        Arc::new(clock.clone()),
    );
    assert!(tracker.try_acquire().is_allowed());
    clock.advance(Duration::from_secs(4));
    match tracker.try_acquire() {
        trialgate::Decision::Denied { wait } => assert_eq!(wait, Duration::from_secs(6)),
        other => panic!("expected denial, got {:?}", other),
    }
    assert_eq!(tracker.snapshot().next_slot_in, Duration::from_secs(6));
}
