use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use trialgate::config::WindowConfig;
use trialgate::query::{QueryBuilder, ToolArgs};
use trialgate::rate_limit::SlidingWindow;
use trialgate::{ManualClock, Operation, RateLimiter, WindowTracker};

// One admission per second against 100/60s: the window never fills.
fn try_acquire_fast_path(c: &mut Criterion) {
    let clock = ManualClock::new();
    let tracker = WindowTracker::with_parts(&WindowConfig::default(), Arc::new(clock.clone()), Arc::new(clock.clone()));

    c.bench_function("window_try_acquire_uncontended", |b| {
        b.iter(|| {
            clock.advance(Duration::from_secs(1));
            black_box(tracker.try_acquire())
        });
    });
}

// Full window with one stamp expiring per check.
fn sliding_window_steady_state(c: &mut Criterion) {
    let clock = ManualClock::new();
    let mut window = SlidingWindow::new(100, Duration::from_secs(60));

    c.bench_function("sliding_window_steady_state", |b| {
        b.iter(|| {
            clock.advance(Duration::from_millis(600));
            black_box(window.try_admit(trialgate::Clock::now(&clock)))
        });
    });
}

fn admit_async(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let clock = ManualClock::new();
    let tracker = Arc::new(WindowTracker::with_parts(
        &WindowConfig::default(),
        Arc::new(clock.clone()),
        Arc::new(clock),
    ));

    // Every 101st admission waits, which the manual clock skips through.
    c.bench_function("window_admit_with_waits", |b| {
        b.to_async(&rt).iter(|| {
            let tracker = tracker.clone();
            async move { black_box(tracker.admit().await) }
        });
    });
}

fn build_queries(c: &mut Criterion) {
    let builder = QueryBuilder::default();
    let args = ToolArgs::from_value(
        Operation::SearchByDateRange,
        json!({"startDateFrom": "2020-01", "startDateTo": "2024-12-31", "condition": "heart failure"}),
    )
    .unwrap();

    c.bench_function("query_build_date_range", |b| {
        b.iter(|| black_box(builder.build(Operation::SearchByDateRange, black_box(&args)).unwrap()));
    });
}

criterion_group!(benches, try_acquire_fast_path, sliding_window_steady_state, admit_async, build_queries);
criterion_main!(benches);
