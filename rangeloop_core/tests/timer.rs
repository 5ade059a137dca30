//! Periodic timer: cadence, overrun accounting, reset, panic containment.

use rangeloop_core::{LoopError, PeriodicTimer};
use rangeloop_traits::clock::test_clock::TestClock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

const PERIOD: Duration = Duration::from_millis(5);

fn wait_until(timeout: Duration, cond: impl Fn() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    cond()
}

#[test]
fn rejects_zero_period() {
    let err = PeriodicTimer::new(Duration::ZERO, |_| {}).unwrap_err();
    assert!(matches!(err, LoopError::Config(_)));
}

#[test]
fn invokes_action_repeatedly_until_disabled() {
    let calls = Arc::new(AtomicUsize::new(0));
    let c = calls.clone();
    let mut t = PeriodicTimer::new(PERIOD, move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();
    t.enable().unwrap();
    assert!(wait_until(Duration::from_secs(2), || calls.load(Ordering::SeqCst) >= 3));
    t.disable();
    assert!(!t.is_enabled());
    let after = calls.load(Ordering::SeqCst);
    std::thread::sleep(PERIOD * 6);
    assert_eq!(calls.load(Ordering::SeqCst), after);
}

#[test]
fn slow_action_counts_overruns() {
    let clock = TestClock::new();
    let c = clock.clone();
    let mut t = PeriodicTimer::new(PERIOD, move |_| c.advance(PERIOD * 3))
        .unwrap()
        .with_clock(Arc::new(clock));
    t.suppress_overrun_log(true);
    t.enable().unwrap();
    assert!(wait_until(Duration::from_secs(2), || t.tick_count() >= 3));
    t.disable();
    assert!(t.overrun_count() >= 3);
    assert_eq!(t.overrun_count(), t.tick_count());
}

#[test]
fn reset_inside_action_suppresses_overrun() {
    let clock = TestClock::new();
    let c = clock.clone();
    let mut t = PeriodicTimer::new(PERIOD, move |h| {
        c.advance(PERIOD * 3);
        h.reset();
    })
    .unwrap()
    .with_clock(Arc::new(clock));
    t.enable().unwrap();
    assert!(wait_until(Duration::from_secs(2), || t.tick_count() >= 3));
    t.disable();
    assert_eq!(t.overrun_count(), 0);
}

#[test]
fn external_reset_postpones_the_next_tick() {
    let calls = Arc::new(AtomicUsize::new(0));
    let c = calls.clone();
    let mut t = PeriodicTimer::new(Duration::from_millis(60), move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();
    let handle = t.handle();
    t.enable().unwrap();
    let start = Instant::now();
    while start.elapsed() < Duration::from_millis(300) {
        handle.reset();
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    // Once the resets stop, the schedule resumes.
    assert!(wait_until(Duration::from_secs(2), || calls.load(Ordering::SeqCst) >= 1));
    t.disable();
    assert_eq!(t.overrun_count(), 0);
}

#[test]
fn action_within_period_never_overruns() {
    let clock = TestClock::new();
    let c = clock.clone();
    let mut t = PeriodicTimer::new(PERIOD, move |_| c.advance(PERIOD / 2))
        .unwrap()
        .with_clock(Arc::new(clock));
    t.enable().unwrap();
    assert!(wait_until(Duration::from_secs(2), || t.tick_count() >= 5));
    t.disable();
    assert_eq!(t.overrun_count(), 0);
}

#[test]
fn panic_in_action_does_not_stop_timer() {
    let calls = Arc::new(AtomicUsize::new(0));
    let c = calls.clone();
    let mut t = PeriodicTimer::new(PERIOD, move |_| {
        if c.fetch_add(1, Ordering::SeqCst) == 0 {
            panic!("first tick fails");
        }
    })
    .unwrap();
    t.enable().unwrap();
    assert!(wait_until(Duration::from_secs(2), || calls.load(Ordering::SeqCst) >= 3));
    t.disable();
    assert_eq!(t.panic_count(), 1);
}

#[test]
fn action_never_runs_concurrently_with_itself() {
    let in_flight = Arc::new(AtomicBool::new(false));
    let overlapped = Arc::new(AtomicBool::new(false));
    let calls = Arc::new(AtomicUsize::new(0));
    let (f, o, c) = (in_flight.clone(), overlapped.clone(), calls.clone());
    let mut t = PeriodicTimer::new(Duration::from_millis(1), move |_| {
        if f.swap(true, Ordering::SeqCst) {
            o.store(true, Ordering::SeqCst);
        }
        std::thread::sleep(Duration::from_millis(3));
        c.fetch_add(1, Ordering::SeqCst);
        f.store(false, Ordering::SeqCst);
    })
    .unwrap();
    t.suppress_overrun_log(true);
    t.enable().unwrap();
    assert!(wait_until(Duration::from_secs(2), || calls.load(Ordering::SeqCst) >= 5));
    t.disable();
    assert!(!overlapped.load(Ordering::SeqCst));
    assert!(t.overrun_count() > 0);
}

#[test]
fn cancel_from_inside_action_then_reenable() {
    let calls = Arc::new(AtomicUsize::new(0));
    let c = calls.clone();
    let mut t = PeriodicTimer::new(PERIOD, move |h| {
        c.fetch_add(1, Ordering::SeqCst);
        h.cancel();
    })
    .unwrap();
    t.enable().unwrap();
    assert!(wait_until(Duration::from_secs(2), || calls.load(Ordering::SeqCst) == 1));
    assert!(wait_until(Duration::from_secs(1), || !t.is_enabled()));
    std::thread::sleep(PERIOD * 4);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    t.enable().unwrap();
    assert!(wait_until(Duration::from_secs(2), || calls.load(Ordering::SeqCst) == 2));
}

#[test]
fn drop_joins_worker() {
    let calls = Arc::new(AtomicUsize::new(0));
    let c = calls.clone();
    let mut t = PeriodicTimer::new(PERIOD, move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();
    t.enable().unwrap();
    assert!(wait_until(Duration::from_secs(2), || calls.load(Ordering::SeqCst) >= 1));
    drop(t);
    let after = calls.load(Ordering::SeqCst);
    std::thread::sleep(PERIOD * 4);
    assert_eq!(calls.load(Ordering::SeqCst), after);
}
