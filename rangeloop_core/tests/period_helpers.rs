// Focused tests for period helpers.
use rangeloop_core::util::{mm_to_inches, period, period_ms, period_us};
use std::time::Duration;

#[test]
fn period_us_clamps_and_floors() {
    // hz=1 → 1s
    assert_eq!(period_us(1), 1_000_000);
    // hz=50 → 20ms
    assert_eq!(period_us(50), 20_000);
    // Very high hz floors to 1µs minimum
    assert_eq!(period_us(1_000_000), 1);
    assert_eq!(period_us(u32::MAX), 1);
    // hz=0 is treated as 1
    assert_eq!(period_us(0), 1_000_000);
}

#[test]
fn period_ms_minimum_resolution() {
    assert_eq!(period_ms(1), 1000);
    assert_eq!(period_ms(50), 20);
    // hz>=1000 would floor to 0ms but we cap to >=1ms
    assert_eq!(period_ms(1000), 1);
    assert_eq!(period_ms(10_000), 1);
    assert_eq!(period_ms(0), 1000);
}

#[test]
fn period_duration_matches_micros() {
    assert_eq!(period(60), Duration::from_micros(16_666));
}

#[test]
fn inches_conversion() {
    assert!((mm_to_inches(254.0) - 10.0).abs() < 1e-12);
}
