//! Acquisition thread lifecycle and cleanup, to prevent thread leaks.
//!
//! Verifies that:
//! - No thread runs before `start()`
//! - `start()` is idempotent
//! - Threads are cleaned up on `stop()` and on drop
//! - A sensor can be restarted after `stop()`

use rangeloop_core::mocks::NoopBus;
use rangeloop_core::{DistanceSensor, SensorCfg};
use rangeloop_hardware::SimulatedLidar;
use rangeloop_traits::clock::test_clock::TestClock;
use std::sync::Arc;
use std::time::Duration;

fn fast() -> SensorCfg {
    SensorCfg {
        poll_hz: 500,
        ..SensorCfg::default()
    }
}

#[test]
fn construction_has_no_side_effects() {
    let sensor = DistanceSensor::new(NoopBus, &fast()).unwrap();
    std::thread::sleep(Duration::from_millis(20));
    assert!(!sensor.is_running());
    assert_eq!(sensor.stats().cycles, 0);
}

#[test]
fn start_is_idempotent_and_stop_joins() {
    let mut sensor = DistanceSensor::new(NoopBus, &fast()).unwrap();
    sensor.start().unwrap();
    sensor.start().unwrap();
    std::thread::sleep(Duration::from_millis(20));
    sensor.stop();
    assert!(!sensor.is_running());
    let cycles = sensor.stats().cycles;
    assert!(cycles > 0);
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(sensor.stats().cycles, cycles);
}

#[test]
fn thread_exits_on_drop() {
    let mut sensor = DistanceSensor::new(NoopBus, &fast()).unwrap();
    sensor.start().unwrap();
    std::thread::sleep(Duration::from_millis(10));
    // Test passes if drop completes without hanging.
    drop(sensor);
}

#[test]
fn many_sensors_do_not_leak_threads() {
    for _ in 0..10 {
        let mut sensor = DistanceSensor::new(SimulatedLidar::new(80.0), &fast()).unwrap();
        sensor.start().unwrap();
        std::thread::sleep(Duration::from_millis(5));
        drop(sensor);
    }
}

#[test]
fn restart_after_stop() {
    let mut sensor = DistanceSensor::new(SimulatedLidar::new(80.0), &fast()).unwrap();
    sensor.start().unwrap();
    std::thread::sleep(Duration::from_millis(10));
    sensor.stop();
    let first = sensor.stats().cycles;
    sensor.start().unwrap();
    std::thread::sleep(Duration::from_millis(10));
    sensor.stop();
    assert!(sensor.stats().cycles > first);
}

#[test]
fn stalled_for_grows_while_bus_fails() {
    let mut sensor = DistanceSensor::new(NoopBus, &fast()).unwrap();
    sensor.start().unwrap();
    std::thread::sleep(Duration::from_millis(30));
    assert!(sensor.stalled_for() >= Duration::from_millis(20));
    sensor.stop();
}

#[test]
fn restart_measures_stall_from_start() {
    let clock = TestClock::new();
    let mut sensor = DistanceSensor::with_clock(NoopBus, &fast(), Arc::new(clock.clone())).unwrap();
    clock.advance(Duration::from_secs(5));
    assert_eq!(sensor.stalled_for(), Duration::from_secs(5));

    sensor.start().unwrap();
    assert_eq!(sensor.stalled_for(), Duration::ZERO);
    sensor.stop();

    clock.advance(Duration::from_secs(3));
    sensor.start().unwrap();
    assert_eq!(sensor.stalled_for(), Duration::ZERO);
    clock.advance(Duration::from_millis(250));
    assert_eq!(sensor.stalled_for(), Duration::from_millis(250));
    sensor.stop();
}

#[test]
fn drop_without_start_is_a_no_op() {
    let sensor = DistanceSensor::new(NoopBus, &fast()).unwrap();
    assert!(!sensor.is_running());
    drop(sensor);
}
