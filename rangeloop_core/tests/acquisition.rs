//! Distance acquisition: windowing, validity gating, settings queries.

use rangeloop_core::{DistanceSensor, DistanceUnit, LoopError, OperationMode, SensorCfg};
use rangeloop_core::{PropertyTable, PropertyValue};
use rangeloop_hardware::SimulatedLidar;
use rangeloop_hardware::error::HwError;
use rangeloop_traits::{BoxError, Bus, MeasurementSource};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Replays queued distances (repeating the last one) and can be told to fail.
#[derive(Clone, Default)]
struct ScriptedBus {
    queue: Arc<Mutex<VecDeque<i16>>>,
    last: Arc<Mutex<i16>>,
    fail: Arc<AtomicBool>,
    threads: Arc<Mutex<Vec<String>>>,
}

impl ScriptedBus {
    fn push(&self, values: &[i16]) {
        self.queue.lock().unwrap().extend(values);
    }
}

impl Bus for ScriptedBus {
    fn write_register(&mut self, register: u8, value: u8) -> Result<(), BoxError> {
        assert_eq!((register, value), (0x44, 0x01));
        if self.fail.load(Ordering::SeqCst) {
            return Err(Box::new(std::io::Error::other("nak")));
        }
        Ok(())
    }

    fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>, BoxError> {
        assert_eq!(count, 2);
        if let Some(name) = std::thread::current().name() {
            self.threads.lock().unwrap().push(name.to_owned());
        }
        let mut last = self.last.lock().unwrap();
        if let Some(v) = self.queue.lock().unwrap().pop_front() {
            *last = v;
        }
        Ok(last.to_be_bytes().to_vec())
    }

    fn write_bulk(&mut self, _bytes: &[u8]) -> Result<(), BoxError> {
        Err(Box::new(std::io::Error::other("not supported")))
    }
}

fn cfg(window: usize, limit: f64) -> SensorCfg {
    SensorCfg {
        window,
        std_dev_limit_mm: limit,
        poll_hz: 200,
        ..SensorCfg::default()
    }
}

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
fn end_to_end_validity_gate() {
    let bus = ScriptedBus::default();
    bus.push(&[100, 100, 100, 100, 100, 500]);
    let sensor = DistanceSensor::new(bus, &cfg(5, 1.0)).unwrap();
    assert!(!sensor.is_valid(), "empty window is invalid");
    assert_eq!(sensor.get_distance_if_valid(DistanceUnit::Millimeters), None);

    for _ in 0..5 {
        sensor.poll_once().unwrap();
    }
    assert!(sensor.is_valid());
    assert_eq!(sensor.get_distance(DistanceUnit::Millimeters), 100.0);
    assert_eq!(sensor.get_distance_if_valid(DistanceUnit::Millimeters), Some(100.0));

    sensor.poll_once().unwrap();
    let snap = sensor.snapshot();
    assert_eq!(snap.distance_mm, 180.0);
    assert_eq!(snap.std_dev_mm, 160.0);
    assert!(!snap.is_valid);
    assert_eq!(sensor.get_distance_if_valid(DistanceUnit::Millimeters), None);
}

#[test]
fn inches_are_millimeters_over_25_4() {
    let bus = ScriptedBus::default();
    bus.push(&[254]);
    let sensor = DistanceSensor::new(bus, &cfg(3, 100.0)).unwrap();
    sensor.poll_once().unwrap();
    assert!((sensor.get_distance(DistanceUnit::Inches) - 10.0).abs() < 1e-12);
}

#[test]
fn negative_readings_are_signed() {
    let bus = ScriptedBus::default();
    bus.push(&[-20]);
    let sensor = DistanceSensor::new(bus, &cfg(1, 100.0)).unwrap();
    assert_eq!(sensor.poll_once().unwrap(), -20.0);
}

#[test]
fn threshold_change_applies_to_current_window() {
    let bus = ScriptedBus::default();
    bus.push(&[100, 110]);
    let sensor = DistanceSensor::new(bus, &cfg(2, 100.0)).unwrap();
    sensor.poll_once().unwrap();
    sensor.poll_once().unwrap();
    assert!(sensor.is_valid());
    // std dev is 5.0; the limit is exclusive
    sensor.set_validity_threshold(5.0);
    assert!(!sensor.is_valid());
    sensor.set_validity_threshold(5.5);
    assert!(sensor.is_valid());
    assert_eq!(sensor.validity_threshold(), 5.5);
}

#[test]
fn reset_invalidates_until_refilled() {
    let bus = ScriptedBus::default();
    bus.push(&[100]);
    let sensor = DistanceSensor::new(bus, &cfg(3, 10.0)).unwrap();
    sensor.poll_once().unwrap();
    assert!(sensor.is_valid());
    sensor.reset();
    assert!(!sensor.is_valid());
    assert_eq!(sensor.window_len(), 0);
    sensor.poll_once().unwrap();
    assert!(sensor.is_valid());
}

#[test]
fn transient_errors_are_counted_not_fatal() {
    let bus = ScriptedBus::default();
    bus.push(&[300]);
    let fail = bus.fail.clone();
    let sensor = DistanceSensor::new(bus, &cfg(3, 10.0)).unwrap();
    fail.store(true, Ordering::SeqCst);
    let err = sensor.poll_once().unwrap_err();
    assert!(matches!(err, LoopError::TransientIo(_)), "{err:?}");
    fail.store(false, Ordering::SeqCst);
    sensor.poll_once().unwrap();
    let stats = sensor.stats();
    assert_eq!(stats.cycles, 2);
    assert_eq!(stats.transient_errors, 1);
    assert_eq!(sensor.get_distance(DistanceUnit::Millimeters), 300.0);
}

#[test]
fn background_cycle_keeps_running_through_failures() {
    let bus = ScriptedBus::default();
    bus.push(&[42]);
    let fail = bus.fail.clone();
    let mut sensor = DistanceSensor::new(bus, &cfg(4, 10.0)).unwrap();
    fail.store(true, Ordering::SeqCst);
    sensor.start().unwrap();
    assert!(wait_until(Duration::from_secs(2), || sensor.stats().transient_errors >= 3));
    fail.store(false, Ordering::SeqCst);
    assert!(wait_until(Duration::from_secs(2), || sensor.is_valid()));
    assert_eq!(sensor.get_distance(DistanceUnit::Millimeters), 42.0);
    sensor.stop();
}

#[test]
fn acquisition_thread_is_named_after_address() {
    let bus = ScriptedBus::default();
    let threads = bus.threads.clone();
    let mut sensor = DistanceSensor::new(bus, &cfg(4, 10.0)).unwrap();
    sensor.start().unwrap();
    assert!(wait_until(Duration::from_secs(2), || !threads.lock().unwrap().is_empty()));
    sensor.stop();
    assert_eq!(threads.lock().unwrap()[0], "lidar-0x10");
}

#[test]
fn reader_feeds_controller_only_when_valid() {
    let bus = ScriptedBus::default();
    bus.push(&[100, 900]);
    let sensor = DistanceSensor::new(bus, &cfg(2, 50.0)).unwrap();
    let mut reader = sensor.reader();
    assert!(reader.read().is_err());
    sensor.poll_once().unwrap();
    assert_eq!(reader.read().unwrap(), 100.0);
    sensor.poll_once().unwrap();
    assert!(reader.read().is_err());
    assert_eq!(reader.get_distance(), 500.0);
    let inches = sensor.reader().in_unit(DistanceUnit::Inches);
    assert!((inches.get_distance() - 500.0 / 25.4).abs() < 1e-12);
}

#[test]
fn query_settings_decodes_device_record() {
    let sensor = DistanceSensor::new(SimulatedLidar::new(250.0), &cfg(3, 10.0)).unwrap();
    let s = sensor.query_settings().unwrap();
    assert_eq!(s.operation_mode, OperationMode::SingleStep);
    assert_eq!(s.firmware_version, "1.4.0");
}

#[test]
fn set_mode_is_visible_in_next_query() {
    let sensor = DistanceSensor::new(SimulatedLidar::new(250.0), &cfg(3, 10.0)).unwrap();
    sensor.set_mode(OperationMode::Continuous).unwrap();
    assert_eq!(
        sensor.query_settings().unwrap().operation_mode,
        OperationMode::Continuous
    );
}

#[test]
fn short_settings_record_is_protocol_error_and_cycle_continues() {
    let lidar = SimulatedLidar::new(250.0).with_truncated_settings(10);
    let mut sensor = DistanceSensor::new(lidar, &cfg(3, 10.0)).unwrap();
    sensor.start().unwrap();
    assert!(matches!(
        sensor.query_settings(),
        Err(LoopError::ProtocolDecode(_))
    ));
    let before = sensor.stats().cycles;
    assert!(wait_until(Duration::from_secs(2), || sensor.stats().cycles > before + 2));
    assert!(wait_until(Duration::from_secs(2), || sensor.is_valid()));
    assert_eq!(sensor.get_distance(DistanceUnit::Millimeters), 250.0);
    sensor.stop();
}

/// Accepts the settings request, then delivers fewer bytes than asked for.
struct ShortReplyBus;

impl Bus for ShortReplyBus {
    fn write_register(&mut self, _register: u8, _value: u8) -> Result<(), BoxError> {
        Ok(())
    }

    fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>, BoxError> {
        Err(Box::new(HwError::ShortRead {
            expected: count,
            got: 4,
        }))
    }

    fn write_bulk(&mut self, _bytes: &[u8]) -> Result<(), BoxError> {
        Ok(())
    }
}

#[test]
fn short_read_on_settings_query_is_protocol_error() {
    let sensor = DistanceSensor::new(ShortReplyBus, &cfg(3, 10.0)).unwrap();
    match sensor.query_settings() {
        Err(LoopError::ProtocolDecode(msg)) => assert_eq!(msg, "expected 23 bytes, got 4"),
        other => panic!("expected a decode error, got {other:?}"),
    }
}

#[test]
fn bus_failure_on_query_maps_to_bus_error() {
    let sensor = DistanceSensor::new(ScriptedBus::default(), &cfg(3, 10.0)).unwrap();
    assert!(matches!(sensor.query_settings(), Err(LoopError::Bus(_))));
    assert!(matches!(
        sensor.set_mode(OperationMode::SingleStep),
        Err(LoopError::Bus(_))
    ));
}

#[test]
fn telemetry_is_read_only() {
    let bus = ScriptedBus::default();
    bus.push(&[120]);
    let sensor = DistanceSensor::new(bus, &cfg(3, 10.0)).unwrap();
    sensor.poll_once().unwrap();
    let mut table = PropertyTable::new();
    sensor.publish_telemetry(&mut table);
    assert_eq!(table.kind(), Some("LiDAR"));
    assert_eq!(
        table.keys().collect::<Vec<_>>(),
        vec!["Distance", "Standard Deviation", "isValid"]
    );
    assert_eq!(table.get("Distance"), Some(PropertyValue::F64(120.0)));
    assert_eq!(table.get("isValid"), Some(PropertyValue::Bool(true)));
    assert!(!table.set("Distance", PropertyValue::F64(1.0)));
}

#[test]
fn invalid_config_rejected() {
    assert!(matches!(
        DistanceSensor::new(ScriptedBus::default(), &cfg(0, 10.0)),
        Err(LoopError::Config(_))
    ));
    assert!(matches!(
        DistanceSensor::new(ScriptedBus::default(), &cfg(3, f64::NAN)),
        Err(LoopError::Config(_))
    ));
}
