//! Background distance acquisition over a request/response bus.
//!
//! A `DistanceSensor` owns its bus behind a mutex and, once started, one
//! thread that triggers a measurement, reads the two-byte big-endian result,
//! feeds it into a rolling window and publishes `{mean, stddev, valid}` in a
//! single critical section. Readers never touch the bus.
//!
//! Safety: the acquisition thread is stopped and joined on `stop()` and on
//! drop, preventing thread leaks.

use crossbeam_channel as xch;
use rangeloop_traits::clock::{Clock, MonotonicClock};
use rangeloop_traits::{BoxError, Bus, MeasurementSource, TelemetryBuilder};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::config::SensorCfg;
use crate::error::LoopError;
use crate::hw_error::{map_bus_error, map_cycle_error, map_settings_read_error};
use crate::settings::{self, DeviceSettings, OperationMode, SETTINGS_LEN};
use crate::stats::RollingStatistics;
use crate::util::{mm_to_inches, period};

const REG_MEASURE: u8 = 0x44;
const MEASURE_TRIGGER: u8 = 0x01;
const CMD_QUERY_SETTINGS: u8 = 0x51;
const CMD_SET_MODE: u8 = 0x4d;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistanceUnit {
    #[default]
    Millimeters,
    Inches,
}

impl DistanceUnit {
    pub fn from_mm(self, mm: f64) -> f64 {
        match self {
            Self::Millimeters => mm,
            Self::Inches => mm_to_inches(mm),
        }
    }
}

/// Values published by the last completed cycle.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AcquisitionSnapshot {
    /// Window mean in millimeters.
    pub distance_mm: f64,
    pub std_dev_mm: f64,
    pub is_valid: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AcquisitionStats {
    pub cycles: u64,
    pub transient_errors: u64,
}

struct Guarded {
    window: RollingStatistics,
    snapshot: AcquisitionSnapshot,
    threshold: f64,
}

impl Guarded {
    fn recompute(&mut self) {
        match (self.window.mean(), self.window.population_std_dev()) {
            (Some(mean), Some(sd)) => {
                self.snapshot = AcquisitionSnapshot {
                    distance_mm: mean,
                    std_dev_mm: sd,
                    is_valid: sd < self.threshold,
                };
            }
            _ => self.snapshot.is_valid = false,
        }
    }
}

struct Shared {
    guarded: Mutex<Guarded>,
    cycles: AtomicU64,
    transient_errors: AtomicU64,
    last_ok_ms: AtomicU64,
    epoch: Instant,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl Shared {
    fn guarded(&self) -> MutexGuard<'_, Guarded> {
        self.guarded.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot(&self) -> AcquisitionSnapshot {
        self.guarded().snapshot
    }

    fn record(&self, mm: f64) {
        {
            let mut g = self.guarded();
            g.window.add(mm);
            g.recompute();
        }
        self.last_ok_ms
            .store(self.clock.ms_since(self.epoch), Ordering::Relaxed);
    }
}

fn lock_bus<B>(bus: &Mutex<B>) -> MutexGuard<'_, B> {
    bus.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One acquisition cycle: trigger, read, convert, publish.
fn poll_cycle<B: Bus>(bus: &Mutex<B>, shared: &Shared) -> Result<f64, LoopError> {
    let reply = {
        let mut b = lock_bus(bus);
        b.write_register(REG_MEASURE, MEASURE_TRIGGER)
            .and_then(|()| b.read_bytes(2))
    };
    shared.cycles.fetch_add(1, Ordering::Relaxed);
    let result = match reply {
        Ok(bytes) if bytes.len() >= 2 => {
            let mm = f64::from(i16::from_be_bytes([bytes[0], bytes[1]]));
            shared.record(mm);
            tracing::trace!(distance_mm = mm, "distance sample");
            return Ok(mm);
        }
        Ok(bytes) => LoopError::TransientIo(format!("short distance read: {} bytes", bytes.len())),
        Err(e) => map_cycle_error(&*e),
    };
    let n = shared.transient_errors.fetch_add(1, Ordering::Relaxed) + 1;
    tracing::warn!(error = %result, transient_errors = n, "acquisition cycle skipped");
    Err(result)
}

struct Worker {
    shutdown: Arc<AtomicBool>,
    stop_tx: xch::Sender<()>,
    join: JoinHandle<()>,
}

/// Ranging sensor service. `start()` spawns the acquisition thread; every
/// accessor is safe to call from any thread.
pub struct DistanceSensor<B> {
    bus: Arc<Mutex<B>>,
    shared: Arc<Shared>,
    address: u8,
    period: Duration,
    worker: Option<Worker>,
}

impl<B> core::fmt::Debug for DistanceSensor<B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DistanceSensor")
            .field("address", &format_args!("0x{:02x}", self.address))
            .field("period", &self.period)
            .field("running", &self.worker.is_some())
            .field("snapshot", &self.shared.snapshot())
            .finish()
    }
}

impl<B> DistanceSensor<B> {
    /// Stop acquisition. The in-flight transaction completes; no new one starts.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        worker.shutdown.store(true, Ordering::Relaxed);
        let _ = worker.stop_tx.try_send(());
        match worker.join.join() {
            Ok(()) => tracing::trace!("acquisition thread joined successfully"),
            Err(e) => tracing::warn!(?e, "acquisition thread panicked during shutdown"),
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }
}

impl<B: Bus + Send + 'static> DistanceSensor<B> {
    pub fn new(bus: B, cfg: &SensorCfg) -> Result<Self, LoopError> {
        Self::with_clock(bus, cfg, Arc::new(MonotonicClock::new()))
    }

    pub fn with_clock(
        bus: B,
        cfg: &SensorCfg,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Result<Self, LoopError> {
        cfg.validate()?;
        let window = RollingStatistics::new(cfg.window)?;
        let epoch = clock.now();
        Ok(Self {
            bus: Arc::new(Mutex::new(bus)),
            shared: Arc::new(Shared {
                guarded: Mutex::new(Guarded {
                    window,
                    snapshot: AcquisitionSnapshot::default(),
                    threshold: cfg.std_dev_limit_mm,
                }),
                cycles: AtomicU64::new(0),
                transient_errors: AtomicU64::new(0),
                last_ok_ms: AtomicU64::new(0),
                epoch,
                clock,
            }),
            address: cfg.address,
            period: period(cfg.poll_hz),
            worker: None,
        })
    }

    /// Begin continuous acquisition. Calling it again while running is a no-op.
    pub fn start(&mut self) -> Result<(), LoopError> {
        if self.worker.is_some() {
            return Ok(());
        }
        // Stall time restarts from here, not from the last pre-stop read.
        self.shared
            .last_ok_ms
            .store(self.shared.clock.ms_since(self.shared.epoch), Ordering::Relaxed);
        let (stop_tx, stop_rx) = xch::bounded::<()>(1);
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let bus = self.bus.clone();
        let shared = self.shared.clone();
        let period = self.period;

        let join = std::thread::Builder::new()
            .name(format!("lidar-0x{:02x}", self.address))
            .spawn(move || {
                loop {
                    if shutdown_clone.load(Ordering::Relaxed) {
                        tracing::debug!("acquisition thread received shutdown signal");
                        break;
                    }
                    // Failures are counted and logged inside the cycle.
                    let _ = poll_cycle(&bus, &shared);

                    match stop_rx.recv_timeout(period) {
                        Err(xch::RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(xch::RecvTimeoutError::Disconnected) => break,
                    }
                }
                tracing::trace!("acquisition thread exiting cleanly");
            })
            .map_err(|e| LoopError::Thread(e.to_string()))?;

        tracing::debug!(address = self.address, period_ms = self.period.as_millis() as u64, "acquisition started");
        self.worker = Some(Worker {
            shutdown,
            stop_tx,
            join,
        });
        Ok(())
    }

    /// Run one cycle on the calling thread.
    pub fn poll_once(&self) -> Result<f64, LoopError> {
        poll_cycle(&self.bus, &self.shared)
    }

    /// Query the device settings record. Serialized with the acquisition cycle.
    pub fn query_settings(&self) -> Result<DeviceSettings, LoopError> {
        let bytes = {
            let mut b = lock_bus(&self.bus);
            b.write_bulk(&[CMD_QUERY_SETTINGS])
                .map_err(|e| map_bus_error(&*e))?;
            b.read_bytes(SETTINGS_LEN)
                .map_err(|e| map_settings_read_error(&*e))?
        };
        settings::decode(&bytes)
    }

    pub fn set_mode(&self, mode: OperationMode) -> Result<(), LoopError> {
        lock_bus(&self.bus)
            .write_bulk(&[CMD_SET_MODE, mode.to_byte()])
            .map_err(|e| map_bus_error(&*e))?;
        tracing::info!(?mode, "operation mode set");
        Ok(())
    }

    pub fn reader(&self) -> DistanceReader {
        DistanceReader {
            shared: self.shared.clone(),
            unit: DistanceUnit::Millimeters,
        }
    }

    pub fn get_distance(&self, unit: DistanceUnit) -> f64 {
        unit.from_mm(self.shared.snapshot().distance_mm)
    }

    pub fn get_distance_if_valid(&self, unit: DistanceUnit) -> Option<f64> {
        let s = self.shared.snapshot();
        s.is_valid.then(|| unit.from_mm(s.distance_mm))
    }

    pub fn snapshot(&self) -> AcquisitionSnapshot {
        self.shared.snapshot()
    }

    pub fn is_valid(&self) -> bool {
        self.shared.snapshot().is_valid
    }

    pub fn std_dev(&self) -> f64 {
        self.shared.snapshot().std_dev_mm
    }

    /// Standard deviation a window must stay below to be valid (millimeters).
    pub fn set_validity_threshold(&self, limit_mm: f64) {
        let mut g = self.shared.guarded();
        g.threshold = limit_mm;
        g.recompute();
    }

    pub fn validity_threshold(&self) -> f64 {
        self.shared.guarded().threshold
    }

    /// Drop every held sample; the snapshot stays invalid until the window refills.
    pub fn reset(&self) {
        let mut g = self.shared.guarded();
        g.window.clear();
        g.snapshot.is_valid = false;
        tracing::debug!("sample window cleared");
    }

    pub fn window_len(&self) -> usize {
        self.shared.guarded().window.len()
    }

    /// Time since the last successful transaction or the last `start()`,
    /// whichever is later; since construction if neither happened.
    pub fn stalled_for(&self) -> Duration {
        let now_ms = self.shared.clock.ms_since(self.shared.epoch);
        Duration::from_millis(now_ms.saturating_sub(self.shared.last_ok_ms.load(Ordering::Relaxed)))
    }

    pub fn stats(&self) -> AcquisitionStats {
        AcquisitionStats {
            cycles: self.shared.cycles.load(Ordering::Relaxed),
            transient_errors: self.shared.transient_errors.load(Ordering::Relaxed),
        }
    }

    pub const fn address(&self) -> u8 {
        self.address
    }

    pub const fn period(&self) -> Duration {
        self.period
    }

    /// Register `isValid`, `Distance` (mm) and `Standard Deviation`, all read-only.
    pub fn publish_telemetry(&self, builder: &mut dyn TelemetryBuilder) {
        builder.set_kind("LiDAR");
        let s = self.shared.clone();
        builder.add_bool_property("isValid", Box::new(move || s.snapshot().is_valid), None);
        let s = self.shared.clone();
        builder.add_f64_property("Distance", Box::new(move || s.snapshot().distance_mm), None);
        let s = self.shared.clone();
        builder.add_f64_property(
            "Standard Deviation",
            Box::new(move || s.snapshot().std_dev_mm),
            None,
        );
    }
}

impl<B> Drop for DistanceSensor<B> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Read-only view of a sensor's published values, cheap to clone across threads.
#[derive(Clone)]
pub struct DistanceReader {
    shared: Arc<Shared>,
    unit: DistanceUnit,
}

impl DistanceReader {
    /// Report distances in `unit` (also applies to `MeasurementSource::read`).
    pub fn in_unit(mut self, unit: DistanceUnit) -> Self {
        self.unit = unit;
        self
    }

    pub fn snapshot(&self) -> AcquisitionSnapshot {
        self.shared.snapshot()
    }

    pub fn get_distance(&self) -> f64 {
        self.unit.from_mm(self.snapshot().distance_mm)
    }

    pub fn get_distance_if_valid(&self) -> Option<f64> {
        let s = self.snapshot();
        s.is_valid.then(|| self.unit.from_mm(s.distance_mm))
    }

    pub fn is_valid(&self) -> bool {
        self.snapshot().is_valid
    }
}

impl MeasurementSource for DistanceReader {
    fn read(&mut self) -> Result<f64, BoxError> {
        self.get_distance_if_valid().ok_or_else(|| {
            let s = self.snapshot();
            LoopError::ControlFault(format!(
                "distance not valid (std dev {:.1} mm)",
                s.std_dev_mm
            ))
            .into()
        })
    }
}
