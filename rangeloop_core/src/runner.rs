//! Orchestration helpers used by the CLI: monitor, hold and self-check.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use eyre::WrapErr;
use rangeloop_traits::{Actuator, Bus};

use crate::acquisition::{AcquisitionSnapshot, AcquisitionStats, DistanceSensor};
use crate::config::ControlCfg;
use crate::controller::ClosedLoopController;
use crate::error::Result;
use crate::settings::DeviceSettings;
use crate::status::ControllerStats;

/// Compute the stall watchdog threshold from the acquisition period.
///
/// Spans at least ten periods so a burst of transient bus errors does not trip
/// it, and never drops below 200 ms.
#[inline]
pub fn stall_threshold(poll_period: Duration) -> Duration {
    poll_period
        .saturating_mul(10)
        .max(Duration::from_millis(200))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MonitorSummary {
    pub reports: u64,
    pub valid_reports: u64,
    pub last: AcquisitionSnapshot,
    pub stats: AcquisitionStats,
}

/// Run acquisition for `duration` (or until `stop` is set), calling `report`
/// once per acquisition period with the current snapshot.
pub fn monitor<B, F>(
    sensor: &mut DistanceSensor<B>,
    duration: Duration,
    stop: &AtomicBool,
    mut report: F,
) -> Result<MonitorSummary>
where
    B: Bus + Send + 'static,
    F: FnMut(&AcquisitionSnapshot),
{
    sensor.start().wrap_err("start acquisition")?;
    let started = Instant::now();
    let mut summary = MonitorSummary::default();
    while started.elapsed() < duration && !stop.load(Ordering::Relaxed) {
        std::thread::sleep(sensor.period());
        let snap = sensor.snapshot();
        summary.reports += 1;
        if snap.is_valid {
            summary.valid_reports += 1;
        }
        report(&snap);
    }
    sensor.stop();
    summary.last = sensor.snapshot();
    summary.stats = sensor.stats();
    tracing::info!(
        reports = summary.reports,
        valid = summary.valid_reports,
        cycles = summary.stats.cycles,
        transient_errors = summary.stats.transient_errors,
        "monitor finished"
    );
    Ok(summary)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HoldSummary {
    pub controller: ControllerStats,
    pub overruns: u64,
    pub final_distance_mm: f64,
    pub final_output: f64,
    pub acquisition: AcquisitionStats,
}

/// Close the loop sensor → controller → actuator around `setpoint_mm`.
///
/// Aborts if the sensor reports no successful transaction for longer than
/// `stall_threshold`; the actuator is stopped on every exit path.
pub fn hold<B, A>(
    sensor: &mut DistanceSensor<B>,
    actuator: A,
    control: &ControlCfg,
    setpoint_mm: f64,
    profile: Option<usize>,
    duration: Duration,
    stop: &AtomicBool,
) -> Result<HoldSummary>
where
    B: Bus + Send + 'static,
    A: Actuator + Send + 'static,
{
    let mut ctl = ClosedLoopController::builder()
        .with_actuator(actuator)
        .with_measurement(sensor.reader())
        .with_period(control.period)
        .with_profiles(control.profiles.iter().copied())
        .with_default_slot(control.default_slot)
        .with_integral_limit(control.integral_limit)
        .with_setpoint(setpoint_mm)
        .build()
        .wrap_err("build controller")?;
    if let Some(slot) = profile {
        ctl.select_profile(slot)?;
    }
    if control.inverted {
        ctl.set_inverted(true)?;
    }

    sensor.start().wrap_err("start acquisition")?;
    ctl.start().wrap_err("start control loop")?;

    let threshold = stall_threshold(sensor.period());
    let started = Instant::now();
    let mut stalled = None;
    while started.elapsed() < duration && !stop.load(Ordering::Relaxed) {
        std::thread::sleep(control.period);
        let stalled_for = sensor.stalled_for();
        // Ignore start-up: the first transaction has not completed yet.
        if started.elapsed() > threshold && stalled_for > threshold {
            stalled = Some(stalled_for);
            break;
        }
    }

    let stopped = ctl.stop();
    sensor.stop();
    stopped.wrap_err("stop control loop")?;

    if let Some(d) = stalled {
        tracing::error!(stalled_ms = d.as_millis() as u64, "sensor stalled; hold aborted");
        eyre::bail!(
            "sensor stalled: no reading for {} ms (threshold {} ms)",
            d.as_millis(),
            threshold.as_millis()
        );
    }

    let summary = HoldSummary {
        controller: ctl.stats(),
        overruns: ctl.overrun_count(),
        final_distance_mm: sensor.snapshot().distance_mm,
        final_output: ctl.last_output(),
        acquisition: sensor.stats(),
    };
    tracing::info!(
        ticks = summary.controller.ticks,
        writes = summary.controller.writes,
        faults = summary.controller.faults,
        final_distance_mm = summary.final_distance_mm,
        "hold finished"
    );
    Ok(summary)
}

#[derive(Debug, Clone)]
pub struct SelfCheckReport {
    pub settings: DeviceSettings,
    pub samples_ok: usize,
    pub samples_failed: usize,
    pub snapshot: AcquisitionSnapshot,
}

/// One settings query followed by a burst of `burst` acquisition cycles on the
/// calling thread.
pub fn self_check<B>(sensor: &DistanceSensor<B>, burst: usize) -> Result<SelfCheckReport>
where
    B: Bus + Send + 'static,
{
    let settings = sensor.query_settings().wrap_err("query device settings")?;
    let mut ok = 0;
    let mut failed = 0;
    for _ in 0..burst {
        match sensor.poll_once() {
            Ok(_) => ok += 1,
            Err(_) => failed += 1,
        }
        std::thread::sleep(sensor.period());
    }
    if burst > 0 && ok == 0 {
        eyre::bail!("no successful distance reading in {burst} attempts");
    }
    Ok(SelfCheckReport {
        settings,
        samples_ok: ok,
        samples_failed: failed,
        snapshot: sensor.snapshot(),
    })
}
