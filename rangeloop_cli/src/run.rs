//! Command execution: config mapping, hardware assembly and output rendering.

use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use eyre::WrapErr;
use rangeloop_config::Config;
use rangeloop_core::runner::{self, HoldSummary, MonitorSummary, SelfCheckReport};
use rangeloop_core::{
    AcquisitionSnapshot, ControlCfg, DeviceSettings, DistanceSensor, DistanceUnit, OperationMode,
    SensorCfg,
};
use serde_json::json;

use crate::backend;
use crate::rt::{RtRequest, setup_rt_once};

fn unit_label(unit: DistanceUnit) -> &'static str {
    match unit {
        DistanceUnit::Millimeters => "mm",
        DistanceUnit::Inches => "in",
    }
}

fn print_snapshot(snap: &AcquisitionSnapshot, unit: DistanceUnit, json: bool) {
    let distance = unit.from_mm(snap.distance_mm);
    if json {
        println!(
            "{}",
            json!({
                "distance": distance,
                "unit": unit_label(unit),
                "std_dev_mm": snap.std_dev_mm,
                "valid": snap.is_valid,
            })
        );
    } else {
        println!(
            "distance: {distance:>9.2} {}  sd: {:>7.2} mm  {}",
            unit_label(unit),
            snap.std_dev_mm,
            if snap.is_valid { "valid" } else { "INVALID" }
        );
    }
}

pub fn monitor(
    cfg: &Config,
    duration_ms: u64,
    inches: bool,
    std_dev_limit: Option<f64>,
    json: bool,
    stop: &AtomicBool,
) -> eyre::Result<MonitorSummary> {
    let mut sensor_cfg = SensorCfg::from(&cfg.sensor);
    if let Some(limit) = std_dev_limit {
        sensor_cfg.std_dev_limit_mm = limit;
    }
    let unit = if inches {
        DistanceUnit::Inches
    } else {
        DistanceUnit::Millimeters
    };
    let mut sensor = DistanceSensor::new(backend::open_sensor(cfg)?, &sensor_cfg)?;
    let summary = runner::monitor(
        &mut sensor,
        Duration::from_millis(duration_ms),
        stop,
        |snap| print_snapshot(snap, unit, json),
    )?;

    let last = summary.last;
    if json {
        println!(
            "{}",
            json!({
                "summary": {
                    "reports": summary.reports,
                    "valid_reports": summary.valid_reports,
                    "cycles": summary.stats.cycles,
                    "transient_errors": summary.stats.transient_errors,
                    "distance": unit.from_mm(last.distance_mm),
                    "unit": unit_label(unit),
                    "valid": last.is_valid,
                }
            })
        );
    } else {
        println!(
            "monitor finished: {} reports ({} valid), {} cycles, {} transient errors",
            summary.reports, summary.valid_reports, summary.stats.cycles, summary.stats.transient_errors
        );
    }
    Ok(summary)
}

fn settings_json(s: &DeviceSettings) -> serde_json::Value {
    json!({
        "operation_mode": format!("{:?}", s.operation_mode),
        "preset": format!("{:?}", s.preset),
        "signal_rate_limit": s.signal_rate_limit,
        "sigma_estimate_limit": s.sigma_estimate_limit,
        "timing_budget_ms": s.timing_budget_ms,
        "pre_range_vcsel_period": s.vcsel.map(|v| v.pre_range),
        "final_range_vcsel_period": s.vcsel.map(|v| v.final_range),
        "firmware_version": s.firmware_version,
        "api_version": s.api_version,
        "offset_calibration": format!("{:?}", s.offset_calibration),
        "offset_calibration_value": s.offset_calibration_value,
        "crosstalk_calibration_value": s.crosstalk_calibration_value,
        "led_indicator": format!("{:?}", s.led_indicator),
        "watchdog_enabled": s.watchdog_enabled,
    })
}

pub fn settings(cfg: &Config, out: Option<&Path>, json: bool) -> eyre::Result<DeviceSettings> {
    let sensor = DistanceSensor::new(backend::open_sensor(cfg)?, &SensorCfg::from(&cfg.sensor))?;
    let settings = sensor
        .query_settings()
        .wrap_err("query device settings")?;
    let text = if json {
        settings_json(&settings).to_string()
    } else {
        settings.to_string()
    };
    println!("{text}");
    if let Some(path) = out {
        rangeloop_core::atomic::write_atomic(path, format!("{text}\n").as_bytes())
            .wrap_err_with(|| format!("write settings to {}", path.display()))?;
        tracing::info!(path = %path.display(), "settings written");
    }
    Ok(settings)
}

pub fn set_mode(cfg: &Config, mode: OperationMode, json: bool) -> eyre::Result<()> {
    let sensor = DistanceSensor::new(backend::open_sensor(cfg)?, &SensorCfg::from(&cfg.sensor))?;
    sensor
        .set_mode(mode)
        .wrap_err_with(|| format!("set operation mode {mode:?}"))?;
    if json {
        println!("{}", json!({ "mode": format!("{mode:?}"), "byte": mode.to_byte() }));
    } else {
        println!("operation mode set to {mode:?} (0x{:02x})", mode.to_byte());
    }
    Ok(())
}

pub fn hold(
    cfg: &Config,
    setpoint_mm: f64,
    profile: Option<usize>,
    duration_ms: u64,
    rt: Option<RtRequest>,
    json: bool,
    stop: &AtomicBool,
) -> eyre::Result<HoldSummary> {
    if !setpoint_mm.is_finite() {
        eyre::bail!("--setpoint-mm must be finite (got {setpoint_mm})");
    }
    if let Some(req) = rt {
        setup_rt_once(req);
    }
    let control = ControlCfg::from(&cfg.control);
    let (bus, motor) = backend::open_loop(cfg)?;
    let mut sensor = DistanceSensor::new(bus, &SensorCfg::from(&cfg.sensor))?;
    tracing::info!(setpoint_mm, ?profile, duration_ms, "hold start");
    let summary = runner::hold(
        &mut sensor,
        motor,
        &control,
        setpoint_mm,
        profile,
        Duration::from_millis(duration_ms),
        stop,
    )?;

    if json {
        println!(
            "{}",
            json!({
                "setpoint_mm": setpoint_mm,
                "final_distance_mm": summary.final_distance_mm,
                "final_output": summary.final_output,
                "ticks": summary.controller.ticks,
                "writes": summary.controller.writes,
                "faults": summary.controller.faults,
                "overruns": summary.overruns,
                "acquisition_cycles": summary.acquisition.cycles,
                "transient_errors": summary.acquisition.transient_errors,
            })
        );
    } else {
        println!(
            "hold complete: setpoint {setpoint_mm:.1} mm, final {:.1} mm, output {:+.3}",
            summary.final_distance_mm, summary.final_output
        );
        println!(
            "ticks {} / writes {} / faults {} / overruns {}",
            summary.controller.ticks,
            summary.controller.writes,
            summary.controller.faults,
            summary.overruns
        );
    }
    Ok(summary)
}

pub fn self_check(cfg: &Config, burst: usize, json: bool) -> eyre::Result<SelfCheckReport> {
    let sensor = DistanceSensor::new(backend::open_sensor(cfg)?, &SensorCfg::from(&cfg.sensor))?;
    let report = runner::self_check(&sensor, burst)?;
    if json {
        println!(
            "{}",
            json!({
                "ok": true,
                "firmware_version": report.settings.firmware_version,
                "operation_mode": format!("{:?}", report.settings.operation_mode),
                "samples_ok": report.samples_ok,
                "samples_failed": report.samples_failed,
                "distance_mm": report.snapshot.distance_mm,
                "valid": report.snapshot.is_valid,
            })
        );
    } else {
        println!(
            "OK: firmware {} ({:?}), {}/{} samples, distance {:.1} mm",
            report.settings.firmware_version,
            report.settings.operation_mode,
            report.samples_ok,
            report.samples_ok + report.samples_failed,
            report.snapshot.distance_mm
        );
    }
    Ok(report)
}
