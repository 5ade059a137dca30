//! Software PID loop with feedforward, driven by a `PeriodicTimer`.
//!
//! Output per tick: `f * setpoint + p * e + i * ∫e dt + d * (-dmeas/dt)`, with
//! `e = setpoint - measurement` and `dt` the nominal period. The integral is
//! clamped so that `|i * ∫e dt| <= integral_limit`; the sum is clamped to
//! `[-1, 1]` before it reaches the actuator.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rangeloop_traits::clock::Clock;
use rangeloop_traits::{Actuator, MeasurementSource, TelemetryBuilder};

use crate::error::LoopError;
use crate::status::{ControllerStats, TickOutcome};
use crate::timer::PeriodicTimer;

/// One set of loop coefficients.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GainProfile {
    pub p: f64,
    pub i: f64,
    pub d: f64,
    pub f: f64,
}

impl GainProfile {
    pub const fn new(p: f64, i: f64, d: f64, f: f64) -> Self {
        Self { p, i, d, f }
    }

    pub fn is_finite(&self) -> bool {
        self.p.is_finite() && self.i.is_finite() && self.d.is_finite() && self.f.is_finite()
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct PidState {
    integral: f64,
    prev_measurement: Option<f64>,
}

pub(crate) struct LoopState<A, M> {
    actuator: A,
    measurement: M,
    setpoint: f64,
    profiles: Vec<GainProfile>,
    active: GainProfile,
    active_slot: Option<usize>,
    enabled: bool,
    pid: PidState,
    integral_limit: f64,
    dt: f64,
    last_output: f64,
    stats: ControllerStats,
}

impl<A: Actuator, M: MeasurementSource> LoopState<A, M> {
    fn fault(&mut self, msg: String) -> TickOutcome {
        self.stats.faults += 1;
        tracing::warn!(faults = self.stats.faults, reason = %msg, "control tick skipped");
        TickOutcome::Fault(LoopError::ControlFault(msg))
    }

    fn compute(&mut self, measurement: f64) -> f64 {
        let g = self.active;
        let error = self.setpoint - measurement;
        if g.i != 0.0 {
            self.pid.integral += error * self.dt;
            let bound = self.integral_limit / g.i.abs();
            self.pid.integral = self.pid.integral.clamp(-bound, bound);
        }
        let derivative = self
            .pid
            .prev_measurement
            .map_or(0.0, |prev| -(measurement - prev) / self.dt);
        self.pid.prev_measurement = Some(measurement);
        g.f * self.setpoint + g.p * error + g.i * self.pid.integral + g.d * derivative
    }

    fn tick(&mut self) -> TickOutcome {
        self.stats.ticks += 1;
        if !self.enabled {
            return TickOutcome::Suppressed;
        }
        let measurement = match self.measurement.read() {
            Ok(v) if v.is_finite() => v,
            Ok(v) => return self.fault(format!("non-finite measurement {v}")),
            Err(e) => return self.fault(format!("measurement failed: {e}")),
        };
        let raw = self.compute(measurement);
        if !raw.is_finite() {
            return self.fault(format!("non-finite output {raw}"));
        }
        let out = raw.clamp(-1.0, 1.0);
        if let Err(e) = self.actuator.set_output(out) {
            return self.fault(format!("actuator rejected {out}: {e}"));
        }
        self.last_output = out;
        self.stats.writes += 1;
        tracing::trace!(setpoint = self.setpoint, measurement, output = out, "control tick");
        TickOutcome::Written(out)
    }

    fn adopt(&mut self, profile: GainProfile, slot: Option<usize>) {
        self.active = profile;
        self.active_slot = slot;
        self.pid = PidState::default();
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Closed-loop controller. Ticks run on the timer thread once `start()` is
/// called; every other method may be called from any thread.
pub struct ClosedLoopController<A, M> {
    state: Arc<Mutex<LoopState<A, M>>>,
    period: Duration,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    timer: Option<PeriodicTimer>,
}

impl<A, M> core::fmt::Debug for ClosedLoopController<A, M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let st = lock(&self.state);
        f.debug_struct("ClosedLoopController")
            .field("setpoint", &st.setpoint)
            .field("active", &st.active)
            .field("enabled", &st.enabled)
            .field("period", &self.period)
            .finish_non_exhaustive()
    }
}

impl<A, M> ClosedLoopController<A, M>
where
    A: Actuator + Send + 'static,
    M: MeasurementSource + Send + 'static,
{
    pub(crate) fn from_parts(
        actuator: A,
        measurement: M,
        period: Duration,
        profiles: Vec<GainProfile>,
        default_slot: usize,
        integral_limit: f64,
        clock: Option<Arc<dyn Clock + Send + Sync>>,
    ) -> Self {
        let active = profiles.get(default_slot).copied().unwrap_or_default();
        let active_slot = (!profiles.is_empty()).then_some(default_slot);
        Self {
            state: Arc::new(Mutex::new(LoopState {
                actuator,
                measurement,
                setpoint: 0.0,
                profiles,
                active,
                active_slot,
                enabled: true,
                pid: PidState::default(),
                integral_limit,
                dt: period.as_secs_f64(),
                last_output: 0.0,
                stats: ControllerStats::default(),
            })),
            period,
            clock,
            timer: None,
        }
    }

    /// Replace the active coefficients. With no stored profiles, `profile`
    /// also becomes slot 0.
    pub fn set_gain_profile(&self, profile: GainProfile) {
        let mut st = lock(&self.state);
        let slot = if st.profiles.is_empty() {
            st.profiles.push(profile);
            Some(0)
        } else {
            None
        };
        st.adopt(profile, slot);
    }

    /// Store a profile and return its slot.
    pub fn add_profile(&self, profile: GainProfile) -> usize {
        let mut st = lock(&self.state);
        st.profiles.push(profile);
        st.profiles.len() - 1
    }

    /// Store a profile and make it active.
    pub fn add_default_profile(&self, profile: GainProfile) -> usize {
        let mut st = lock(&self.state);
        st.profiles.push(profile);
        let slot = st.profiles.len() - 1;
        st.adopt(profile, Some(slot));
        slot
    }

    pub fn select_profile(&self, slot: usize) -> Result<(), LoopError> {
        let mut st = lock(&self.state);
        let Some(profile) = st.profiles.get(slot).copied() else {
            return Err(LoopError::OutOfRange {
                slot,
                len: st.profiles.len(),
            });
        };
        st.adopt(profile, Some(slot));
        tracing::debug!(slot, ?profile, "gain profile selected");
        Ok(())
    }

    pub fn set_setpoint(&self, value: f64) {
        lock(&self.state).setpoint = value;
    }

    /// Resume writing on the next tick; integral and derivative history start fresh.
    pub fn enable(&self) {
        let mut st = lock(&self.state);
        if !st.enabled {
            st.enabled = true;
            st.pid = PidState::default();
        }
    }

    /// Stop writing from the next tick on. The timer keeps running.
    pub fn disable(&self) {
        lock(&self.state).enabled = false;
    }

    pub fn set_inverted(&self, inverted: bool) -> Result<(), LoopError> {
        lock(&self.state)
            .actuator
            .set_inverted(inverted)
            .map_err(|e| LoopError::ControlFault(format!("set_inverted: {e}")))
    }

    /// Run one control step on the calling thread.
    pub fn tick(&self) -> TickOutcome {
        lock(&self.state).tick()
    }

    /// Start the periodic tick.
    pub fn start(&mut self) -> Result<(), LoopError> {
        if self.timer.is_none() {
            let state = Arc::clone(&self.state);
            let mut timer = PeriodicTimer::new(self.period, move |handle| {
                let _ = lock(&state).tick();
                handle.reset();
            })?
            .with_name("control-loop");
            if let Some(clock) = &self.clock {
                timer = timer.with_clock(Arc::clone(clock));
            }
            timer.suppress_overrun_log(true);
            self.timer = Some(timer);
        }
        lock(&self.state).pid = PidState::default();
        if let Some(timer) = self.timer.as_mut() {
            timer.enable()?;
        }
        tracing::info!(period_ms = self.period.as_millis() as u64, "control loop started");
        Ok(())
    }

    /// Stop the periodic tick and command the actuator to stop.
    pub fn stop(&mut self) -> Result<(), LoopError> {
        if let Some(timer) = self.timer.as_mut() {
            timer.disable();
        }
        let mut st = lock(&self.state);
        st.last_output = 0.0;
        st.actuator
            .stop()
            .map_err(|e| LoopError::ControlFault(format!("actuator stop: {e}")))?;
        tracing::info!(ticks = st.stats.ticks, faults = st.stats.faults, "control loop stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.timer.as_ref().is_some_and(PeriodicTimer::is_enabled)
    }

    pub fn setpoint(&self) -> f64 {
        lock(&self.state).setpoint
    }

    pub fn is_enabled(&self) -> bool {
        lock(&self.state).enabled
    }

    pub fn last_output(&self) -> f64 {
        lock(&self.state).last_output
    }

    pub fn active_profile(&self) -> GainProfile {
        lock(&self.state).active
    }

    /// Slot of the active profile, if it came from the stored list.
    pub fn active_slot(&self) -> Option<usize> {
        lock(&self.state).active_slot
    }

    pub fn profile_count(&self) -> usize {
        lock(&self.state).profiles.len()
    }

    pub fn stats(&self) -> ControllerStats {
        lock(&self.state).stats
    }

    pub fn overrun_count(&self) -> u64 {
        self.timer.as_ref().map_or(0, PeriodicTimer::overrun_count)
    }

    pub const fn period(&self) -> Duration {
        self.period
    }

    /// Register `setpoint` and `enabled` (read/write) and `output` (read-only).
    pub fn publish_telemetry(&self, builder: &mut dyn TelemetryBuilder) {
        builder.set_kind("PIDController");

        let (g, s) = (Arc::clone(&self.state), Arc::clone(&self.state));
        builder.add_f64_property(
            "setpoint",
            Box::new(move || lock(&g).setpoint),
            Some(Box::new(move |v| lock(&s).setpoint = v)),
        );

        let (g, s) = (Arc::clone(&self.state), Arc::clone(&self.state));
        builder.add_bool_property(
            "enabled",
            Box::new(move || lock(&g).enabled),
            Some(Box::new(move |on| {
                let mut st = lock(&s);
                if on && !st.enabled {
                    st.pid = PidState::default();
                }
                st.enabled = on;
            })),
        );

        let g = Arc::clone(&self.state);
        builder.add_f64_property("output", Box::new(move || lock(&g).last_output), None);
    }
}

impl<A, M> Drop for ClosedLoopController<A, M> {
    fn drop(&mut self) {
        if let Some(mut timer) = self.timer.take() {
            if timer.is_enabled() {
                timer.disable();
                tracing::debug!("control loop dropped while running");
            }
        }
    }
}
