//! Builder for `ClosedLoopController`.
//!
//! All fields are validated on `build()`; a missing actuator or measurement
//! source is reported as a `BuildError` rather than a panic.

use std::sync::Arc;
use std::time::Duration;

use rangeloop_traits::clock::Clock;
use rangeloop_traits::{Actuator, MeasurementSource};

use crate::controller::{ClosedLoopController, GainProfile};
use crate::error::BuildError;

/// Default loop rate: 50 Hz.
pub const DEFAULT_PERIOD: Duration = Duration::from_millis(20);
/// Default bound on `|i * integral|`.
pub const DEFAULT_INTEGRAL_LIMIT: f64 = 1.0;

pub struct ControllerBuilder<A, M> {
    actuator: Option<A>,
    measurement: Option<M>,
    period: Duration,
    profiles: Vec<GainProfile>,
    default_slot: usize,
    setpoint: f64,
    integral_limit: f64,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
}

impl<A, M> Default for ControllerBuilder<A, M> {
    fn default() -> Self {
        Self {
            actuator: None,
            measurement: None,
            period: DEFAULT_PERIOD,
            profiles: Vec::new(),
            default_slot: 0,
            setpoint: 0.0,
            integral_limit: DEFAULT_INTEGRAL_LIMIT,
            clock: None,
        }
    }
}

impl<A, M> ClosedLoopController<A, M>
where
    A: Actuator + Send + 'static,
    M: MeasurementSource + Send + 'static,
{
    /// Start building a controller.
    pub fn builder() -> ControllerBuilder<A, M> {
        ControllerBuilder::default()
    }
}

impl<A, M> ControllerBuilder<A, M>
where
    A: Actuator + Send + 'static,
    M: MeasurementSource + Send + 'static,
{
    pub fn with_actuator(mut self, actuator: A) -> Self {
        self.actuator = Some(actuator);
        self
    }

    pub fn with_measurement(mut self, measurement: M) -> Self {
        self.measurement = Some(measurement);
        self
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Stored gain profiles; slot 0 is active unless `with_default_slot` says otherwise.
    pub fn with_profiles(mut self, profiles: impl IntoIterator<Item = GainProfile>) -> Self {
        self.profiles = profiles.into_iter().collect();
        self
    }

    pub fn with_default_slot(mut self, slot: usize) -> Self {
        self.default_slot = slot;
        self
    }

    pub fn with_setpoint(mut self, setpoint: f64) -> Self {
        self.setpoint = setpoint;
        self
    }

    pub fn with_integral_limit(mut self, limit: f64) -> Self {
        self.integral_limit = limit;
        self
    }

    /// Time source for the loop timer (tests use a manual clock).
    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Result<ClosedLoopController<A, M>, BuildError> {
        let actuator = self.actuator.ok_or(BuildError::MissingActuator)?;
        let measurement = self.measurement.ok_or(BuildError::MissingMeasurement)?;
        if self.period.is_zero() {
            return Err(BuildError::InvalidConfig("period must be > 0"));
        }
        if !(self.integral_limit >= 0.0) {
            return Err(BuildError::InvalidConfig("integral limit must be >= 0"));
        }
        if !self.profiles.iter().all(GainProfile::is_finite) {
            return Err(BuildError::InvalidConfig("gains must be finite"));
        }
        if !self.profiles.is_empty() && self.default_slot >= self.profiles.len() {
            return Err(BuildError::InvalidConfig("default slot out of range"));
        }
        if !self.setpoint.is_finite() {
            return Err(BuildError::InvalidConfig("setpoint must be finite"));
        }
        let ctl = ClosedLoopController::from_parts(
            actuator,
            measurement,
            self.period,
            self.profiles,
            self.default_slot,
            self.integral_limit,
            self.clock,
        );
        ctl.set_setpoint(self.setpoint);
        Ok(ctl)
    }
}
