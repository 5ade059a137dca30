//! Runtime configuration for the acquisition service and the control loop.
//!
//! These are separate from the TOML-deserialized config in `rangeloop_config`.

use std::time::Duration;

use crate::builder::{DEFAULT_INTEGRAL_LIMIT, DEFAULT_PERIOD};
use crate::controller::GainProfile;
use crate::error::LoopError;

/// Ranging sensor settings.
#[derive(Debug, Clone)]
pub struct SensorCfg {
    /// 7-bit bus address.
    pub address: u8,
    /// Rolling window size in samples.
    pub window: usize,
    /// Window standard deviation (mm) at or above which readings are invalid.
    pub std_dev_limit_mm: f64,
    /// Acquisition cadence. The device refreshes at 60 Hz.
    pub poll_hz: u32,
}

impl Default for SensorCfg {
    fn default() -> Self {
        Self {
            address: 0x10,
            window: 25,
            std_dev_limit_mm: 100.0,
            poll_hz: 50,
        }
    }
}

impl SensorCfg {
    pub fn validate(&self) -> Result<(), LoopError> {
        if self.window == 0 {
            return Err(LoopError::Config("sensor window must be >= 1".into()));
        }
        if self.poll_hz == 0 {
            return Err(LoopError::Config("sensor poll_hz must be >= 1".into()));
        }
        if !(self.std_dev_limit_mm.is_finite() && self.std_dev_limit_mm > 0.0) {
            return Err(LoopError::Config(format!(
                "std_dev_limit_mm must be finite and > 0 (got {})",
                self.std_dev_limit_mm
            )));
        }
        Ok(())
    }
}

/// Control loop settings.
#[derive(Debug, Clone)]
pub struct ControlCfg {
    pub period: Duration,
    pub integral_limit: f64,
    pub inverted: bool,
    pub profiles: Vec<GainProfile>,
    pub default_slot: usize,
}

impl Default for ControlCfg {
    fn default() -> Self {
        Self {
            period: DEFAULT_PERIOD,
            integral_limit: DEFAULT_INTEGRAL_LIMIT,
            inverted: false,
            profiles: Vec::new(),
            default_slot: 0,
        }
    }
}
