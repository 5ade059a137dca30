#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the ranging sensor and control loop.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Every section is optional; omitted fields take the device defaults.
use serde::Deserialize;
use serde::de::Deserializer;

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SensorCfg {
    /// I2C bus number (`/dev/i2c-N`).
    pub i2c_bus: u8,
    /// 7-bit device address.
    pub address: u8,
    /// Rolling window size in samples.
    pub window: usize,
    /// Readings are invalid while the window std dev is at or above this (mm).
    pub std_dev_limit_mm: f64,
    pub poll_hz: u32,
}

impl Default for SensorCfg {
    fn default() -> Self {
        Self {
            i2c_bus: 1,
            address: 0x10,
            window: 25,
            std_dev_limit_mm: 100.0,
            poll_hz: 50,
        }
    }
}

/// One `{p, i, d, f}` gain set.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct Profile {
    pub p: f64,
    #[serde(default)]
    pub i: f64,
    #[serde(default)]
    pub d: f64,
    #[serde(default)]
    pub f: f64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ControlCfg {
    pub period_ms: u64,
    /// Bound on the integral term's contribution to the output.
    pub integral_limit: f64,
    pub inverted: bool,
    /// Gain profiles. Accepts either:
    /// - array of tables: [{ p = 0.01, i = 0.0, d = 0.0, f = 0.0 }, ...]
    /// - array of tuples: [[0.01, 0.0, 0.0, 0.0], ...]
    #[serde(deserialize_with = "de_profiles")]
    pub profiles: Vec<Profile>,
    /// Slot active after start.
    pub default_slot: usize,
}

impl Default for ControlCfg {
    fn default() -> Self {
        Self {
            period_ms: 20,
            integral_limit: 1.0,
            inverted: false,
            profiles: vec![Profile {
                p: 0.005,
                i: 0.0,
                d: 0.0,
                f: 0.0,
            }],
            default_slot: 0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ProfileToml {
    Tuple((f64, f64, f64, f64)),
    Table(Profile),
}

fn de_profiles<'de, D>(deserializer: D) -> Result<Vec<Profile>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt: Option<Vec<ProfileToml>> = Option::deserialize(deserializer)?;
    let mut out = Vec::new();
    if let Some(items) = opt {
        for item in items {
            match item {
                ProfileToml::Tuple((p, i, d, f)) => out.push(Profile { p, i, d, f }),
                ProfileToml::Table(profile) => out.push(profile),
            }
        }
    }
    Ok(out)
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ActuatorCfg {
    /// Hardware PWM channel (0 or 1).
    pub pwm_channel: u8,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub sensor: SensorCfg,
    pub control: ControlCfg,
    pub actuator: ActuatorCfg,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Sensor
        if self.sensor.address > 0x7f {
            eyre::bail!("sensor.address must be a 7-bit address (<= 0x7f)");
        }
        if self.sensor.window == 0 {
            eyre::bail!("sensor.window must be >= 1");
        }
        if self.sensor.poll_hz == 0 {
            eyre::bail!("sensor.poll_hz must be > 0");
        }
        if !(self.sensor.std_dev_limit_mm.is_finite() && self.sensor.std_dev_limit_mm > 0.0) {
            eyre::bail!("sensor.std_dev_limit_mm must be finite and > 0");
        }

        // Control
        if self.control.period_ms == 0 {
            eyre::bail!("control.period_ms must be > 0");
        }
        if !(self.control.integral_limit.is_finite() && self.control.integral_limit >= 0.0) {
            eyre::bail!("control.integral_limit must be finite and >= 0");
        }
        if self.control.profiles.is_empty() {
            eyre::bail!("control.profiles must contain at least one profile");
        }
        for (slot, p) in self.control.profiles.iter().enumerate() {
            if !(p.p.is_finite() && p.i.is_finite() && p.d.is_finite() && p.f.is_finite()) {
                eyre::bail!("control.profiles[{slot}] has a non-finite gain");
            }
        }
        if self.control.default_slot >= self.control.profiles.len() {
            eyre::bail!(
                "control.default_slot {} out of range (have {} profiles)",
                self.control.default_slot,
                self.control.profiles.len()
            );
        }

        // Actuator
        if self.actuator.pwm_channel > 1 {
            eyre::bail!("actuator.pwm_channel must be 0 or 1");
        }

        // Logging
        if let Some(r) = self.logging.rotation.as_deref()
            && !matches!(r, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never, daily, hourly (got {r:?})");
        }

        Ok(())
    }
}
