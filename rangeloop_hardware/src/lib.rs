pub mod error;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod rpi;

use rangeloop_traits::{Actuator, BoxError, Bus};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

/// Register that triggers a distance measurement on the device.
const REG_MEASURE: u8 = 0x44;
/// Bulk command answered with the 23-byte settings record.
const CMD_QUERY_SETTINGS: u8 = 0x51;
/// Bulk command `[0x4d, mode]` switching the operation mode.
const CMD_SET_MODE: u8 = 0x4d;
const SETTINGS_LEN: usize = 23;

/// Settings record reported by the simulated device.
///
/// single-step, tinyLiDAR preset, 0.25 MCPS signal limit, sigma 60, 33 ms budget,
/// VCSEL 14/10, firmware 1.4.0, API 1.0.2, watchdog on, LED on measurement,
/// custom offset calibration 25 mm, crosstalk 3 MCPS.
pub const SIM_SETTINGS_RECORD: [u8; SETTINGS_LEN] = [
    0x43, 0x54, 0x40, 0x00, 0x3c, 0x00, 0x21, 0x0e, 0x01, 0x04, 0x00, 0x01, 0x00, 0x02, 0x0d,
    0x00, 0x00, 0x61, 0xa8, 0x00, 0x03, 0x00, 0x00,
];

#[derive(Debug)]
struct PlantState {
    distance_mm: f64,
    velocity_mm_s: f64,
    last: Instant,
}

/// First-order simulated mechanism shared by a simulated sensor and actuator:
/// the actuator output sets a velocity, the sensor observes the integrated distance.
#[derive(Debug, Clone)]
pub struct SimPlant {
    state: Arc<Mutex<PlantState>>,
    max_speed_mm_s: f64,
}

impl SimPlant {
    pub fn new(distance_mm: f64, max_speed_mm_s: f64) -> Self {
        Self {
            state: Arc::new(Mutex::new(PlantState {
                distance_mm,
                velocity_mm_s: 0.0,
                last: Instant::now(),
            })),
            max_speed_mm_s,
        }
    }

    fn advance(state: &mut PlantState) {
        let now = Instant::now();
        let dt = now.saturating_duration_since(state.last).as_secs_f64();
        state.distance_mm = (state.distance_mm + state.velocity_mm_s * dt).max(0.0);
        state.last = now;
    }

    /// Integrated distance at this instant.
    pub fn distance_mm(&self) -> f64 {
        let mut st = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        Self::advance(&mut st);
        st.distance_mm
    }

    fn drive(&self, output: f64) {
        let mut st = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        Self::advance(&mut st);
        st.velocity_mm_s = output * self.max_speed_mm_s;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Idle,
    Distance,
    Settings,
}

/// Simulated time-of-flight ranging device speaking the register protocol.
#[derive(Debug)]
pub struct SimulatedLidar {
    plant: SimPlant,
    noise_mm: f64,
    rng: u32,
    settings: [u8; SETTINGS_LEN],
    settings_len: usize,
    pending: Pending,
    transactions: u64,
}

impl SimulatedLidar {
    /// A device observing a fixed target at `distance_mm`.
    pub fn new(distance_mm: f64) -> Self {
        Self::with_plant(SimPlant::new(distance_mm, 0.0))
    }

    /// A device observing a plant that a `SimulatedActuator` can move.
    pub fn with_plant(plant: SimPlant) -> Self {
        Self {
            plant,
            noise_mm: 0.0,
            rng: 0x9e37_79b9,
            settings: SIM_SETTINGS_RECORD,
            settings_len: SETTINGS_LEN,
            pending: Pending::Idle,
            transactions: 0,
        }
    }

    /// Add uniform pseudo-random noise of `±noise_mm` to every reading.
    pub fn with_noise(mut self, noise_mm: f64) -> Self {
        self.noise_mm = noise_mm.abs();
        self
    }

    /// Answer settings queries with only the first `len` bytes of the record.
    pub fn with_truncated_settings(mut self, len: usize) -> Self {
        self.settings_len = len.min(SETTINGS_LEN);
        self
    }

    /// Number of completed read transactions.
    pub fn transactions(&self) -> u64 {
        self.transactions
    }

    fn next_noise(&mut self) -> f64 {
        let mut x = self.rng;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.rng = x;
        let unit = f64::from(x) / f64::from(u32::MAX);
        (unit * 2.0 - 1.0) * self.noise_mm
    }

    fn sample_mm(&mut self) -> i16 {
        let mm = self.plant.distance_mm() + self.next_noise();
        mm.round().clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16
    }
}

impl Bus for SimulatedLidar {
    fn write_register(&mut self, register: u8, _value: u8) -> Result<(), BoxError> {
        if register != REG_MEASURE {
            return Err(error::HwError::Bus(format!("unknown register 0x{register:02x}")).into());
        }
        self.pending = Pending::Distance;
        Ok(())
    }

    fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>, BoxError> {
        let pending = std::mem::replace(&mut self.pending, Pending::Idle);
        let reply = match pending {
            Pending::Idle => return Err(error::HwError::NoPendingRequest.into()),
            Pending::Distance => {
                let mm = self.sample_mm();
                tracing::trace!(distance_mm = mm, "sim lidar sample");
                mm.to_be_bytes().to_vec()
            }
            Pending::Settings => self.settings[..self.settings_len].to_vec(),
        };
        self.transactions += 1;
        Ok(reply.into_iter().take(count).collect())
    }

    fn write_bulk(&mut self, bytes: &[u8]) -> Result<(), BoxError> {
        match bytes {
            [CMD_QUERY_SETTINGS] => {
                self.pending = Pending::Settings;
                Ok(())
            }
            [CMD_SET_MODE, mode] => {
                self.settings[0] = *mode;
                tracing::debug!(mode = *mode, "sim lidar mode change");
                Ok(())
            }
            other => Err(error::HwError::Bus(format!("unsupported bulk command {other:02x?}")).into()),
        }
    }
}

/// Simulated motor controller; optionally drives a `SimPlant`.
#[derive(Debug, Default)]
pub struct SimulatedActuator {
    plant: Option<SimPlant>,
    inverted: bool,
    output: f64,
    writes: u64,
}

impl SimulatedActuator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn driving(plant: SimPlant) -> Self {
        Self {
            plant: Some(plant),
            ..Self::default()
        }
    }

    /// Last commanded output after inversion.
    pub fn output(&self) -> f64 {
        self.output
    }

    pub fn writes(&self) -> u64 {
        self.writes
    }
}

impl Actuator for SimulatedActuator {
    fn set_output(&mut self, value: f64) -> Result<(), BoxError> {
        if !(-1.0..=1.0).contains(&value) {
            return Err(error::HwError::Pwm(format!("output {value} outside [-1, 1]")).into());
        }
        self.output = if self.inverted { -value } else { value };
        self.writes += 1;
        if let Some(plant) = &self.plant {
            plant.drive(self.output);
        }
        Ok(())
    }

    fn set_inverted(&mut self, inverted: bool) -> Result<(), BoxError> {
        self.inverted = inverted;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), BoxError> {
        self.output = 0.0;
        if let Some(plant) = &self.plant {
            plant.drive(0.0);
        }
        tracing::debug!("sim actuator stopped");
        Ok(())
    }
}
