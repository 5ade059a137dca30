//! Hardware assembly: the simulated rig by default, Raspberry Pi peripherals
//! with `--features hardware` on Linux.

use rangeloop_config::Config;

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
pub use sim::{Motor, SensorBus, open_loop, open_sensor};

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub use rpi::{Motor, SensorBus, open_loop, open_sensor};

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
mod sim {
    use super::Config;
    use eyre::WrapErr;
    use rangeloop_hardware::{SimPlant, SimulatedActuator, SimulatedLidar};

    pub type SensorBus = SimulatedLidar;
    pub type Motor = SimulatedActuator;

    const DEFAULT_DISTANCE_MM: f64 = 250.0;
    /// Plant speed at full actuator output.
    const MAX_SPEED_MM_S: f64 = 400.0;
    /// Bytes answered to a settings query when failure injection is on.
    const TRUNCATED_SETTINGS_LEN: usize = 10;

    fn env_f64(key: &str, default: f64) -> eyre::Result<f64> {
        match std::env::var(key) {
            Ok(v) => v
                .trim()
                .parse::<f64>()
                .wrap_err_with(|| format!("{key} must be a number (got {v:?})")),
            Err(_) => Ok(default),
        }
    }

    fn lidar(plant: SimPlant) -> eyre::Result<SimulatedLidar> {
        let noise = env_f64("RANGELOOP_SIM_NOISE_MM", 0.0)?;
        let mut lidar = SimulatedLidar::with_plant(plant).with_noise(noise);
        if let Ok(v) = std::env::var("RANGELOOP_SIM_FAIL_SETTINGS")
            && !matches!(v.trim(), "" | "0" | "false")
        {
            lidar = lidar.with_truncated_settings(TRUNCATED_SETTINGS_LEN);
        }
        Ok(lidar)
    }

    pub fn open_sensor(_cfg: &Config) -> eyre::Result<SensorBus> {
        let distance = env_f64("RANGELOOP_SIM_DISTANCE_MM", DEFAULT_DISTANCE_MM)?;
        tracing::info!(distance_mm = distance, "using simulated sensor");
        lidar(SimPlant::new(distance, 0.0))
    }

    /// Sensor and actuator sharing one simulated mechanism.
    pub fn open_loop(_cfg: &Config) -> eyre::Result<(SensorBus, Motor)> {
        let distance = env_f64("RANGELOOP_SIM_DISTANCE_MM", DEFAULT_DISTANCE_MM)?;
        tracing::info!(distance_mm = distance, "using simulated plant");
        let plant = SimPlant::new(distance, MAX_SPEED_MM_S);
        Ok((lidar(plant.clone())?, SimulatedActuator::driving(plant)))
    }
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
mod rpi {
    use super::Config;
    use eyre::WrapErr;
    use rangeloop_hardware::rpi::{I2cBus, PwmActuator};

    pub type SensorBus = I2cBus;
    pub type Motor = PwmActuator;

    pub fn open_sensor(cfg: &Config) -> eyre::Result<SensorBus> {
        I2cBus::new(cfg.sensor.i2c_bus, cfg.sensor.address).wrap_err_with(|| {
            format!(
                "open i2c bus {} at 0x{:02x}",
                cfg.sensor.i2c_bus, cfg.sensor.address
            )
        })
    }

    pub fn open_loop(cfg: &Config) -> eyre::Result<(SensorBus, Motor)> {
        let bus = open_sensor(cfg)?;
        let motor = PwmActuator::new(cfg.actuator.pwm_channel)
            .wrap_err_with(|| format!("open pwm channel {}", cfg.actuator.pwm_channel))?;
        Ok((bus, motor))
    }
}
