//! Raspberry Pi back-ends: I2C ranging sensor bus and PWM motor controller.

use std::time::Duration;

use rangeloop_traits::{Actuator, BoxError, Bus};
use rppal::i2c::I2c;
use rppal::pwm::{Channel, Polarity, Pwm};
use tracing::{trace, warn};

use crate::error::{HwError, Result};

/// I2C bus bound to one slave address.
pub struct I2cBus {
    i2c: I2c,
    max_attempts: u8,
}

impl I2cBus {
    pub fn new(bus: u8, address: u8) -> Result<Self> {
        let mut i2c = I2c::with_bus(bus).map_err(|e| HwError::Bus(e.to_string()))?;
        i2c.set_slave_address(u16::from(address))
            .map_err(|e| HwError::Bus(e.to_string()))?;
        Ok(Self {
            i2c,
            max_attempts: 3,
        })
    }
}

impl Bus for I2cBus {
    fn write_register(&mut self, register: u8, value: u8) -> std::result::Result<(), BoxError> {
        self.i2c
            .smbus_write_byte(register, value)
            .map_err(|e| HwError::Bus(e.to_string()).into())
    }

    fn read_bytes(&mut self, count: usize) -> std::result::Result<Vec<u8>, BoxError> {
        let mut buf = vec![0u8; count];
        let mut attempts = 0;
        loop {
            match self.i2c.read(&mut buf) {
                Ok(n) if n == count => {
                    trace!(bytes = n, "i2c read");
                    return Ok(buf);
                }
                Ok(n) => return Err(HwError::ShortRead { expected: count, got: n }.into()),
                Err(e) if attempts + 1 < self.max_attempts => {
                    attempts += 1;
                    warn!(retries = attempts, error = %e, "i2c read failed, retrying");
                }
                Err(e) => return Err(HwError::Bus(e.to_string()).into()),
            }
        }
    }

    fn write_bulk(&mut self, bytes: &[u8]) -> std::result::Result<(), BoxError> {
        let n = self
            .i2c
            .write(bytes)
            .map_err(|e| HwError::Bus(e.to_string()))?;
        if n != bytes.len() {
            return Err(HwError::Bus(format!("short write: {n} of {} bytes", bytes.len())).into());
        }
        Ok(())
    }
}

/// Hobby-style motor controller on a hardware PWM channel: 1.0 ms full reverse,
/// 1.5 ms neutral, 2.0 ms full forward at a 50 Hz frame.
pub struct PwmActuator {
    pwm: Pwm,
    inverted: bool,
}

const FRAME: Duration = Duration::from_millis(20);
const NEUTRAL_US: f64 = 1_500.0;
const SPAN_US: f64 = 500.0;

impl PwmActuator {
    pub fn new(channel: u8) -> Result<Self> {
        let channel = match channel {
            0 => Channel::Pwm0,
            1 => Channel::Pwm1,
            other => return Err(HwError::Pwm(format!("no PWM channel {other}"))),
        };
        let pwm = Pwm::with_period(
            channel,
            FRAME,
            Duration::from_micros(NEUTRAL_US as u64),
            Polarity::Normal,
            true,
        )
        .map_err(|e| HwError::Pwm(e.to_string()))?;
        Ok(Self {
            pwm,
            inverted: false,
        })
    }

    fn pulse_for(&self, value: f64) -> Duration {
        let v = if self.inverted { -value } else { value };
        Duration::from_micros((NEUTRAL_US + v.clamp(-1.0, 1.0) * SPAN_US).round() as u64)
    }
}

impl Actuator for PwmActuator {
    fn set_output(&mut self, value: f64) -> std::result::Result<(), BoxError> {
        let pulse = self.pulse_for(value);
        self.pwm
            .set_pulse_width(pulse)
            .map_err(|e| HwError::Pwm(e.to_string()).into())
    }

    fn set_inverted(&mut self, inverted: bool) -> std::result::Result<(), BoxError> {
        self.inverted = inverted;
        Ok(())
    }

    fn stop(&mut self) -> std::result::Result<(), BoxError> {
        self.pwm
            .set_pulse_width(Duration::from_micros(NEUTRAL_US as u64))
            .map_err(|e| HwError::Pwm(e.to_string()).into())
    }
}
