//! Test and helper mocks for rangeloop_core

use rangeloop_traits::{Actuator, BoxError, Bus, MeasurementSource};

/// A bus that fails every transaction; exercises the transient-error path.
pub struct NoopBus;

impl Bus for NoopBus {
    fn write_register(&mut self, _register: u8, _value: u8) -> Result<(), BoxError> {
        Err(Box::new(std::io::Error::other("noop bus")))
    }

    fn read_bytes(&mut self, _count: usize) -> Result<Vec<u8>, BoxError> {
        Err(Box::new(std::io::Error::other("noop bus")))
    }

    fn write_bulk(&mut self, _bytes: &[u8]) -> Result<(), BoxError> {
        Err(Box::new(std::io::Error::other("noop bus")))
    }
}

/// A measurement source that always errors.
pub struct FailingMeasurement;

impl MeasurementSource for FailingMeasurement {
    fn read(&mut self) -> Result<f64, BoxError> {
        Err(Box::new(std::io::Error::other("measurement unavailable")))
    }
}

/// An actuator that accepts and discards every command.
#[derive(Debug, Default)]
pub struct NullActuator;

impl Actuator for NullActuator {
    fn set_output(&mut self, _value: f64) -> Result<(), BoxError> {
        Ok(())
    }

    fn set_inverted(&mut self, _inverted: bool) -> Result<(), BoxError> {
        Ok(())
    }

    fn stop(&mut self) -> Result<(), BoxError> {
        Ok(())
    }
}
