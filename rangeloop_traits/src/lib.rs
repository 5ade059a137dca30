pub mod clock;

pub use clock::{Clock, MonotonicClock};

/// Error type used at every collaborator boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Request/response two-wire bus bound to a single device address.
///
/// Every call is synchronous and blocks for the duration of the transaction.
pub trait Bus {
    fn write_register(&mut self, register: u8, value: u8) -> Result<(), BoxError>;
    fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>, BoxError>;
    fn write_bulk(&mut self, bytes: &[u8]) -> Result<(), BoxError>;
}

/// Actuation device accepting a normalized command in `[-1.0, 1.0]`.
pub trait Actuator {
    fn set_output(&mut self, value: f64) -> Result<(), BoxError>;
    fn set_inverted(&mut self, inverted: bool) -> Result<(), BoxError>;
    fn stop(&mut self) -> Result<(), BoxError>;
}

/// Zero-argument measurement feed; units are defined by whoever wires it.
pub trait MeasurementSource {
    fn read(&mut self) -> Result<f64, BoxError>;
}

impl<F> MeasurementSource for F
where
    F: FnMut() -> Result<f64, BoxError>,
{
    fn read(&mut self) -> Result<f64, BoxError> {
        self()
    }
}

pub type Getter<T> = Box<dyn Fn() -> T + Send + Sync>;
pub type Setter<T> = Box<dyn Fn(T) + Send + Sync>;

/// Registration surface for named telemetry properties.
pub trait TelemetryBuilder {
    /// Tag the group of properties with a display type (e.g. "LiDAR").
    fn set_kind(&mut self, kind: &str);
    fn add_bool_property(&mut self, key: &str, getter: Getter<bool>, setter: Option<Setter<bool>>);
    fn add_f64_property(&mut self, key: &str, getter: Getter<f64>, setter: Option<Setter<f64>>);
}
