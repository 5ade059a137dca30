use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LoopError {
    #[error("gain profile slot {slot} out of range (have {len})")]
    OutOfRange { slot: usize, len: usize },
    #[error("malformed settings record: {0}")]
    ProtocolDecode(String),
    #[error("transient bus failure: {0}")]
    TransientIo(String),
    #[error("control fault: {0}")]
    ControlFault(String),
    #[error("bus error: {0}")]
    Bus(String),
    #[error("timeout waiting for device")]
    Timeout,
    #[error("configuration error: {0}")]
    Config(String),
    #[error("thread error: {0}")]
    Thread(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("missing actuator")]
    MissingActuator,
    #[error("missing measurement source")]
    MissingMeasurement,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
