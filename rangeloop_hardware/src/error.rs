use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("bus error: {0}")]
    Bus(String),
    #[error("bus read without a pending request")]
    NoPendingRequest,
    #[error("short read: expected {expected} bytes, got {got}")]
    ShortRead { expected: usize, got: usize },
    #[error("bus timeout")]
    Timeout,
    #[error("pwm error: {0}")]
    Pwm(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
