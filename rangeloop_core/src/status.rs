//! Outcome of a single control-loop tick.

use crate::error::LoopError;

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Command written to the actuator (after clamping).
    Written(f64),
    /// Loop disabled; nothing read, nothing written.
    Suppressed,
    /// Measurement, computation or actuator failure; nothing written.
    Fault(LoopError),
}

impl TickOutcome {
    pub fn output(&self) -> Option<f64> {
        match self {
            Self::Written(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_fault(&self) -> bool {
        matches!(self, Self::Fault(_))
    }
}

/// Counters kept by the controller across ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControllerStats {
    pub ticks: u64,
    pub writes: u64,
    pub faults: u64,
}
