//! Maps `Box<dyn Error>` from trait boundaries to typed `LoopError`.
//!
//! The traits in `rangeloop_traits` use `Box<dyn Error + Send + Sync>` so any
//! back-end can plug in; this module converts those to our typed error enum,
//! with an optional feature-gated path for `rangeloop_hardware::HwError`.

use crate::error::LoopError;

/// Map a failed one-shot bus call (settings query, mode change).
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_bus_error(e: &(dyn std::error::Error + 'static)) -> LoopError {
    #[cfg(feature = "hardware-errors")]
    {
        use rangeloop_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Timeout => LoopError::Timeout,
                other => LoopError::Bus(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        LoopError::Timeout
    } else {
        LoopError::Bus(s)
    }
}

/// Map a failed settings-record read. A short record is a decode failure,
/// not a bus fault, whichever back-end produced it.
pub fn map_settings_read_error(e: &(dyn std::error::Error + 'static)) -> LoopError {
    #[cfg(feature = "hardware-errors")]
    {
        use rangeloop_hardware::error::HwError;
        if let Some(HwError::ShortRead { expected, got }) = e.downcast_ref::<HwError>() {
            return LoopError::ProtocolDecode(format!("expected {expected} bytes, got {got}"));
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("short read") {
        LoopError::ProtocolDecode(s)
    } else {
        map_bus_error(e)
    }
}

/// Map a failure inside the acquisition cycle; these are never propagated.
pub fn map_cycle_error(e: &(dyn std::error::Error + 'static)) -> LoopError {
    match map_bus_error(e) {
        LoopError::Timeout => LoopError::TransientIo("timeout".into()),
        LoopError::Bus(msg) => LoopError::TransientIo(msg),
        other => other,
    }
}
