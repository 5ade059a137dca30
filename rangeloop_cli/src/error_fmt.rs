//! Human-readable error descriptions, stable exit codes and structured JSON errors.

use rangeloop_core::error::{BuildError, LoopError};

/// Process exit codes. 2 is left to clap for usage errors.
pub const EXIT_GENERIC: i32 = 1;
pub const EXIT_PROTOCOL: i32 = 3;
pub const EXIT_BUS: i32 = 4;
pub const EXIT_CONFIG: i32 = 5;

fn find_loop_error(err: &eyre::Report) -> Option<&LoopError> {
    err.chain().find_map(|e| e.downcast_ref::<LoopError>())
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(be) = err.chain().find_map(|e| e.downcast_ref::<BuildError>()) {
        return match be {
            BuildError::MissingActuator => {
                "What happened: No actuator was provided to the control loop.\nLikely causes: The motor controller failed to initialize or was not wired into the builder.\nHow to fix: Ensure the actuator is created successfully and passed via with_actuator(...).".to_string()
            }
            BuildError::MissingMeasurement => {
                "What happened: No measurement source was provided to the control loop.\nLikely causes: The sensor was not started or its reader was not passed to the builder.\nHow to fix: Pass the sensor reader via with_measurement(...).".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid control configuration ({msg}).\nLikely causes: Missing or out-of-range values in [control].\nHow to fix: Edit the config file, then rerun. See etc/rangeloop.toml for a sample."
            ),
        };
    }

    if let Some(le) = find_loop_error(err) {
        return match le {
            LoopError::OutOfRange { slot, len } => format!(
                "What happened: Gain profile slot {slot} does not exist (have {len}).\nLikely causes: --profile points past the end of control.profiles.\nHow to fix: Pick a slot between 0 and {} or add profiles to the config.",
                len.saturating_sub(1)
            ),
            LoopError::ProtocolDecode(detail) => format!(
                "What happened: The device settings record could not be decoded ({detail}).\nLikely causes: A truncated I2C transfer, a different firmware, or another device at this address.\nHow to fix: Check sensor.address and wiring, then retry `rangeloop settings`."
            ),
            LoopError::Timeout => {
                "What happened: The sensor did not answer in time.\nLikely causes: Loose SDA/SCL wiring, missing power, or a wrong bus number.\nHow to fix: Verify wiring and sensor.i2c_bus, then rerun with --log-level=debug.".to_string()
            }
            LoopError::Bus(detail) | LoopError::TransientIo(detail) => format!(
                "What happened: Bus transaction failed ({detail}).\nLikely causes: Wrong sensor.address, missing pull-ups, or insufficient permissions on /dev/i2c-*.\nHow to fix: Run `i2cdetect` to confirm the address and ensure the user is in the i2c group."
            ),
            LoopError::Config(detail) => format!(
                "What happened: Configuration is invalid ({detail}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file and try again. See etc/rangeloop.toml for a sample."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    if let Some(te) = err.chain().find_map(|e| e.downcast_ref::<toml::de::Error>()) {
        return format!(
            "What happened: The config file is not valid TOML for this program.\nLikely causes: A typo, an unknown section or key, or a value of the wrong type.\nHow to fix: Fix the file and retry. Parser said: {}",
            te.message()
        );
    }

    // String-based heuristics for errors coming from init or orchestration
    let msg = err.to_string();
    let lower = format!("{err:#}").to_ascii_lowercase();

    if lower.contains("sensor stalled") {
        return "What happened: The sensor stopped producing readings while holding.\nLikely causes: Bus errors on every cycle, a disconnected sensor, or a crashed device.\nHow to fix: Check wiring and power; run `rangeloop self-check` before holding again.".to_string();
    }

    if lower.contains("read config") {
        return format!(
            "What happened: The config file could not be read.\nLikely causes: Wrong --config path or missing permissions.\nHow to fix: Pass --config with a readable file. Original: {msg}"
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Map the error chain to a stable process exit code.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if err.chain().any(|e| e.is::<BuildError>() || e.is::<toml::de::Error>()) {
        return EXIT_CONFIG;
    }
    match find_loop_error(err) {
        Some(LoopError::ProtocolDecode(_)) => EXIT_PROTOCOL,
        Some(LoopError::Bus(_) | LoopError::Timeout | LoopError::TransientIo(_)) => EXIT_BUS,
        Some(LoopError::Config(_) | LoopError::OutOfRange { .. }) => EXIT_CONFIG,
        _ => EXIT_GENERIC,
    }
}

fn reason_name(err: &eyre::Report) -> &'static str {
    if err.chain().any(|e| e.is::<BuildError>() || e.is::<toml::de::Error>()) {
        return "Config";
    }
    match find_loop_error(err) {
        Some(LoopError::OutOfRange { .. }) => "OutOfRange",
        Some(LoopError::ProtocolDecode(_)) => "ProtocolDecode",
        Some(LoopError::TransientIo(_)) => "TransientIo",
        Some(LoopError::ControlFault(_)) => "ControlFault",
        Some(LoopError::Bus(_)) => "Bus",
        Some(LoopError::Timeout) => "Timeout",
        Some(LoopError::Config(_)) => "Config",
        Some(LoopError::Thread(_)) => "Thread",
        None => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    serde_json::json!({
        "reason": reason_name(err),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use eyre::WrapErr;

    #[test]
    fn decode_error_maps_to_protocol_code_through_context() {
        let err: eyre::Result<()> = Err(LoopError::ProtocolDecode("expected 23 bytes, got 10".into()))
            .wrap_err("query device settings");
        let err = err.unwrap_err();
        assert_eq!(exit_code_for_error(&err), EXIT_PROTOCOL);
        assert!(humanize(&err).contains("settings record could not be decoded"));
    }

    #[test]
    fn timeout_maps_to_bus_code() {
        let err = eyre::Report::new(LoopError::Timeout);
        assert_eq!(exit_code_for_error(&err), EXIT_BUS);
    }

    #[test]
    fn adhoc_error_is_generic() {
        let err = eyre::eyre!("sensor stalled: no reading for 900 ms (threshold 500 ms)");
        assert_eq!(exit_code_for_error(&err), EXIT_GENERIC);
        assert!(humanize(&err).contains("stopped producing readings"));
    }

    #[test]
    fn json_error_carries_reason_and_code() {
        let err = eyre::Report::new(LoopError::Config("sensor.window must be >= 1".into()));
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&err)).unwrap();
        assert_eq!(v["reason"], "Config");
        assert_eq!(v["exit_code"], 5);
    }
}
