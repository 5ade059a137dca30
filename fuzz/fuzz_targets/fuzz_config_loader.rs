#![no_main]
use libfuzzer_sys::fuzz_target;

// Parse errors and validation errors are both fine; panics are not.
fuzz_target!(|data: &str| {
    if let Ok(cfg) = toml::from_str::<rangeloop_config::Config>(data)
        && cfg.validate().is_ok()
    {
        // A validated config must map into runtime structs that validate too.
        let sensor = rangeloop_core::SensorCfg::from(&cfg.sensor);
        assert!(sensor.validate().is_ok(), "validated config rejected by core: {sensor:?}");
        let _ = rangeloop_core::ControlCfg::from(&cfg.control);
    }
});
