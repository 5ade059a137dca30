#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    match rangeloop_core::settings::decode(data) {
        Ok(s) => {
            assert!(data.len() >= rangeloop_core::settings::SETTINGS_LEN);
            let _ = s.to_string();
        }
        Err(e) => assert!(matches!(e, rangeloop_core::LoopError::ProtocolDecode(_))),
    }
});
