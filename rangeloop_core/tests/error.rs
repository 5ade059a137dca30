use rangeloop_core::LoopError;
use rangeloop_core::hw_error::{map_bus_error, map_cycle_error, map_settings_read_error};
use rangeloop_hardware::error::HwError;
use rstest::rstest;

#[rstest]
#[case(LoopError::OutOfRange { slot: 5, len: 2 }, "gain profile slot 5 out of range (have 2)")]
#[case(LoopError::ProtocolDecode("expected 23 bytes, got 10".into()), "malformed settings record: expected 23 bytes, got 10")]
#[case(LoopError::Timeout, "timeout waiting for device")]
fn display_is_stable(#[case] err: LoopError, #[case] text: &str) {
    assert_eq!(err.to_string(), text);
}

#[test]
fn hw_errors_downcast_precisely() {
    assert_eq!(map_bus_error(&HwError::Timeout), LoopError::Timeout);
    assert_eq!(
        map_bus_error(&HwError::ShortRead {
            expected: 23,
            got: 4
        }),
        LoopError::Bus("short read: expected 23 bytes, got 4".into())
    );
}

#[test]
fn short_settings_read_is_a_decode_error() {
    let short = HwError::ShortRead {
        expected: 23,
        got: 4,
    };
    assert_eq!(
        map_settings_read_error(&short),
        LoopError::ProtocolDecode("expected 23 bytes, got 4".into())
    );
    assert_eq!(map_settings_read_error(&HwError::Timeout), LoopError::Timeout);
    assert!(matches!(
        map_settings_read_error(&HwError::Bus("nak".into())),
        LoopError::Bus(_)
    ));
}

#[test]
fn cycle_errors_are_transient() {
    assert!(matches!(
        map_cycle_error(&HwError::Timeout),
        LoopError::TransientIo(_)
    ));
    assert!(matches!(
        map_cycle_error(&HwError::NoPendingRequest),
        LoopError::TransientIo(_)
    ));
}

#[test]
fn loop_errors_convert_into_eyre_reports() {
    fn fails() -> rangeloop_core::Result<()> {
        Err(LoopError::Config("window must be >= 1".into()).into())
    }
    let report = fails().unwrap_err();
    assert!(report.downcast_ref::<LoopError>().is_some());
}
