//! `From` implementations bridging `rangeloop_config` types to `rangeloop_core` types.

use std::time::Duration;

use crate::config::{ControlCfg, SensorCfg};
use crate::controller::GainProfile;

// ── SensorCfg ────────────────────────────────────────────────────────────────

impl From<&rangeloop_config::SensorCfg> for SensorCfg {
    fn from(c: &rangeloop_config::SensorCfg) -> Self {
        Self {
            address: c.address,
            window: c.window,
            std_dev_limit_mm: c.std_dev_limit_mm,
            poll_hz: c.poll_hz,
        }
    }
}

// ── Gain profiles ────────────────────────────────────────────────────────────

impl From<&rangeloop_config::Profile> for GainProfile {
    fn from(p: &rangeloop_config::Profile) -> Self {
        Self::new(p.p, p.i, p.d, p.f)
    }
}

// ── ControlCfg ───────────────────────────────────────────────────────────────

impl From<&rangeloop_config::ControlCfg> for ControlCfg {
    fn from(c: &rangeloop_config::ControlCfg) -> Self {
        Self {
            period: Duration::from_millis(c.period_ms),
            integral_limit: c.integral_limit,
            inverted: c.inverted,
            profiles: c.profiles.iter().map(GainProfile::from).collect(),
            default_slot: c.default_slot,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_cfg_maps_profiles_in_order() {
        let cfg = rangeloop_config::load_toml(
            "[control]\nperiod_ms = 10\nprofiles = [[1.0, 2.0, 3.0, 4.0], { p = 5.0 }]\n",
        )
        .unwrap();
        let c = ControlCfg::from(&cfg.control);
        assert_eq!(c.period, Duration::from_millis(10));
        assert_eq!(
            c.profiles,
            vec![
                GainProfile::new(1.0, 2.0, 3.0, 4.0),
                GainProfile::new(5.0, 0.0, 0.0, 0.0)
            ]
        );
    }
}
