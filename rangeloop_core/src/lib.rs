#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Periodic control loop and ranging-sensor acquisition (hardware-agnostic).
//!
//! All hardware interactions go through the `rangeloop_traits::Bus`,
//! `rangeloop_traits::Actuator` and `rangeloop_traits::MeasurementSource` traits.
//!
//! ## Architecture
//!
//! - **Statistics**: fixed-capacity rolling window (`stats` module)
//! - **Settings**: decoder for the 23-byte device settings record (`settings`)
//! - **Timer**: fixed-period action runner with overrun detection (`timer`)
//! - **Control**: PID + feedforward loop with gain profiles (`controller`, `builder`)
//! - **Acquisition**: background distance sampling with validity gating (`acquisition`)
//! - **Telemetry**: named property table (`telemetry`)
//! - **Orchestration**: monitor / hold / self-check (`runner`)
//!
//! Component APIs return `Result<T, LoopError>`; orchestration returns `eyre::Result`.

pub mod acquisition;
pub mod atomic;
pub mod builder;
pub mod config;
pub mod controller;
pub mod conversions;
pub mod error;
pub mod hw_error;
pub mod mocks;
pub mod runner;
pub mod settings;
pub mod stats;
pub mod status;
pub mod telemetry;
pub mod timer;
pub mod util;

pub use acquisition::{
    AcquisitionSnapshot, AcquisitionStats, DistanceReader, DistanceSensor, DistanceUnit,
};
pub use builder::ControllerBuilder;
pub use config::{ControlCfg, SensorCfg};
pub use controller::{ClosedLoopController, GainProfile};
pub use error::{BuildError, LoopError, Result};
pub use settings::{
    DeviceSettings, LedIndicator, OffsetCalibration, OperationMode, PresetConfiguration,
    VcselPeriods,
};
pub use stats::RollingStatistics;
pub use status::{ControllerStats, TickOutcome};
pub use telemetry::{PropertyTable, PropertyValue};
pub use timer::{PeriodicTimer, TimerHandle};
