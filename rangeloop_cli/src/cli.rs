//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "rangeloop", version, about = "Ranging sensor acquisition and closed-loop control")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/rangeloop.toml")]
    pub config: PathBuf,

    /// Log as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// Memory locking mode for real-time operation.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum RtLock {
    /// Do not lock memory
    None,
    /// Lock currently resident pages
    Current,
    /// Lock current and future pages
    All,
}

impl RtLock {
    #[inline]
    pub fn os_default() -> Self {
        #[cfg(target_os = "linux")]
        {
            return RtLock::Current;
        }
        #[allow(unreachable_code)]
        RtLock::None
    }
}

/// Device operation modes that can be written back with `set-mode`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum ModeArg {
    /// Measure once per trigger
    SingleStep,
    /// Free-running measurement
    Continuous,
}

impl From<ModeArg> for rangeloop_core::OperationMode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::SingleStep => Self::SingleStep,
            ModeArg::Continuous => Self::Continuous,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Stream distance snapshots from the ranging sensor
    Monitor {
        /// How long to run before printing the summary
        #[arg(long, value_name = "MS", default_value_t = 2_000)]
        duration_ms: u64,
        /// Report distances in inches
        #[arg(long, action = ArgAction::SetTrue)]
        inches: bool,
        /// Override sensor.std_dev_limit_mm for this run
        #[arg(long, value_name = "MM")]
        std_dev_limit: Option<f64>,
    },
    /// Query and print the decoded device settings record
    Settings {
        /// Also write the printed settings to this file (atomically)
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
    /// Switch the device operation mode
    SetMode {
        #[arg(value_enum)]
        mode: ModeArg,
    },
    /// Hold a distance setpoint: sensor -> controller -> actuator
    Hold {
        /// Target distance in millimeters
        #[arg(long, value_name = "MM")]
        setpoint_mm: f64,
        /// Gain profile slot to select before starting
        #[arg(long, value_name = "SLOT")]
        profile: Option<usize>,
        /// How long to hold before stopping
        #[arg(long, value_name = "MS", default_value_t = 5_000)]
        duration_ms: u64,
        /// Enable real-time mode (SCHED_FIFO, affinity, mlockall)
        #[arg(
            long,
            action = ArgAction::SetTrue,
            long_help = "Enable real-time mode on Linux.\n\nAttempts SCHED_FIFO priority, pins to the selected CPU, and calls mlockall to lock the process address space into RAM. This reduces page faults and jitter on the control loop but may require elevated privileges or ulimits (e.g., memlock)."
        )]
        rt: bool,
        /// Real-time priority for SCHED_FIFO (1..=max)
        #[arg(long, value_name = "PRIO")]
        rt_prio: Option<i32>,
        /// Select memory locking mode for --rt: none, current, or all
        #[arg(long, value_enum, value_name = "MODE")]
        rt_lock: Option<RtLock>,
        /// CPU index to pin the process to when --rt is enabled (defaults to 0)
        #[arg(long, value_name = "CPU")]
        rt_cpu: Option<usize>,
    },
    /// Quick health check: one settings query plus a short acquisition burst
    SelfCheck {
        /// Number of acquisition cycles in the burst
        #[arg(long, value_name = "N", default_value_t = 5)]
        burst: usize,
    },
}
