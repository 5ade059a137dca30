//! Decoder for the 23-byte settings record reported by the ranging sensor.
//!
//! Layout (multi-byte fields big-endian):
//!
//! | offset | width | field |
//! |---|---|---|
//! | 0 | 1 | operation mode |
//! | 1 | 1 | preset configuration |
//! | 2 | 2 | signal rate limit, i16 / 65536 |
//! | 4 | 1 | sigma estimate limit, signed |
//! | 5 | 2 | timing budget (ms), i16 |
//! | 7 | 1 | VCSEL period code |
//! | 8 | 3 | firmware version |
//! | 11 | 3 | API version |
//! | 14 | 1 | flags: bit0 watchdog, bits1-2 LED, bit3 offset calibration |
//! | 15 | 4 | offset calibration, i32 / 1000 |
//! | 19 | 4 | crosstalk calibration, i32 / 65536 |
//!
//! Unknown enum bytes decode to a fallback variant; only a short record fails.

use std::fmt;

use crate::error::LoopError;

pub const SETTINGS_LEN: usize = 23;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationMode {
    Invalid,
    SingleStep,
    Continuous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresetConfiguration {
    Custom,
    HighAccuracy,
    LongRange,
    HighSpeed,
    TinyLidar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedIndicator {
    Off,
    On,
    Measurement,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetCalibration {
    Default,
    Custom,
}

const OPERATION_MODES: [(u8, OperationMode); 3] = [
    (0x00, OperationMode::Invalid),
    (0x43, OperationMode::SingleStep),
    (0x53, OperationMode::Continuous),
];

const PRESETS: [(u8, PresetConfiguration); 5] = [
    (0x00, PresetConfiguration::Custom),
    (0x41, PresetConfiguration::HighAccuracy),
    (0x52, PresetConfiguration::LongRange),
    (0x53, PresetConfiguration::HighSpeed),
    (0x54, PresetConfiguration::TinyLidar),
];

const LED_MODES: [LedIndicator; 4] = [
    LedIndicator::Off,
    LedIndicator::On,
    LedIndicator::Measurement,
    LedIndicator::Unknown,
];

/// VCSEL code → (pre-range, final-range) periods.
const VCSEL_PERIODS: [(u8, u8, u8); 2] = [(0x0e, 14, 10), (0x12, 18, 14)];

fn lookup<T: Copy>(table: &[(u8, T)], byte: u8, fallback: T) -> T {
    table
        .iter()
        .find(|(code, _)| *code == byte)
        .map_or(fallback, |(_, v)| *v)
}

fn reverse<T: Copy + PartialEq>(table: &[(u8, T)], value: T) -> u8 {
    table
        .iter()
        .find(|(_, v)| *v == value)
        .map_or(0, |(code, _)| *code)
}

impl OperationMode {
    pub fn from_byte(b: u8) -> Self {
        lookup(&OPERATION_MODES, b, Self::Invalid)
    }

    pub fn to_byte(self) -> u8 {
        reverse(&OPERATION_MODES, self)
    }
}

impl PresetConfiguration {
    pub fn from_byte(b: u8) -> Self {
        lookup(&PRESETS, b, Self::Custom)
    }

    pub fn to_byte(self) -> u8 {
        reverse(&PRESETS, self)
    }
}

impl LedIndicator {
    /// Decode from the flags byte (bits 1-2).
    pub fn from_flags(flags: u8) -> Self {
        LED_MODES[usize::from((flags & 0x6) >> 1)]
    }

    pub fn to_byte(self) -> u8 {
        match self {
            Self::Off => 0,
            Self::On => 1,
            Self::Measurement => 2,
            Self::Unknown => 3,
        }
    }
}

impl OffsetCalibration {
    /// Decode from the flags byte (bit 3).
    pub fn from_flags(flags: u8) -> Self {
        if flags & 0x8 == 0 {
            Self::Default
        } else {
            Self::Custom
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            Self::Default => 0,
            Self::Custom => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VcselPeriods {
    pub pre_range: u8,
    pub final_range: u8,
}

impl VcselPeriods {
    pub fn from_byte(b: u8) -> Option<Self> {
        VCSEL_PERIODS
            .iter()
            .find(|(code, _, _)| *code == b)
            .map(|&(_, pre_range, final_range)| Self {
                pre_range,
                final_range,
            })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSettings {
    pub operation_mode: OperationMode,
    pub preset: PresetConfiguration,
    pub signal_rate_limit: f64,
    pub sigma_estimate_limit: i8,
    pub timing_budget_ms: i16,
    pub vcsel: Option<VcselPeriods>,
    pub firmware_version: String,
    pub api_version: String,
    pub offset_calibration: OffsetCalibration,
    pub led_indicator: LedIndicator,
    pub watchdog_enabled: bool,
    pub offset_calibration_value: i32,
    pub crosstalk_calibration_value: i32,
}

fn be_i16(b: &[u8], at: usize) -> i16 {
    i16::from_be_bytes([b[at], b[at + 1]])
}

fn be_i32(b: &[u8], at: usize) -> i32 {
    i32::from_be_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]])
}

fn version(b: &[u8]) -> String {
    format!("{}.{}.{}", b[0] as i8, b[1] as i8, b[2] as i8)
}

/// Decode a settings record. Bytes past the 23rd are ignored.
pub fn decode(record: &[u8]) -> Result<DeviceSettings, LoopError> {
    if record.len() < SETTINGS_LEN {
        return Err(LoopError::ProtocolDecode(format!(
            "expected {SETTINGS_LEN} bytes, got {}",
            record.len()
        )));
    }
    if record.len() > SETTINGS_LEN {
        tracing::debug!(
            excess = record.len() - SETTINGS_LEN,
            "settings record longer than expected"
        );
    }
    let flags = record[14];
    Ok(DeviceSettings {
        operation_mode: OperationMode::from_byte(record[0]),
        preset: PresetConfiguration::from_byte(record[1]),
        signal_rate_limit: f64::from(be_i16(record, 2)) / 65536.0,
        sigma_estimate_limit: record[4] as i8,
        timing_budget_ms: be_i16(record, 5),
        vcsel: VcselPeriods::from_byte(record[7]),
        firmware_version: version(&record[8..11]),
        api_version: version(&record[11..14]),
        offset_calibration: OffsetCalibration::from_flags(flags),
        led_indicator: LedIndicator::from_flags(flags),
        watchdog_enabled: flags & 0x1 != 0,
        offset_calibration_value: be_i32(record, 15) / 1000,
        crosstalk_calibration_value: be_i32(record, 19) / 65536,
    })
}

impl fmt::Display for DeviceSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "operation mode:      {:?}", self.operation_mode)?;
        writeln!(f, "preset:              {:?}", self.preset)?;
        writeln!(f, "signal rate limit:   {:.4} MCPS", self.signal_rate_limit)?;
        writeln!(f, "sigma limit:         {} mm", self.sigma_estimate_limit)?;
        writeln!(f, "timing budget:       {} ms", self.timing_budget_ms)?;
        match self.vcsel {
            Some(v) => writeln!(f, "VCSEL periods:       {}/{}", v.pre_range, v.final_range)?,
            None => writeln!(f, "VCSEL periods:       unset")?,
        }
        writeln!(f, "firmware:            {}", self.firmware_version)?;
        writeln!(f, "API:                 {}", self.api_version)?;
        writeln!(f, "offset calibration:  {:?} ({} mm)", self.offset_calibration, self.offset_calibration_value)?;
        writeln!(f, "crosstalk:           {} MCPS", self.crosstalk_calibration_value)?;
        writeln!(f, "LED:                 {:?}", self.led_indicator)?;
        write!(f, "watchdog:            {}", if self.watchdog_enabled { "on" } else { "off" })
    }
}
