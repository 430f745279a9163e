//! Recorder configuration model.
//!
//! Supplied by the external configuration collaborators (USB or acoustic
//! chime) and read-only to the engine. A snapshot of the current
//! configuration travels with the retained state so it survives the
//! power-down between wakes.

use serde::{Deserialize, Serialize};

/// Maximum number of recording periods a configuration may carry. Entries
/// beyond `active_recording_periods` are ignored.
pub const MAX_RECORDING_PERIODS: usize = 5;

/// Minutes in a day; all minute-of-day fields are taken modulo this at use.
pub const MINUTES_IN_DAY: u32 = 1440;

/// Energy-saver mode only binds at or below this effective sample rate (Hz).
pub const ENERGY_SAVER_SAMPLE_RATE_THRESHOLD: u32 = 48_000;

/// Microphone gain step.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GainSetting {
    Low,
    LowMedium,
    #[default]
    Medium,
    MediumHigh,
    High,
}

impl GainSetting {
    /// Lower-case label used in file metadata.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::LowMedium => "low-medium",
            Self::Medium => "medium",
            Self::MediumHigh => "medium-high",
            Self::High => "high",
        }
    }
}

/// One recording period as minutes of day.
///
/// An end minute at or before the start minute wraps past midnight; equal
/// start and end minutes (and an end of 1440) select the whole day. Minute
/// 0 always means midnight.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordingPeriod {
    pub start_minutes: u16,
    pub end_minutes: u16,
}

impl RecordingPeriod {
    pub const fn new(start_minutes: u16, end_minutes: u16) -> Self {
        Self {
            start_minutes,
            end_minutes,
        }
    }

    /// Period length in minutes, in `1..=1440`.
    pub const fn duration_minutes(self) -> u32 {
        let start = self.start_minutes as u32 % MINUTES_IN_DAY;
        let end = self.end_minutes as u32 % MINUTES_IN_DAY;
        ((end + MINUTES_IN_DAY - start - 1) % MINUTES_IN_DAY) + 1
    }
}

/// Complete recorder configuration.
///
/// The two gain steps share the microphone clocking parameters but have
/// independent gains and record durations within each duty cycle.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecorderConfig {
    pub gain1: GainSetting,
    pub gain2: GainSetting,
    pub clock_divider: u8,
    pub acquisition_cycles: u8,
    pub oversample_rate: u8,
    /// Raw hardware sample rate in Hz, before decimation.
    pub sample_rate: u32,
    /// Decimation divider; the effective rate is `sample_rate / divider`.
    pub sample_rate_divider: u8,
    /// Seconds of sleep between gain sub-cycles.
    pub sleep_duration: u16,
    /// Seconds of gain-1 recording per duty cycle.
    pub record_duration_gain1: u16,
    /// Seconds of gain-2 recording per duty cycle.
    pub record_duration_gain2: u16,
    pub enable_led: bool,
    pub active_recording_periods: u8,
    pub recording_periods: [RecordingPeriod; MAX_RECORDING_PERIODS],
    pub enable_low_voltage_cutoff: bool,
    /// Record the whole period continuously at gain 1 instead of cycling.
    pub disable_sleep_record_cycle: bool,
    /// Epoch seconds before which no recording may start; 0 = unbounded.
    pub earliest_recording_time: u32,
    /// Epoch seconds at or after which no recording may run; 0 = unbounded.
    pub latest_recording_time: u32,
    /// Silence-detection threshold on decimated sample amplitude; 0 disables
    /// triggering, so every segment is treated as carrying signal.
    pub amplitude_threshold: u16,
    pub enable_energy_saver_mode: bool,
    /// Place each recording inside a per-day folder.
    pub enable_daily_folders: bool,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            gain1: GainSetting::Medium,
            gain2: GainSetting::High,
            clock_divider: 4,
            acquisition_cycles: 16,
            oversample_rate: 1,
            sample_rate: 384_000,
            sample_rate_divider: 8,
            sleep_duration: 5,
            record_duration_gain1: 55,
            record_duration_gain2: 55,
            enable_led: true,
            active_recording_periods: 1,
            recording_periods: [RecordingPeriod::default(); MAX_RECORDING_PERIODS],
            enable_low_voltage_cutoff: true,
            disable_sleep_record_cycle: false,
            earliest_recording_time: 0,
            latest_recording_time: 0,
            amplitude_threshold: 0,
            enable_energy_saver_mode: false,
            enable_daily_folders: false,
        }
    }
}

impl RecorderConfig {
    /// Effective (decimated) sample rate in Hz.
    pub fn effective_sample_rate(&self) -> u32 {
        self.sample_rate / self.sample_rate_divider.max(1) as u32
    }

    /// The active recording periods, capped at the configured maximum.
    pub fn active_periods(&self) -> &[RecordingPeriod] {
        let count = (self.active_recording_periods as usize).min(MAX_RECORDING_PERIODS);
        &self.recording_periods[..count]
    }

    /// Energy-saver mode only binds when the effective sample rate is low
    /// enough for the reduced clock to keep up.
    pub fn is_energy_saver(&self) -> bool {
        self.enable_energy_saver_mode
            && self.effective_sample_rate() <= ENERGY_SAVER_SAMPLE_RATE_THRESHOLD
    }

    /// Microphone clock divider with the energy-saver reduction applied.
    pub fn microphone_clock_divider(&self) -> u8 {
        if self.is_energy_saver() {
            self.clock_divider.saturating_mul(2)
        } else {
            self.clock_divider
        }
    }
}
