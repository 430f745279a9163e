//! Capability traits through which the engine reaches the hardware and its
//! peer subsystems.
//!
//! The engine never touches registers, file systems or protocols directly;
//! everything outside the duty-cycled recording core — clocking, the SD
//! card, the microphone front end, power sensing, retained memory and the
//! configuration/metadata text collaborators — sits behind one of these
//! traits. The firmware binary implements them against real hardware, the
//! simulator and the tests implement them in memory.

use core::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

use crate::config::{GainSetting, RecorderConfig};
use crate::recorder::RecordingOutcome;
use crate::wav::{ARTIST_LENGTH, COMMENT_LENGTH};

/// Failure of a single storage operation. The card layer only reports
/// success or failure; the failed operation is carried for logging.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    #[error("failed to create directory")]
    CreateDirectory,
    #[error("failed to open file")]
    Open,
    #[error("failed to seek within file")]
    Seek,
    #[error("failed to write to file")]
    Write,
    #[error("failed to close file")]
    Close,
    #[error("failed to rename file")]
    Rename,
}

/// Millisecond-resolution wall-clock reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timestamp {
    pub seconds: u32,
    pub milliseconds: u32,
}

impl Timestamp {
    pub const fn new(seconds: u32, milliseconds: u32) -> Self {
        Self {
            seconds,
            milliseconds,
        }
    }

    pub const fn as_millis(self) -> u64 {
        self.seconds as u64 * 1000 + self.milliseconds as u64
    }
}

/// External tri-state mode switch position.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchPosition {
    /// Passive maintenance/transfer mode; the engine defers entirely to the
    /// USB collaborator.
    UsbTransfer,
    /// Record around the clock with the configured duty cycle.
    Continuous,
    /// Record according to the configured recording periods.
    CustomSchedule,
}

/// Cooperative cancellation signals shared between the interrupt-modelled
/// producer context and the main acquisition loop.
///
/// Raised from interrupt context (or its test stand-in) while the loop
/// blocks in [`SamplingHardware::next_transfer`]; checked once per outer
/// acquisition iteration. The polled low-voltage result is the third
/// cooperative signal and comes from [`PowerMonitor`] instead.
#[derive(Debug, Default)]
pub struct Signals {
    microphone_changed: AtomicBool,
    switch_changed: AtomicBool,
}

impl Signals {
    pub const fn new() -> Self {
        Self {
            microphone_changed: AtomicBool::new(false),
            switch_changed: AtomicBool::new(false),
        }
    }

    pub fn raise_microphone_changed(&self) {
        self.microphone_changed.store(true, Ordering::Relaxed);
    }

    pub fn raise_switch_changed(&self) {
        self.switch_changed.store(true, Ordering::Relaxed);
    }

    pub fn microphone_changed(&self) -> bool {
        self.microphone_changed.load(Ordering::Relaxed)
    }

    pub fn switch_changed(&self) -> bool {
        self.switch_changed.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.microphone_changed.store(false, Ordering::Relaxed);
        self.switch_changed.store(false, Ordering::Relaxed);
    }
}

/// Microphone clocking parameters resolved from the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MicrophoneSettings {
    pub gain: GainSetting,
    pub clock_divider: u8,
    pub acquisition_cycles: u8,
    pub oversample_rate: u8,
    /// Raw (pre-decimation) sample rate in Hz.
    pub sample_rate: u32,
}

/// Values the engine supplies to the external metadata formatter. The text
/// itself — wording, timezone presentation — is the collaborator's concern.
#[derive(Debug, Clone, Copy)]
pub struct RecordingInfo {
    /// Effective start time of the recording.
    pub timestamp: u32,
    pub gain: GainSetting,
    pub outcome: RecordingOutcome,
    pub battery_millivolts: u32,
    pub temperature_millidegrees: i32,
    /// All zeroes when no deployment identity has been set.
    pub deployment_id: [u8; 8],
}

/// Wall-clock time source.
pub trait Clock {
    fn now(&self) -> Timestamp;

    /// False until the device has ever received a real time; scheduling is
    /// meaningless before then.
    fn time_is_set(&self) -> bool;
}

/// The external tri-state mode switch.
pub trait ModeInput {
    fn switch_position(&self) -> SwitchPosition;
}

/// File storage with at most one open file at a time.
pub trait Storage {
    fn create_directory(&mut self, path: &str) -> Result<(), StorageError>;
    fn open_file(&mut self, path: &str) -> Result<(), StorageError>;
    fn seek(&mut self, offset: u32) -> Result<(), StorageError>;
    fn write(&mut self, data: &[u8]) -> Result<(), StorageError>;
    fn close_file(&mut self) -> Result<(), StorageError>;
    fn rename_file(&mut self, from: &str, to: &str) -> Result<(), StorageError>;
}

/// Continuous sampling hardware delivering alternating raw buffers.
pub trait SamplingHardware {
    fn enable_microphone(&mut self, settings: &MicrophoneSettings);
    fn disable_microphone(&mut self);

    /// Block in the low-power wait until the next transfer-complete
    /// interrupt, then yield the just-completed raw buffer. Interrupt-side
    /// events observed during the wait are raised on `signals`.
    fn next_transfer(&mut self, signals: &Signals) -> &[i16];
}

/// Supply voltage and temperature sensing.
pub trait PowerMonitor {
    fn supply_voltage_millivolts(&mut self) -> u32;

    fn temperature_millidegrees(&mut self) -> i32;

    fn supply_voltage_low(&mut self, threshold_millivolts: u32) -> bool {
        self.supply_voltage_millivolts() < threshold_millivolts
    }
}

/// The retained memory region that survives power-down.
pub trait RetainedMemory {
    /// True on the very first power-up only; no retained field may be
    /// assumed valid before the cold-boot initialization this triggers.
    fn is_initial_power_up(&self) -> bool;

    fn retained_read(&self, buffer: &mut [u8]);
    fn retained_write(&mut self, data: &[u8]);
}

/// Long-term (true power-loss-surviving) configuration storage, read once
/// at cold boot. Writes happen only through the external configuration
/// collaborator.
pub trait ConfigStore {
    /// Copy the stored configuration blob into `buffer` and return its
    /// length, or 0 when none has ever been written.
    fn read_config_blob(&self, buffer: &mut [u8]) -> usize;
}

/// External human-readable text formatting collaborator.
pub trait Metadata {
    /// Fill the WAV artist field (device identity).
    fn format_artist(&self, out: &mut heapless::String<ARTIST_LENGTH>);

    /// Fill the WAV comment field from the attempt's outcome and the
    /// environment readings taken at finalization.
    fn format_comment(&self, out: &mut heapless::String<COMMENT_LENGTH>, info: &RecordingInfo);

    /// Write the human-readable configuration file for this deployment.
    /// The collaborator performs its own storage access.
    fn write_config_file(
        &mut self,
        config: &RecorderConfig,
        deployment_id: &[u8; 8],
    ) -> Result<(), StorageError>;
}

/// Settings delivered by the configuration protocols.
#[derive(Debug, Clone, Copy)]
pub struct ConfigUpdate {
    pub config: RecorderConfig,
    /// New deployment identity, when the protocol delivered one.
    pub deployment_id: Option<[u8; 8]>,
}

/// External maintenance and configuration-acquisition collaborator.
pub trait Maintenance {
    /// Handle the USB/maintenance switch position; returns once the host
    /// disconnects or the switch moves.
    fn handle_usb_transfer(&mut self);

    /// Give the configuration protocols a chance to deliver new settings
    /// after a mode transition.
    fn acquire_configuration(&mut self) -> Option<ConfigUpdate>;
}

/// Umbrella over every capability the orchestrator needs.
pub trait Hal:
    Clock
    + ModeInput
    + Storage
    + SamplingHardware
    + PowerMonitor
    + RetainedMemory
    + ConfigStore
    + Metadata
    + Maintenance
{
}

impl<T> Hal for T where
    T: Clock
        + ModeInput
        + Storage
        + SamplingHardware
        + PowerMonitor
        + RetainedMemory
        + ConfigStore
        + Metadata
        + Maintenance
{
}
