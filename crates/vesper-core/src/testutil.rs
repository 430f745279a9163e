//! In-memory HAL used across the engine's tests: a byte-faithful file
//! store, a scripted clock that advances with each sample transfer, and
//! knobs for injecting faults and operator events mid-recording.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::Write as _;

use crate::config::RecorderConfig;
use crate::hal::{
    Clock, ConfigStore, ConfigUpdate, Maintenance, Metadata, MicrophoneSettings, ModeInput,
    PowerMonitor, RecordingInfo, RetainedMemory, SamplingHardware, Signals, Storage,
    StorageError, SwitchPosition, Timestamp,
};
use crate::wav::{ARTIST_LENGTH, COMMENT_LENGTH};

struct OpenFile {
    path: String,
    cursor: usize,
}

pub struct MockHal {
    clock_micros: u64,
    pub time_set: bool,
    pub switch: SwitchPosition,
    pub files: BTreeMap<String, Vec<u8>>,
    pub directories: Vec<String>,
    open: Option<OpenFile>,
    pub fail_open: bool,
    pub fail_write: bool,
    pub voltage_millivolts: u32,
    pub temperature_millidegrees: i32,
    pub initial_power_up: bool,
    retained: Vec<u8>,
    pub config_blob: Vec<u8>,
    pub delivered_config: Option<ConfigUpdate>,
    pub usb_sessions: u32,
    pub config_files_written: u32,
    pub last_microphone: Option<MicrophoneSettings>,
    transfer_buffer: [i16; 1024],
    pub transfer_count: u32,
    /// Constant sample value the microphone delivers; 0 is silence.
    pub signal_amplitude: i16,
    pub raise_switch_after: Option<u32>,
    pub raise_microphone_after: Option<u32>,
    /// Drop the supply to the given millivolts after N transfers.
    pub voltage_drop_after: Option<(u32, u32)>,
    raw_sample_rate: u32,
}

impl MockHal {
    pub fn new(config: &RecorderConfig) -> Self {
        Self {
            clock_micros: 0,
            time_set: true,
            switch: SwitchPosition::CustomSchedule,
            files: BTreeMap::new(),
            directories: Vec::new(),
            open: None,
            fail_open: false,
            fail_write: false,
            voltage_millivolts: 3600,
            temperature_millidegrees: 20_000,
            initial_power_up: true,
            retained: Vec::new(),
            config_blob: Vec::new(),
            delivered_config: None,
            usb_sessions: 0,
            config_files_written: 0,
            last_microphone: None,
            transfer_buffer: [0; 1024],
            transfer_count: 0,
            signal_amplitude: 0,
            raise_switch_after: None,
            raise_microphone_after: None,
            voltage_drop_after: None,
            raw_sample_rate: config.sample_rate,
        }
    }

    pub fn set_clock(&mut self, seconds: u32, milliseconds: u32) {
        self.clock_micros = seconds as u64 * 1_000_000 + milliseconds as u64 * 1000;
    }

    pub fn file(&self, path: &str) -> Option<&Vec<u8>> {
        self.files.get(path)
    }
}

impl Clock for MockHal {
    fn now(&self) -> Timestamp {
        Timestamp::new(
            (self.clock_micros / 1_000_000) as u32,
            (self.clock_micros / 1000 % 1000) as u32,
        )
    }

    fn time_is_set(&self) -> bool {
        self.time_set
    }
}

impl ModeInput for MockHal {
    fn switch_position(&self) -> SwitchPosition {
        self.switch
    }
}

impl Storage for MockHal {
    fn create_directory(&mut self, path: &str) -> Result<(), StorageError> {
        if !self.directories.iter().any(|d| d == path) {
            self.directories.push(path.into());
        }
        Ok(())
    }

    fn open_file(&mut self, path: &str) -> Result<(), StorageError> {
        if self.fail_open {
            return Err(StorageError::Open);
        }
        self.files.insert(path.into(), Vec::new());
        self.open = Some(OpenFile {
            path: path.into(),
            cursor: 0,
        });
        Ok(())
    }

    fn seek(&mut self, offset: u32) -> Result<(), StorageError> {
        match self.open.as_mut() {
            Some(open) => {
                open.cursor = offset as usize;
                Ok(())
            }
            None => Err(StorageError::Seek),
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<(), StorageError> {
        if self.fail_write {
            return Err(StorageError::Write);
        }
        let open = self.open.as_mut().ok_or(StorageError::Write)?;
        let file = self.files.get_mut(&open.path).ok_or(StorageError::Write)?;
        let end = open.cursor + data.len();
        if file.len() < end {
            file.resize(end, 0);
        }
        file[open.cursor..end].copy_from_slice(data);
        open.cursor = end;
        Ok(())
    }

    fn close_file(&mut self) -> Result<(), StorageError> {
        self.open = None;
        Ok(())
    }

    fn rename_file(&mut self, from: &str, to: &str) -> Result<(), StorageError> {
        let data = self.files.remove(from).ok_or(StorageError::Rename)?;
        self.files.insert(to.into(), data);
        Ok(())
    }
}

impl SamplingHardware for MockHal {
    fn enable_microphone(&mut self, settings: &MicrophoneSettings) {
        self.last_microphone = Some(*settings);
    }

    fn disable_microphone(&mut self) {}

    fn next_transfer(&mut self, signals: &Signals) -> &[i16] {
        self.transfer_count += 1;
        if let Some(after) = self.raise_switch_after {
            if self.transfer_count >= after {
                signals.raise_switch_changed();
            }
        }
        if let Some(after) = self.raise_microphone_after {
            if self.transfer_count >= after {
                signals.raise_microphone_changed();
            }
        }
        if let Some((after, millivolts)) = self.voltage_drop_after {
            if self.transfer_count >= after {
                self.voltage_millivolts = millivolts;
            }
        }

        self.clock_micros += 1024 * 1_000_000 / self.raw_sample_rate as u64;
        self.transfer_buffer.fill(self.signal_amplitude);
        &self.transfer_buffer
    }
}

impl PowerMonitor for MockHal {
    fn supply_voltage_millivolts(&mut self) -> u32 {
        self.voltage_millivolts
    }

    fn temperature_millidegrees(&mut self) -> i32 {
        self.temperature_millidegrees
    }
}

impl RetainedMemory for MockHal {
    fn is_initial_power_up(&self) -> bool {
        self.initial_power_up
    }

    fn retained_read(&self, buffer: &mut [u8]) {
        buffer.fill(0);
        let len = buffer.len().min(self.retained.len());
        buffer[..len].copy_from_slice(&self.retained[..len]);
    }

    fn retained_write(&mut self, data: &[u8]) {
        self.retained.clear();
        self.retained.extend_from_slice(data);
        self.initial_power_up = false;
    }
}

impl ConfigStore for MockHal {
    fn read_config_blob(&self, buffer: &mut [u8]) -> usize {
        let len = buffer.len().min(self.config_blob.len());
        buffer[..len].copy_from_slice(&self.config_blob[..len]);
        len
    }
}

impl Metadata for MockHal {
    fn format_artist(&self, out: &mut heapless::String<ARTIST_LENGTH>) {
        let _ = write!(out, "vesper");
    }

    fn format_comment(&self, out: &mut heapless::String<COMMENT_LENGTH>, info: &RecordingInfo) {
        let _ = write!(
            out,
            "Recorded at {} with {} gain at {} mV",
            info.timestamp,
            info.gain.label(),
            info.battery_millivolts
        );
    }

    fn write_config_file(
        &mut self,
        _config: &RecorderConfig,
        _deployment_id: &[u8; 8],
    ) -> Result<(), StorageError> {
        self.config_files_written += 1;
        Ok(())
    }
}

impl Maintenance for MockHal {
    fn handle_usb_transfer(&mut self) {
        self.usb_sessions += 1;
    }

    fn acquire_configuration(&mut self) -> Option<ConfigUpdate> {
        self.delivered_config.take()
    }
}
