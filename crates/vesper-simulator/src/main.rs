//! Desktop simulator for the vesper acoustic recorder engine.
//!
//! Drives the wake-tick orchestrator against a host-filesystem HAL and a
//! synthetic soundscape — a 1 kHz tone that comes and goes — so the produced
//! WAV files contain both raw audio segments and collapsed silence runs.
//! Each requested power-down simply advances the simulated clock.
//!
//! Usage: `vesper-simulator [OUTPUT_DIR] [SIMULATED_MINUTES]`
//!
//! Run with `RUST_LOG=info` to watch the engine schedule and record.

use std::f64::consts::TAU;
use std::fs::{self, File};
use std::io::{Seek, SeekFrom, Write as _};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{error, info};

use vesper_core::config::{RecorderConfig, RecordingPeriod};
use vesper_core::datetime;
use vesper_core::hal::{
    Clock, ConfigStore, ConfigUpdate, Maintenance, Metadata, MicrophoneSettings, ModeInput,
    PowerMonitor, RecordingInfo, RetainedMemory, SamplingHardware, Signals, Storage,
    StorageError, SwitchPosition, Timestamp,
};
use vesper_core::orchestrator::Device;
use vesper_core::wav::{ARTIST_LENGTH, COMMENT_LENGTH};

// ---------------------------------------------------------------------------
// Soundscape constants
// ---------------------------------------------------------------------------

/// Synthetic tone frequency in Hz.
const TONE_FREQUENCY: f64 = 1_000.0;

/// Synthetic tone amplitude on the 16-bit scale.
const TONE_AMPLITUDE: f64 = 8_000.0;

/// The tone sounds for the first portion of every cycle of this length.
const SOUNDSCAPE_CYCLE_SECONDS: u64 = 30;
const SOUNDSCAPE_TONE_SECONDS: u64 = 12;

// ---------------------------------------------------------------------------
// Host-filesystem HAL
// ---------------------------------------------------------------------------

struct OpenFile {
    file: File,
    path: PathBuf,
}

/// HAL implementation over the host filesystem and a simulated clock.
struct SimHal {
    clock_micros: u64,
    output: PathBuf,
    open: Option<OpenFile>,
    retained: Vec<u8>,
    first_power_up: bool,
    pending_config: Option<ConfigUpdate>,
    transfer: [i16; 1024],
    samples_generated: u64,
    raw_sample_rate: u32,
}

impl SimHal {
    fn new(output: PathBuf, start_seconds: u32, config: RecorderConfig) -> Self {
        Self {
            clock_micros: start_seconds as u64 * 1_000_000,
            output,
            open: None,
            retained: Vec::new(),
            first_power_up: true,
            raw_sample_rate: config.sample_rate,
            pending_config: Some(ConfigUpdate {
                config,
                deployment_id: Some(*b"SIM-0001"),
            }),
            transfer: [0; 1024],
            samples_generated: 0,
        }
    }

    fn advance_millis(&mut self, milliseconds: u32) {
        self.clock_micros += milliseconds as u64 * 1000;
    }
}

impl Clock for SimHal {
    fn now(&self) -> Timestamp {
        Timestamp::new(
            (self.clock_micros / 1_000_000) as u32,
            (self.clock_micros / 1000 % 1000) as u32,
        )
    }

    fn time_is_set(&self) -> bool {
        true
    }
}

impl ModeInput for SimHal {
    fn switch_position(&self) -> SwitchPosition {
        SwitchPosition::CustomSchedule
    }
}

impl Storage for SimHal {
    fn create_directory(&mut self, path: &str) -> Result<(), StorageError> {
        fs::create_dir_all(self.output.join(path)).map_err(|e| {
            error!("create_dir {}: {}", path, e);
            StorageError::CreateDirectory
        })
    }

    fn open_file(&mut self, path: &str) -> Result<(), StorageError> {
        let full = self.output.join(path);
        let file = File::create(&full).map_err(|e| {
            error!("open {}: {}", full.display(), e);
            StorageError::Open
        })?;
        self.open = Some(OpenFile { file, path: full });
        Ok(())
    }

    fn seek(&mut self, offset: u32) -> Result<(), StorageError> {
        let open = self.open.as_mut().ok_or(StorageError::Seek)?;
        open.file
            .seek(SeekFrom::Start(offset as u64))
            .map(|_| ())
            .map_err(|e| {
                error!("seek {}: {}", open.path.display(), e);
                StorageError::Seek
            })
    }

    fn write(&mut self, data: &[u8]) -> Result<(), StorageError> {
        let open = self.open.as_mut().ok_or(StorageError::Write)?;
        open.file.write_all(data).map_err(|e| {
            error!("write {}: {}", open.path.display(), e);
            StorageError::Write
        })
    }

    fn close_file(&mut self) -> Result<(), StorageError> {
        match self.open.take() {
            Some(open) => open.file.sync_all().map_err(|e| {
                error!("close {}: {}", open.path.display(), e);
                StorageError::Close
            }),
            None => Ok(()),
        }
    }

    fn rename_file(&mut self, from: &str, to: &str) -> Result<(), StorageError> {
        fs::rename(self.output.join(from), self.output.join(to)).map_err(|e| {
            error!("rename {} -> {}: {}", from, to, e);
            StorageError::Rename
        })
    }
}

impl SamplingHardware for SimHal {
    fn enable_microphone(&mut self, settings: &MicrophoneSettings) {
        info!(
            "microphone on: {} gain, {} Hz raw",
            settings.gain.label(),
            settings.sample_rate
        );
    }

    fn disable_microphone(&mut self) {
        info!("microphone off");
    }

    fn next_transfer(&mut self, _signals: &Signals) -> &[i16] {
        // Tone on or off is decided per transfer (2.7 ms at 384 kHz), the
        // phase runs continuously across transfers.
        let second = self.clock_micros / 1_000_000;
        let audible = second % SOUNDSCAPE_CYCLE_SECONDS < SOUNDSCAPE_TONE_SECONDS;

        for slot in self.transfer.iter_mut() {
            *slot = if audible {
                let t = self.samples_generated as f64 / self.raw_sample_rate as f64;
                (f64::sin(TAU * TONE_FREQUENCY * t) * TONE_AMPLITUDE) as i16
            } else {
                0
            };
            self.samples_generated += 1;
        }

        self.clock_micros += self.transfer.len() as u64 * 1_000_000 / self.raw_sample_rate as u64;
        &self.transfer
    }
}

impl PowerMonitor for SimHal {
    fn supply_voltage_millivolts(&mut self) -> u32 {
        3_700
    }

    fn temperature_millidegrees(&mut self) -> i32 {
        21_500
    }
}

impl RetainedMemory for SimHal {
    fn is_initial_power_up(&self) -> bool {
        self.first_power_up
    }

    fn retained_read(&self, buffer: &mut [u8]) {
        buffer.fill(0);
        let len = buffer.len().min(self.retained.len());
        buffer[..len].copy_from_slice(&self.retained[..len]);
    }

    fn retained_write(&mut self, data: &[u8]) {
        self.retained.clear();
        self.retained.extend_from_slice(data);
        self.first_power_up = false;
    }
}

impl ConfigStore for SimHal {
    fn read_config_blob(&self, _buffer: &mut [u8]) -> usize {
        // The simulated deployment delivers its configuration through the
        // mode-transition path instead.
        0
    }
}

impl Metadata for SimHal {
    fn format_artist(&self, out: &mut heapless::String<ARTIST_LENGTH>) {
        let _ = core::fmt::Write::write_str(out, "vesper simulator");
    }

    fn format_comment(&self, out: &mut heapless::String<COMMENT_LENGTH>, info: &RecordingInfo) {
        let dt = datetime::from_epoch(info.timestamp);
        let _ = core::fmt::write(
            out,
            format_args!(
                "Recorded at {:02}:{:02}:{:02} {:02}/{:02}/{:04} (UTC) at {} gain \
                 while battery was {} mV and temperature was {}.{}C.",
                dt.hours,
                dt.minutes,
                dt.seconds,
                dt.day,
                dt.month,
                dt.year,
                info.gain.label(),
                info.battery_millivolts,
                info.temperature_millidegrees / 1000,
                (info.temperature_millidegrees.unsigned_abs() % 1000) / 100,
            ),
        );
    }

    fn write_config_file(
        &mut self,
        config: &RecorderConfig,
        _deployment_id: &[u8; 8],
    ) -> Result<(), StorageError> {
        let path = self.output.join("CONFIG.TXT");
        let text = format!(
            "Sample rate (Hz) : {}\n\
             Gain 1 / gain 2  : {} / {}\n\
             Record (s)       : {} / {}\n\
             Sleep (s)        : {}\n\
             Threshold        : {}\n",
            config.effective_sample_rate(),
            config.gain1.label(),
            config.gain2.label(),
            config.record_duration_gain1,
            config.record_duration_gain2,
            config.sleep_duration,
            config.amplitude_threshold,
        );
        fs::write(&path, text).map_err(|e| {
            error!("write {}: {}", path.display(), e);
            StorageError::Write
        })
    }
}

impl Maintenance for SimHal {
    fn handle_usb_transfer(&mut self) {
        info!("USB transfer position, nothing to do in the simulator");
    }

    fn acquire_configuration(&mut self) -> Option<ConfigUpdate> {
        self.pending_config.take()
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> std::io::Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let output = PathBuf::from(args.next().unwrap_or_else(|| "recordings".into()));
    let minutes: u32 = args.next().and_then(|a| a.parse().ok()).unwrap_or(5);
    fs::create_dir_all(&output)?;

    // Short duty cycle so a few simulated minutes produce several files.
    let mut config = RecorderConfig::default();
    config.active_recording_periods = 1;
    config.recording_periods[0] = RecordingPeriod::new(0, 0);
    config.record_duration_gain1 = 5;
    config.record_duration_gain2 = 5;
    config.sleep_duration = 10;
    config.amplitude_threshold = 512;

    let start = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as u32;
    let end = start + minutes * 60;

    info!(
        "simulating {} minute(s) into {}, starting at epoch {}",
        minutes,
        output.display(),
        start
    );

    let mut device = Device::new(SimHal::new(output.clone(), start, config));
    let mut ticks = 0u32;

    while device.hal().now().seconds < end {
        let sleep = device.wake_tick();
        device.hal_mut().advance_millis(sleep.milliseconds);
        ticks += 1;
    }

    info!("done: {} wake ticks, output in {}", ticks, output.display());
    Ok(())
}
