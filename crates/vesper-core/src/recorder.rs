//! Recording executor.
//!
//! One call to [`make_recording`] takes a single scheduled gain window from
//! file open to close: pre-flight checks, start alignment, the acquire/drain
//! loop against the segment ring, and header finalization. Cancellation
//! conditions stop acquisition but still finalize the file with the samples
//! gathered so far; only storage failure abandons it.

use core::fmt::Write as _;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::acquisition::ring::SAMPLES_PER_SEGMENT;
use crate::acquisition::{Decimator, SamplePipeline, SegmentWriter};
use crate::config::{GainSetting, RecorderConfig};
use crate::datetime;
use crate::hal::{
    Hal, MicrophoneSettings, RecordingInfo, Signals, StorageError, Timestamp,
};
use crate::wav::{HEADER_LENGTH, MAXIMUM_WAV_FILE_SIZE, WavHeader};

/// Supply voltage floor below which recording is refused or aborted when
/// the low-voltage cutoff is enabled.
pub const MINIMUM_SUPPLY_VOLTAGE_MILLIVOLTS: u32 = 2800;

/// How a recording attempt ended.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingOutcome {
    Okay,
    /// Completed, but the duration was truncated to the file-size ceiling.
    FileSizeLimited,
    LowVoltage,
    SwitchChanged,
    MicrophoneChanged,
    SdWriteError,
}

impl RecordingOutcome {
    /// Whether this outcome counts toward the consecutive-error limit.
    /// Operator actions and deliberate truncation are not faults.
    pub const fn counts_as_error(self) -> bool {
        matches!(self, Self::SdWriteError | Self::LowVoltage)
    }
}

/// Which half of the duty cycle a scheduled window belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GainStep {
    Gain1,
    Gain2,
}

impl GainStep {
    /// Index into the per-gain schedule arrays.
    pub const fn index(self) -> usize {
        match self {
            Self::Gain1 => 0,
            Self::Gain2 => 1,
        }
    }

    pub const fn gain(self, config: &RecorderConfig) -> GainSetting {
        match self {
            Self::Gain1 => config.gain1,
            Self::Gain2 => config.gain2,
        }
    }

    pub const fn record_duration(self, config: &RecorderConfig) -> u32 {
        match self {
            Self::Gain1 => config.record_duration_gain1 as u32,
            Self::Gain2 => config.record_duration_gain2 as u32,
        }
    }
}

/// Result of one recording attempt, as the orchestrator needs it: the
/// outcome for error accounting and rescheduling, plus the observed file
/// open time for tuning the preparation period.
#[derive(Debug, Clone, Copy)]
pub struct AttemptReport {
    pub outcome: RecordingOutcome,
    pub file_open_time: Timestamp,
}

/// Execute one scheduled recording window.
///
/// `start` and `duration` come from the persisted schedule. When the wake
/// ran late the effective start is pushed to the next whole second at or
/// after the file open and the duration shrinks to keep the original end
/// time; the file is renamed to its effective start afterwards.
#[allow(clippy::too_many_arguments)]
pub fn make_recording<H: Hal>(
    hal: &mut H,
    signals: &Signals,
    pipeline: &mut SamplePipeline,
    config: &RecorderConfig,
    deployment_id: &[u8; 8],
    start: u32,
    duration: u32,
    step: GainStep,
) -> AttemptReport {
    if config.enable_low_voltage_cutoff
        && hal.supply_voltage_low(MINIMUM_SUPPLY_VOLTAGE_MILLIVOLTS)
    {
        warn!("supply voltage below cutoff, recording refused");
        return AttemptReport {
            outcome: RecordingOutcome::LowVoltage,
            file_open_time: hal.now(),
        };
    }

    let effective_rate = config.effective_sample_rate();

    // Truncate to what fits under the WAV size ceiling.
    let maximum_duration = (MAXIMUM_WAV_FILE_SIZE - HEADER_LENGTH as u32) / 2 / effective_rate;
    let (duration, mut outcome) = if duration > maximum_duration {
        (maximum_duration, RecordingOutcome::FileSizeLimited)
    } else {
        (duration, RecordingOutcome::Okay)
    };

    // The file is named for the scheduled start and renamed later if the
    // effective start differs.
    let path = recording_path(config, start);
    if config.enable_daily_folders {
        let folder = day_folder(start);
        if hal.create_directory(&folder).is_err() {
            return AttemptReport {
                outcome: RecordingOutcome::SdWriteError,
                file_open_time: hal.now(),
            };
        }
    }
    if hal.open_file(&path).is_err() {
        warn!("failed to open {}", path.as_str());
        return AttemptReport {
            outcome: RecordingOutcome::SdWriteError,
            file_open_time: hal.now(),
        };
    }

    let file_open_time = hal.now();

    // Late wake: slide the start to the next whole second and keep the
    // scheduled end. The sub-second residue is absorbed by discarding
    // whole transfers before the first kept sample.
    let open_millis = file_open_time.as_millis();
    let effective_start = (start as u64 * 1000).max(open_millis).div_ceil(1000) as u32;
    let duration = duration.saturating_sub(effective_start - start);
    let residual_millis = effective_start as u64 * 1000 - open_millis;
    let transfers_to_wait =
        (residual_millis * config.sample_rate as u64 / 1000 / 1024) as u32;

    info!(
        "recording {} for {}s at {} gain",
        path.as_str(),
        duration,
        step.gain(config).label()
    );

    let mut header = WavHeader::new();
    let report = run_attempt(
        hal,
        signals,
        pipeline,
        config,
        deployment_id,
        &mut header,
        effective_start,
        duration,
        transfers_to_wait,
        step,
        &mut outcome,
    );
    if report.is_err() {
        outcome = RecordingOutcome::SdWriteError;
        let _ = hal.close_file();
        return AttemptReport {
            outcome,
            file_open_time,
        };
    }

    if effective_start != start && outcome != RecordingOutcome::SdWriteError {
        let renamed = recording_path(config, effective_start);
        if hal.rename_file(&path, &renamed).is_err() {
            outcome = RecordingOutcome::SdWriteError;
        }
    }

    AttemptReport {
        outcome,
        file_open_time,
    }
}

/// The storage-touching body of an attempt; any error here condemns the
/// file, so it is separated to let `?` run to a single failure exit.
#[allow(clippy::too_many_arguments)]
fn run_attempt<H: Hal>(
    hal: &mut H,
    signals: &Signals,
    pipeline: &mut SamplePipeline,
    config: &RecorderConfig,
    deployment_id: &[u8; 8],
    header: &mut WavHeader,
    effective_start: u32,
    duration: u32,
    transfers_to_wait: u32,
    step: GainStep,
    outcome: &mut RecordingOutcome,
) -> Result<(), StorageError> {
    // Placeholder header; the real one is seeked over it at finalization.
    hal.write(&[0u8; HEADER_LENGTH])?;

    let settings = MicrophoneSettings {
        gain: step.gain(config),
        clock_divider: config.microphone_clock_divider(),
        acquisition_cycles: config.acquisition_cycles,
        oversample_rate: config.oversample_rate,
        sample_rate: config.sample_rate,
    };
    hal.enable_microphone(&settings);
    pipeline.begin(
        Decimator::new(config.sample_rate_divider, config.amplitude_threshold),
        transfers_to_wait,
    );

    let effective_rate = config.effective_sample_rate();
    let target_samples = duration as u64 * effective_rate as u64;
    let mut writer = SegmentWriter::new();

    let acquire_result = (|| -> Result<(), StorageError> {
        while pipeline.samples_acquired() < target_samples {
            if signals.switch_changed() {
                *outcome = RecordingOutcome::SwitchChanged;
                break;
            }
            if signals.microphone_changed() {
                *outcome = RecordingOutcome::MicrophoneChanged;
                break;
            }
            if config.enable_low_voltage_cutoff
                && hal.supply_voltage_low(MINIMUM_SUPPLY_VOLTAGE_MILLIVOLTS)
            {
                *outcome = RecordingOutcome::LowVoltage;
                break;
            }

            let raw = hal.next_transfer(signals);
            pipeline.handle_transfer(raw);

            // Acquisition can overshoot the target by part of a transfer;
            // never write past it.
            while let Some(sequence) = pipeline.next_filled() {
                let remaining =
                    target_samples.saturating_sub(writer.samples_represented()) as usize;
                let (samples, has_signal) = pipeline.filled_segment(sequence);
                let take = samples.len().min(remaining);
                if take > 0 {
                    writer.drain(
                        &mut *hal,
                        &samples[..take],
                        has_signal,
                        take == SAMPLES_PER_SEGMENT,
                    )?;
                }
                pipeline.release(sequence);
            }
        }
        Ok(())
    })();
    hal.disable_microphone();
    acquire_result?;

    // Final drain: everything acquired up to the target, the partial tail
    // included, then any outstanding silence run.
    let final_target = target_samples.min(pipeline.samples_acquired());
    while let Some(sequence) = pipeline.next_filled() {
        let remaining = final_target.saturating_sub(writer.samples_represented()) as usize;
        let (samples, has_signal) = pipeline.filled_segment(sequence);
        let take = samples.len().min(remaining);
        if take > 0 {
            writer.drain(
                &mut *hal,
                &samples[..take],
                has_signal,
                take == SAMPLES_PER_SEGMENT,
            )?;
        }
        pipeline.release(sequence);
    }
    let remaining = final_target.saturating_sub(writer.samples_represented()) as usize;
    if remaining > 0 {
        let (samples, has_signal) = pipeline.partial_segment();
        let take = samples.len().min(remaining);
        writer.drain(&mut *hal, &samples[..take], has_signal, false)?;
    }
    writer.flush_run(&mut *hal)?;

    let info = RecordingInfo {
        timestamp: effective_start,
        gain: step.gain(config),
        outcome: *outcome,
        battery_millivolts: hal.supply_voltage_millivolts(),
        temperature_millidegrees: hal.temperature_millidegrees(),
        deployment_id: *deployment_id,
    };
    let mut comment = heapless::String::new();
    hal.format_comment(&mut comment, &info);
    let mut artist = heapless::String::new();
    hal.format_artist(&mut artist);
    header.set_comment(&comment);
    header.set_artist(&artist);
    // The data chunk covers the bytes actually present; the span the
    // suppressed silence stood for is recovered from the in-band tokens.
    header.set_details(effective_rate, writer.bytes_written() / 2);

    hal.seek(0)?;
    hal.write(&header.to_bytes())?;
    hal.close_file()
}

/// `YYYYMMDD_HHMMSS.WAV`, inside a `YYYYMMDD` folder when daily folders
/// are enabled.
fn recording_path(config: &RecorderConfig, time: u32) -> heapless::String<40> {
    let dt = datetime::from_epoch(time);
    let mut path = heapless::String::new();
    if config.enable_daily_folders {
        let _ = write!(path, "{:04}{:02}{:02}/", dt.year, dt.month, dt.day);
    }
    let _ = write!(
        path,
        "{:04}{:02}{:02}_{:02}{:02}{:02}.WAV",
        dt.year, dt.month, dt.day, dt.hours, dt.minutes, dt.seconds
    );
    path
}

fn day_folder(time: u32) -> heapless::String<12> {
    let dt = datetime::from_epoch(time);
    let mut folder = heapless::String::new();
    let _ = write!(folder, "{:04}{:02}{:02}", dt.year, dt.month, dt.day);
    folder
}
