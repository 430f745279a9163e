//! Cross-wake persisted state.
//!
//! RAM does not survive between wake events, so everything the scheduler
//! and orchestrator need across ticks lives in one serializable snapshot
//! written to the retained memory region. [`StateStore`] owns the only
//! load/save paths; every other component receives the state by reference.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::config::RecorderConfig;
use crate::hal::{RetainedMemory, SwitchPosition};
use crate::scheduler::NO_EVENT_SCHEDULED;

/// Preparation-period clamp and adjustment constants (milliseconds). The
/// preparation period is the lead time the device wakes early so the file
/// is open and storage ready before the target sample.
pub const MINIMUM_PREPARATION_PERIOD_MS: u32 = 750;
pub const INITIAL_PREPARATION_PERIOD_MS: u32 = 2_000;
pub const MAXIMUM_PREPARATION_PERIOD_MS: u32 = 30_000;
pub const PREPARATION_PERIOD_INCREMENT_MS: u32 = 250;

/// Recording errors tolerated before scheduling is cancelled until the next
/// mode transition.
pub const MAXIMUM_RECORDING_ERRORS: u32 = 5;

pub const DEPLOYMENT_ID_LENGTH: usize = 8;

/// Size of the serialized snapshot region, including the magic prefix.
pub const SNAPSHOT_SIZE: usize = 256;

/// Identifies a valid snapshot; an unmatched magic (or a snapshot that
/// fails to decode) forces cold-boot defaults, since retained memory is
/// never assumed zero-initialized.
const SNAPSHOT_MAGIC: [u8; 2] = *b"VS";

/// Everything that must survive a power-down/wake cycle.
///
/// Index 0 of the per-gain arrays is the gain-1 step, index 1 the gain-2
/// step. A time of [`NO_EVENT_SCHEDULED`] means nothing is scheduled; a
/// duration of 0 means "skip this gain step".
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RetainedState {
    pub config: RecorderConfig,
    pub time_of_next_recording: [u32; 2],
    pub duration_of_next_recording: [u32; 2],
    pub previous_switch_position: SwitchPosition,
    pub recording_errors: u32,
    /// Learned wake-early lead time in milliseconds, clamped to
    /// `[MINIMUM_PREPARATION_PERIOD_MS, MAXIMUM_PREPARATION_PERIOD_MS]`.
    pub preparation_period_ms: u32,
    /// Opaque deployment identity; all zeroes means "no deployment set".
    pub deployment_id: [u8; DEPLOYMENT_ID_LENGTH],
    /// At-most-once-per-session guard for the configuration file.
    pub written_config_to_file: bool,
    /// Recomputed on every mode transition.
    pub ready_to_make_recordings: bool,
}

impl Default for RetainedState {
    fn default() -> Self {
        Self {
            config: RecorderConfig::default(),
            time_of_next_recording: [NO_EVENT_SCHEDULED; 2],
            duration_of_next_recording: [0; 2],
            previous_switch_position: SwitchPosition::UsbTransfer,
            recording_errors: 0,
            preparation_period_ms: INITIAL_PREPARATION_PERIOD_MS,
            deployment_id: [0; DEPLOYMENT_ID_LENGTH],
            written_config_to_file: false,
            ready_to_make_recordings: false,
        }
    }
}

impl RetainedState {
    pub fn deployment_id_is_set(&self) -> bool {
        self.deployment_id != [0; DEPLOYMENT_ID_LENGTH]
    }

    /// Cancel both gain schedules until the next mode transition.
    pub fn cancel_schedule(&mut self) {
        self.time_of_next_recording = [NO_EVENT_SCHEDULED; 2];
        self.duration_of_next_recording = [0; 2];
    }

    /// Move the preparation period to the measured lead time plus a fixed
    /// margin, clamped to the allowed range.
    pub fn adjust_preparation_period(&mut self, measured_ms: u32) {
        self.preparation_period_ms = measured_ms
            .saturating_add(PREPARATION_PERIOD_INCREMENT_MS)
            .clamp(MINIMUM_PREPARATION_PERIOD_MS, MAXIMUM_PREPARATION_PERIOD_MS);
    }
}

/// Owner of the retained snapshot; the only component allowed to touch the
/// retained memory region.
pub struct StateStore {
    state: RetainedState,
    cold_boot: bool,
}

impl StateStore {
    /// Load the snapshot from retained memory.
    ///
    /// Defaults are written exactly once, on the device-level first-power-up
    /// signal — or whenever the snapshot fails to validate, since no field
    /// may be assumed meaningful unless a previous save wrote it.
    pub fn load<M: RetainedMemory>(memory: &mut M) -> Self {
        if memory.is_initial_power_up() {
            info!("first power-up, initializing retained state");
            let store = Self {
                state: RetainedState::default(),
                cold_boot: true,
            };
            store.save(memory);
            return store;
        }

        let mut buffer = [0u8; SNAPSHOT_SIZE];
        memory.retained_read(&mut buffer);

        if buffer[..2] == SNAPSHOT_MAGIC {
            if let Ok(state) = postcard::from_bytes::<RetainedState>(&buffer[2..]) {
                return Self {
                    state,
                    cold_boot: false,
                };
            }
        }

        warn!("retained snapshot invalid, re-initializing");
        let store = Self {
            state: RetainedState::default(),
            cold_boot: true,
        };
        store.save(memory);
        store
    }

    /// Persist the snapshot. Called immediately before every power-down
    /// request and after any state change that must survive it.
    pub fn save<M: RetainedMemory>(&self, memory: &mut M) {
        let mut buffer = [0u8; SNAPSHOT_SIZE];
        buffer[..2].copy_from_slice(&SNAPSHOT_MAGIC);
        match postcard::to_slice(&self.state, &mut buffer[2..]) {
            Ok(_) => memory.retained_write(&buffer),
            Err(_) => warn!("retained snapshot did not fit, state not persisted"),
        }
    }

    /// True when this load performed cold-boot initialization.
    pub fn was_cold_boot(&self) -> bool {
        self.cold_boot
    }

    pub fn state(&self) -> &RetainedState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut RetainedState {
        &mut self.state
    }
}
