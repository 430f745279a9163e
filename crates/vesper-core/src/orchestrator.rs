//! Wake-tick orchestrator.
//!
//! The device spends its life powered down; each wake runs exactly one
//! [`Device::wake_tick`] pass — reload persisted state, honor the mode
//! switch, run any due recording, reschedule, persist, and report how long
//! to power down for. Nothing is kept in RAM between ticks except the
//! sample ring, which is dead weight while asleep anyway.

use alloc::boxed::Box;

use log::{info, warn};

use crate::acquisition::SamplePipeline;
use crate::config::{RecorderConfig, RecordingPeriod};
use crate::hal::{Hal, Signals, SwitchPosition, Timestamp};
use crate::recorder::{self, GainStep};
use crate::retained::{MAXIMUM_RECORDING_ERRORS, RetainedState, StateStore};
use crate::scheduler::{self, NO_EVENT_SCHEDULED};

/// Power-down interval when no recording is scheduled; the switch and clock
/// are re-checked at this cadence.
pub const DEFAULT_WAIT_INTERVAL_MS: u32 = 1000;

/// Power-down interval when the next event is already due or imminent.
pub const SHORT_WAIT_INTERVAL_MS: u32 = 100;

/// Size of the long-term configuration blob read at cold boot.
const CONFIG_BLOB_SIZE: usize = 128;

/// How long the caller should power the device down before the next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepRequest {
    pub milliseconds: u32,
}

/// The engine's top-level object: owns the HAL, the cancellation signals
/// and the sample ring for the lifetime of the firmware.
pub struct Device<H: Hal> {
    hal: H,
    signals: Signals,
    pipeline: Box<SamplePipeline>,
}

impl<H: Hal> Device<H> {
    pub fn new(hal: H) -> Self {
        Self {
            hal,
            signals: Signals::new(),
            pipeline: Box::new(SamplePipeline::new()),
        }
    }

    pub fn hal(&self) -> &H {
        &self.hal
    }

    pub fn hal_mut(&mut self) -> &mut H {
        &mut self.hal
    }

    /// Run one wake tick to completion.
    pub fn wake_tick(&mut self) -> SleepRequest {
        let mut store = StateStore::load(&mut self.hal);

        if store.was_cold_boot() {
            self.load_stored_configuration(&mut store);
        }

        let switch = self.hal.switch_position();

        if switch == SwitchPosition::UsbTransfer {
            self.hal.handle_usb_transfer();
            store.state_mut().previous_switch_position = SwitchPosition::UsbTransfer;
            store.save(&mut self.hal);
            return SleepRequest {
                milliseconds: DEFAULT_WAIT_INTERVAL_MS,
            };
        }

        self.signals.clear();

        if switch != store.state().previous_switch_position {
            self.handle_mode_transition(&mut store, switch);
        }

        if store.state().ready_to_make_recordings {
            self.write_config_file_once(&mut store);
            let attempted_through = self.run_due_recordings(&mut store);
            self.reschedule_if_empty(&mut store, switch, attempted_through);
        }

        let sleep = self.power_down_interval(store.state());
        store.state_mut().previous_switch_position = switch;
        store.save(&mut self.hal);
        sleep
    }

    /// Cold boot: the retained snapshot was just re-initialized, so pull the
    /// last configuration from long-term storage if one was ever written.
    fn load_stored_configuration(&mut self, store: &mut StateStore) {
        let mut buffer = [0u8; CONFIG_BLOB_SIZE];
        let length = self.hal.read_config_blob(&mut buffer);
        if length == 0 {
            info!("no stored configuration, using defaults");
            return;
        }
        match postcard::from_bytes::<RecorderConfig>(&buffer[..length]) {
            Ok(config) => store.state_mut().config = config,
            Err(_) => warn!("stored configuration invalid, using defaults"),
        }
    }

    /// The switch moved (or this is the first tick out of USB): give the
    /// configuration protocols a chance, reset the error counter, recompute
    /// readiness and build a fresh schedule.
    fn handle_mode_transition(&mut self, store: &mut StateStore, switch: SwitchPosition) {
        info!("mode transition to {:?}", switch);

        if let Some(update) = self.hal.acquire_configuration() {
            let state = store.state_mut();
            state.config = update.config;
            if let Some(id) = update.deployment_id {
                state.deployment_id = id;
            }
        }

        let time_is_set = self.hal.time_is_set();
        let now = self.hal.now();
        let state = store.state_mut();
        state.recording_errors = 0;
        state.written_config_to_file = false;
        state.ready_to_make_recordings = time_is_set
            && (switch == SwitchPosition::Continuous || !state.config.active_periods().is_empty());

        if state.ready_to_make_recordings {
            let schedule_time = schedule_time_after(now, state.preparation_period_ms);
            apply_schedule(state, switch, schedule_time);
        } else {
            state.cancel_schedule();
        }
    }

    /// Write the human-readable configuration file at most once per session.
    fn write_config_file_once(&mut self, store: &mut StateStore) {
        if store.state().written_config_to_file {
            return;
        }
        let config = store.state().config;
        let deployment_id = store.state().deployment_id;
        if self.hal.write_config_file(&config, &deployment_id).is_ok() {
            store.state_mut().written_config_to_file = true;
        }
    }

    /// Run every gain step whose start falls within the preparation horizon,
    /// earliest first. Returns the end of the latest attempted window so
    /// rescheduling can never land back inside it.
    fn run_due_recordings(&mut self, store: &mut StateStore) -> Option<u32> {
        let mut attempted_through = None;

        loop {
            let now = self.hal.now();
            let state = store.state_mut();
            let horizon = now.as_millis() + state.preparation_period_ms as u64;

            let due = [GainStep::Gain1, GainStep::Gain2]
                .into_iter()
                .filter(|step| {
                    let time = state.time_of_next_recording[step.index()];
                    let duration = state.duration_of_next_recording[step.index()];
                    time != NO_EVENT_SCHEDULED && duration > 0 && time as u64 * 1000 <= horizon
                })
                .min_by_key(|step| state.time_of_next_recording[step.index()]);
            let Some(step) = due else { break };

            let start = state.time_of_next_recording[step.index()];
            let duration = state.duration_of_next_recording[step.index()];
            state.time_of_next_recording[step.index()] = NO_EVENT_SCHEDULED;
            state.duration_of_next_recording[step.index()] = 0;
            let config = state.config;
            let deployment_id = state.deployment_id;

            let report = recorder::make_recording(
                &mut self.hal,
                &self.signals,
                &mut self.pipeline,
                &config,
                &deployment_id,
                start,
                duration,
                step,
            );

            let state = store.state_mut();
            if report.outcome.counts_as_error() {
                state.recording_errors += 1;
                warn!(
                    "recording failed ({:?}), {} of {} errors",
                    report.outcome, state.recording_errors, MAXIMUM_RECORDING_ERRORS
                );
            }
            // The lead time is measured from the moment this attempt was
            // picked up, not from the start of the tick, so earlier
            // recordings in the same tick do not inflate it.
            let measured_ms = report
                .file_open_time
                .as_millis()
                .saturating_sub(now.as_millis()) as u32;
            state.adjust_preparation_period(measured_ms);

            let end = start.saturating_add(duration);
            attempted_through = Some(attempted_through.map_or(end, |e: u32| e.max(end)));

            if state.recording_errors >= MAXIMUM_RECORDING_ERRORS {
                warn!("error limit reached, recordings suspended until mode change");
                state.cancel_schedule();
                break;
            }
            if self.signals.switch_changed() {
                break;
            }
        }

        attempted_through
    }

    /// Build a fresh schedule once both gain slots have been consumed.
    fn reschedule_if_empty(
        &mut self,
        store: &mut StateStore,
        switch: SwitchPosition,
        attempted_through: Option<u32>,
    ) {
        let state = store.state_mut();
        let nothing_scheduled = state
            .time_of_next_recording
            .iter()
            .all(|&t| t == NO_EVENT_SCHEDULED);
        if !nothing_scheduled
            || state.recording_errors >= MAXIMUM_RECORDING_ERRORS
            || self.signals.switch_changed()
        {
            return;
        }

        let now = self.hal.now();
        let mut schedule_time = schedule_time_after(now, state.preparation_period_ms);
        if let Some(end) = attempted_through {
            // Never schedule back into a window that was just attempted.
            schedule_time = schedule_time.max(end);
        }
        apply_schedule(state, switch, schedule_time);
    }

    fn power_down_interval(&mut self, state: &RetainedState) -> SleepRequest {
        let next = state
            .time_of_next_recording
            .iter()
            .zip(state.duration_of_next_recording.iter())
            .filter(|&(&time, &duration)| time != NO_EVENT_SCHEDULED && duration > 0)
            .map(|(&time, _)| time)
            .min();

        let milliseconds = match next {
            Some(time) => {
                let target = (time as u64 * 1000).saturating_sub(state.preparation_period_ms as u64);
                let now = self.hal.now().as_millis();
                if target <= now {
                    SHORT_WAIT_INTERVAL_MS
                } else {
                    (target - now) as u32
                }
            }
            None => DEFAULT_WAIT_INTERVAL_MS,
        };

        SleepRequest { milliseconds }
    }
}

/// First whole second at least one preparation period ahead of `now`.
fn schedule_time_after(now: Timestamp, preparation_period_ms: u32) -> u32 {
    now.seconds + (now.milliseconds + preparation_period_ms).div_ceil(1000)
}

/// Run the scheduler and store the result in the per-gain slots. In
/// continuous mode the configured periods are ignored in favor of a single
/// full-day period.
fn apply_schedule(state: &mut RetainedState, switch: SwitchPosition, schedule_time: u32) {
    let mut config = state.config;
    if switch == SwitchPosition::Continuous {
        config.active_recording_periods = 1;
        config.recording_periods[0] = RecordingPeriod::new(0, 0);
    }

    let schedule = scheduler::schedule_recording(&config, schedule_time);
    state.time_of_next_recording = [schedule.gain1_start, schedule.gain2_start];
    state.duration_of_next_recording = [schedule.gain1_duration, schedule.gain2_duration];

    match schedule.next_event() {
        Some(time) => info!("next recording at {}", time),
        None => info!("nothing to schedule"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::{Clock, ConfigUpdate};
    use crate::retained::MINIMUM_PREPARATION_PERIOD_MS;
    use crate::scheduler::START_OF_CENTURY;
    use crate::testutil::MockHal;

    const BASE: u32 = START_OF_CENTURY;

    /// Full-day single period, 1 s at each gain, 58 s of sleep per cycle.
    fn deployed_config() -> RecorderConfig {
        let mut config = RecorderConfig::default();
        config.active_recording_periods = 1;
        config.recording_periods[0] = RecordingPeriod::new(0, 0);
        config.record_duration_gain1 = 1;
        config.record_duration_gain2 = 1;
        config.sleep_duration = 58;
        config
    }

    fn deployed_device(config: &RecorderConfig) -> Device<MockHal> {
        let mut hal = MockHal::new(config);
        hal.set_clock(BASE, 0);
        hal.signal_amplitude = 500;
        hal.config_blob = postcard::to_allocvec(config).unwrap();
        Device::new(hal)
    }

    fn persisted_state(device: &mut Device<MockHal>) -> RetainedState {
        StateStore::load(device.hal_mut()).state().clone()
    }

    #[test]
    fn cold_boot_initializes_exactly_once() {
        let config = deployed_config();
        let mut device = deployed_device(&config);

        device.wake_tick();
        let state = persisted_state(&mut device);
        assert_eq!(state.config, config);

        // A later tick is a warm wake over the persisted snapshot.
        let store = StateStore::load(device.hal_mut());
        assert!(!store.was_cold_boot());
    }

    #[test]
    fn usb_position_defers_to_the_transfer_handler() {
        let config = deployed_config();
        let mut device = deployed_device(&config);
        device.hal_mut().switch = SwitchPosition::UsbTransfer;

        let sleep = device.wake_tick();
        assert_eq!(sleep.milliseconds, DEFAULT_WAIT_INTERVAL_MS);
        assert_eq!(device.hal().usb_sessions, 1);
        assert!(device.hal().files.is_empty());

        let state = persisted_state(&mut device);
        assert_eq!(state.previous_switch_position, SwitchPosition::UsbTransfer);
    }

    #[test]
    fn first_tick_schedules_and_sleeps_until_the_preparation_point() {
        let config = deployed_config();
        let mut device = deployed_device(&config);

        let sleep = device.wake_tick();

        // Transition at BASE with a 2000 ms initial preparation period
        // pushes the schedule time to BASE+2, into the first cycle's sleep
        // phase; both gains land in the next cycle.
        let state = persisted_state(&mut device);
        assert_eq!(state.time_of_next_recording, [BASE + 60, BASE + 61]);
        assert_eq!(state.duration_of_next_recording, [1, 1]);
        assert!(state.ready_to_make_recordings);

        // Sleep runs to one preparation period before the gain-1 start.
        assert_eq!(sleep.milliseconds, 58_000);
    }

    #[test]
    fn due_windows_record_both_gains_and_reschedule() {
        let config = deployed_config();
        let mut device = deployed_device(&config);

        let sleep = device.wake_tick();
        let wake = BASE as u64 * 1000 + sleep.milliseconds as u64;
        device
            .hal_mut()
            .set_clock((wake / 1000) as u32, (wake % 1000) as u32);

        device.wake_tick();

        // Gain 1 at 00:01:00, gain 2 at 00:01:01.
        assert!(device.hal().file("20000101_000100.WAV").is_some());
        assert!(device.hal().file("20000101_000101.WAV").is_some());

        // Rescheduled into the following duty cycle, never back into the
        // attempted windows.
        let state = persisted_state(&mut device);
        assert_eq!(state.time_of_next_recording, [BASE + 120, BASE + 121]);
        assert_eq!(state.recording_errors, 0);

        // The config file was written once this session.
        assert_eq!(device.hal().config_files_written, 1);
    }

    #[test]
    fn preparation_period_learns_the_observed_lead() {
        let config = deployed_config();
        let mut device = deployed_device(&config);

        let sleep = device.wake_tick();
        let wake = BASE as u64 * 1000 + sleep.milliseconds as u64;
        device
            .hal_mut()
            .set_clock((wake / 1000) as u32, (wake % 1000) as u32);
        device.wake_tick();

        let state = persisted_state(&mut device);
        // Measured leads stayed under the minimum clamp.
        assert_eq!(state.preparation_period_ms, MINIMUM_PREPARATION_PERIOD_MS);
    }

    #[test]
    fn preparation_period_excludes_earlier_recordings_in_the_tick() {
        // Long gain-1 window followed by a gain-2 window in the same tick;
        // the gain-2 lead measurement must not include the 35 s spent
        // recording gain 1.
        let mut config = deployed_config();
        config.record_duration_gain1 = 35;
        config.record_duration_gain2 = 5;
        config.sleep_duration = 20;
        let mut device = deployed_device(&config);

        device.wake_tick();

        assert!(device.hal().file("20000101_000000.WAV").is_some());
        assert!(device.hal().file("20000101_000035.WAV").is_some());

        let state = persisted_state(&mut device);
        assert_eq!(state.preparation_period_ms, MINIMUM_PREPARATION_PERIOD_MS);
    }

    #[test]
    fn failed_open_counts_exactly_one_error() {
        let config = deployed_config();
        let mut device = deployed_device(&config);
        device.hal_mut().fail_open = true;

        let sleep = device.wake_tick();
        let wake = BASE as u64 * 1000 + sleep.milliseconds as u64;
        device
            .hal_mut()
            .set_clock((wake / 1000) as u32, (wake % 1000) as u32);
        device.wake_tick();

        let state = persisted_state(&mut device);
        assert_eq!(state.recording_errors, 1);
    }

    #[test]
    fn error_exhaustion_suspends_until_mode_change() {
        let config = deployed_config();
        let mut device = deployed_device(&config);
        device.hal_mut().fail_open = true;

        // Drive ticks, advancing the clock by each requested sleep, until
        // the engine gives up.
        let mut sleep = device.wake_tick();
        for _ in 0..32 {
            let state = persisted_state(&mut device);
            if state.recording_errors >= MAXIMUM_RECORDING_ERRORS {
                break;
            }
            let now = device.hal().now().as_millis() + sleep.milliseconds as u64;
            device
                .hal_mut()
                .set_clock((now / 1000) as u32, (now % 1000) as u32);
            sleep = device.wake_tick();
        }

        let state = persisted_state(&mut device);
        assert_eq!(state.recording_errors, MAXIMUM_RECORDING_ERRORS);
        assert_eq!(state.time_of_next_recording, [NO_EVENT_SCHEDULED; 2]);
        assert_eq!(sleep.milliseconds, DEFAULT_WAIT_INTERVAL_MS);

        // Moving the switch (with the card healthy again) restores service.
        device.hal_mut().fail_open = false;
        device.hal_mut().switch = SwitchPosition::Continuous;
        device.wake_tick();
        let state = persisted_state(&mut device);
        assert_eq!(state.recording_errors, 0);
        assert_ne!(state.time_of_next_recording[0], NO_EVENT_SCHEDULED);
    }

    #[test]
    fn not_ready_without_a_set_clock() {
        let config = deployed_config();
        let mut device = deployed_device(&config);
        device.hal_mut().time_set = false;

        let sleep = device.wake_tick();
        let state = persisted_state(&mut device);
        assert!(!state.ready_to_make_recordings);
        assert_eq!(state.time_of_next_recording, [NO_EVENT_SCHEDULED; 2]);
        assert_eq!(sleep.milliseconds, DEFAULT_WAIT_INTERVAL_MS);
    }

    #[test]
    fn continuous_mode_ignores_configured_periods() {
        let mut config = deployed_config();
        // No periods configured at all.
        config.active_recording_periods = 0;
        let mut device = deployed_device(&config);
        device.hal_mut().switch = SwitchPosition::Continuous;

        device.wake_tick();
        let state = persisted_state(&mut device);
        assert!(state.ready_to_make_recordings);
        assert_ne!(state.time_of_next_recording[0], NO_EVENT_SCHEDULED);
    }

    #[test]
    fn transition_delivers_new_configuration_and_identity() {
        let config = deployed_config();
        let mut device = deployed_device(&config);

        let mut updated = config;
        updated.record_duration_gain1 = 30;
        device.hal_mut().delivered_config = Some(ConfigUpdate {
            config: updated,
            deployment_id: Some([0xAB; 8]),
        });

        device.wake_tick();
        let state = persisted_state(&mut device);
        assert_eq!(state.config.record_duration_gain1, 30);
        assert_eq!(state.deployment_id, [0xAB; 8]);
        assert!(state.deployment_id_is_set());
    }
}
