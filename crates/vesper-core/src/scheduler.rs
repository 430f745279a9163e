//! Recording scheduler.
//!
//! Pure computation: given the configuration and the current time, resolve
//! the selected recording period and the next gain-1/gain-2 windows inside
//! it. Candidate periods are evaluated in a fixed order — the last active
//! period as if it started yesterday (periods may span midnight), then each
//! active period today, then the first period tomorrow — and the first
//! window containing or still ahead of the current time wins.

use crate::config::{RecorderConfig, RecordingPeriod};

pub const SECONDS_IN_MINUTE: u32 = 60;
pub const SECONDS_IN_DAY: u32 = 86_400;

/// Sentinel meaning "no such event scheduled".
pub const NO_EVENT_SCHEDULED: u32 = u32::MAX;

/// Epoch floor; the device clock can never meaningfully sit before
/// 2000-01-01, which conveniently falls on a midnight.
pub const START_OF_CENTURY: u32 = 946_684_800;

/// Ceiling used when no latest recording time is configured. Kept from the
/// source hardware's convention so the ceiling arithmetic cannot wrap;
/// nothing downstream depends on its particular value.
pub const MIDPOINT_OF_CENTURY: u32 = 2_524_608_000;

/// Resolved schedule for one wake: the two gain windows and the selected
/// recording period that contains them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub gain1_start: u32,
    pub gain1_duration: u32,
    pub gain2_start: u32,
    pub gain2_duration: u32,
    pub period_start: u32,
    pub period_end: u32,
}

impl Schedule {
    /// Nothing scheduled for either gain step.
    pub const NONE: Self = Self {
        gain1_start: NO_EVENT_SCHEDULED,
        gain1_duration: 0,
        gain2_start: NO_EVENT_SCHEDULED,
        gain2_duration: 0,
        period_start: NO_EVENT_SCHEDULED,
        period_end: NO_EVENT_SCHEDULED,
    };

    pub fn gain1_scheduled(&self) -> bool {
        self.gain1_start != NO_EVENT_SCHEDULED && self.gain1_duration > 0
    }

    pub fn gain2_scheduled(&self) -> bool {
        self.gain2_start != NO_EVENT_SCHEDULED && self.gain2_duration > 0
    }

    /// Start time of the earlier pending gain event, if any.
    pub fn next_event(&self) -> Option<u32> {
        match (self.gain1_scheduled(), self.gain2_scheduled()) {
            (true, true) => Some(self.gain1_start.min(self.gain2_start)),
            (true, false) => Some(self.gain1_start),
            (false, true) => Some(self.gain2_start),
            (false, false) => None,
        }
    }
}

/// One candidate recording window before gain resolution.
#[derive(Debug, Clone, Copy)]
struct CandidateWindow {
    start: u32,
    duration: u32,
}

/// Trim a recording window so it never ends mid-sleep.
///
/// If the window is an exact multiple of the duty cycle, one trailing sleep
/// is removed so the window ends with the last recording sub-cycle;
/// otherwise a final partial cycle is clamped to its completed recording
/// portion. Idempotent: re-trimming a trimmed duration is a no-op.
pub fn adjust_recording_duration(
    duration: u32,
    record_duration_gain1: u32,
    record_duration_gain2: u32,
    sleep_duration: u32,
) -> u32 {
    let record = record_duration_gain1 + record_duration_gain2;
    let cycle = record + sleep_duration;

    if duration == 0 || cycle == 0 || sleep_duration == 0 {
        return duration;
    }

    let remainder = duration % cycle;

    if remainder == 0 {
        duration - sleep_duration
    } else if remainder > record {
        duration - (remainder - record)
    } else {
        duration
    }
}

/// Compute the next recording window(s) for both gain steps.
///
/// `current_time` is clamped to the epoch floor and to the configured
/// earliest recording time before any period is considered.
pub fn schedule_recording(config: &RecorderConfig, current_time: u32) -> Schedule {
    let periods = config.active_periods();
    if periods.is_empty() {
        return Schedule::NONE;
    }

    let mut now = current_time.max(START_OF_CENTURY);
    if config.earliest_recording_time > 0 {
        now = now.max(config.earliest_recording_time);
    }

    let midnight = now - now % SECONDS_IN_DAY;
    let window = select_window(config, periods, now, midnight);

    resolve_gain_windows(config, now, window)
}

/// Ordered candidate evaluation with early return on the first match.
fn select_window(
    config: &RecorderConfig,
    periods: &[RecordingPeriod],
    now: u32,
    midnight: u32,
) -> CandidateWindow {
    // The last active period, evaluated as if it started yesterday, may
    // still be open when it spans midnight.
    let yesterday = candidate(config, periods[periods.len() - 1], midnight - SECONDS_IN_DAY);
    if now < yesterday.start + yesterday.duration {
        return yesterday;
    }

    for &period in periods {
        let today = candidate(config, period, midnight);
        if now < today.start + today.duration {
            return today;
        }
    }

    // Every window today has already closed; fall back to the first period
    // tomorrow.
    candidate(config, periods[0], midnight + SECONDS_IN_DAY)
}

fn candidate(config: &RecorderConfig, period: RecordingPeriod, day_start: u32) -> CandidateWindow {
    let start = day_start + (period.start_minutes as u32 % 1440) * SECONDS_IN_MINUTE;
    let mut duration = period.duration_minutes() * SECONDS_IN_MINUTE;

    if !config.disable_sleep_record_cycle {
        duration = adjust_recording_duration(
            duration,
            config.record_duration_gain1 as u32,
            config.record_duration_gain2 as u32,
            config.sleep_duration as u32,
        );
    }

    CandidateWindow { start, duration }
}

/// Place the gain-1 and gain-2 windows inside the selected period.
fn resolve_gain_windows(config: &RecorderConfig, now: u32, window: CandidateWindow) -> Schedule {
    let period_start = window.start;
    let period_end = window.start + window.duration;
    let record_gain1 = config.record_duration_gain1 as u32;
    let record_gain2 = config.record_duration_gain2 as u32;

    let (mut gain1_start, mut gain1_duration, mut gain2_start, mut gain2_duration);

    if config.disable_sleep_record_cycle {
        // The whole window is one continuous gain-1 recording.
        gain1_start = period_start.max(now.min(period_end));
        gain1_duration = period_end - gain1_start;
        gain2_start = NO_EVENT_SCHEDULED;
        gain2_duration = 0;
    } else if now <= period_start {
        // Period not yet started: gain 1 leads, gain 2 follows immediately.
        gain1_start = period_start;
        gain1_duration = window.duration.min(record_gain1);
        let remaining = window.duration - gain1_duration;
        if remaining > 0 && record_gain2 > 0 {
            gain2_start = gain1_start + gain1_duration;
            gain2_duration = remaining.min(record_gain2);
        } else {
            gain2_start = NO_EVENT_SCHEDULED;
            gain2_duration = 0;
        }
    } else {
        // Resuming mid-period: phase arithmetic against the duty cycle.
        let cycle = record_gain1 + record_gain2 + config.sleep_duration as u32;
        let phase = (now - period_start) % cycle.max(1);
        let cycle_start = now - phase;

        gain1_start = if phase < record_gain1 {
            cycle_start
        } else {
            cycle_start + cycle
        };
        gain2_start = if phase < record_gain1 + record_gain2 {
            cycle_start + record_gain1
        } else {
            cycle_start + cycle + record_gain1
        };

        gain1_duration = record_gain1.min(period_end.saturating_sub(gain1_start));
        gain2_duration = record_gain2.min(period_end.saturating_sub(gain2_start));
    }

    // Hard ceiling: cancel any start at or past it, shorten any overrun.
    let ceiling = if config.latest_recording_time > 0 {
        config.latest_recording_time
    } else {
        MIDPOINT_OF_CENTURY
    };

    if gain1_start >= ceiling {
        gain1_duration = 0;
    } else {
        gain1_duration = gain1_duration.min(ceiling - gain1_start);
    }
    if gain2_start != NO_EVENT_SCHEDULED {
        if gain2_start >= ceiling {
            gain2_duration = 0;
        } else {
            gain2_duration = gain2_duration.min(ceiling - gain2_start);
        }
    }

    // Gain 1 always has priority: if clamping made the windows intersect,
    // gain 2 yields the overlap, never gain 1.
    if gain1_duration > 0 && gain2_duration > 0 {
        let gain1_end = gain1_start + gain1_duration;
        let gain2_end = gain2_start + gain2_duration;
        if gain2_start < gain1_end && gain1_start < gain2_end {
            if gain2_start >= gain1_start {
                let overlap = gain1_end - gain2_start;
                gain2_start = gain1_end;
                gain2_duration = gain2_duration.saturating_sub(overlap);
            } else {
                gain2_duration = gain1_start - gain2_start;
            }
        }
    }

    if gain1_duration == 0 {
        gain1_start = NO_EVENT_SCHEDULED;
    }
    if gain2_duration == 0 {
        gain2_start = NO_EVENT_SCHEDULED;
    }

    Schedule {
        gain1_start,
        gain1_duration,
        gain2_start,
        gain2_duration,
        period_start,
        period_end,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecordingPeriod;

    /// Midnight-aligned base time for readable arithmetic.
    const BASE: u32 = START_OF_CENTURY;

    fn config_with_periods(periods: &[(u16, u16)]) -> RecorderConfig {
        let mut config = RecorderConfig::default();
        config.active_recording_periods = periods.len() as u8;
        for (i, &(start, end)) in periods.iter().enumerate() {
            config.recording_periods[i] = RecordingPeriod::new(start, end);
        }
        config
    }

    fn dual_gain_config() -> RecorderConfig {
        // One full-day period, 5 s gain 1 + 5 s gain 2 + 50 s sleep.
        let mut config = config_with_periods(&[(0, 0)]);
        config.record_duration_gain1 = 5;
        config.record_duration_gain2 = 5;
        config.sleep_duration = 50;
        config
    }

    #[test]
    fn no_active_periods_yields_no_schedule() {
        let config = config_with_periods(&[]);
        assert_eq!(schedule_recording(&config, BASE), Schedule::NONE);
    }

    #[test]
    fn trim_removes_one_sleep_from_exact_multiple() {
        let cycle = 5 + 5 + 50;
        assert_eq!(adjust_recording_duration(2 * cycle, 5, 5, 50), 2 * cycle - 50);
    }

    #[test]
    fn trim_clamps_partial_cycle_to_recording_portion() {
        // 100 s into a 60 s cycle leaves a 40 s partial cycle; only the
        // first 10 s of it are recording time.
        assert_eq!(adjust_recording_duration(100, 5, 5, 50), 70);
        // A partial cycle that ends during recording is left alone.
        assert_eq!(adjust_recording_duration(68, 5, 5, 50), 68);
    }

    #[test]
    fn trim_is_idempotent() {
        for duration in [30, 60, 68, 100, 120, 3600, 86_400] {
            let once = adjust_recording_duration(duration, 5, 5, 50);
            assert_eq!(adjust_recording_duration(once, 5, 5, 50), once);
        }
    }

    #[test]
    fn dual_gain_windows_at_period_start() {
        let config = dual_gain_config();
        let schedule = schedule_recording(&config, BASE);

        assert_eq!(schedule.gain1_start, BASE);
        assert_eq!(schedule.gain1_duration, 5);
        assert_eq!(schedule.gain2_start, BASE + 5);
        assert_eq!(schedule.gain2_duration, 5);
        assert_eq!(schedule.period_start, BASE);
        // Full day trimmed by one trailing sleep.
        assert_eq!(schedule.period_end, BASE + SECONDS_IN_DAY - 50);
    }

    #[test]
    fn dual_gain_windows_repeat_one_cycle_later() {
        let config = dual_gain_config();
        let schedule = schedule_recording(&config, BASE + 60);

        assert_eq!(schedule.gain1_start, BASE + 60);
        assert_eq!(schedule.gain1_duration, 5);
        assert_eq!(schedule.gain2_start, BASE + 65);
        assert_eq!(schedule.gain2_duration, 5);
    }

    #[test]
    fn waking_during_sleep_phase_schedules_next_cycle() {
        let config = dual_gain_config();
        let schedule = schedule_recording(&config, BASE + 30);

        assert_eq!(schedule.gain1_start, BASE + 60);
        assert_eq!(schedule.gain2_start, BASE + 65);
    }

    #[test]
    fn waking_during_gain2_portion_resumes_it_late() {
        let config = dual_gain_config();
        let schedule = schedule_recording(&config, BASE + 7);

        // Gain 1's portion has passed; it moves to the next cycle. Gain 2's
        // window opened at +5 and is resumed late.
        assert_eq!(schedule.gain1_start, BASE + 60);
        assert_eq!(schedule.gain2_start, BASE + 5);
        assert_eq!(schedule.gain2_duration, 5);
    }

    #[test]
    fn period_spanning_midnight_stays_open() {
        // 22:00 - 02:00, waking at 23:00: the window is still open and ends
        // at 02:00 the next day.
        let mut config = config_with_periods(&[(1320, 120)]);
        config.disable_sleep_record_cycle = true;
        let now = BASE + 23 * 3600;
        let schedule = schedule_recording(&config, now);

        assert_eq!(schedule.period_start, BASE + 22 * 3600);
        assert_eq!(schedule.period_end, BASE + 26 * 3600);
        assert_eq!(schedule.gain1_start, now);
        assert_eq!(schedule.gain1_duration, 3 * 3600);
    }

    #[test]
    fn period_spanning_midnight_found_after_midnight() {
        // Same period, waking at 01:00 the next day: found via the
        // started-yesterday candidate.
        let mut config = config_with_periods(&[(1320, 120)]);
        config.disable_sleep_record_cycle = true;
        let now = BASE + SECONDS_IN_DAY + 3600;
        let schedule = schedule_recording(&config, now);

        assert_eq!(schedule.period_start, BASE + 22 * 3600);
        assert_eq!(schedule.period_end, BASE + 26 * 3600);
        assert_eq!(schedule.gain1_start, now);
    }

    #[test]
    fn closed_periods_fall_back_to_tomorrow() {
        // 06:00 - 07:00, waking at 20:00: today's window has closed.
        let mut config = config_with_periods(&[(360, 420)]);
        config.disable_sleep_record_cycle = true;
        let schedule = schedule_recording(&config, BASE + 20 * 3600);

        assert_eq!(schedule.period_start, BASE + SECONDS_IN_DAY + 6 * 3600);
        assert_eq!(schedule.gain1_start, schedule.period_start);
        assert_eq!(schedule.gain1_duration, 3600);
    }

    #[test]
    fn periods_scanned_in_configured_order() {
        let mut config = config_with_periods(&[(360, 420), (720, 780)]);
        config.disable_sleep_record_cycle = true;

        // 05:00: first period is ahead.
        let schedule = schedule_recording(&config, BASE + 5 * 3600);
        assert_eq!(schedule.period_start, BASE + 6 * 3600);

        // 08:00: first has closed, second is ahead.
        let schedule = schedule_recording(&config, BASE + 8 * 3600);
        assert_eq!(schedule.period_start, BASE + 12 * 3600);
    }

    #[test]
    fn start_bounded_by_configured_period() {
        // For any wake inside the window the start never precedes the
        // configured period start.
        let config = dual_gain_config();
        for offset in [0u32, 1, 59, 60, 61, 3599, 86_000] {
            let schedule = schedule_recording(&config, BASE + offset);
            if schedule.gain1_scheduled() {
                assert!(schedule.gain1_start + schedule.gain1_duration > BASE + offset);
                assert!(schedule.gain1_duration <= SECONDS_IN_DAY);
            }
        }
    }

    #[test]
    fn earliest_recording_time_defers_scheduling() {
        let mut config = dual_gain_config();
        config.earliest_recording_time = BASE + SECONDS_IN_DAY;
        let schedule = schedule_recording(&config, BASE);

        assert_eq!(schedule.gain1_start, BASE + SECONDS_IN_DAY);
    }

    #[test]
    fn latest_recording_time_cancels_and_shortens() {
        let mut config = dual_gain_config();

        // Ceiling inside gain 1's window: gain 1 shortened, gain 2 cancelled.
        config.latest_recording_time = BASE + 3;
        let schedule = schedule_recording(&config, BASE);
        assert_eq!(schedule.gain1_start, BASE);
        assert_eq!(schedule.gain1_duration, 3);
        assert!(!schedule.gain2_scheduled());

        // Ceiling before the window: everything cancelled.
        let mut config = config_with_periods(&[(600, 660)]);
        config.record_duration_gain1 = 5;
        config.record_duration_gain2 = 5;
        config.sleep_duration = 50;
        config.latest_recording_time = BASE + 3600;
        let schedule = schedule_recording(&config, BASE);
        assert!(!schedule.gain1_scheduled());
        assert!(!schedule.gain2_scheduled());
    }

    #[test]
    fn gain2_skipped_when_period_too_short() {
        // A 3-minute period shorter than one gain-1 record duration.
        let mut config = config_with_periods(&[(0, 3)]);
        config.record_duration_gain1 = 300;
        config.record_duration_gain2 = 60;
        config.sleep_duration = 60;
        let schedule = schedule_recording(&config, BASE);

        assert_eq!(schedule.gain1_start, BASE);
        assert_eq!(schedule.gain1_duration, 180);
        assert!(!schedule.gain2_scheduled());
    }

    #[test]
    fn disabled_cycle_records_whole_window_at_gain1() {
        let mut config = dual_gain_config();
        config.disable_sleep_record_cycle = true;
        let schedule = schedule_recording(&config, BASE);

        assert_eq!(schedule.gain1_start, BASE);
        assert_eq!(schedule.gain1_duration, SECONDS_IN_DAY);
        assert!(!schedule.gain2_scheduled());
    }

    #[test]
    fn next_event_picks_the_earlier_gain() {
        let config = dual_gain_config();
        let schedule = schedule_recording(&config, BASE);
        assert_eq!(schedule.next_event(), Some(BASE));

        assert_eq!(Schedule::NONE.next_event(), None);
    }
}
