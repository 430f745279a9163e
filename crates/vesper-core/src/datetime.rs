//! Civil date/time helpers for file and folder naming.
//!
//! Epoch timestamps are u32 seconds since 1970-01-01 UTC, which covers the
//! device's whole service life. Timezone handling belongs to the external
//! formatting collaborator and never enters the engine.

/// Broken-down UTC date and wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateTime {
    pub year: u32,
    pub month: u32,
    pub day: u32,
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
}

/// Convert an epoch timestamp to a civil UTC date and time.
pub fn from_epoch(timestamp: u32) -> DateTime {
    let days = (timestamp / 86_400) as i64;
    let secs_of_day = timestamp % 86_400;

    // Proleptic-Gregorian conversion on eras of 400 years (146097 days).
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = if month <= 2 { y + 1 } else { y };

    DateTime {
        year: year as u32,
        month: month as u32,
        day: day as u32,
        hours: secs_of_day / 3600,
        minutes: secs_of_day / 60 % 60,
        seconds: secs_of_day % 60,
    }
}
