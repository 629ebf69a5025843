//! Integer time math over millisecond timestamps.
//!
//! All core timestamps are unsigned milliseconds since the Unix epoch.
//! Simulation time is supplied by the caller - nothing here reads the
//! system clock.

/// Milliseconds per second.
pub const MS_PER_SEC: u64 = 1_000;
/// Milliseconds per minute.
pub const MS_PER_MIN: u64 = 60_000;
/// Milliseconds per hour.
pub const MS_PER_HOUR: u64 = 3_600_000;
/// Milliseconds per day.
pub const MS_PER_DAY: u64 = 86_400_000;
/// Seconds per hour.
pub const SEC_PER_HOUR: u64 = 3_600;

/// Hour index since the Unix epoch for a millisecond timestamp.
#[inline]
pub fn hour_of_ms(time_ms: u64) -> u64 {
    time_ms / MS_PER_HOUR
}

/// Start of the hour containing `time_ms`, in milliseconds.
#[inline]
pub fn start_of_hour_ms(time_ms: u64) -> u64 {
    time_ms - (time_ms % MS_PER_HOUR)
}

/// Day index since the Unix epoch for a millisecond timestamp.
#[inline]
pub fn day_of_ms(time_ms: u64) -> u64 {
    time_ms / MS_PER_DAY
}

/// Start of the day containing `time_ms`, in milliseconds.
#[inline]
pub fn start_of_day_ms(time_ms: u64) -> u64 {
    time_ms - (time_ms % MS_PER_DAY)
}

/// Whole seconds elapsed for a millisecond duration.
#[inline]
pub fn ms_to_sec(time_ms: u64) -> u64 {
    time_ms / MS_PER_SEC
}

/// Start of the period of length `period_ms` containing `time_ms`.
///
/// Periods are anchored at the Unix epoch. A zero period returns `time_ms`
/// unchanged.
#[inline]
pub fn start_of_period_ms(period_ms: u64, time_ms: u64) -> u64 {
    if period_ms == 0 {
        return time_ms;
    }
    time_ms - (time_ms % period_ms)
}

/// Millisecond timestamp for a UTC calendar date at midnight.
pub fn timestamp_ms(year: i32, month: u32, day: u32) -> u64 {
    use chrono::{TimeZone, Utc};
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0)
        .single()
        .map(|dt| dt.timestamp_millis() as u64)
        .unwrap_or(0)
}

/// Parses an RFC3339 timestamp into milliseconds since the epoch.
pub fn parse_timestamp_ms(s: &str) -> Option<u64> {
    chrono::DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.timestamp_millis() as u64)
}
