//! Day boundaries in a fixed local offset.

use chrono::{Duration, FixedOffset, NaiveTime, Offset, TimeZone, Utc};
use shared_types::{TimeWindow, Timestamp};

fn offset(offset_minutes: i32) -> FixedOffset {
    FixedOffset::east_opt(offset_minutes.saturating_mul(60)).unwrap_or(Utc.fix())
}

/// Local midnight of the day containing `t`, as a UTC instant.
pub fn start_of_day(t: Timestamp, offset_minutes: i32) -> Timestamp {
    let tz = offset(offset_minutes);
    let local_midnight = t.with_timezone(&tz).date_naive().and_time(NaiveTime::MIN);
    Utc.from_utc_datetime(&(local_midnight - Duration::seconds(i64::from(tz.local_minus_utc()))))
}

/// Last instant of the local day containing `t`.
pub fn end_of_day(t: Timestamp, offset_minutes: i32) -> Timestamp {
    start_of_day(t, offset_minutes) + Duration::days(1) - Duration::nanoseconds(1)
}

/// `[start of (today - days), end of today]`.
pub fn lookback_window(now: Timestamp, days: i64, offset_minutes: i32) -> TimeWindow {
    TimeWindow {
        start: start_of_day(now, offset_minutes) - Duration::days(days.max(0)),
        end: end_of_day(now, offset_minutes),
    }
}
