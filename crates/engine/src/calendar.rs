//! Calendar arithmetic used by the tier windows.
//!
//! Both arguments of every function must share the same UTC offset; the
//! classifier converts record timestamps into the reference time's offset
//! before calling in here.

use chrono::{DateTime, Datelike, FixedOffset, TimeDelta, Timelike, Weekday};

/// Timestamp in the offset that calendar periods are evaluated in.
pub type LocalTime = DateTime<FixedOffset>;

/// Exact elapsed time from `ts` to `now`. Negative for future timestamps.
pub fn age(ts: &LocalTime, now: &LocalTime) -> TimeDelta {
    now.signed_duration_since(*ts)
}

/// Whole days elapsed, truncated toward zero.
pub fn days_between(ts: &LocalTime, now: &LocalTime) -> i64 {
    age(ts, now).num_days()
}

/// Whole weeks elapsed, truncated toward zero.
pub fn weeks_between(ts: &LocalTime, now: &LocalTime) -> i64 {
    age(ts, now).num_weeks()
}

/// Whole calendar months elapsed.
///
/// A month only counts once the later instant has reached the earlier
/// instant's day-of-month and time-of-day, so 2022-01-12T11:00 to
/// 2023-01-12T11:00 is exactly 12 months and one second less is 11.
pub fn months_between(ts: &LocalTime, now: &LocalTime) -> i64 {
    let (earlier, later, sign) = if ts <= now { (ts, now, 1) } else { (now, ts, -1) };

    let mut months = i64::from(later.year() - earlier.year()) * 12
        + i64::from(later.month())
        - i64::from(earlier.month());

    if (later.day(), later.time()) < (earlier.day(), earlier.time()) {
        months -= 1;
    }

    sign * months
}

pub fn same_hour(a: &LocalTime, b: &LocalTime) -> bool {
    a.date_naive() == b.date_naive() && a.hour() == b.hour()
}

pub fn same_day(a: &LocalTime, b: &LocalTime) -> bool {
    a.date_naive() == b.date_naive()
}

/// Same ISO week (Monday through Sunday).
pub fn same_week(a: &LocalTime, b: &LocalTime) -> bool {
    a.iso_week() == b.iso_week()
}

pub fn same_month(a: &LocalTime, b: &LocalTime) -> bool {
    a.year() == b.year() && a.month() == b.month()
}

pub fn same_year(a: &LocalTime, b: &LocalTime) -> bool {
    a.year() == b.year()
}

/// Sunday closes an ISO week.
pub fn is_last_day_of_week(ts: &LocalTime) -> bool {
    ts.weekday() == Weekday::Sun
}
