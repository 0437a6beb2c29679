//! Injectable Unix-second clock and calendar helpers (all UTC)

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use std::sync::Arc;

/// Returns "now" as Unix seconds. Tests inject a fixed value.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(|| Utc::now().timestamp())
}

pub fn to_datetime(ts: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(ts, 0).single()
}

/// Calendar date (UTC) of a timestamp
pub fn utc_date(ts: i64) -> NaiveDate {
    to_datetime(ts)
        .map(|dt| dt.date_naive())
        .unwrap_or(NaiveDate::MIN)
}

/// Monday 00:00 UTC of the ISO week containing `ts`
pub fn week_start(ts: i64) -> i64 {
    let date = utc_date(ts);
    let monday = date - Duration::days(date.weekday().num_days_from_monday() as i64);
    midnight(monday)
}

/// The following Monday 00:00 UTC (when the free weekly allowance resets)
pub fn next_week_start(ts: i64) -> i64 {
    week_start(ts) + 7 * 86_400
}

fn midnight(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or(0)
}
