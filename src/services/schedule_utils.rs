use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, SecondsFormat, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use serde_json::json;

use crate::error::{AppError, AppResult};

pub fn parse_datetime(value: &str) -> AppResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| {
            AppError::validation_with_details(
                "无效的时间格式",
                json!({"value": value, "error": err.to_string()}),
            )
        })
}

/// Fixed-width UTC form, so stored values compare lexicographically.
pub fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn add_minutes(dt: DateTime<Utc>, minutes: i64) -> AppResult<DateTime<Utc>> {
    dt.checked_add_signed(Duration::minutes(minutes))
        .ok_or_else(|| AppError::validation("时间计算超出范围"))
}

/// Minutes from `earlier` to `later`; negative when they are out of order.
pub fn gap_minutes(earlier: DateTime<Utc>, later: DateTime<Utc>) -> i64 {
    later.signed_duration_since(earlier).num_minutes()
}

/// Rounds up to the next multiple of `step_minutes` counted from the Unix epoch.
pub fn align_up(dt: DateTime<Utc>, step_minutes: i64) -> AppResult<DateTime<Utc>> {
    if step_minutes <= 0 {
        return Err(AppError::validation("时间粒度必须大于 0"));
    }
    let step_seconds = step_minutes * 60;
    let seconds = dt.timestamp();
    let has_fraction = dt.timestamp_subsec_nanos() > 0;
    let remainder = seconds.rem_euclid(step_seconds);
    let aligned = if remainder == 0 && !has_fraction {
        seconds
    } else {
        seconds - remainder + step_seconds
    };
    DateTime::<Utc>::from_timestamp(aligned, 0)
        .ok_or_else(|| AppError::validation("时间计算超出范围"))
}

pub fn local_minute_of_day(dt: DateTime<Utc>, tz: Tz) -> u32 {
    let local = dt.with_timezone(&tz);
    local.hour() * 60 + local.minute()
}

pub fn local_hour(dt: DateTime<Utc>, tz: Tz) -> u32 {
    dt.with_timezone(&tz).hour()
}

pub fn local_weekday(dt: DateTime<Utc>, tz: Tz) -> Weekday {
    dt.with_timezone(&tz).weekday()
}

pub fn same_local_day(a: DateTime<Utc>, b: DateTime<Utc>, tz: Tz) -> bool {
    a.with_timezone(&tz).date_naive() == b.with_timezone(&tz).date_naive()
}

/// The instant at which the local wall clock on `date` reads `minute` minutes
/// past midnight. `24 * 60` means the following midnight. A wall time skipped
/// by a DST jump resolves to the first instant after the gap.
pub fn local_instant(date: NaiveDate, minute: u32, tz: Tz) -> Option<DateTime<Utc>> {
    let (date, minute) = if minute >= 24 * 60 {
        (date.succ_opt()?, 0)
    } else {
        (date, minute)
    };
    let naive = date.and_time(NaiveTime::from_hms_opt(minute / 60, minute % 60, 0)?);
    naive
        .and_local_timezone(tz)
        .earliest()
        .or_else(|| (naive + Duration::hours(1)).and_local_timezone(tz).earliest())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Local minute-of-day at which an interval ends, or `None` when it runs past local midnight.
pub fn local_end_minute(start: DateTime<Utc>, end: DateTime<Utc>, tz: Tz) -> Option<u32> {
    let local_end = end.with_timezone(&tz);
    let end_minute = local_end.hour() * 60 + local_end.minute();
    if same_local_day(start, end, tz) {
        Some(end_minute)
    } else if end_minute == 0 && gap_minutes(start, end) <= 24 * 60 {
        Some(24 * 60)
    } else {
        None
    }
}
