use crate::error::CoreError;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};

/// The calendar date of `ts` as seen in the account's local offset.
pub fn local_date(ts: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    ts.with_timezone(&offset).date_naive()
}

/// Daily snapshot bucket: the event-local calendar date pinned to local noon.
///
/// Pinning to noon keeps every timestamp of the same local day on one row even
/// when the offset moves the day boundary away from UTC midnight.
pub fn daily_bucket(ts: DateTime<Utc>, offset: FixedOffset) -> DateTime<Utc> {
    let noon = local_date(ts, offset).and_time(NaiveTime::from_hms_opt(12, 0, 0).unwrap_or(NaiveTime::MIN));
    match offset.from_local_datetime(&noon).single() {
        Some(local) => local.with_timezone(&Utc),
        None => noon.and_utc(),
    }
}

/// Intraday cache bucket: wall-clock time floored to the quarter hour.
pub fn intraday_bucket(ts: DateTime<Utc>) -> DateTime<Utc> {
    let minute = ts.minute() - ts.minute() % 15;
    ts.with_minute(minute)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(ts)
}

/// Local midnight opening the given month, as a UTC instant.
pub fn month_start(year: i32, month: u32, offset: FixedOffset) -> Result<DateTime<Utc>, CoreError> {
    let date = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| CoreError::InvalidInput("month".to_string(), format!("{year}-{month:02}")))?;
    offset
        .from_local_datetime(&date.and_time(NaiveTime::MIN))
        .single()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| CoreError::TimestampOutOfRange(date.to_string()))
}
