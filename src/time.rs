//! Timestamp storage format and day boundaries

use chrono::{
    DateTime, Duration, FixedOffset, NaiveDate, Offset, SecondsFormat, SubsecRound, TimeZone, Utc,
};

/// Storage format: RFC 3339, UTC, millisecond precision
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Drop precision the storage format cannot hold, so values kept in memory
/// compare equal to what is read back
pub fn truncate_to_storage(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(3)
}

pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Fixed offset for day cutting; out-of-range values fall back to UTC
pub fn day_offset(utc_offset_minutes: i32) -> FixedOffset {
    FixedOffset::east_opt(utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
}

/// Calendar date of `ts` in the given offset
pub fn local_date(ts: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    ts.with_timezone(&offset).date_naive()
}

/// `[start, end)` of `date` in the given offset, as UTC instants
pub fn day_bounds(date: NaiveDate, offset: FixedOffset) -> (DateTime<Utc>, DateTime<Utc>) {
    let midnight = date.and_hms_opt(0, 0, 0).unwrap_or_default();
    // A fixed offset has no gaps or folds, so local midnight is always unique
    let start = offset
        .from_local_datetime(&midnight)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| midnight.and_utc());
    (start, start + Duration::days(1))
}

/// Inclusive date range as `[first day start, last day end)`
pub fn range_bounds(
    from: NaiveDate,
    to: NaiveDate,
    offset: FixedOffset,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let (start, _) = day_bounds(from, offset);
    let (_, end) = day_bounds(to, offset);
    (start, end)
}

pub fn format_duration_ms(ms: i64) -> String {
    let minutes = ms / 60_000;
    let hours = minutes / 60;
    let mins = minutes % 60;

    if hours > 0 {
        format!("{}h {}m", hours, mins)
    } else {
        format!("{}m", mins)
    }
}
