//! The 30-minute booking grid, in UTC.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Timelike, Utc};

pub const SLOT_MINUTES: u32 = 30;

/// Truncates `dt` to the start of its enclosing 30-minute slot.
pub fn normalize_to_slot(dt: DateTime<Utc>) -> DateTime<Utc> {
    let minute = dt.minute() - dt.minute() % SLOT_MINUTES;
    // Only time-of-day fields change, so the date is always valid.
    dt.date_naive()
        .and_hms_opt(dt.hour(), minute, 0)
        .map(|naive| naive.and_utc())
        .unwrap_or(dt)
}

/// Parses a client supplied timestamp. Offsets are honored; timestamps
/// without one are taken as UTC.
pub fn parse_timestamp(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }

    const NAIVE_FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ];
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| anyhow::anyhow!("unrecognized date/time: {raw}"))
}

/// Parses and normalizes in one step.
pub fn parse_slot(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    parse_timestamp(raw).map(normalize_to_slot)
}

/// Every slot start of `day` from `start_hour` until `end_hour`.
pub fn day_slots(day: NaiveDate, start_hour: u32, end_hour: u32) -> Vec<DateTime<Utc>> {
    let Some(first) = day.and_hms_opt(start_hour, 0, 0) else {
        return vec![];
    };
    let first = first.and_utc();
    let count = end_hour.min(24).saturating_sub(start_hour) * 60 / SLOT_MINUTES;

    (0..count)
        .map(|i| first + Duration::minutes((i * SLOT_MINUTES) as i64))
        .collect()
}
