//! ISO-8601 UTC text with millisecond precision, e.g. `2025-01-01T10:30:00.000Z`.
//!
//! Every timestamp that reaches storage or the wire goes through here, so
//! string equality and lexical order match the instants they encode.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serializer};

pub const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

pub fn format(dt: &DateTime<Utc>) -> String {
    dt.format(FORMAT).to_string()
}

pub fn parse(s: &str) -> anyhow::Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(s, FORMAT)?;
    Ok(naive.and_utc())
}

pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format(dt))
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let s = String::deserialize(deserializer)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(serde::de::Error::custom)
}
