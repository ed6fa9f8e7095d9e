//! Timestamp decoding for backend records.
//!
//! The backend emits RFC 3339 strings, offset-less ISO strings (taken as UTC) and
//! plain dates. Anything else decodes to `None` so the record itself is kept.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use log::warn;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

pub fn parse_lenient(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    if let Some(midnight) = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
    {
        return Some(Utc.from_utc_datetime(&midnight));
    }
    warn!("Ignoring unparseable timestamp {:?}", raw);
    None
}

/// `deserialize_with` helper for optional timestamps.
pub fn deserialize_optional<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(raw)) => parse_lenient(&raw),
        None | Some(Value::Null) => None,
        Some(other) => {
            warn!("Ignoring non-string timestamp {}", other);
            None
        }
    })
}
