//! Lenient accessors for loosely shaped JSON records.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use lckb_core::Severity;
use serde_json::Value;

/// First non-blank string among `keys`.
pub(crate) fn str_field<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|text| !text.is_empty())
}

pub(crate) fn string_field(value: &Value, keys: &[&str]) -> Option<String> {
    str_field(value, keys).map(str::to_string)
}

/// Numbers may arrive as JSON numbers or numeric strings ("7.0").
pub(crate) fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

pub(crate) fn parse_datetime(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

pub(crate) fn datetime_field(value: &Value, keys: &[&str]) -> Option<DateTime<Utc>> {
    keys.iter()
        .filter_map(|key| value.get(*key).and_then(Value::as_str))
        .find_map(parse_datetime)
}

pub(crate) fn parse_severity(text: &str) -> Option<Severity> {
    match text.trim().to_lowercase().as_str() {
        "critical" | "high" | "urgent" => Some(Severity::Critical),
        "warning" | "moderate" | "medium" => Some(Severity::Warning),
        "info" | "low" | "informational" => Some(Severity::Info),
        _ => None,
    }
}
