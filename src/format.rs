//! Formatting helpers shared by the feed, health and sync views.
//!
//! Everything here is pure: functions that depend on wall-clock time take `now`
//! explicitly so callers (and tests) control it.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde_json::Value;

/// Parse a backend timestamp. Accepts RFC 3339, naive
/// `YYYY-MM-DD[T ]HH:MM:SS[.fff]` and bare `YYYY-MM-DD` (all read as UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Milliseconds since epoch used for ordering; unparseable → 0.
pub fn timestamp_millis(raw: Option<&str>) -> i64 {
    raw.and_then(parse_timestamp)
        .map(|dt| dt.timestamp_millis())
        .unwrap_or(0)
}

/// Whole seconds elapsed since `value`, clamped at 0. `None` for empty/invalid input.
pub fn seconds_since(value: Option<&str>, now: DateTime<Utc>) -> Option<i64> {
    let ts = parse_timestamp(value?)?;
    let delta = (now - ts).num_milliseconds().div_euclid(1000);
    Some(delta.max(0))
}

pub fn format_age_short(seconds: Option<i64>) -> String {
    match seconds {
        None => "n/a".to_string(),
        Some(s) if s < 60 => format!("{s}s"),
        Some(s) if s < 3_600 => format!("{}m", s / 60),
        Some(s) if s < 86_400 => format!("{}h", s / 3_600),
        Some(s) => format!("{}d", s / 86_400),
    }
}

/// "just now", "42s ago", "5m ago", ... falling back to the date after two weeks.
pub fn format_relative_time(value: Option<&str>, now: DateTime<Utc>) -> String {
    let Some(raw) = value.filter(|v| !v.is_empty()) else {
        return "n/a".to_string();
    };
    let Some(ts) = parse_timestamp(raw) else {
        return raw.to_string();
    };
    let seconds = round_div((now - ts).num_milliseconds(), 1000);
    if seconds < 10 {
        return "just now".to_string();
    }
    if seconds < 60 {
        return format!("{seconds}s ago");
    }
    let minutes = round_div(seconds, 60);
    if minutes < 60 {
        return format!("{minutes}m ago");
    }
    let hours = round_div(minutes, 60);
    if hours < 24 {
        return format!("{hours}h ago");
    }
    let days = round_div(hours, 24);
    if days < 14 {
        return format!("{days}d ago");
    }
    ts.format("%Y-%m-%d").to_string()
}

pub fn format_timestamp(value: Option<&str>) -> String {
    match value.filter(|v| !v.is_empty()) {
        None => "never".to_string(),
        Some(raw) => parse_timestamp(raw)
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| raw.to_string()),
    }
}

/// `0.734` → `"73%"`.
pub fn format_percent(value: Option<f64>) -> String {
    match value.filter(|v| v.is_finite()) {
        Some(v) => format!("{}%", (v * 100.0).round() as i64),
        None => "n/a".to_string(),
    }
}

/// Effective context multiplier: `(saved + read) / read`.
pub fn format_multiplier(saved: f64, read: f64) -> String {
    if !saved.is_finite() || !read.is_finite() || read <= 0.0 {
        return "n/a".to_string();
    }
    let factor = (saved + read) / read;
    if !factor.is_finite() || factor <= 0.0 {
        return "n/a".to_string();
    }
    if factor >= 10.0 {
        format!("{factor:.0}x")
    } else {
        format!("{factor:.1}x")
    }
}

/// Share of tokens avoided by reuse, as a rounded integer percentage.
pub fn reduction_percent(saved: f64, read: f64) -> Option<f64> {
    if !saved.is_finite() || !read.is_finite() {
        return None;
    }
    let total = saved + read;
    if total <= 0.0 {
        return None;
    }
    let pct = saved / total;
    pct.is_finite().then(|| (pct * 100.0).round())
}

pub fn format_reduction_percent(saved: f64, read: f64) -> String {
    match reduction_percent(saved, read) {
        Some(p) => format!("{}%", p as i64),
        None => "n/a".to_string(),
    }
}

/// Inverse of the percentage labels above; anything not ending in `%` is `None`.
pub fn parse_percent_value(label: &str) -> Option<f64> {
    let text = label.trim();
    let raw = text.strip_suffix('%')?;
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Collapse whitespace, trim, lowercase.
pub fn normalize(text: &str) -> String {
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").expect("static regex"));
    re_ws.replace_all(text, " ").trim().to_lowercase()
}

pub fn title_case(value: &str) -> String {
    let text = value.trim();
    let mut chars = text.chars();
    match chars.next() {
        None => "Unknown".to_string(),
        Some(first) => first.to_uppercase().chain(chars).collect(),
    }
}

/// `next_steps` → `Next Steps`.
pub fn to_title_label(value: &str) -> String {
    value
        .replace('_', " ")
        .split(' ')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

/// First `limit` files joined, with a `+N` suffix for the rest.
pub fn format_file_list(files: &[String], limit: usize) -> String {
    let trimmed: Vec<&str> = files
        .iter()
        .map(|f| f.trim())
        .filter(|f| !f.is_empty())
        .collect();
    if trimmed.is_empty() {
        return String::new();
    }
    let shown = trimmed.iter().take(limit).copied().collect::<Vec<_>>().join(", ");
    if trimmed.len() > limit {
        format!("{shown} +{}", trimmed.len() - limit)
    } else {
        shown
    }
}

/// Tags are `label:detail`; only the label is displayed.
pub fn format_tag_label(tag: &str) -> String {
    let trimmed = tag.trim();
    match trimmed.split_once(':') {
        Some((label, _)) => label.trim().to_string(),
        None => trimmed.to_string(),
    }
}

/// Integer with thousands separators (`1234567` → `1,234,567`).
pub fn format_count(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if value < 0 {
        out.insert(0, '-');
    }
    out
}

/// Accepts a JSON array or a JSON-encoded array string; anything else is empty.
pub fn parse_json_array(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        Value::String(s) if !s.is_empty() => match serde_json::from_str::<Value>(s) {
            Ok(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// Lenient numeric coercion for free-form payloads: numbers, numeric strings
/// and booleans count; everything else is `None`.
pub fn value_as_f64(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

/// Loose truthiness: `null`, `false`, `0` and `""` are false, everything else true.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Scalar JSON → display string; `null`/objects → `None`.
pub fn value_as_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn round_div(value: i64, by: i64) -> i64 {
    (value as f64 / by as f64).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn parses_rfc3339_and_naive_timestamps() {
        let a = parse_timestamp("2025-03-01T11:00:00Z").unwrap();
        let b = parse_timestamp("2025-03-01T13:00:00+02:00").unwrap();
        let c = parse_timestamp("2025-03-01 11:00:00.250").unwrap();
        assert_eq!(a, b);
        assert_eq!(c.timestamp_millis() - a.timestamp_millis(), 250);
        assert!(parse_timestamp("yesterday").is_none());
        assert_eq!(timestamp_millis(Some("nope")), 0);
        assert_eq!(timestamp_millis(None), 0);
    }

    #[test]
    fn date_only_values_read_as_utc_midnight() {
        let d = parse_timestamp("2025-01-01").unwrap();
        assert_eq!(d, Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        assert!(timestamp_millis(Some("2025-01-02")) > timestamp_millis(Some("2025-01-01T23:59:59Z")));
        assert!(parse_timestamp("2025-13-01").is_none());
    }

    #[test]
    fn seconds_since_clamps_future_to_zero() {
        assert_eq!(seconds_since(Some("2025-03-01T11:59:00Z"), now()), Some(60));
        assert_eq!(seconds_since(Some("2025-03-01T12:05:00Z"), now()), Some(0));
        assert_eq!(seconds_since(Some(""), now()), None);
        assert_eq!(seconds_since(None, now()), None);
    }

    #[test]
    fn age_short_buckets() {
        assert_eq!(format_age_short(None), "n/a");
        assert_eq!(format_age_short(Some(59)), "59s");
        assert_eq!(format_age_short(Some(125)), "2m");
        assert_eq!(format_age_short(Some(7_300)), "2h");
        assert_eq!(format_age_short(Some(200_000)), "2d");
    }

    #[test]
    fn relative_time_rounds_like_the_browser() {
        assert_eq!(format_relative_time(Some("2025-03-01T11:59:55Z"), now()), "just now");
        assert_eq!(format_relative_time(Some("2025-03-01T11:59:30Z"), now()), "30s ago");
        assert_eq!(format_relative_time(Some("2025-03-01T11:30:00Z"), now()), "30m ago");
        assert_eq!(format_relative_time(Some("2025-02-27T12:00:00Z"), now()), "2d ago");
        assert_eq!(format_relative_time(Some("garbage"), now()), "garbage");
        assert_eq!(format_relative_time(None, now()), "n/a");
    }

    #[test]
    fn reduction_and_multiplier() {
        assert_eq!(format_reduction_percent(900.0, 100.0), "90%");
        assert_eq!(format_reduction_percent(0.0, 0.0), "n/a");
        assert_eq!(reduction_percent(1.0, 19.0), Some(5.0));
        assert_eq!(format_multiplier(900.0, 100.0), "10x");
        assert_eq!(format_multiplier(50.0, 100.0), "1.5x");
        assert_eq!(format_multiplier(50.0, 0.0), "n/a");
        assert_eq!(parse_percent_value("42%"), Some(42.0));
        assert_eq!(parse_percent_value("n/a"), None);
    }

    #[test]
    fn text_helpers() {
        assert_eq!(normalize("  Hello\n\t World "), "hello world");
        assert_eq!(title_case("offline"), "Offline");
        assert_eq!(title_case("  "), "Unknown");
        assert_eq!(to_title_label("next_steps"), "Next Steps");
        assert_eq!(format_tag_label("area: sync"), "area");
        assert_eq!(format_tag_label("plain"), "plain");
        let files = vec!["a.rs".to_string(), " ".to_string(), "b.rs".into(), "c.rs".into()];
        assert_eq!(format_file_list(&files, 2), "a.rs, b.rs +1");
        assert_eq!(format_count(1_234_567), "1,234,567");
        assert_eq!(format_count(-1_000), "-1,000");
        assert_eq!(format_count(12), "12");
    }

    #[test]
    fn json_array_accepts_encoded_strings() {
        let encoded = Value::String(r#"["a","b"]"#.into());
        assert_eq!(parse_json_array(&encoded).len(), 2);
        assert!(parse_json_array(&Value::String("not json".into())).is_empty());
        assert!(parse_json_array(&Value::Null).is_empty());
    }
}
