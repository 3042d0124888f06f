//! Human-readable rendering of local-tier entries

use chrono::{DateTime, Utc};
use layercache_core::CacheEntry;
use serde_json::Value;
use std::time::Duration;

const PREVIEW_CHARS: usize = 40;

/// Compact duration such as `950ms`, `42s`, `5m 3s` or `2h 10m`
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1000 {
        return format!("{}ms", millis);
    }

    let secs = duration.as_secs();
    match secs {
        0..=59 => format!("{}s", secs),
        60..=3599 => format!("{}m {}s", secs / 60, secs % 60),
        _ => format!("{}h {}m", secs / 3600, (secs % 3600) / 60),
    }
}

pub fn format_timestamp(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| format!("{}ms", millis))
}

/// Single-line JSON, truncated with `...`
pub fn preview(value: &Value) -> String {
    let text = value.to_string();
    if text.chars().count() > PREVIEW_CHARS {
        let short: String = text.chars().take(PREVIEW_CHARS - 3).collect();
        format!("{}...", short)
    } else {
        text
    }
}

/// `●` fresh with time left, `✗` expired with how long ago
pub fn entry_status(entry: &CacheEntry<Value>, now: i64) -> String {
    match entry.time_until_expiration(now) {
        Some(left) => format!("● {} left", format_duration(left)),
        None => {
            let since = now.saturating_sub(entry.expires_at()).max(0);
            format!("✗ expired {} ago", format_duration(Duration::from_millis(since as u64)))
        }
    }
}

/// One line of `layercache list` output
pub fn entry_line(key: &str, entry: &CacheEntry<Value>, now: i64) -> String {
    format!(
        "{:<32} {:<22} {}  {}",
        key,
        entry_status(entry, now),
        format_timestamp(entry.timestamp),
        preview(&entry.value)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(950)), "950ms");
        assert_eq!(format_duration(Duration::from_secs(42)), "42s");
        assert_eq!(format_duration(Duration::from_secs(303)), "5m 3s");
        assert_eq!(format_duration(Duration::from_secs(7800)), "2h 10m");
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "1970-01-01 00:00:00");
        assert_eq!(format_timestamp(86_400_000), "1970-01-02 00:00:00");
    }

    #[test]
    fn test_preview_truncates() {
        assert_eq!(preview(&json!({"a": 1})), r#"{"a":1}"#);

        let long = preview(&json!("x".repeat(100)));
        assert_eq!(long.chars().count(), PREVIEW_CHARS);
        assert!(long.ends_with("..."));
    }

    #[test]
    fn test_entry_status() {
        let entry = CacheEntry::new(json!(1), 1_000, Duration::from_secs(60));

        assert_eq!(entry_status(&entry, 31_000), "● 30s left");
        assert_eq!(entry_status(&entry, 61_000), "✗ expired 0ms ago");
        assert_eq!(entry_status(&entry, 63_000), "✗ expired 2s ago");
    }

    #[test]
    fn test_entry_line() {
        let entry = CacheEntry::new(json!([1, 2]), 0, Duration::from_secs(10));
        let line = entry_line("feed?page=1", &entry, 5_000);

        assert!(line.starts_with("feed?page=1"));
        assert!(line.contains("● 5s left"));
        assert!(line.contains("1970-01-01 00:00:00"));
        assert!(line.ends_with("[1,2]"));
    }
}
