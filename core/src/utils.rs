//! Small formatting and text helpers shared across crates.

use chrono::{DateTime, Utc};

/// Current instant as an RFC 3339 timestamp, the format used throughout the
/// task log and the control API's `last_run`/`next_run` fields.
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339()
}

pub fn datetime_to_iso8601(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

/// Format a duration in human-readable form, as used in log messages.
pub fn format_duration(duration_ms: f64) -> String {
    if duration_ms < 1000.0 {
        format!("{duration_ms:.1}ms")
    } else if duration_ms < 60_000.0 {
        format!("{:.1}s", duration_ms / 1000.0)
    } else {
        format!("{:.1}m", duration_ms / 60_000.0)
    }
}

/// Truncate a string to at most `max_len` bytes, appending an ellipsis when
/// truncated. Used to cap HTTP response bodies before they're logged.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        "...".to_string()
    } else {
        let mut end = max_len - 3;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_duration_picks_the_right_unit() {
        assert_eq!(format_duration(42.0), "42.0ms");
        assert_eq!(format_duration(1500.0), "1.5s");
        assert_eq!(format_duration(90_000.0), "1.5m");
    }

    #[test]
    fn truncate_string_appends_ellipsis() {
        assert_eq!(truncate_string("hello", 10), "hello");
        assert_eq!(truncate_string("hello world", 8), "hello...");
    }

    #[test]
    fn truncate_string_respects_char_boundaries() {
        let s = "héllo world";
        let truncated = truncate_string(s, 6);
        assert!(truncated.ends_with("..."));
    }
}
