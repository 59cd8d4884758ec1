use chrono::{DateTime, Duration, Utc};

/// Stored form of an item's publish time. Lexical order equals chronological
/// order, which `list_history` relies on.
pub const DISPLAY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Formats `published` with [`DISPLAY_TIME_FORMAT`].
pub fn format_display_time(published: DateTime<Utc>) -> String {
    published.format(DISPLAY_TIME_FORMAT).to_string()
}

/// Human-readable age of `published` as seen at `now`.
///
/// Buckets: under an hour in minutes, under a day in hours, under 365 days in
/// days, otherwise years. Counts are truncated and the unit is singular only
/// when the count is exactly 1. Zero or negative elapsed time is `"now"`.
pub fn format_relative_time(published: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now - published;
    if elapsed <= Duration::zero() {
        return "now".to_string();
    }

    let (count, unit) = if elapsed < Duration::hours(1) {
        (elapsed.num_minutes(), "minute")
    } else if elapsed < Duration::hours(24) {
        (elapsed.num_hours(), "hour")
    } else if elapsed < Duration::days(365) {
        (elapsed.num_days(), "day")
    } else {
        (elapsed.num_days() / 365, "year")
    };

    if count == 1 {
        format!("{count} {unit} ago")
    } else {
        format!("{count} {unit}s ago")
    }
}
