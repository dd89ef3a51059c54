use chrono::{DateTime, Duration, Local, NaiveDate, Timelike, Utc};

/// This is the standard way of converting a date to a string in sitetime.
pub fn date_to_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Returns the local calendar day and hour a moment belongs to. Buckets are always keyed by the
/// local calendar of the process that observed the activity.
pub fn local_bucket(moment: DateTime<Utc>) -> (NaiveDate, u32) {
    let local = moment.with_timezone(&Local);
    (local.date_naive(), local.hour())
}

/// Returns `count` consecutive days starting with `start`.
pub fn date_range(start: NaiveDate, count: u32) -> impl Iterator<Item = NaiveDate> {
    start.iter_days().take(count as usize)
}

/// Formats durations the way they are printed across the cli.
pub fn format_duration(v: Duration) -> String {
    if v.num_hours() > 0 {
        format!(
            "{}h{}m{}s",
            v.num_hours(),
            v.num_minutes() % 60,
            v.num_seconds() % 60
        )
    } else if v.num_minutes() > 0 {
        format!("{}m{}s", v.num_minutes() % 60, v.num_seconds() % 60)
    } else {
        format!("{}s", v.num_seconds() % 60)
    }
}
