//! Open-count and timestamp mutations on a matched row.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};

use crate::codec::TrackingIdentifier;
use crate::row::{columns, TrackingRow};

/// Repeated fetches of the same pixel inside this window count once.
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_millis(5_000);

/// Result of applying an open to a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenUpdate {
    /// Row mutated; `slot` is the Seen N column written
    Applied { total_opens: u64, slot: usize },
    /// Last Seen Time is within the dedup window; row untouched
    WithinDedupWindow,
}

/// Timestamps are stored as RFC 3339 UTC with millisecond precision.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored timestamp; epoch milliseconds are accepted as well.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    raw.parse::<i64>()
        .ok()
        .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
}

/// Whether `observed_at` falls within `window` of the row's Last Seen Time.
/// An empty or unparseable Last Seen Time never suppresses.
pub fn within_dedup_window(
    row: &TrackingRow,
    observed_at: DateTime<Utc>,
    window: Duration,
) -> bool {
    let Some(last_seen) = parse_timestamp(row.get(columns::LAST_SEEN_TIME)) else {
        return false;
    };
    let delta = (observed_at - last_seen).num_milliseconds().unsigned_abs();
    u128::from(delta) < window.as_millis()
}

/// Record one open on `row`.
///
/// Increments Total Opens (a missing or non-numeric value counts as 0), sets
/// Last Seen Time, and writes the first empty Seen slot. Once all ten slots
/// are filled, Seen 10 is overwritten on every later open.
pub fn apply_open(
    row: &mut TrackingRow,
    observed_at: DateTime<Utc>,
    window: Duration,
) -> OpenUpdate {
    if within_dedup_window(row, observed_at, window) {
        return OpenUpdate::WithinDedupWindow;
    }

    let previous = row
        .get(columns::TOTAL_OPENS)
        .trim()
        .parse::<u64>()
        .unwrap_or(0);
    let total_opens = previous.saturating_add(1);
    let stamp = format_timestamp(observed_at);

    let slot = (1..=columns::SEEN_SLOTS)
        .find(|n| row.get(&columns::seen(*n)).trim().is_empty())
        .unwrap_or(columns::SEEN_SLOTS);

    row.set(columns::TOTAL_OPENS, total_opens.to_string());
    row.set(columns::LAST_SEEN_TIME, stamp.clone());
    row.set(&columns::seen(slot), stamp);

    OpenUpdate::Applied { total_opens, slot }
}

/// Whether the identifier's email contains any denylisted substring.
pub fn is_ignored_sender(identifier: &TrackingIdentifier, denylist: &[String]) -> bool {
    let Some(email) = identifier.recipient_email.as_deref() else {
        return false;
    };
    denylist
        .iter()
        .filter(|entry| !entry.is_empty())
        .any(|entry| email.contains(entry.as_str()))
}
