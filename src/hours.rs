use chrono::{DateTime, Datelike, Duration, Timelike, Utc, Weekday};

use crate::types::SessionMode;

/// Support desk time zone, fixed UTC+8. The gate shifts the UTC instant
/// by the offset instead of constructing a time zone; for a fixed
/// offset the two are equivalent.
const UTC_OFFSET_HOURS: i64 = 8;
const OPEN_HOUR: u32 = 9;
const CLOSE_HOUR: u32 = 18;

/// Whether live support is staffed at the given instant: Monday-Friday,
/// 09:00 inclusive to 18:00 exclusive, in UTC+8.
pub fn is_business_hours(at: DateTime<Utc>) -> bool {
    let local = at + Duration::hours(UTC_OFFSET_HOURS);
    let weekday_staffed = !matches!(local.weekday(), Weekday::Sat | Weekday::Sun);
    weekday_staffed && (OPEN_HOUR..CLOSE_HOUR).contains(&local.hour())
}

/// Mode for a session starting now. Evaluated at session start and
/// never re-evaluated for the session's lifetime.
pub fn session_mode(at: DateTime<Utc>) -> SessionMode {
    if is_business_hours(at) {
        SessionMode::Human
    } else {
        SessionMode::Ai
    }
}
