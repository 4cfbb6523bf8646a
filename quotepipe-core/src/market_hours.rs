//! Market-session awareness and quote freshness policy
//!
//! Approximates the US equities session with a weekday + UTC clock check
//! (9:30 AM ET = 14:30 UTC, 4:00 PM ET = 21:00 UTC, EST offsets). Holidays
//! are not modeled; on those days a single unnecessary refetch may occur.

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};

/// Session open, UTC.
pub const MARKET_OPEN_HOUR: u32 = 14;
pub const MARKET_OPEN_MINUTE: u32 = 30;
/// Session close, UTC.
pub const MARKET_CLOSE_HOUR: u32 = 21;

/// True if the US stock market is open at `now` (approximate).
pub fn is_market_open(now: DateTime<Utc>) -> bool {
    use chrono::Timelike;

    if now.weekday().num_days_from_monday() >= 5 {
        return false;
    }
    let (hour, minute) = (now.hour(), now.minute());
    if hour < MARKET_OPEN_HOUR || hour >= MARKET_CLOSE_HOUR {
        return false;
    }
    if hour == MARKET_OPEN_HOUR && minute < MARKET_OPEN_MINUTE {
        return false;
    }
    true
}

/// The most recent prior session close.
///
/// Weekday at/after 21:00 UTC -> today 21:00. Weekday before 21:00 ->
/// previous business day 21:00 (Monday rolls back to Friday). Saturday and
/// Sunday -> Friday 21:00.
pub fn last_session_close(now: DateTime<Utc>) -> DateTime<Utc> {
    // 21:00:00 is always a valid wall-clock time.
    let close_today = Utc
        .from_utc_datetime(
            &now.date_naive()
                .and_hms_opt(MARKET_CLOSE_HOUR, 0, 0)
                .unwrap(),
        );

    match now.weekday().num_days_from_monday() {
        5 => close_today - Duration::days(1), // Saturday -> Friday
        6 => close_today - Duration::days(2), // Sunday -> Friday
        weekday => {
            if now >= close_today {
                close_today
            } else if weekday == 0 {
                close_today - Duration::days(3) // Monday -> Friday
            } else {
                close_today - Duration::days(1)
            }
        }
    }
}

/// Decide whether a cached quote is still fresh enough to skip refetching.
///
/// During market hours a quote is fresh while younger than
/// `staleness_seconds`. Outside market hours it is fresh once it was
/// persisted after the most recent close, so the closing price is captured
/// exactly once per session and never refetched overnight. A missing
/// `updated_at` is always stale.
pub fn is_fresh(
    updated_at: Option<DateTime<Utc>>,
    staleness_seconds: u64,
    now: DateTime<Utc>,
) -> bool {
    let updated_at = match updated_at {
        Some(ts) => ts,
        None => return false,
    };

    if is_market_open(now) {
        let age = now.signed_duration_since(updated_at);
        // The window is env-configurable; a value too large for a chrono
        // Duration saturates instead of panicking.
        let staleness = i64::try_from(staleness_seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX);
        return age < staleness;
    }

    updated_at > last_session_close(now)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    // 2025-01-06 is a Monday, 2025-01-08 a Wednesday, 2025-01-11 a Saturday.

    #[test]
    fn test_market_open_midweek_session() {
        assert!(is_market_open(utc(2025, 1, 8, 15, 0)));
        assert!(is_market_open(utc(2025, 1, 8, 14, 30)));
        assert!(is_market_open(utc(2025, 1, 8, 20, 59)));
    }

    #[test]
    fn test_market_closed_outside_session() {
        assert!(!is_market_open(utc(2025, 1, 8, 14, 29)));
        assert!(!is_market_open(utc(2025, 1, 8, 21, 0)));
        assert!(!is_market_open(utc(2025, 1, 8, 3, 0)));
    }

    #[test]
    fn test_market_closed_weekend() {
        assert!(!is_market_open(utc(2025, 1, 11, 15, 0))); // Saturday
        assert!(!is_market_open(utc(2025, 1, 12, 15, 0))); // Sunday
    }

    #[test]
    fn test_last_close_weekday_after_close() {
        let close = last_session_close(utc(2025, 1, 8, 22, 0));
        assert_eq!(close, utc(2025, 1, 8, 21, 0));
    }

    #[test]
    fn test_last_close_weekday_before_close() {
        let close = last_session_close(utc(2025, 1, 8, 15, 0));
        assert_eq!(close, utc(2025, 1, 7, 21, 0));
    }

    #[test]
    fn test_last_close_monday_rolls_back_to_friday() {
        let close = last_session_close(utc(2025, 1, 6, 15, 0));
        assert_eq!(close, utc(2025, 1, 3, 21, 0));
    }

    #[test]
    fn test_last_close_weekend_rolls_back_to_friday() {
        assert_eq!(
            last_session_close(utc(2025, 1, 11, 9, 0)),
            utc(2025, 1, 10, 21, 0)
        );
        assert_eq!(
            last_session_close(utc(2025, 1, 12, 23, 0)),
            utc(2025, 1, 10, 21, 0)
        );
    }

    #[test]
    fn test_missing_updated_at_is_always_stale() {
        for staleness in [0, 1, 60, 3600, u64::MAX / 2] {
            assert!(!is_fresh(None, staleness, utc(2025, 1, 8, 15, 0)));
            assert!(!is_fresh(None, staleness, utc(2025, 1, 11, 15, 0)));
        }
    }

    #[test]
    fn test_freshness_during_market_hours_is_age_based() {
        let now = utc(2025, 1, 8, 15, 0);
        assert!(is_fresh(Some(now - Duration::seconds(30)), 60, now));
        assert!(!is_fresh(Some(now - Duration::seconds(60)), 60, now));
        assert!(!is_fresh(Some(now - Duration::seconds(90)), 60, now));
    }

    #[test]
    fn test_oversized_staleness_window_saturates() {
        let now = utc(2025, 1, 8, 15, 0); // market open
        assert!(is_fresh(Some(now - Duration::days(365)), u64::MAX, now));
        assert!(!is_fresh(None, u64::MAX, now));
    }

    #[test]
    fn test_freshness_after_close_requires_post_close_update() {
        // Wednesday 22:00, session closed at 21:00 the same day.
        let now = utc(2025, 1, 8, 22, 0);
        assert!(is_fresh(Some(utc(2025, 1, 8, 21, 30)), 60, now));
        assert!(!is_fresh(Some(utc(2025, 1, 8, 20, 59)), 60, now));
        // The age-based window does not apply while closed.
        assert!(is_fresh(Some(utc(2025, 1, 8, 21, 5)), 1, now));
    }

    #[test]
    fn test_freshness_on_weekend() {
        let now = utc(2025, 1, 11, 15, 0); // Saturday
        assert!(is_fresh(Some(utc(2025, 1, 10, 21, 30)), 60, now));
        assert!(!is_fresh(Some(utc(2025, 1, 10, 15, 0)), 60, now));
    }
}
