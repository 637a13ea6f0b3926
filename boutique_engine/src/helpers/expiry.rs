use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether a closing deadline has passed. This is the single definition of "closed" in the system: the persisted
/// status row may lag behind (the sweep runs periodically), but every reader and the sweep itself agree on this
/// predicate.
pub fn is_closed(closes_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    closes_at <= now
}

/// Time remaining until a package closes, split into display fields. All fields are zero once the deadline has
/// passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Countdown {
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
    pub expired: bool,
}

pub fn countdown(closes_at: DateTime<Utc>, now: DateTime<Utc>) -> Countdown {
    if is_closed(closes_at, now) {
        return Countdown { days: 0, hours: 0, minutes: 0, seconds: 0, expired: true };
    }
    let remaining = closes_at - now;
    let secs = remaining.num_seconds();
    Countdown {
        days: secs / 86_400,
        hours: (secs % 86_400) / 3_600,
        minutes: (secs % 3_600) / 60,
        seconds: secs % 60,
        expired: false,
    }
}

#[cfg(test)]
mod test {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;

    #[test]
    fn deadline_is_inclusive() {
        let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        assert!(!is_closed(t0 + Duration::seconds(1), t0));
        assert!(is_closed(t0, t0));
        assert!(is_closed(t0 - Duration::seconds(1), t0));
    }

    #[test]
    fn countdown_splits_remaining_time() {
        let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let closes = t0 + Duration::days(2) + Duration::hours(3) + Duration::minutes(4) + Duration::seconds(5);
        let c = countdown(closes, t0);
        assert_eq!((c.days, c.hours, c.minutes, c.seconds), (2, 3, 4, 5));
        assert!(!c.expired);
    }

    #[test]
    fn countdown_is_zeroed_after_expiry() {
        let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let c = countdown(t0 - Duration::hours(1), t0);
        assert_eq!((c.days, c.hours, c.minutes, c.seconds), (0, 0, 0, 0));
        assert!(c.expired);
    }
}
