use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "state")]
pub enum TimeRemaining {
    Expired,
    Remaining {
        days: i64,
        hours: i64,
        minutes: i64,
        seconds: i64,
    },
}

/// Percentage of the window `[start, end]` that has elapsed at `now`, clamped
/// to `0..=100`. A zero-length or inverted window reports `0`.
pub fn progress(start: DateTime<Utc>, end: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let total = (end - start).num_milliseconds();
    if total <= 0 || now < start {
        return 0.0;
    }

    let elapsed = (now - start).num_milliseconds();
    (elapsed as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
}

/// Whole time left until `end`, or `Expired` once `now` has reached it. A
/// fraction of a second before `end` is still `Remaining`, all zeros.
pub fn remaining(end: DateTime<Utc>, now: DateTime<Utc>) -> TimeRemaining {
    if end <= now {
        return TimeRemaining::Expired;
    }

    let left = (end - now).num_seconds();

    TimeRemaining::Remaining {
        days: left / 86_400,
        hours: left % 86_400 / 3_600,
        minutes: left % 3_600 / 60,
        seconds: left % 60,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn progress_is_linear_and_clamped() {
        let end = t0() + Duration::days(10);

        assert_eq!(progress(t0(), end, t0() - Duration::days(1)), 0.0);
        assert_eq!(progress(t0(), end, t0()), 0.0);
        assert_eq!(progress(t0(), end, t0() + Duration::days(5)), 50.0);
        assert_eq!(progress(t0(), end, end), 100.0);
        assert_eq!(progress(t0(), end, end + Duration::days(3)), 100.0);
    }

    #[test]
    fn empty_window_has_no_progress() {
        assert_eq!(progress(t0(), t0(), t0()), 0.0);
        assert_eq!(progress(t0(), t0() - Duration::hours(1), t0()), 0.0);
    }

    #[test]
    fn remaining_breaks_down_the_interval() {
        let end = t0() + Duration::days(2) + Duration::hours(3) + Duration::minutes(4) + Duration::seconds(5);

        assert_eq!(
            remaining(end, t0()),
            TimeRemaining::Remaining {
                days: 2,
                hours: 3,
                minutes: 4,
                seconds: 5
            }
        );
    }

    #[test]
    fn remaining_under_a_second_before_end_is_not_expired() {
        let end = t0() + Duration::days(1);

        assert_eq!(
            remaining(end, end - Duration::milliseconds(500)),
            TimeRemaining::Remaining {
                days: 0,
                hours: 0,
                minutes: 0,
                seconds: 0
            }
        );
        assert_eq!(
            remaining(end, end - Duration::milliseconds(1500)),
            TimeRemaining::Remaining {
                days: 0,
                hours: 0,
                minutes: 0,
                seconds: 1
            }
        );
    }

    #[test]
    fn remaining_at_or_after_end_is_expired() {
        assert_eq!(remaining(t0(), t0()), TimeRemaining::Expired);
        assert_eq!(remaining(t0(), t0() + Duration::seconds(1)), TimeRemaining::Expired);
    }

    #[test]
    fn remaining_serializes_with_state_tag() {
        let json = serde_json::to_value(TimeRemaining::Remaining {
            days: 1,
            hours: 0,
            minutes: 0,
            seconds: 0,
        })
        .unwrap();

        assert_eq!(
            json,
            serde_json::json!({"state": "remaining", "days": 1, "hours": 0, "minutes": 0, "seconds": 0})
        );
        assert_eq!(
            serde_json::to_value(TimeRemaining::Expired).unwrap(),
            serde_json::json!({"state": "expired"})
        );
    }
}
