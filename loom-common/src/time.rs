//! Timestamp, cadence and day-marker utilities

use crate::{Error, Result};
use chrono::{DateTime, Days, FixedOffset, NaiveDateTime, NaiveTime, TimeZone, Utc};
use std::time::Duration;

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Convert milliseconds to duration
pub fn millis_to_duration(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

/// Convert a duration to whole milliseconds (saturating)
pub fn duration_to_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

/// Convert stored unix milliseconds to a UTC timestamp
pub fn datetime_from_millis(millis: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| Error::InvalidInput(format!("Timestamp out of range: {}", millis)))
}

/// Delay until the next wall-clock-aligned tick
///
/// Ticks land on multiples of `interval_secs` since the unix epoch (":00",
/// ":05", ":10" for a 300s interval). When `now` sits exactly on a mark the
/// delay is a full interval, never zero.
pub fn next_tick_delay(now_unix_secs: i64, interval_secs: u64) -> Duration {
    let interval = interval_secs.max(1) as i64;
    let elapsed = now_unix_secs.rem_euclid(interval);
    Duration::from_secs((interval - elapsed) as u64)
}

/// Sub-second aware variant of [`next_tick_delay`]
pub fn next_tick_delay_at<Tz: TimeZone>(now: &DateTime<Tz>, interval_secs: u64) -> Duration {
    let whole = next_tick_delay(now.timestamp(), interval_secs);
    let nanos = Duration::from_nanos(u64::from(now.timestamp_subsec_nanos()));
    whole.checked_sub(nanos).unwrap_or(whole)
}

/// Fifteen-minute steps tried when a local time falls in a DST gap
const GAP_STEPS: u32 = 16;

/// Resolve a local wall-clock time in `tz`
///
/// An ambiguous time (clocks going back) takes the earlier instant. A time
/// skipped by clocks going forward moves to the first valid local time after
/// it.
pub fn resolve_local<Tz: TimeZone>(tz: &Tz, local: NaiveDateTime) -> DateTime<FixedOffset> {
    let mut candidate = local;
    for _ in 0..=GAP_STEPS {
        if let Some(resolved) = tz.from_local_datetime(&candidate).earliest() {
            return resolved.fixed_offset();
        }
        candidate += chrono::Duration::minutes(15);
    }
    tz.from_utc_datetime(&local).fixed_offset()
}

/// The next local midnight in `tz` strictly after `now`
pub fn next_local_midnight<Tz: TimeZone>(
    tz: &Tz,
    now: DateTime<FixedOffset>,
) -> DateTime<FixedOffset> {
    let tomorrow = now.with_timezone(tz).date_naive() + Days::new(1);
    resolve_local(tz, tomorrow.and_time(NaiveTime::MIN))
}

/// The next end-of-day marker in `tz` strictly after `now`
///
/// Today's marker when it is still ahead, otherwise tomorrow's.
pub fn next_end_of_day<Tz: TimeZone>(
    tz: &Tz,
    now: DateTime<FixedOffset>,
    end_of_day: NaiveTime,
) -> DateTime<FixedOffset> {
    let date = now.with_timezone(tz).date_naive();
    let today = resolve_local(tz, date.and_time(end_of_day));
    if now < today {
        today
    } else {
        resolve_local(tz, (date + Days::new(1)).and_time(end_of_day))
    }
}

/// How far a schedule must reach once the given end-of-day marker is armed
///
/// The midnight that follows the marker's day, so a continuous stream always
/// holds programming past the moment the marker fires again.
pub fn schedule_horizon<Tz: TimeZone>(
    tz: &Tz,
    end_of_day_marker: DateTime<FixedOffset>,
) -> DateTime<FixedOffset> {
    next_local_midnight(tz, end_of_day_marker)
}

/// Parse "HH:MM" (or "HH:MM:SS") into a time of day
pub fn parse_time_of_day(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map_err(|e| Error::Config(format!("Invalid time of day '{}': {}", s, e)))
}

/// Round `duration` up to the next multiple of `granularity`
///
/// A zero granularity leaves the duration unchanged.
pub fn round_up_to(duration: Duration, granularity: Duration) -> Duration {
    let step = granularity.as_millis();
    if step == 0 {
        return duration;
    }
    let millis = duration.as_millis();
    let slots = millis.div_ceil(step).max(1);
    Duration::from_millis(u64::try_from(slots * step).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{LocalResult, NaiveDate, Timelike};

    fn utc_offset() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn local(h: u32, m: u32) -> DateTime<FixedOffset> {
        utc_offset().with_ymd_and_hms(2026, 5, 10, h, m, 0).unwrap()
    }

    #[test]
    fn test_now_returns_valid_timestamp() {
        let timestamp = now();
        // Should be a reasonable timestamp (after year 2000)
        assert!(timestamp.timestamp() > 946_684_800);
    }

    #[test]
    fn test_tick_delay_on_mark_is_full_interval() {
        let t = 1_700_000_100; // divisible by 300
        assert_eq!(t % 300, 0);
        assert_eq!(next_tick_delay(t, 300), Duration::from_secs(300));
    }

    #[test]
    fn test_tick_delay_aligns_to_next_mark() {
        let t = 1_700_000_100 + 17;
        assert_eq!(next_tick_delay(t, 300), Duration::from_secs(283));
        assert_eq!(next_tick_delay(t + 282, 300), Duration::from_secs(1));
    }

    #[test]
    fn test_tick_delay_zero_interval_is_clamped() {
        assert_eq!(next_tick_delay(1_700_000_000, 0), Duration::from_secs(1));
    }

    #[test]
    fn test_tick_delay_at_accounts_for_subseconds() {
        let t = Utc.timestamp_opt(1_700_000_117, 250_000_000).unwrap();
        assert_eq!(next_tick_delay_at(&t, 300), Duration::from_millis(282_750));
    }

    #[test]
    fn test_next_local_midnight_respects_offset() {
        let offset = FixedOffset::east_opt(-5 * 3600).unwrap();
        let now = offset.with_ymd_and_hms(2026, 5, 10, 22, 15, 0).unwrap();
        let midnight = next_local_midnight(&offset, now);

        assert_eq!(midnight.date_naive().to_string(), "2026-05-11");
        assert_eq!(midnight.hour(), 0);
        assert_eq!(midnight.offset(), &offset);
        assert_eq!((midnight - now).num_minutes(), 105);
    }

    #[test]
    fn test_next_end_of_day_today_or_tomorrow() {
        let eod = parse_time_of_day("23:30").unwrap();

        let before = next_end_of_day(&utc_offset(), local(18, 0), eod);
        assert_eq!(before, local(23, 30));

        let after = next_end_of_day(&utc_offset(), local(23, 30), eod);
        assert_eq!(after, local(23, 30) + chrono::Duration::days(1));
    }

    #[test]
    fn test_schedule_horizon_is_midnight_after_marker() {
        let horizon = schedule_horizon(&utc_offset(), local(23, 30));
        assert_eq!(horizon, local(0, 0) + chrono::Duration::days(1));
    }

    /// UTC-5, moving to UTC-4 at 02:00 local on 2026-03-08
    #[derive(Debug, Clone, Copy)]
    struct SpringForward;

    impl SpringForward {
        fn change() -> NaiveDateTime {
            NaiveDate::from_ymd_opt(2026, 3, 8)
                .unwrap()
                .and_hms_opt(2, 0, 0)
                .unwrap()
        }

        fn winter() -> FixedOffset {
            FixedOffset::west_opt(5 * 3600).unwrap()
        }

        fn summer() -> FixedOffset {
            FixedOffset::west_opt(4 * 3600).unwrap()
        }
    }

    impl TimeZone for SpringForward {
        type Offset = FixedOffset;

        fn from_offset(_offset: &FixedOffset) -> Self {
            SpringForward
        }

        fn offset_from_local_date(&self, local: &NaiveDate) -> LocalResult<FixedOffset> {
            self.offset_from_local_datetime(&local.and_time(NaiveTime::MIN))
        }

        fn offset_from_local_datetime(&self, local: &NaiveDateTime) -> LocalResult<FixedOffset> {
            let change = Self::change();
            if *local < change {
                LocalResult::Single(Self::winter())
            } else if *local < change + chrono::Duration::hours(1) {
                LocalResult::None
            } else {
                LocalResult::Single(Self::summer())
            }
        }

        fn offset_from_utc_date(&self, utc: &NaiveDate) -> FixedOffset {
            self.offset_from_utc_datetime(&utc.and_time(NaiveTime::MIN))
        }

        fn offset_from_utc_datetime(&self, utc: &NaiveDateTime) -> FixedOffset {
            // 02:00 at UTC-5 is 07:00 UTC
            if *utc < Self::change() + chrono::Duration::hours(5) {
                Self::winter()
            } else {
                Self::summer()
            }
        }
    }

    #[test]
    fn test_markers_follow_dst_change() {
        let eod = parse_time_of_day("23:30").unwrap();
        let evening = SpringForward::winter()
            .with_ymd_and_hms(2026, 3, 7, 22, 0, 0)
            .unwrap();

        let midnight = next_local_midnight(&SpringForward, evening);
        let winter = SpringForward::winter();
        assert_eq!(midnight, winter.with_ymd_and_hms(2026, 3, 8, 0, 0, 0).unwrap());

        // Computed before the change, the marker still lands on summer time
        let marker = next_end_of_day(&SpringForward, midnight, eod);
        let summer = SpringForward::summer();
        assert_eq!(marker, summer.with_ymd_and_hms(2026, 3, 8, 23, 30, 0).unwrap());
        assert_eq!(marker.offset(), &summer);

        let horizon = schedule_horizon(&SpringForward, marker);
        assert_eq!(horizon, summer.with_ymd_and_hms(2026, 3, 9, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_time_in_dst_gap_moves_forward() {
        let skipped = SpringForward::change() + chrono::Duration::minutes(30);
        assert_eq!(
            resolve_local(&SpringForward, skipped),
            SpringForward::summer().with_ymd_and_hms(2026, 3, 8, 3, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_time_of_day_rejects_garbage() {
        assert!(parse_time_of_day("23:30:15").is_ok());
        assert!(parse_time_of_day("half past eleven").is_err());
    }

    #[test]
    fn test_round_up_to_slot() {
        let slot = Duration::from_secs(1800);
        assert_eq!(round_up_to(Duration::from_secs(1320), slot), slot);
        assert_eq!(round_up_to(Duration::from_secs(1800), slot), slot);
        assert_eq!(round_up_to(Duration::from_secs(5460), slot), Duration::from_secs(7200));
        assert_eq!(round_up_to(Duration::ZERO, slot), slot);
        assert_eq!(round_up_to(Duration::from_secs(42), Duration::ZERO), Duration::from_secs(42));
    }

    #[test]
    fn test_datetime_millis_round_trip() {
        let t = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(datetime_from_millis(t.timestamp_millis()).unwrap(), t);
    }
}
