//! Day markers
//!
//! `tomorrow` is the next local midnight; `end_of_day` the next configured
//! end-of-day time. Both are always strictly in the future when recomputed,
//! in the zone the clock reports, so a DST change moves them with it.

use crate::clock::LocalZone;
use chrono::{DateTime, FixedOffset, NaiveTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayMarkers {
    pub tomorrow: DateTime<FixedOffset>,
    pub end_of_day: DateTime<FixedOffset>,
    end_of_day_time: NaiveTime,
    zone: LocalZone,
}

impl DayMarkers {
    pub fn new(now: DateTime<FixedOffset>, end_of_day_time: NaiveTime, zone: LocalZone) -> Self {
        Self {
            tomorrow: zone.next_midnight(now),
            end_of_day: zone.next_end_of_day(now, end_of_day_time),
            end_of_day_time,
            zone,
        }
    }

    pub fn tomorrow_passed(&self, now: DateTime<FixedOffset>) -> bool {
        now >= self.tomorrow
    }

    pub fn end_of_day_passed(&self, now: DateTime<FixedOffset>) -> bool {
        now >= self.end_of_day
    }

    pub fn roll_tomorrow(&mut self, now: DateTime<FixedOffset>) {
        self.tomorrow = self.zone.next_midnight(now);
    }

    /// Arm the next end-of-day marker and return it
    pub fn roll_end_of_day(&mut self, now: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
        self.end_of_day = self.zone.next_end_of_day(now, self.end_of_day_time);
        self.end_of_day
    }

    /// How far the schedule must reach while the current marker is armed
    pub fn horizon(&self) -> DateTime<FixedOffset> {
        self.zone.horizon(self.end_of_day)
    }
}
