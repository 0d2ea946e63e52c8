//! Wall-clock source for the scheduler

use chrono::{DateTime, FixedOffset, Local, NaiveTime};
use loom_common::time;
use std::sync::{Arc, Mutex};

/// Source of the current local time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;

    /// Zone day boundaries are computed in
    fn zone(&self) -> LocalZone {
        LocalZone::Fixed(*self.now().offset())
    }
}

/// Zone the day markers follow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalZone {
    /// The host's zone, DST changes included
    Host,
    Fixed(FixedOffset),
}

impl LocalZone {
    pub fn next_midnight(&self, now: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
        match self {
            LocalZone::Host => time::next_local_midnight(&Local, now),
            LocalZone::Fixed(offset) => time::next_local_midnight(offset, now),
        }
    }

    pub fn next_end_of_day(
        &self,
        now: DateTime<FixedOffset>,
        end_of_day: NaiveTime,
    ) -> DateTime<FixedOffset> {
        match self {
            LocalZone::Host => time::next_end_of_day(&Local, now, end_of_day),
            LocalZone::Fixed(offset) => time::next_end_of_day(offset, now, end_of_day),
        }
    }

    /// Midnight following the day of `marker`
    pub fn horizon(&self, marker: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
        match self {
            LocalZone::Host => time::schedule_horizon(&Local, marker),
            LocalZone::Fixed(offset) => time::schedule_horizon(offset, marker),
        }
    }
}

/// Host clock in the host's local zone
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }

    fn zone(&self) -> LocalZone {
        LocalZone::Host
    }
}

/// Clock that only moves when told to
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<FixedOffset>>>,
}

impl ManualClock {
    pub fn new(now: DateTime<FixedOffset>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn set(&self, now: DateTime<FixedOffset>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<FixedOffset> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}
