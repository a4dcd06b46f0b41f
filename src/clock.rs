//! Local wall-clock access and week arithmetic.
//!
//! All scheduling decisions are made in the group's configured local offset,
//! so the clock hands out [`DateTime<FixedOffset>`] values rather than UTC.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use std::sync::Mutex;

/// Source of the current local time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;
}

/// Real time in a fixed offset.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    #[must_use]
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset)
    }
}

/// Manually advanced clock for tests and replays.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<FixedOffset>>,
}

impl FixedClock {
    #[must_use]
    pub fn new(now: DateTime<FixedOffset>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Jump to `now`.
    pub fn set(&self, now: DateTime<FixedOffset>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Local midnight at the start of `date`, shifted by `hour` hours.
#[must_use]
pub fn local_at(date: NaiveDate, hour: u32, offset: &FixedOffset) -> DateTime<FixedOffset> {
    let naive = date.and_time(NaiveTime::MIN) + Duration::hours(i64::from(hour));
    // Fixed offsets never produce gaps or folds.
    offset
        .from_local_datetime(&naive)
        .single()
        .unwrap_or_else(|| offset.from_utc_datetime(&naive))
}

/// Monday 00:00 of the week containing `now`.
#[must_use]
pub fn week_start(now: &DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    let days_from_monday = i64::from(now.weekday().num_days_from_monday());
    let monday = now.date_naive() - Duration::days(days_from_monday);
    local_at(monday, 0, now.offset())
}

/// Friday of the current week for Monday–Friday, next week's Friday for the weekend.
#[must_use]
pub fn next_friday(now: &DateTime<FixedOffset>) -> NaiveDate {
    let monday = week_start(now).date_naive();
    let friday = monday + Duration::days(4);
    if now.weekday().number_from_monday() <= 5 {
        friday
    } else {
        friday + Duration::days(7)
    }
}
