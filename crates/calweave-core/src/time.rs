//! Time types for calendar records.
//!
//! This module provides [`EventTime`] for representing record start/end times
//! (which may be either a canonical UTC instant or an all-day date), and
//! [`DateRange`] for defining query windows.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// The time of a calendar record.
///
/// Records carry one of two time shapes:
/// - **Instant**: a specific point in time, stored in UTC
/// - **AllDay**: a date without a time component (all-day records)
///
/// All-day values are deliberately kept as plain dates. Converting them
/// through offset arithmetic shifts them across midnight for zones behind
/// UTC, which is exactly the off-by-one-day bug this representation avoids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum EventTime {
    /// A specific instant, stored in UTC.
    Instant(DateTime<Utc>),
    /// An all-day date (no time component).
    AllDay(NaiveDate),
}

impl EventTime {
    /// Creates an `EventTime::Instant` from a UTC datetime.
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self::Instant(dt)
    }

    /// Creates an `EventTime::AllDay` from a date.
    pub fn from_date(date: NaiveDate) -> Self {
        Self::AllDay(date)
    }

    /// Returns `true` if this is an all-day value.
    pub fn is_all_day(&self) -> bool {
        matches!(self, Self::AllDay(_))
    }

    /// Returns the instant if this is an `Instant` variant.
    pub fn as_instant(&self) -> Option<&DateTime<Utc>> {
        match self {
            Self::Instant(dt) => Some(dt),
            Self::AllDay(_) => None,
        }
    }

    /// Returns the date if this is an `AllDay` variant.
    pub fn as_date(&self) -> Option<&NaiveDate> {
        match self {
            Self::AllDay(d) => Some(d),
            Self::Instant(_) => None,
        }
    }

    /// Converts to a UTC datetime for comparison purposes.
    ///
    /// All-day values compare at midnight UTC on their date.
    pub fn to_utc(&self) -> DateTime<Utc> {
        match self {
            Self::Instant(dt) => *dt,
            Self::AllDay(date) => date.and_hms_opt(0, 0, 0).expect("valid time").and_utc(),
        }
    }

    /// Returns the date portion of this event time.
    pub fn date(&self) -> NaiveDate {
        match self {
            Self::Instant(dt) => dt.date_naive(),
            Self::AllDay(date) => *date,
        }
    }
}

impl PartialOrd for EventTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EventTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_utc().cmp(&other.to_utc())
    }
}

/// A query window over the record set.
///
/// Represents a half-open interval `[start, end)` in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// Start of the range (inclusive).
    pub start: DateTime<Utc>,
    /// End of the range (exclusive).
    pub end: DateTime<Utc>,
}

impl DateRange {
    /// Creates a new range.
    ///
    /// # Panics
    ///
    /// Panics if `start` is after `end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        assert!(start <= end, "DateRange start must be <= end");
        Self { start, end }
    }

    /// Creates a range spanning `days_back` days before `now` through
    /// `days_ahead` days after it.
    pub fn around(now: DateTime<Utc>, days_back: i64, days_ahead: i64) -> Self {
        Self::new(
            now - Duration::days(days_back),
            now + Duration::days(days_ahead),
        )
    }

    /// Returns the duration of this range.
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Checks if an instant falls within this range (`[start, end)`).
    pub fn contains(&self, dt: DateTime<Utc>) -> bool {
        self.start <= dt && dt < self.end
    }

    /// Checks if a record with the given start falls within this range.
    ///
    /// All-day starts are compared at midnight UTC.
    pub fn contains_event_time(&self, et: &EventTime) -> bool {
        self.contains(et.to_utc())
    }
}
