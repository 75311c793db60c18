//! Provider time normalization.
//!
//! Feeds deliver times in several shapes: UTC instants, offset-carrying
//! datetimes, zone-naive wall-clock times with (or without) a declared IANA
//! zone, and date-only all-day markers. [`Normalizer`] converts each into the
//! canonical [`EventTime`] representation plus an all-day flag.
//!
//! Zone-naive times are resolved against the feed-declared zone hint when one
//! is present, else against the configured fallback zone. Resolution is
//! DST-aware: a wall time inside a spring-forward gap is shifted forward by
//! the gap length, and a wall time repeated by a fall-back transition resolves
//! to the earliest of its two instants.

use chrono::offset::MappedLocalTime;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use thiserror::Error;

use crate::time::EventTime;

/// A provider time value before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawTime {
    /// An instant already in UTC.
    Utc(DateTime<Utc>),
    /// An instant carrying an explicit UTC offset.
    Offset(DateTime<FixedOffset>),
    /// A zone-naive wall-clock time; resolved via zone hint or fallback.
    Floating(NaiveDateTime),
    /// A date-only all-day marker.
    Date(NaiveDate),
}

impl RawTime {
    /// Returns the wall-clock date of this value as written by the provider,
    /// without any offset conversion.
    pub fn wall_date(&self) -> NaiveDate {
        match self {
            Self::Utc(dt) => dt.date_naive(),
            Self::Offset(dt) => dt.date_naive(),
            Self::Floating(naive) => naive.date(),
            Self::Date(date) => *date,
        }
    }

    /// Returns true if this is a date-only value.
    pub fn is_date_only(&self) -> bool {
        matches!(self, Self::Date(_))
    }
}

/// Errors from time normalization.
///
/// Both variants are per-record conditions: the caller drops the record and
/// continues with the rest of the feed.
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// The feed declared a zone name that is not a known IANA identifier.
    #[error("unknown time zone {zone:?}")]
    UnknownZone { zone: String },

    /// The wall-clock time could not be mapped to an instant in the zone.
    #[error("wall-clock time {time} cannot be resolved in zone {zone}")]
    UnresolvableLocalTime { time: NaiveDateTime, zone: Tz },
}

/// Converts raw provider times into canonical [`EventTime`] values.
#[derive(Debug, Clone)]
pub struct Normalizer {
    fallback: Tz,
}

impl Normalizer {
    /// Creates a normalizer with the given fallback zone for zone-naive times.
    pub fn new(fallback: Tz) -> Self {
        Self { fallback }
    }

    /// Returns the configured fallback zone.
    pub fn fallback(&self) -> Tz {
        self.fallback
    }

    /// Normalizes a raw time to `(canonical time, is_all_day)`.
    ///
    /// Date-only values and values flagged all-day by the provider become
    /// [`EventTime::AllDay`] carrying the wall-clock date exactly as written.
    /// Everything else becomes a UTC instant.
    pub fn normalize(
        &self,
        raw: &RawTime,
        zone_hint: Option<&str>,
        all_day_hint: bool,
    ) -> Result<(EventTime, bool), NormalizeError> {
        if raw.is_date_only() || all_day_hint {
            // All-day markers keep their wall date. Offset arithmetic here
            // would move midnight starts across the date line for zones
            // behind UTC.
            return Ok((EventTime::from_date(raw.wall_date()), true));
        }

        let instant = match raw {
            RawTime::Utc(dt) => *dt,
            RawTime::Offset(dt) => dt.with_timezone(&Utc),
            RawTime::Floating(naive) => {
                let tz = self.resolve_zone(zone_hint)?;
                resolve_local(*naive, tz)?
            }
            RawTime::Date(_) => unreachable!("date-only handled above"),
        };

        Ok((EventTime::from_utc(instant), false))
    }

    fn resolve_zone(&self, zone_hint: Option<&str>) -> Result<Tz, NormalizeError> {
        match zone_hint {
            Some(name) => name.parse::<Tz>().map_err(|_| NormalizeError::UnknownZone {
                zone: name.to_string(),
            }),
            None => Ok(self.fallback),
        }
    }
}

/// Maps a wall-clock time to a UTC instant in the given zone.
///
/// Spring-forward gaps shift forward by the gap length; fall-back ambiguity
/// resolves to the earliest instant.
fn resolve_local(naive: NaiveDateTime, tz: Tz) -> Result<DateTime<Utc>, NormalizeError> {
    match tz.from_local_datetime(&naive) {
        MappedLocalTime::Single(dt) => Ok(dt.with_timezone(&Utc)),
        MappedLocalTime::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
        MappedLocalTime::None => {
            // Inside a spring-forward gap. Interpreting the wall time with
            // the pre-transition offset lands the instant past the gap by
            // exactly the gap length (02:30 in a 02:00->03:00 gap => 03:30).
            let pre_gap = tz
                .from_local_datetime(&(naive - Duration::hours(3)))
                .earliest()
                .ok_or(NormalizeError::UnresolvableLocalTime { time: naive, zone: tz })?;
            let offset = Duration::seconds(i64::from(pre_gap.offset().fix().local_minus_utc()));
            Ok(Utc.from_utc_datetime(&(naive - offset)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn naive(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDateTime::new(
            NaiveDate::from_ymd_opt(y, m, d).unwrap(),
            NaiveTime::from_hms_opt(h, min, 0).unwrap(),
        )
    }

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn pacific_normalizer() -> Normalizer {
        Normalizer::new(chrono_tz::America::Los_Angeles)
    }

    mod explicit_offsets {
        use super::*;

        #[test]
        fn utc_passes_through() {
            let n = pacific_normalizer();
            let raw = RawTime::Utc(utc(2025, 6, 2, 16, 0));
            let (et, all_day) = n.normalize(&raw, None, false).unwrap();
            assert_eq!(et, EventTime::from_utc(utc(2025, 6, 2, 16, 0)));
            assert!(!all_day);
        }

        #[test]
        fn offset_converts_directly() {
            let n = pacific_normalizer();
            let fixed = FixedOffset::west_opt(8 * 3600)
                .unwrap()
                .with_ymd_and_hms(2025, 1, 15, 9, 0, 0)
                .unwrap();
            let (et, _) = n.normalize(&RawTime::Offset(fixed), None, false).unwrap();
            assert_eq!(et, EventTime::from_utc(utc(2025, 1, 15, 17, 0)));
        }

        #[test]
        fn zone_hint_ignored_when_offset_present() {
            let n = pacific_normalizer();
            let raw = RawTime::Utc(utc(2025, 6, 2, 16, 0));
            let (et, _) = n.normalize(&raw, Some("Asia/Tokyo"), false).unwrap();
            assert_eq!(et, EventTime::from_utc(utc(2025, 6, 2, 16, 0)));
        }
    }

    mod naive_times {
        use super::*;

        #[test]
        fn zone_hint_applied() {
            let n = pacific_normalizer();
            let raw = RawTime::Floating(naive(2025, 6, 2, 9, 0));
            let (et, _) = n.normalize(&raw, Some("America/New_York"), false).unwrap();
            // 09:00 EDT == 13:00 UTC
            assert_eq!(et, EventTime::from_utc(utc(2025, 6, 2, 13, 0)));
        }

        #[test]
        fn fallback_applied_without_hint() {
            let n = pacific_normalizer();
            let raw = RawTime::Floating(naive(2025, 6, 2, 9, 0));
            let (et, _) = n.normalize(&raw, None, false).unwrap();
            // 09:00 PDT == 16:00 UTC
            assert_eq!(et, EventTime::from_utc(utc(2025, 6, 2, 16, 0)));
        }

        #[test]
        fn unknown_zone_is_rejected() {
            let n = pacific_normalizer();
            let raw = RawTime::Floating(naive(2025, 6, 2, 9, 0));
            let err = n.normalize(&raw, Some("Mars/Olympus_Mons"), false);
            assert!(matches!(err, Err(NormalizeError::UnknownZone { .. })));
        }
    }

    mod dst_transitions {
        use super::*;

        #[test]
        fn spring_forward_gap_shifts_forward() {
            // 2025-03-09 02:30 does not exist in America/Los_Angeles; the
            // 02:00->03:00 gap shifts it to 03:30 PDT == 10:30 UTC.
            let n = pacific_normalizer();
            let raw = RawTime::Floating(naive(2025, 3, 9, 2, 30));
            let (et, _) = n.normalize(&raw, None, false).unwrap();
            assert_eq!(et, EventTime::from_utc(utc(2025, 3, 9, 10, 30)));
        }

        #[test]
        fn fall_back_ambiguity_resolves_to_earliest() {
            // 2025-11-02 01:30 occurs twice; the earliest (PDT, -07:00)
            // mapping wins, deterministically.
            let n = pacific_normalizer();
            let raw = RawTime::Floating(naive(2025, 11, 2, 1, 30));
            let (et, _) = n.normalize(&raw, None, false).unwrap();
            assert_eq!(et, EventTime::from_utc(utc(2025, 11, 2, 8, 30)));
        }
    }

    mod all_day {
        use super::*;

        #[test]
        fn date_only_is_all_day() {
            let n = pacific_normalizer();
            let raw = RawTime::Date(NaiveDate::from_ymd_opt(2025, 6, 2).unwrap());
            let (et, all_day) = n.normalize(&raw, None, false).unwrap();
            assert!(all_day);
            assert_eq!(et.as_date(), Some(&NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()));
        }

        #[test]
        fn all_day_hint_keeps_wall_date() {
            // A midnight UTC start flagged all-day must keep its written
            // date, not drift to the previous day in the fallback zone.
            let n = pacific_normalizer();
            let raw = RawTime::Utc(utc(2025, 6, 2, 0, 0));
            let (et, all_day) = n.normalize(&raw, None, true).unwrap();
            assert!(all_day);
            assert_eq!(et.as_date(), Some(&NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()));
        }

        #[test]
        fn all_day_hint_on_floating_midnight() {
            let n = pacific_normalizer();
            let raw = RawTime::Floating(naive(2025, 6, 2, 0, 0));
            let (et, all_day) = n.normalize(&raw, Some("America/New_York"), true).unwrap();
            assert!(all_day);
            assert_eq!(et.as_date(), Some(&NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()));
        }
    }
}
