//! ICS feed parsing.
//!
//! Parses RFC 5545 text into [`RawEventRecord`]s. Both the `ics` and the
//! `apple-export` source kinds share this grammar; the caller tags the
//! records with the owning source kind.
//!
//! Zone-qualified times (`DTSTART;TZID=...`) are kept zone-naive with the
//! TZID carried as a zone hint, so the Time Normalizer can resolve them
//! DST-aware instead of assuming UTC. Privacy-limited feeds deliver
//! placeholder subjects; these pass through unchanged.

use chrono::{NaiveDate, NaiveDateTime};
use icalendar::parser::{read_calendar, unfold, Component, Property};
use icalendar::{CalendarDateTime, DatePerhapsTime};
use tracing::{debug, warn};

use calweave_core::{Domain, RawTime, SourceKind};

use crate::error::{FeedError, FeedIssue, FeedResult};
use crate::raw_record::{FeedParse, RawEventRecord};

/// Parses ICS content into raw records.
///
/// Individual unreadable VEVENTs are skipped and reported as issues; only
/// text that is not an iCalendar stream at all fails the feed.
pub fn parse_ics_feed(content: &str, domain: Domain, source: SourceKind) -> FeedResult<FeedParse> {
    let unfolded = unfold(content);
    let calendar =
        read_calendar(&unfolded).map_err(|e| FeedError::payload(source, e.to_string()))?;

    // Calendar-level default zone, used when a DTSTART carries no TZID.
    let calendar_zone = calendar
        .properties
        .iter()
        .find(|p| p.name == "X-WR-TIMEZONE")
        .map(|p| p.val.to_string());

    let mut out = FeedParse::new();

    for component in calendar
        .components
        .iter()
        .filter(|c| c.name == "VEVENT")
    {
        match convert_vevent(component, domain, source, calendar_zone.as_deref()) {
            Ok(Some(record)) => out.records.push(record),
            Ok(None) => {}
            Err(issue) => {
                warn!(
                    id = ?issue.identity_hint,
                    detail = %issue.detail,
                    "Dropping unreadable VEVENT"
                );
                out.issues.push(issue);
            }
        }
    }

    Ok(out)
}

/// Converts one VEVENT. Returns `Ok(None)` for cancelled standalone events,
/// which are simply absent from the feed's contribution.
fn convert_vevent(
    vevent: &Component<'_>,
    domain: Domain,
    source: SourceKind,
    calendar_zone: Option<&str>,
) -> Result<Option<RawEventRecord>, FeedIssue> {
    let uid = vevent
        .find_prop("UID")
        .map(|p| p.val.to_string())
        .ok_or_else(|| FeedIssue::malformed(None, "VEVENT has no UID"))?;

    let start_prop = vevent
        .find_prop("DTSTART")
        .ok_or_else(|| FeedIssue::malformed(Some(uid.clone()), "VEVENT has no DTSTART"))?;
    let start_dpt = DatePerhapsTime::try_from(start_prop)
        .map_err(|_| FeedIssue::malformed(Some(uid.clone()), "unparseable DTSTART"))?;
    let (start, start_zone) = convert_time(start_dpt);

    // Missing DTEND means zero duration for timed events and one day for
    // all-day events (half-open).
    let (end, _) = match vevent.find_prop("DTEND") {
        Some(prop) => {
            let dpt = DatePerhapsTime::try_from(prop)
                .map_err(|_| FeedIssue::malformed(Some(uid.clone()), "unparseable DTEND"))?;
            convert_time(dpt)
        }
        None => match &start {
            RawTime::Date(d) => (
                RawTime::Date(d.succ_opt().ok_or_else(|| {
                    FeedIssue::malformed(Some(uid.clone()), "DTSTART date out of range")
                })?),
                None,
            ),
            other => (other.clone(), None),
        },
    };

    let cancelled = vevent
        .find_prop("STATUS")
        .is_some_and(|p| p.val.as_ref().eq_ignore_ascii_case("CANCELLED"));

    let original_start = vevent
        .find_prop("RECURRENCE-ID")
        .and_then(|p| DatePerhapsTime::try_from(p).ok())
        .map(|dpt| convert_time(dpt).0);

    if cancelled && original_start.is_none() {
        // A cancelled standalone event simply does not contribute. Cancelled
        // overrides are kept so the expander can remove their occurrence.
        debug!(uid = %uid, "Skipping cancelled event");
        return Ok(None);
    }

    let subject = vevent
        .find_prop("SUMMARY")
        .map(|p| p.val.to_string())
        .unwrap_or_else(|| "(No title)".to_string());

    let mut record = RawEventRecord::new(source, domain, subject, start, end)
        .with_native_id(&uid)
        .with_cancelled(cancelled);

    if let Some(zone) = start_zone.or_else(|| calendar_zone.map(str::to_string)) {
        record = record.with_zone_hint(zone);
    }

    if let Some(original) = original_start {
        record = record.with_original_start(original);
        record = record.with_series_seed(&uid);
    }

    if let Some(rrule) = vevent.find_prop("RRULE") {
        record = record.with_rrule(rrule.val.to_string());
        record = record.with_series_seed(&uid);
        record.exdates = vevent
            .properties
            .iter()
            .filter(|p| p.name == "EXDATE")
            .flat_map(parse_exdate_property)
            .collect();
    }

    if let Some(organizer) = vevent.find_prop("ORGANIZER") {
        let (email, name) = parse_cal_address(organizer);
        record = record.with_organizer(email, name);
    }

    let attendees: Vec<String> = vevent
        .properties
        .iter()
        .filter(|p| p.name == "ATTENDEE")
        .map(|p| parse_cal_address(p).0)
        .collect();
    if !attendees.is_empty() {
        record = record.with_attendees(attendees);
    }

    if let Some(location) = vevent.find_prop("LOCATION") {
        record = record.with_location(location.val.to_string());
    }

    if let Some(description) = vevent.find_prop("DESCRIPTION") {
        record = record.with_body_preview(description.val.to_string());
    }

    Ok(Some(record))
}

/// Converts icalendar's DatePerhapsTime to a raw time plus an optional TZID
/// zone hint. Zone-qualified wall times stay naive for DST-aware resolution.
fn convert_time(dpt: DatePerhapsTime) -> (RawTime, Option<String>) {
    match dpt {
        DatePerhapsTime::Date(date) => (RawTime::Date(date), None),
        DatePerhapsTime::DateTime(cdt) => match cdt {
            CalendarDateTime::Utc(dt) => (RawTime::Utc(dt), None),
            CalendarDateTime::Floating(naive) => (RawTime::Floating(naive), None),
            CalendarDateTime::WithTimezone { date_time, tzid } => {
                (RawTime::Floating(date_time), Some(tzid))
            }
        },
    }
}

/// Parses an EXDATE property into raw times.
///
/// Handles TZID parameters, `VALUE=DATE`, UTC `Z` suffixes, floating times,
/// and comma-separated value lists.
fn parse_exdate_property(prop: &Property<'_>) -> Vec<RawTime> {
    let is_date = prop
        .params
        .iter()
        .any(|p| p.key == "VALUE" && p.val.as_ref().map(|v| v.as_ref()) == Some("DATE"));

    prop.val
        .as_ref()
        .split(',')
        .filter_map(|s| {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            if is_date {
                NaiveDate::parse_from_str(s, "%Y%m%d").ok().map(RawTime::Date)
            } else if let Some(stripped) = s.strip_suffix('Z') {
                NaiveDateTime::parse_from_str(stripped, "%Y%m%dT%H%M%S")
                    .ok()
                    .map(|dt| RawTime::Utc(dt.and_utc()))
            } else {
                // TZID-qualified and floating EXDATEs both stay naive; they
                // are matched against occurrence wall times, not converted.
                NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%S")
                    .ok()
                    .map(RawTime::Floating)
            }
        })
        .collect()
}

/// Parses an ORGANIZER/ATTENDEE property into `(email, display name)`.
fn parse_cal_address(prop: &Property<'_>) -> (String, Option<String>) {
    let email = prop
        .val
        .as_ref()
        .strip_prefix("mailto:")
        .unwrap_or(prop.val.as_ref())
        .to_string();
    let name = prop
        .params
        .iter()
        .find(|p| p.key == "CN")
        .and_then(|p| p.val.as_ref().map(|v| v.to_string()));
    (email, name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_ics() -> &'static str {
        "BEGIN:VCALENDAR\r\n\
         VERSION:2.0\r\n\
         PRODID:-//Test//Test//EN\r\n\
         BEGIN:VEVENT\r\n\
         UID:evt-1@example.com\r\n\
         DTSTART;TZID=America/New_York:20250602T090000\r\n\
         DTEND;TZID=America/New_York:20250602T100000\r\n\
         SUMMARY:Dentist\r\n\
         LOCATION:Clinic\r\n\
         DESCRIPTION:Bring insurance card\r\n\
         ORGANIZER;CN=Front Desk:mailto:desk@clinic.example\r\n\
         ATTENDEE:mailto:me@example.com\r\n\
         STATUS:CONFIRMED\r\n\
         END:VEVENT\r\n\
         END:VCALENDAR"
    }

    #[test]
    fn parses_zoned_event() {
        let parse = parse_ics_feed(sample_ics(), Domain::Personal, SourceKind::Ics).unwrap();
        assert_eq!(parse.records.len(), 1);
        assert!(parse.issues.is_empty());

        let record = &parse.records[0];
        assert_eq!(record.native_id.as_deref(), Some("evt-1@example.com"));
        assert_eq!(record.subject, "Dentist");
        assert_eq!(record.zone_hint.as_deref(), Some("America/New_York"));
        assert!(matches!(record.start, RawTime::Floating(_)));
        assert_eq!(record.organizer_email.as_deref(), Some("desk@clinic.example"));
        assert_eq!(record.organizer_name.as_deref(), Some("Front Desk"));
        assert_eq!(record.attendees, vec!["me@example.com".to_string()]);
        assert_eq!(record.location.as_deref(), Some("Clinic"));
        assert_eq!(record.body_preview.as_deref(), Some("Bring insurance card"));
    }

    #[test]
    fn parses_all_day_event() {
        let ics = "BEGIN:VCALENDAR\r\n\
                   VERSION:2.0\r\n\
                   BEGIN:VEVENT\r\n\
                   UID:allday-1@example.com\r\n\
                   DTSTART;VALUE=DATE:20250610\r\n\
                   DTEND;VALUE=DATE:20250611\r\n\
                   SUMMARY:Holiday\r\n\
                   END:VEVENT\r\n\
                   END:VCALENDAR";
        let parse = parse_ics_feed(ics, Domain::Personal, SourceKind::Ics).unwrap();
        let record = &parse.records[0];
        assert!(record.start.is_date_only());
        assert!(record.end.is_date_only());
    }

    #[test]
    fn missing_dtend_defaults() {
        let ics = "BEGIN:VCALENDAR\r\n\
                   VERSION:2.0\r\n\
                   BEGIN:VEVENT\r\n\
                   UID:noend-1@example.com\r\n\
                   DTSTART;VALUE=DATE:20250610\r\n\
                   SUMMARY:Marker\r\n\
                   END:VEVENT\r\n\
                   END:VCALENDAR";
        let parse = parse_ics_feed(ics, Domain::Personal, SourceKind::Ics).unwrap();
        let record = &parse.records[0];
        // Date-only with no DTEND spans one day, half-open.
        assert_eq!(
            record.end,
            RawTime::Date(NaiveDate::from_ymd_opt(2025, 6, 11).unwrap())
        );
    }

    #[test]
    fn series_master_carries_rule_and_exdates() {
        let ics = "BEGIN:VCALENDAR\r\n\
                   VERSION:2.0\r\n\
                   BEGIN:VEVENT\r\n\
                   UID:series-1@example.com\r\n\
                   DTSTART;TZID=America/New_York:20250602T090000\r\n\
                   DTEND;TZID=America/New_York:20250602T093000\r\n\
                   RRULE:FREQ=WEEKLY;BYDAY=MO\r\n\
                   EXDATE;TZID=America/New_York:20250616T090000\r\n\
                   SUMMARY:Yoga\r\n\
                   END:VEVENT\r\n\
                   END:VCALENDAR";
        let parse = parse_ics_feed(ics, Domain::Personal, SourceKind::Ics).unwrap();
        let record = &parse.records[0];
        assert!(record.is_series_master());
        assert_eq!(record.rrule.as_deref(), Some("FREQ=WEEKLY;BYDAY=MO"));
        assert_eq!(record.series_seed.as_deref(), Some("series-1@example.com"));
        assert_eq!(record.exdates.len(), 1);
    }

    #[test]
    fn override_carries_original_start() {
        let ics = "BEGIN:VCALENDAR\r\n\
                   VERSION:2.0\r\n\
                   BEGIN:VEVENT\r\n\
                   UID:series-1@example.com\r\n\
                   RECURRENCE-ID;TZID=America/New_York:20250609T090000\r\n\
                   DTSTART;TZID=America/New_York:20250609T110000\r\n\
                   DTEND;TZID=America/New_York:20250609T113000\r\n\
                   SUMMARY:Yoga (moved)\r\n\
                   END:VEVENT\r\n\
                   END:VCALENDAR";
        let parse = parse_ics_feed(ics, Domain::Personal, SourceKind::Ics).unwrap();
        let record = &parse.records[0];
        assert!(record.is_override());
        assert_eq!(record.series_seed.as_deref(), Some("series-1@example.com"));
    }

    #[test]
    fn cancelled_standalone_is_dropped() {
        let ics = "BEGIN:VCALENDAR\r\n\
                   VERSION:2.0\r\n\
                   BEGIN:VEVENT\r\n\
                   UID:gone-1@example.com\r\n\
                   DTSTART:20250602T090000Z\r\n\
                   DTEND:20250602T100000Z\r\n\
                   SUMMARY:Gone\r\n\
                   STATUS:CANCELLED\r\n\
                   END:VEVENT\r\n\
                   END:VCALENDAR";
        let parse = parse_ics_feed(ics, Domain::Personal, SourceKind::Ics).unwrap();
        assert!(parse.records.is_empty());
        assert!(parse.issues.is_empty());
    }

    #[test]
    fn placeholder_subject_passes_through() {
        let ics = "BEGIN:VCALENDAR\r\n\
                   VERSION:2.0\r\n\
                   BEGIN:VEVENT\r\n\
                   UID:busy-1@example.com\r\n\
                   DTSTART:20250602T090000Z\r\n\
                   DTEND:20250602T100000Z\r\n\
                   SUMMARY:Busy\r\n\
                   END:VEVENT\r\n\
                   END:VCALENDAR";
        let parse = parse_ics_feed(ics, Domain::Work, SourceKind::Ics).unwrap();
        assert_eq!(parse.records[0].subject, "Busy");
    }

    #[test]
    fn missing_uid_is_isolated() {
        let ics = "BEGIN:VCALENDAR\r\n\
                   VERSION:2.0\r\n\
                   BEGIN:VEVENT\r\n\
                   DTSTART:20250602T090000Z\r\n\
                   DTEND:20250602T100000Z\r\n\
                   SUMMARY:Anonymous\r\n\
                   END:VEVENT\r\n\
                   BEGIN:VEVENT\r\n\
                   UID:ok-1@example.com\r\n\
                   DTSTART:20250602T110000Z\r\n\
                   DTEND:20250602T120000Z\r\n\
                   SUMMARY:Fine\r\n\
                   END:VEVENT\r\n\
                   END:VCALENDAR";
        let parse = parse_ics_feed(ics, Domain::Personal, SourceKind::Ics).unwrap();
        assert_eq!(parse.records.len(), 1);
        assert_eq!(parse.issues.len(), 1);
        assert_eq!(parse.issues[0].kind, crate::error::FeedIssueKind::MalformedRecord);
    }

    #[test]
    fn calendar_level_zone_applies_to_floating_times() {
        let ics = "BEGIN:VCALENDAR\r\n\
                   VERSION:2.0\r\n\
                   X-WR-TIMEZONE:Europe/Paris\r\n\
                   BEGIN:VEVENT\r\n\
                   UID:float-1@example.com\r\n\
                   DTSTART:20250602T090000\r\n\
                   DTEND:20250602T100000\r\n\
                   SUMMARY:Floating\r\n\
                   END:VEVENT\r\n\
                   END:VCALENDAR";
        let parse = parse_ics_feed(ics, Domain::Personal, SourceKind::Ics).unwrap();
        assert_eq!(parse.records[0].zone_hint.as_deref(), Some("Europe/Paris"));
    }

    #[test]
    fn apple_export_uses_same_grammar() {
        let parse = parse_ics_feed(sample_ics(), Domain::Personal, SourceKind::AppleExport).unwrap();
        assert_eq!(parse.records[0].source, SourceKind::AppleExport);
    }
}
