//! Graph-style API payload parsing.
//!
//! Parses the structured JSON payload shape used by Microsoft-Graph-style
//! calendar APIs (`calendarView` responses) into [`RawEventRecord`]s.
//!
//! The payload is assumed fully detailed: recurring series arrive as
//! concrete `occurrence`/`exception` instances carrying a `seriesMasterId`
//! link, so no local recurrence expansion is needed for this source. The
//! `seriesMaster` rows themselves are skipped; the concrete instances carry
//! the data.

use chrono::{DateTime, NaiveDateTime};
use serde::Deserialize;
use tracing::{debug, warn};

use calweave_core::{Domain, RawTime, SourceKind};

use crate::error::{FeedError, FeedIssue, FeedResult};
use crate::raw_record::{FeedParse, RawEventRecord};

#[derive(Debug, Deserialize)]
struct GraphPayload {
    #[serde(default)]
    value: Vec<GraphEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphEvent {
    id: Option<String>,
    subject: Option<String>,
    body_preview: Option<String>,
    #[serde(default)]
    is_all_day: bool,
    #[serde(default)]
    is_cancelled: bool,
    start: Option<GraphDateTimeZone>,
    end: Option<GraphDateTimeZone>,
    series_master_id: Option<String>,
    original_start: Option<String>,
    #[serde(rename = "type")]
    event_type: Option<String>,
    organizer: Option<GraphRecipient>,
    #[serde(default)]
    attendees: Vec<GraphRecipient>,
    location: Option<GraphLocation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphDateTimeZone {
    date_time: String,
    time_zone: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphRecipient {
    email_address: Option<GraphEmailAddress>,
}

#[derive(Debug, Deserialize)]
struct GraphEmailAddress {
    address: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphLocation {
    display_name: Option<String>,
}

/// Parses a Graph-style JSON payload into raw records.
///
/// Individual unreadable events are skipped and reported as issues; only a
/// payload that is not valid JSON at all fails the feed.
pub fn parse_graph_payload(payload: &str, domain: Domain) -> FeedResult<FeedParse> {
    let parsed: GraphPayload = serde_json::from_str(payload)
        .map_err(|e| FeedError::payload(SourceKind::GraphApi, e.to_string()))?;

    let mut out = FeedParse::new();

    for event in parsed.value {
        if event.is_cancelled {
            debug!(id = ?event.id, "Skipping cancelled event");
            continue;
        }
        if event.event_type.as_deref() == Some("seriesMaster") {
            // calendarView lists the concrete occurrences separately.
            debug!(id = ?event.id, "Skipping series master row");
            continue;
        }

        match convert_event(event, domain) {
            Ok(record) => out.records.push(record),
            Err(issue) => {
                warn!(
                    id = ?issue.identity_hint,
                    detail = %issue.detail,
                    "Dropping unreadable event"
                );
                out.issues.push(issue);
            }
        }
    }

    Ok(out)
}

fn convert_event(event: GraphEvent, domain: Domain) -> Result<RawEventRecord, FeedIssue> {
    let id = event
        .id
        .clone()
        .ok_or_else(|| FeedIssue::malformed(None, "event has no id"))?;

    let start_spec = event
        .start
        .as_ref()
        .ok_or_else(|| FeedIssue::malformed(Some(id.clone()), "event has no start"))?;
    let end_spec = event
        .end
        .as_ref()
        .ok_or_else(|| FeedIssue::malformed(Some(id.clone()), "event has no end"))?;

    let start = parse_graph_time(&start_spec.date_time)
        .ok_or_else(|| FeedIssue::malformed(Some(id.clone()), "unparseable start time"))?;
    let end = parse_graph_time(&end_spec.date_time)
        .ok_or_else(|| FeedIssue::malformed(Some(id.clone()), "unparseable end time"))?;

    let subject = event.subject.unwrap_or_else(|| "(No title)".to_string());

    let mut record = RawEventRecord::new(SourceKind::GraphApi, domain, subject, start, end)
        .with_native_id(&id)
        .with_all_day_hint(event.is_all_day);

    // The start's declared zone covers both times; Graph repeats it on end.
    if let Some(tz) = start_spec.time_zone.as_deref().or(end_spec.time_zone.as_deref()) {
        record = record.with_zone_hint(tz);
    }

    if let Some(master) = event.series_master_id {
        record = record.with_series_seed(master);
    }

    if let Some(ref original) = event.original_start
        && let Ok(dt) = DateTime::parse_from_rfc3339(original)
    {
        record = record.with_original_start(RawTime::Offset(dt));
    }

    if let Some(email) = event.organizer.and_then(|o| o.email_address)
        && let Some(address) = email.address
    {
        record = record.with_organizer(address, email.name);
    }

    let attendees: Vec<String> = event
        .attendees
        .into_iter()
        .filter_map(|a| a.email_address.and_then(|e| e.address))
        .collect();
    if !attendees.is_empty() {
        record = record.with_attendees(attendees);
    }

    if let Some(location) = event.location.and_then(|l| l.display_name)
        && !location.trim().is_empty()
    {
        record = record.with_location(location);
    }

    if let Some(preview) = event.body_preview
        && !preview.is_empty()
    {
        record = record.with_body_preview(preview);
    }

    Ok(record)
}

/// Parses a Graph `dateTime` value.
///
/// Handles both offset-carrying RFC3339 strings and the zone-naive
/// `2025-12-01T15:00:00.0000000` form (zone carried separately).
fn parse_graph_time(value: &str) -> Option<RawTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(RawTime::Offset(dt));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(RawTime::Floating)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_payload() -> &'static str {
        r#"{
            "value": [
                {
                    "id": "AAMk-1",
                    "subject": "Sprint Review",
                    "bodyPreview": "Agenda: demos",
                    "type": "singleInstance",
                    "start": {"dateTime": "2025-06-02T09:00:00.0000000", "timeZone": "America/Los_Angeles"},
                    "end": {"dateTime": "2025-06-02T10:00:00.0000000", "timeZone": "America/Los_Angeles"},
                    "organizer": {"emailAddress": {"address": "PM@Example.com", "name": "PM"}},
                    "attendees": [
                        {"emailAddress": {"address": "a@example.com", "name": "A"}},
                        {"emailAddress": {"address": "b@example.com", "name": "B"}}
                    ],
                    "location": {"displayName": "Room 4A"}
                },
                {
                    "id": "AAMk-2",
                    "subject": "Standup",
                    "type": "occurrence",
                    "seriesMasterId": "AAMk-series",
                    "start": {"dateTime": "2025-06-03T09:00:00.0000000", "timeZone": "UTC"},
                    "end": {"dateTime": "2025-06-03T09:15:00.0000000", "timeZone": "UTC"}
                }
            ]
        }"#
    }

    #[test]
    fn parses_single_instance() {
        let parse = parse_graph_payload(sample_payload(), Domain::Work).unwrap();
        assert_eq!(parse.records.len(), 2);
        assert!(parse.issues.is_empty());

        let record = &parse.records[0];
        assert_eq!(record.native_id.as_deref(), Some("AAMk-1"));
        assert_eq!(record.subject, "Sprint Review");
        assert_eq!(record.source, SourceKind::GraphApi);
        assert_eq!(record.domain, Domain::Work);
        assert_eq!(record.zone_hint.as_deref(), Some("America/Los_Angeles"));
        assert_eq!(record.organizer_email.as_deref(), Some("PM@Example.com"));
        assert_eq!(record.attendees.len(), 2);
        assert_eq!(record.location.as_deref(), Some("Room 4A"));
        assert!(!record.all_day_hint);
    }

    #[test]
    fn occurrence_carries_series_seed() {
        let parse = parse_graph_payload(sample_payload(), Domain::Work).unwrap();
        let record = &parse.records[1];
        assert_eq!(record.series_seed.as_deref(), Some("AAMk-series"));
        assert!(record.native_id.is_some());
    }

    #[test]
    fn skips_cancelled_and_series_master_rows() {
        let payload = r#"{
            "value": [
                {
                    "id": "AAMk-c",
                    "subject": "Gone",
                    "isCancelled": true,
                    "start": {"dateTime": "2025-06-02T09:00:00", "timeZone": "UTC"},
                    "end": {"dateTime": "2025-06-02T10:00:00", "timeZone": "UTC"}
                },
                {
                    "id": "AAMk-m",
                    "subject": "Standup",
                    "type": "seriesMaster",
                    "start": {"dateTime": "2025-06-02T09:00:00", "timeZone": "UTC"},
                    "end": {"dateTime": "2025-06-02T09:15:00", "timeZone": "UTC"}
                }
            ]
        }"#;
        let parse = parse_graph_payload(payload, Domain::Work).unwrap();
        assert!(parse.records.is_empty());
        assert!(parse.issues.is_empty());
    }

    #[test]
    fn all_day_hint_propagates() {
        let payload = r#"{
            "value": [{
                "id": "AAMk-ad",
                "subject": "Offsite",
                "isAllDay": true,
                "start": {"dateTime": "2025-06-02T00:00:00.0000000", "timeZone": "UTC"},
                "end": {"dateTime": "2025-06-03T00:00:00.0000000", "timeZone": "UTC"}
            }]
        }"#;
        let parse = parse_graph_payload(payload, Domain::Work).unwrap();
        assert!(parse.records[0].all_day_hint);
    }

    #[test]
    fn bad_record_is_isolated() {
        let payload = r#"{
            "value": [
                {
                    "id": "AAMk-bad",
                    "subject": "Broken",
                    "start": {"dateTime": "not-a-time", "timeZone": "UTC"},
                    "end": {"dateTime": "2025-06-02T10:00:00", "timeZone": "UTC"}
                },
                {
                    "id": "AAMk-ok",
                    "subject": "Fine",
                    "start": {"dateTime": "2025-06-02T09:00:00", "timeZone": "UTC"},
                    "end": {"dateTime": "2025-06-02T10:00:00", "timeZone": "UTC"}
                }
            ]
        }"#;
        let parse = parse_graph_payload(payload, Domain::Work).unwrap();
        assert_eq!(parse.records.len(), 1);
        assert_eq!(parse.records[0].native_id.as_deref(), Some("AAMk-ok"));
        assert_eq!(parse.issues.len(), 1);
        assert_eq!(parse.issues[0].identity_hint.as_deref(), Some("AAMk-bad"));
    }

    #[test]
    fn whole_payload_failure() {
        let err = parse_graph_payload("not json at all", Domain::Work);
        assert!(matches!(err, Err(FeedError::Payload { .. })));
    }

    #[test]
    fn rfc3339_times_accepted() {
        let raw = parse_graph_time("2025-06-02T09:00:00Z").unwrap();
        assert!(matches!(raw, RawTime::Offset(_)));

        let raw = parse_graph_time("2025-06-02T09:00:00.0000000").unwrap();
        assert!(matches!(raw, RawTime::Floating(_)));
    }
}
