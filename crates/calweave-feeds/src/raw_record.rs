//! Raw record type produced by feed parsers.
//!
//! This module defines [`RawEventRecord`], a source-agnostic representation
//! of one event as it came off a feed, before time normalization, recurrence
//! expansion, and identity resolution.
//!
//! Each parser variant (Graph payload, ICS text) maps its own field grammar
//! into this one shape; everything downstream is source-blind.

use calweave_core::{Domain, RawTime, SourceKind};

use crate::error::FeedIssue;

/// One event as parsed from a feed, prior to normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEventRecord {
    /// The provider's stable native event ID, if it has one.
    pub native_id: Option<String>,

    /// The feed this record came from.
    pub source: SourceKind,

    /// The calendar partition of the owning feed.
    pub domain: Domain,

    /// The event title. Privacy-limited feeds may deliver a placeholder;
    /// it is passed through unchanged.
    pub subject: String,

    /// When the event starts, as written by the provider.
    pub start: RawTime,

    /// When the event ends, as written by the provider.
    pub end: RawTime,

    /// Feed-declared IANA zone for zone-naive times.
    pub zone_hint: Option<String>,

    /// Provider flagged this record all-day.
    pub all_day_hint: bool,

    /// The native ID of the recurring definition this record belongs to.
    pub series_seed: Option<String>,

    /// Raw RRULE text when this record is an unexpanded series master.
    pub rrule: Option<String>,

    /// Excluded occurrence starts (EXDATE) for a series master.
    pub exdates: Vec<RawTime>,

    /// The generated occurrence start this record overrides (RECURRENCE-ID).
    pub original_start: Option<RawTime>,

    /// Provider marked the record cancelled.
    pub cancelled: bool,

    /// The event location, if available.
    pub location: Option<String>,

    /// The organizer's email address.
    pub organizer_email: Option<String>,

    /// The organizer's display name.
    pub organizer_name: Option<String>,

    /// Attendee email addresses, in feed order.
    pub attendees: Vec<String>,

    /// A preview of the event body/description.
    pub body_preview: Option<String>,
}

impl RawEventRecord {
    /// Creates a raw record with the minimum required fields.
    pub fn new(
        source: SourceKind,
        domain: Domain,
        subject: impl Into<String>,
        start: RawTime,
        end: RawTime,
    ) -> Self {
        Self {
            native_id: None,
            source,
            domain,
            subject: subject.into(),
            start,
            end,
            zone_hint: None,
            all_day_hint: false,
            series_seed: None,
            rrule: None,
            exdates: Vec::new(),
            original_start: None,
            cancelled: false,
            location: None,
            organizer_email: None,
            organizer_name: None,
            attendees: Vec::new(),
            body_preview: None,
        }
    }

    /// Returns true if this record is an unexpanded series master.
    pub fn is_series_master(&self) -> bool {
        self.rrule.is_some()
    }

    /// Returns true if this record overrides one generated occurrence.
    pub fn is_override(&self) -> bool {
        self.original_start.is_some()
    }

    /// Builder method to set the native ID.
    pub fn with_native_id(mut self, id: impl Into<String>) -> Self {
        self.native_id = Some(id.into());
        self
    }

    /// Builder method to set the zone hint.
    pub fn with_zone_hint(mut self, zone: impl Into<String>) -> Self {
        self.zone_hint = Some(zone.into());
        self
    }

    /// Builder method to flag the record all-day.
    pub fn with_all_day_hint(mut self, all_day: bool) -> Self {
        self.all_day_hint = all_day;
        self
    }

    /// Builder method to set the series seed.
    pub fn with_series_seed(mut self, seed: impl Into<String>) -> Self {
        self.series_seed = Some(seed.into());
        self
    }

    /// Builder method to set the recurrence rule text.
    pub fn with_rrule(mut self, rrule: impl Into<String>) -> Self {
        self.rrule = Some(rrule.into());
        self
    }

    /// Builder method to set the override's original start.
    pub fn with_original_start(mut self, original: RawTime) -> Self {
        self.original_start = Some(original);
        self
    }

    /// Builder method to mark the record cancelled.
    pub fn with_cancelled(mut self, cancelled: bool) -> Self {
        self.cancelled = cancelled;
        self
    }

    /// Builder method to set the location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Builder method to set the organizer.
    pub fn with_organizer(mut self, email: impl Into<String>, name: Option<String>) -> Self {
        self.organizer_email = Some(email.into());
        self.organizer_name = name;
        self
    }

    /// Builder method to set the attendee list.
    pub fn with_attendees(mut self, attendees: Vec<String>) -> Self {
        self.attendees = attendees;
        self
    }

    /// Builder method to set the body preview.
    pub fn with_body_preview(mut self, preview: impl Into<String>) -> Self {
        self.body_preview = Some(preview.into());
        self
    }
}

/// The product of parsing one feed payload.
///
/// Parsing is per-record fault tolerant: records that could not be read are
/// reported in `issues` while the rest of the feed parses normally.
#[derive(Debug, Default)]
pub struct FeedParse {
    /// Successfully parsed records.
    pub records: Vec<RawEventRecord>,
    /// Per-record problems encountered along the way.
    pub issues: Vec<FeedIssue>,
}

impl FeedParse {
    /// Creates an empty parse result.
    pub fn new() -> Self {
        Self::default()
    }
}
