//! Canonical record types.
//!
//! This module provides the types the rest of the system revolves around:
//! - [`EventRecord`]: the canonical, deduplicated unit of calendar data
//! - [`Domain`]: the work/personal partition
//! - [`SourceKind`]: the feed a record came from, ordered by precedence
//! - [`IgnoreEntry`]: user-maintained suppression entries
//! - [`ConflictAnnotation`]: a derived work/personal time overlap

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::time::EventTime;

/// The calendar partition a record belongs to.
///
/// Work and personal records are never merged during deduplication; an
/// identical subject and start time across domains is two distinct
/// commitments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Work,
    Personal,
}

impl Domain {
    /// Returns the wire/storage name for this domain.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Work => "work",
            Self::Personal => "personal",
        }
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of feed a record was ingested from.
///
/// Kinds are ordered by precedence: when the same logical event arrives from
/// two sources in one domain, the higher-precedence source's version wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// A structured Graph-style API payload; fully detailed.
    GraphApi,
    /// A subscribed ICS feed; may carry privacy-redacted subjects.
    Ics,
    /// An exported Apple calendar, same grammar as ICS.
    AppleExport,
}

impl SourceKind {
    /// Returns the wire/storage name for this source kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GraphApi => "graph-api",
            Self::Ics => "ics",
            Self::AppleExport => "apple-export",
        }
    }

    /// Returns the precedence rank; higher wins within one domain.
    pub fn precedence(&self) -> u8 {
        match self {
            Self::GraphApi => 2,
            Self::Ics | Self::AppleExport => 1,
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The canonical unit of calendar data.
///
/// One record per logical event occurrence. `identity` is unique across the
/// whole record set regardless of source; ingesting the same logical event
/// again updates the stored row rather than duplicating it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Stable key, unique per logical event.
    pub identity: String,
    /// Stable key shared by all occurrences of one recurring definition.
    pub series_key: Option<String>,
    /// The work/personal partition; immutable once assigned.
    pub domain: Domain,
    /// The feed this version of the record came from.
    pub source: SourceKind,
    /// The event title; may be a provider-redacted placeholder.
    pub subject: String,
    /// When the event starts.
    pub start: EventTime,
    /// When the event ends (half-open; `end >= start` unless all-day).
    pub end: EventTime,
    /// All-day records are excluded from overlap computation.
    pub is_all_day: bool,
    /// Set when the record's series rule could only be partially expanded.
    pub partially_expanded: bool,
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
    /// When this record was first stored.
    pub first_seen_at: DateTime<Utc>,
    /// When the most recent ingestion touched this record.
    pub last_seen_at: DateTime<Utc>,
}

impl EventRecord {
    /// Creates a record with required fields; timestamps start equal.
    pub fn new(
        identity: impl Into<String>,
        domain: Domain,
        source: SourceKind,
        subject: impl Into<String>,
        start: EventTime,
        end: EventTime,
        seen_at: DateTime<Utc>,
    ) -> Self {
        let is_all_day = start.is_all_day();
        Self {
            identity: identity.into(),
            series_key: None,
            domain,
            source,
            subject: subject.into(),
            start,
            end,
            is_all_day,
            partially_expanded: false,
            location: None,
            organizer_email: None,
            organizer_name: None,
            attendees: Vec::new(),
            body_preview: None,
            first_seen_at: seen_at,
            last_seen_at: seen_at,
        }
    }

    /// The occurrence key (`series key` + start) when this record belongs to
    /// a series. Unique across the record set together with `series_key`.
    pub fn occurrence_key(&self) -> Option<String> {
        self.series_key
            .as_ref()
            .map(|sk| format!("{}@{}", sk, self.start.to_utc().to_rfc3339()))
    }

    /// Returns true if the record has zero duration.
    pub fn is_zero_duration(&self) -> bool {
        self.start == self.end
    }

    /// Builder method to set the series key.
    pub fn with_series_key(mut self, series_key: impl Into<String>) -> Self {
        self.series_key = Some(series_key.into());
        self
    }

    /// Builder method to set the location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Builder method to set the organizer.
    pub fn with_organizer(
        mut self,
        email: impl Into<String>,
        name: Option<String>,
    ) -> Self {
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

    /// Builder method to mark the record partially expanded.
    pub fn with_partially_expanded(mut self, partial: bool) -> Self {
        self.partially_expanded = partial;
        self
    }
}

/// A user-maintained suppression entry.
///
/// Entries are created and removed only by explicit user action; the sync
/// pipeline never writes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum IgnoreEntry {
    /// Suppresses every past and future occurrence of one series.
    Series {
        series_key: String,
        /// Subject note kept for listing the entry back to the user.
        subject: Option<String>,
        reason: String,
        created_at: DateTime<Utc>,
    },
    /// Suppresses exactly one occurrence, matched by record identity or by
    /// occurrence key (`series key` + start).
    Occurrence {
        key: String,
        subject: Option<String>,
        reason: String,
        created_at: DateTime<Utc>,
    },
}

impl IgnoreEntry {
    /// Creates a series-level entry.
    pub fn series(
        series_key: impl Into<String>,
        reason: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self::Series {
            series_key: series_key.into(),
            subject: None,
            reason: reason.into(),
            created_at,
        }
    }

    /// Creates an occurrence-level entry.
    pub fn occurrence(
        key: impl Into<String>,
        reason: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self::Occurrence {
            key: key.into(),
            subject: None,
            reason: reason.into(),
            created_at,
        }
    }

    /// Builder method to set the subject note.
    pub fn with_subject(self, subject: impl Into<String>) -> Self {
        match self {
            Self::Series {
                series_key,
                reason,
                created_at,
                ..
            } => Self::Series {
                series_key,
                subject: Some(subject.into()),
                reason,
                created_at,
            },
            Self::Occurrence {
                key,
                reason,
                created_at,
                ..
            } => Self::Occurrence {
                key,
                subject: Some(subject.into()),
                reason,
                created_at,
            },
        }
    }

    /// Returns true if this entry suppresses the given record.
    pub fn suppresses(&self, record: &EventRecord) -> bool {
        match self {
            Self::Series { series_key, .. } => {
                record.series_key.as_deref() == Some(series_key.as_str())
            }
            Self::Occurrence { key, .. } => {
                record.identity == *key || record.occurrence_key().as_deref() == Some(key.as_str())
            }
        }
    }
}

/// A derived work/personal time overlap.
///
/// Annotations are recomputed on every query from the current filtered record
/// set; they are never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictAnnotation {
    /// Identity of the work-side record.
    pub work_identity: String,
    /// Identity of the personal-side record.
    pub personal_identity: String,
    /// Start of the overlapping interval (inclusive).
    pub start: DateTime<Utc>,
    /// End of the overlapping interval (exclusive).
    pub end: DateTime<Utc>,
}
