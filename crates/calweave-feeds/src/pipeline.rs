//! The per-source ingestion pipeline: parse, expand, normalize.
//!
//! [`ingest`] takes one source's payload text and produces identity-less
//! [`Candidate`] records ready for the deduplication resolver, collecting
//! per-record issues along the way. A failure in here never aborts other
//! sources; only a whole-payload failure aborts this one.

use std::collections::HashMap;

use chrono::Duration;
use tracing::warn;

use calweave_core::{Domain, EventTime, Normalizer, SourceKind};

use crate::error::{FeedIssue, FeedResult};
use crate::graph::parse_graph_payload;
use crate::ics::parse_ics_feed;
use crate::raw_record::RawEventRecord;
use crate::recurrence::{expand_series, ExpansionLimits};

/// A normalized record awaiting identity resolution.
///
/// Candidates carry everything an [`calweave_core::EventRecord`] needs except
/// the identity and ingestion timestamps, which the resolver assigns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// The provider's native event ID, if it has one.
    pub native_id: Option<String>,
    /// The feed this candidate came from.
    pub source: SourceKind,
    /// The calendar partition of the owning feed.
    pub domain: Domain,
    /// The event title.
    pub subject: String,
    /// Stable key shared by all occurrences of one recurring definition.
    pub series_key: Option<String>,
    /// Canonical start.
    pub start: EventTime,
    /// Canonical end (half-open).
    pub end: EventTime,
    /// All-day flag from normalization.
    pub is_all_day: bool,
    /// The owning series' rule could only be partially expanded.
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
}

/// The product of ingesting one source's payload.
#[derive(Debug, Default)]
pub struct IngestOutcome {
    /// Candidates ready for resolution.
    pub candidates: Vec<Candidate>,
    /// Records dropped or degraded along the way.
    pub issues: Vec<FeedIssue>,
}

/// Parses, expands, and normalizes one source payload.
///
/// # Errors
///
/// Returns a [`crate::error::FeedError`] only when the payload as a whole is
/// unreadable; per-record failures land in the outcome's issues.
pub fn ingest(
    kind: SourceKind,
    domain: Domain,
    payload: &str,
    normalizer: &Normalizer,
    limits: &ExpansionLimits,
) -> FeedResult<IngestOutcome> {
    let parse = match kind {
        SourceKind::GraphApi => parse_graph_payload(payload, domain)?,
        SourceKind::Ics | SourceKind::AppleExport => parse_ics_feed(payload, domain, kind)?,
    };

    let mut outcome = IngestOutcome {
        candidates: Vec::new(),
        issues: parse.issues,
    };

    // Partition the feed: series masters expand locally, overrides attach to
    // their master, everything else is already concrete.
    let mut masters: Vec<RawEventRecord> = Vec::new();
    let mut concrete: Vec<(RawEventRecord, bool)> = Vec::new();
    let mut overrides_by_seed: HashMap<String, Vec<RawEventRecord>> = HashMap::new();

    for record in parse.records {
        if record.is_series_master() {
            masters.push(record);
        } else if record.is_override() {
            match record.series_seed.clone().or_else(|| record.native_id.clone()) {
                Some(seed) => overrides_by_seed.entry(seed).or_default().push(record),
                None => concrete.push((record, false)),
            }
        } else {
            concrete.push((record, false));
        }
    }

    for master in &masters {
        let seed = master
            .series_seed
            .clone()
            .or_else(|| master.native_id.clone())
            .unwrap_or_default();
        let group = overrides_by_seed.remove(&seed).unwrap_or_default();
        let group_refs: Vec<&RawEventRecord> = group.iter().collect();

        let expansion = expand_series(master, &group_refs, limits);
        outcome.issues.extend(expansion.issues);
        let partial = expansion.partial;
        concrete.extend(expansion.records.into_iter().map(|r| (r, partial)));
    }

    // Overrides whose master is not in this payload are concrete statements
    // on their own (Graph delivers exception instances this way).
    for (_, group) in overrides_by_seed {
        for record in group {
            if !record.cancelled {
                concrete.push((record, false));
            }
        }
    }

    for (raw, partial) in concrete {
        match normalize_record(&raw, normalizer, partial) {
            Ok(candidate) => outcome.candidates.push(candidate),
            Err(issue) => {
                warn!(
                    id = ?issue.identity_hint,
                    detail = %issue.detail,
                    "Dropping record during normalization"
                );
                outcome.issues.push(issue);
            }
        }
    }

    Ok(outcome)
}

fn normalize_record(
    raw: &RawEventRecord,
    normalizer: &Normalizer,
    partially_expanded: bool,
) -> Result<Candidate, FeedIssue> {
    let zone = raw.zone_hint.as_deref();

    let (start, is_all_day) = normalizer
        .normalize(&raw.start, zone, raw.all_day_hint)
        .map_err(|e| FeedIssue::malformed(raw.native_id.clone(), e.to_string()))?;
    let (end, _) = normalizer
        .normalize(&raw.end, zone, is_all_day)
        .map_err(|e| FeedIssue::malformed(raw.native_id.clone(), e.to_string()))?;

    // All-day records span at least one whole day, half-open.
    let end = if is_all_day && end <= start {
        EventTime::from_date(start.date() + Duration::days(1))
    } else {
        end
    };

    if !is_all_day && end < start {
        return Err(FeedIssue::malformed(
            raw.native_id.clone(),
            "end precedes start",
        ));
    }

    let series_key = raw
        .series_seed
        .as_ref()
        .map(|seed| format!("{}:{}", raw.source.as_str(), seed));

    Ok(Candidate {
        native_id: raw.native_id.clone(),
        source: raw.source,
        domain: raw.domain,
        subject: raw.subject.clone(),
        series_key,
        start,
        end,
        is_all_day,
        partially_expanded,
        location: raw.location.clone(),
        organizer_email: raw.organizer_email.clone(),
        organizer_name: raw.organizer_name.clone(),
        attendees: raw.attendees.clone(),
        body_preview: raw.body_preview.clone(),
    })
}
