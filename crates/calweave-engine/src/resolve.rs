//! Identity and deduplication resolution.
//!
//! For each incoming candidate the resolver decides: is this a new record,
//! an update to an existing one, or a duplicate to discard? Decisions apply
//! the source precedence rules within one domain; work and personal are
//! never merged.
//!
//! The resolver owns all writes to the record set. Callers run the commit
//! loop single-threaded per run, which gives the single-writer-per-identity
//! discipline without per-record locking.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::warn;

use calweave_core::EventRecord;
use calweave_feeds::Candidate;

use crate::identity::{composite_identity, native_identity};

/// The resolver's decision for one candidate.
#[derive(Debug)]
pub enum Resolution {
    /// Store a new record.
    Insert(EventRecord),
    /// Overwrite an existing record's descriptive fields.
    Update(EventRecord),
    /// Drop the candidate.
    Discard(DiscardReason),
}

/// Why a candidate was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// A higher-precedence source already owns this event.
    LowerPrecedence,
    /// The candidate's identity is already held by a record it cannot
    /// legally replace (e.g. another domain). Should not occur; logged.
    IdentityConflict,
}

/// An indexed view of the stored record set for one commit phase.
///
/// Keeps a primary index by identity and a secondary index by composite
/// digest, the cross-source dedup key.
#[derive(Debug, Default)]
pub struct SnapshotIndex {
    by_identity: HashMap<String, EventRecord>,
    by_composite: HashMap<String, String>,
}

impl SnapshotIndex {
    /// Builds the index from a store snapshot.
    pub fn build(records: impl IntoIterator<Item = EventRecord>) -> Self {
        let mut index = Self::default();
        for record in records {
            index.apply(record);
        }
        index
    }

    /// Returns the record stored under the given identity.
    pub fn get(&self, identity: &str) -> Option<&EventRecord> {
        self.by_identity.get(identity)
    }

    /// Returns the number of indexed records.
    pub fn len(&self) -> usize {
        self.by_identity.len()
    }

    /// Returns true if the index holds no records.
    pub fn is_empty(&self) -> bool {
        self.by_identity.is_empty()
    }

    /// Folds a committed record into the index so later candidates in the
    /// same run resolve against it.
    pub fn apply(&mut self, record: EventRecord) {
        let composite = composite_identity(
            record.domain,
            &record.subject,
            &record.start,
            record.organizer_email.as_deref(),
        );
        self.by_composite.insert(composite, record.identity.clone());
        self.by_identity.insert(record.identity.clone(), record);
    }
}

/// Resolves one candidate against the indexed record set.
pub fn resolve(candidate: &Candidate, index: &SnapshotIndex, now: DateTime<Utc>) -> Resolution {
    let composite = composite_identity(
        candidate.domain,
        &candidate.subject,
        &candidate.start,
        candidate.organizer_email.as_deref(),
    );
    let native = candidate
        .native_id
        .as_deref()
        .map(|id| native_identity(candidate.source, id));

    // Primary: direct native-identity hit.
    if let Some(ref identity) = native
        && let Some(existing) = index.get(identity)
    {
        if existing.domain != candidate.domain {
            warn!(
                identity = %identity,
                stored_domain = %existing.domain,
                candidate_domain = %candidate.domain,
                "Identity collision across domains; discarding candidate"
            );
            return Resolution::Discard(DiscardReason::IdentityConflict);
        }
        if candidate.source.precedence() < existing.source.precedence() {
            return Resolution::Discard(DiscardReason::LowerPrecedence);
        }
        return Resolution::Update(merge(existing, candidate, now));
    }

    // Secondary: composite-key hit, the same logical event from another
    // source. The composite embeds the domain, so this never crosses the
    // work/personal boundary.
    if let Some(identity) = index.by_composite.get(&composite)
        && let Some(existing) = index.get(identity)
    {
        if candidate.source.precedence() < existing.source.precedence() {
            return Resolution::Discard(DiscardReason::LowerPrecedence);
        }
        // Higher or equal precedence replaces the descriptive fields while
        // the stored identity stays what it was.
        return Resolution::Update(merge(existing, candidate, now));
    }

    let identity = native.unwrap_or(composite);
    Resolution::Insert(fresh_record(candidate, identity, now))
}

/// Builds the updated row: stored identity, domain, and first-seen timestamp
/// survive; everything descriptive comes from the candidate.
fn merge(existing: &EventRecord, candidate: &Candidate, now: DateTime<Utc>) -> EventRecord {
    let mut record = fresh_record(candidate, existing.identity.clone(), now);
    record.domain = existing.domain;
    record.first_seen_at = existing.first_seen_at;
    record
}

fn fresh_record(candidate: &Candidate, identity: String, now: DateTime<Utc>) -> EventRecord {
    let mut record = EventRecord::new(
        identity,
        candidate.domain,
        candidate.source,
        candidate.subject.clone(),
        candidate.start.clone(),
        candidate.end.clone(),
        now,
    );
    record.series_key = candidate.series_key.clone();
    record.is_all_day = candidate.is_all_day;
    record.partially_expanded = candidate.partially_expanded;
    record.location = candidate.location.clone();
    record.organizer_email = candidate.organizer_email.clone();
    record.organizer_name = candidate.organizer_name.clone();
    record.attendees = candidate.attendees.clone();
    record.body_preview = candidate.body_preview.clone();
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use calweave_core::{Domain, EventTime, SourceKind};
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn candidate(source: SourceKind, domain: Domain, native_id: Option<&str>) -> Candidate {
        Candidate {
            native_id: native_id.map(str::to_string),
            source,
            domain,
            subject: "Sprint Review".to_string(),
            series_key: None,
            start: EventTime::from_utc(utc(2025, 6, 2, 16, 0)),
            end: EventTime::from_utc(utc(2025, 6, 2, 17, 0)),
            is_all_day: false,
            partially_expanded: false,
            location: None,
            organizer_email: Some("pm@example.com".to_string()),
            organizer_name: None,
            attendees: Vec::new(),
            body_preview: None,
        }
    }

    fn commit(resolution: Resolution, index: &mut SnapshotIndex) -> EventRecord {
        match resolution {
            Resolution::Insert(record) | Resolution::Update(record) => {
                index.apply(record.clone());
                record
            }
            Resolution::Discard(reason) => panic!("unexpected discard: {reason:?}"),
        }
    }

    #[test]
    fn fresh_candidate_inserts_with_native_identity() {
        let index = SnapshotIndex::default();
        let resolution = resolve(
            &candidate(SourceKind::GraphApi, Domain::Work, Some("AAMk1")),
            &index,
            utc(2025, 6, 1, 0, 0),
        );
        match resolution {
            Resolution::Insert(record) => assert_eq!(record.identity, "graph-api:AAMk1"),
            other => panic!("expected insert, got {other:?}"),
        }
    }

    #[test]
    fn fresh_candidate_without_native_id_uses_composite() {
        let index = SnapshotIndex::default();
        let resolution = resolve(
            &candidate(SourceKind::Ics, Domain::Personal, None),
            &index,
            utc(2025, 6, 1, 0, 0),
        );
        match resolution {
            Resolution::Insert(record) => assert!(record.identity.starts_with("composite:")),
            other => panic!("expected insert, got {other:?}"),
        }
    }

    #[test]
    fn replay_updates_instead_of_duplicating() {
        let mut index = SnapshotIndex::default();
        let c = candidate(SourceKind::GraphApi, Domain::Work, Some("AAMk1"));
        commit(resolve(&c, &index, utc(2025, 6, 1, 0, 0)), &mut index);

        let resolution = resolve(&c, &index, utc(2025, 6, 1, 6, 0));
        match resolution {
            Resolution::Update(record) => {
                assert_eq!(record.identity, "graph-api:AAMk1");
                assert_eq!(record.first_seen_at, utc(2025, 6, 1, 0, 0));
                assert_eq!(record.last_seen_at, utc(2025, 6, 1, 6, 0));
            }
            other => panic!("expected update, got {other:?}"),
        }
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn higher_precedence_wins_regardless_of_order() {
        // ics first, then graph: the graph candidate updates in place,
        // preserving the stored identity while taking the graph source.
        let mut index = SnapshotIndex::default();
        let ics = candidate(SourceKind::Ics, Domain::Work, Some("uid-1"));
        commit(resolve(&ics, &index, utc(2025, 6, 1, 0, 0)), &mut index);

        let graph = candidate(SourceKind::GraphApi, Domain::Work, Some("AAMk1"));
        let record = commit(resolve(&graph, &index, utc(2025, 6, 1, 1, 0)), &mut index);
        assert_eq!(record.identity, "ics:uid-1");
        assert_eq!(record.source, SourceKind::GraphApi);

        // graph first, then ics: the ics candidate is discarded outright.
        let mut index = SnapshotIndex::default();
        commit(resolve(&graph, &index, utc(2025, 6, 1, 0, 0)), &mut index);
        let resolution = resolve(&ics, &index, utc(2025, 6, 1, 1, 0));
        assert!(matches!(
            resolution,
            Resolution::Discard(DiscardReason::LowerPrecedence)
        ));
    }

    #[test]
    fn lower_precedence_never_overwrites_by_identity() {
        // The stored row kept its ics identity but was upgraded to
        // graph-api; a later ics replay of that identity must not downgrade.
        let mut index = SnapshotIndex::default();
        let ics = candidate(SourceKind::Ics, Domain::Work, Some("uid-1"));
        commit(resolve(&ics, &index, utc(2025, 6, 1, 0, 0)), &mut index);
        let graph = candidate(SourceKind::GraphApi, Domain::Work, Some("AAMk1"));
        commit(resolve(&graph, &index, utc(2025, 6, 1, 1, 0)), &mut index);

        let resolution = resolve(&ics, &index, utc(2025, 6, 1, 2, 0));
        assert!(matches!(
            resolution,
            Resolution::Discard(DiscardReason::LowerPrecedence)
        ));
    }

    #[test]
    fn equal_precedence_across_sources_updates_in_place() {
        let mut index = SnapshotIndex::default();
        let ics = candidate(SourceKind::Ics, Domain::Personal, Some("uid-1"));
        commit(resolve(&ics, &index, utc(2025, 6, 1, 0, 0)), &mut index);

        let apple = candidate(SourceKind::AppleExport, Domain::Personal, Some("other-uid"));
        let record = commit(resolve(&apple, &index, utc(2025, 6, 1, 1, 0)), &mut index);
        assert_eq!(record.identity, "ics:uid-1");
        assert_eq!(record.source, SourceKind::AppleExport);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn no_cross_domain_merge() {
        let mut index = SnapshotIndex::default();
        let work = candidate(SourceKind::Ics, Domain::Work, None);
        commit(resolve(&work, &index, utc(2025, 6, 1, 0, 0)), &mut index);

        let personal = candidate(SourceKind::Ics, Domain::Personal, None);
        let resolution = resolve(&personal, &index, utc(2025, 6, 1, 0, 0));
        match resolution {
            Resolution::Insert(record) => {
                assert_eq!(record.domain, Domain::Personal);
            }
            other => panic!("expected insert, got {other:?}"),
        }
    }

    #[test]
    fn cross_domain_identity_collision_is_discarded() {
        let mut index = SnapshotIndex::default();
        let work = candidate(SourceKind::GraphApi, Domain::Work, Some("AAMk1"));
        commit(resolve(&work, &index, utc(2025, 6, 1, 0, 0)), &mut index);

        let mut rogue = candidate(SourceKind::GraphApi, Domain::Personal, Some("AAMk1"));
        rogue.subject = "Different".to_string();
        let resolution = resolve(&rogue, &index, utc(2025, 6, 1, 0, 0));
        assert!(matches!(
            resolution,
            Resolution::Discard(DiscardReason::IdentityConflict)
        ));
    }

    #[test]
    fn moved_start_keeps_identity() {
        let mut index = SnapshotIndex::default();
        let c = candidate(SourceKind::GraphApi, Domain::Work, Some("AAMk1"));
        commit(resolve(&c, &index, utc(2025, 6, 1, 0, 0)), &mut index);

        let mut moved = c.clone();
        moved.start = EventTime::from_utc(utc(2025, 6, 2, 18, 0));
        moved.end = EventTime::from_utc(utc(2025, 6, 2, 19, 0));
        let record = commit(resolve(&moved, &index, utc(2025, 6, 1, 1, 0)), &mut index);
        assert_eq!(record.identity, "graph-api:AAMk1");
        assert_eq!(record.start, EventTime::from_utc(utc(2025, 6, 2, 18, 0)));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn changed_native_id_is_a_fresh_insert() {
        // A rescheduled series instance can come back under a new native ID
        // at a new time; stale-row cleanup is a separate concern.
        let mut index = SnapshotIndex::default();
        let c = candidate(SourceKind::GraphApi, Domain::Work, Some("AAMk1"));
        commit(resolve(&c, &index, utc(2025, 6, 1, 0, 0)), &mut index);

        let mut renamed = candidate(SourceKind::GraphApi, Domain::Work, Some("AAMk2"));
        renamed.start = EventTime::from_utc(utc(2025, 6, 3, 16, 0));
        renamed.end = EventTime::from_utc(utc(2025, 6, 3, 17, 0));
        let resolution = resolve(&renamed, &index, utc(2025, 6, 1, 1, 0));
        match resolution {
            Resolution::Insert(record) => assert_eq!(record.identity, "graph-api:AAMk2"),
            other => panic!("expected insert, got {other:?}"),
        }
    }
}
