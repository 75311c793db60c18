//! The sync engine facade.
//!
//! One [`SyncEngine::run_sync`] call is one logical run: every configured
//! source is fetched and ingested concurrently (the stages share no mutable
//! state), then a single-threaded commit phase resolves all candidates
//! against one store snapshot. A run-level mutex keeps a new run from
//! starting while a previous commit is still in progress.
//!
//! Queries are read-only over a snapshot and safe to run concurrently with
//! each other and with a later run.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use futures_util::future;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use calweave_core::{
    ConflictAnnotation, DateRange, Domain, EventRecord, Normalizer, SourceKind,
};
use calweave_feeds::{ingest, ExpansionLimits, FeedFetch, IngestOutcome, FeedResult, DEFAULT_MAX_OCCURRENCES};

use crate::error::EngineResult;
use crate::ignore::filter_ignored;
use crate::overlap::detect_overlaps;
use crate::report::{RecordIssue, SourceReport, SyncReport};
use crate::resolve::{resolve, DiscardReason, Resolution, SnapshotIndex};
use crate::store::EventStore;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Zone applied to zone-naive feed times with no declared zone.
    pub fallback_zone: Tz,
    /// Cap on generated occurrences per recurring series.
    pub max_occurrences: u16,
    /// How far past "now" series expansion reaches.
    pub horizon_days: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            fallback_zone: chrono_tz::UTC,
            max_occurrences: DEFAULT_MAX_OCCURRENCES,
            horizon_days: 365,
        }
    }
}

impl SyncConfig {
    /// Builder: set the fallback zone.
    pub fn with_fallback_zone(mut self, zone: Tz) -> Self {
        self.fallback_zone = zone;
        self
    }

    /// Builder: set the occurrence cap.
    pub fn with_max_occurrences(mut self, max: u16) -> Self {
        self.max_occurrences = max;
        self
    }

    /// Builder: set the expansion horizon.
    pub fn with_horizon_days(mut self, days: i64) -> Self {
        self.horizon_days = days;
        self
    }
}

/// One configured feed source.
pub struct SyncSource {
    /// Short name for logs and the report.
    pub name: String,
    /// The feed grammar.
    pub kind: SourceKind,
    /// The calendar partition this source feeds.
    pub domain: Domain,
    /// The fetch collaborator.
    pub fetcher: Arc<dyn FeedFetch>,
}

impl SyncSource {
    /// Creates a source.
    pub fn new(
        name: impl Into<String>,
        kind: SourceKind,
        domain: Domain,
        fetcher: Arc<dyn FeedFetch>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            domain,
            fetcher,
        }
    }
}

/// A record returned from a query, with its conflicts attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueriedEvent {
    pub record: EventRecord,
    pub conflicts: Vec<ConflictAnnotation>,
}

impl QueriedEvent {
    /// Returns true if the record overlaps anything in the other domain.
    pub fn is_conflicting(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

/// The ingestion/query engine over an injected store.
pub struct SyncEngine<S> {
    store: Arc<S>,
    config: SyncConfig,
    run_guard: Mutex<()>,
}

impl<S: EventStore> SyncEngine<S> {
    /// Creates an engine over the given store.
    pub fn new(store: Arc<S>, config: SyncConfig) -> Self {
        Self {
            store,
            config,
            run_guard: Mutex::new(()),
        }
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Runs one sync against the current wall clock.
    pub async fn run_sync(&self, sources: &[SyncSource]) -> EngineResult<SyncReport> {
        self.run_sync_at(sources, Utc::now()).await
    }

    /// Runs one sync with an explicit "now" (tests pin this).
    pub async fn run_sync_at(
        &self,
        sources: &[SyncSource],
        now: DateTime<Utc>,
    ) -> EngineResult<SyncReport> {
        // One run at a time; a second caller waits for the commit to finish.
        let _run = self.run_guard.lock().await;
        info!(sources = sources.len(), "Starting sync run");

        let normalizer = Normalizer::new(self.config.fallback_zone);
        let limits = ExpansionLimits::new(
            self.config.max_occurrences,
            now + Duration::days(self.config.horizon_days),
        );

        // Fetch and ingest every source concurrently; they share nothing
        // until the commit phase.
        let outcomes: Vec<FeedResult<IngestOutcome>> =
            future::join_all(sources.iter().map(|source| {
                let normalizer = normalizer.clone();
                let limits = limits.clone();
                async move {
                    let payload = source.fetcher.fetch().await?;
                    ingest(source.kind, source.domain, &payload, &normalizer, &limits)
                }
            }))
            .await;

        // Single-threaded commit phase: one snapshot, one writer.
        let snapshot = self.store.snapshot(None)?;
        let mut index = SnapshotIndex::build(snapshot);
        let mut report = SyncReport::default();

        for (source, outcome) in sources.iter().zip(outcomes) {
            let mut source_report = SourceReport::new(&source.name, source.kind, source.domain);

            match outcome {
                Err(err) => {
                    warn!(
                        source = %source.name,
                        error = %err,
                        "Source contributes nothing this run"
                    );
                    source_report
                        .issues
                        .push(RecordIssue::source_fetch(err.to_string()));
                }
                Ok(outcome) => {
                    source_report.fetched = outcome.candidates.len() + outcome.issues.len();
                    source_report.skipped = outcome.issues.len();
                    source_report
                        .issues
                        .extend(outcome.issues.into_iter().map(RecordIssue::from));

                    for candidate in outcome.candidates {
                        match resolve(&candidate, &index, now) {
                            Resolution::Insert(record) => {
                                self.store.upsert(record.clone())?;
                                index.apply(record);
                                source_report.inserted += 1;
                            }
                            Resolution::Update(record) => {
                                self.store.upsert(record.clone())?;
                                index.apply(record);
                                source_report.updated += 1;
                            }
                            Resolution::Discard(reason) => {
                                source_report.discarded += 1;
                                if reason == DiscardReason::IdentityConflict {
                                    source_report.issues.push(RecordIssue::identity_conflict(
                                        candidate.native_id.clone(),
                                        "identity held by another domain",
                                    ));
                                }
                            }
                        }
                    }
                }
            }

            report.sources.push(source_report);
        }

        info!(
            inserted = report.total_inserted(),
            updated = report.total_updated(),
            discarded = report.total_discarded(),
            partial = report.is_partial(),
            "Sync run finished"
        );
        Ok(report)
    }

    /// Queries stored records in a range, with conflict annotations.
    ///
    /// Conflicts are recomputed from the filtered snapshot on every call and
    /// always consider both domains, even when the result is restricted to
    /// one of them.
    pub fn query_events(
        &self,
        domain: Option<Domain>,
        range: DateRange,
        include_ignored: bool,
    ) -> EngineResult<Vec<QueriedEvent>> {
        let snapshot = self.store.snapshot(None)?;

        let visible = if include_ignored {
            snapshot
        } else {
            let entries = self.store.ignore_entries()?;
            filter_ignored(snapshot, &entries)
        };

        let in_range: Vec<EventRecord> = visible
            .into_iter()
            .filter(|r| range.contains_event_time(&r.start))
            .collect();

        let (work, personal): (Vec<EventRecord>, Vec<EventRecord>) = in_range
            .iter()
            .cloned()
            .partition(|r| r.domain == Domain::Work);
        let conflicts = detect_overlaps(&work, &personal);

        let mut events: Vec<QueriedEvent> = in_range
            .into_iter()
            .filter(|r| domain.is_none_or(|d| r.domain == d))
            .map(|record| {
                let matching: Vec<ConflictAnnotation> = conflicts
                    .iter()
                    .filter(|c| {
                        c.work_identity == record.identity
                            || c.personal_identity == record.identity
                    })
                    .cloned()
                    .collect();
                QueriedEvent {
                    record,
                    conflicts: matching,
                }
            })
            .collect();

        events.sort_by(|a, b| {
            a.record
                .start
                .cmp(&b.record.start)
                .then_with(|| a.record.identity.cmp(&b.record.identity))
        });
        Ok(events)
    }
}
