//! Sync run reporting.
//!
//! A run never fails all-or-nothing over a bad record or a dead source;
//! everything that was dropped, degraded, or discarded is accounted for
//! here instead.

use serde::Serialize;

use calweave_core::{Domain, SourceKind};
use calweave_feeds::{FeedIssue, FeedIssueKind};

/// The category of a collected issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// Unparseable time or missing required field; record dropped.
    MalformedRecord,
    /// Unsupported recurrence grammar; series partially expanded.
    RecurrenceParse,
    /// A source's fetch or whole-payload parse failed; it contributed
    /// nothing this run.
    SourceFetch,
    /// A candidate collided with an identity it cannot replace.
    IdentityConflict,
}

/// One collected problem, with the record identity when known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordIssue {
    pub kind: IssueKind,
    pub identity: Option<String>,
    pub detail: String,
}

impl RecordIssue {
    /// Creates a source-fetch issue.
    pub fn source_fetch(detail: impl Into<String>) -> Self {
        Self {
            kind: IssueKind::SourceFetch,
            identity: None,
            detail: detail.into(),
        }
    }

    /// Creates an identity-conflict issue.
    pub fn identity_conflict(identity: Option<String>, detail: impl Into<String>) -> Self {
        Self {
            kind: IssueKind::IdentityConflict,
            identity,
            detail: detail.into(),
        }
    }
}

impl From<FeedIssue> for RecordIssue {
    fn from(issue: FeedIssue) -> Self {
        Self {
            kind: match issue.kind {
                FeedIssueKind::MalformedRecord => IssueKind::MalformedRecord,
                FeedIssueKind::RecurrenceParse => IssueKind::RecurrenceParse,
            },
            identity: issue.identity_hint,
            detail: issue.detail,
        }
    }
}

/// Per-source accounting for one run.
#[derive(Debug, Serialize)]
pub struct SourceReport {
    /// The source's configured name.
    pub source: String,
    pub kind: SourceKind,
    pub domain: Domain,
    /// Records the pipeline produced or dropped for this source.
    pub fetched: usize,
    pub inserted: usize,
    pub updated: usize,
    pub discarded: usize,
    /// Records dropped before resolution (malformed, unexpandable).
    pub skipped: usize,
    pub issues: Vec<RecordIssue>,
}

impl SourceReport {
    /// Creates an empty report for one source.
    pub fn new(source: impl Into<String>, kind: SourceKind, domain: Domain) -> Self {
        Self {
            source: source.into(),
            kind,
            domain,
            fetched: 0,
            inserted: 0,
            updated: 0,
            discarded: 0,
            skipped: 0,
            issues: Vec::new(),
        }
    }

    /// Returns true if this source contributed nothing because its fetch or
    /// payload parse failed.
    pub fn failed(&self) -> bool {
        self.issues.iter().any(|i| i.kind == IssueKind::SourceFetch)
    }
}

/// The outcome of one sync run.
#[derive(Debug, Default, Serialize)]
pub struct SyncReport {
    pub sources: Vec<SourceReport>,
}

impl SyncReport {
    /// Total records inserted across all sources.
    pub fn total_inserted(&self) -> usize {
        self.sources.iter().map(|s| s.inserted).sum()
    }

    /// Total records updated across all sources.
    pub fn total_updated(&self) -> usize {
        self.sources.iter().map(|s| s.updated).sum()
    }

    /// Total candidates discarded across all sources.
    pub fn total_discarded(&self) -> usize {
        self.sources.iter().map(|s| s.discarded).sum()
    }

    /// Returns true if at least one source failed while others proceeded.
    pub fn is_partial(&self) -> bool {
        self.sources.iter().any(SourceReport::failed)
    }

    /// All issues across all sources.
    pub fn issues(&self) -> impl Iterator<Item = &RecordIssue> {
        self.sources.iter().flat_map(|s| s.issues.iter())
    }
}
