//! Error types for feed operations.
//!
//! Feed-level failures ([`FeedError`]) abort one source's contribution to a
//! run; per-record problems ([`FeedIssue`]) drop or degrade a single record
//! while the rest of the feed continues.

use serde::Serialize;
use thiserror::Error;

use calweave_core::SourceKind;

/// A specialized Result type for feed operations.
pub type FeedResult<T> = Result<T, FeedError>;

/// An error that aborts one source for the current run.
#[derive(Debug, Error)]
pub enum FeedError {
    /// The fetch collaborator failed (network, auth, timeout).
    #[error("feed fetch failed: {message}")]
    Fetch { message: String },

    /// The payload as a whole was not parseable for its source kind.
    #[error("payload is not valid {kind}: {message}")]
    Payload { kind: SourceKind, message: String },
}

impl FeedError {
    /// Creates a fetch error.
    pub fn fetch(message: impl Into<String>) -> Self {
        Self::Fetch {
            message: message.into(),
        }
    }

    /// Creates a whole-payload parse error.
    pub fn payload(kind: SourceKind, message: impl Into<String>) -> Self {
        Self::Payload {
            kind,
            message: message.into(),
        }
    }
}

/// The category of a per-record issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedIssueKind {
    /// Unparseable time or missing required field; the record was dropped.
    MalformedRecord,
    /// Unsupported recurrence grammar; the series was partially expanded.
    RecurrenceParse,
}

/// A per-record problem collected while parsing or expanding a feed.
///
/// Issues never abort the feed; they are carried into the sync report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedIssue {
    /// What went wrong.
    pub kind: FeedIssueKind,
    /// The record's native ID, when one was readable.
    pub identity_hint: Option<String>,
    /// Human-readable detail.
    pub detail: String,
}

impl FeedIssue {
    /// Creates a malformed-record issue.
    pub fn malformed(identity_hint: Option<String>, detail: impl Into<String>) -> Self {
        Self {
            kind: FeedIssueKind::MalformedRecord,
            identity_hint,
            detail: detail.into(),
        }
    }

    /// Creates a recurrence-parse issue.
    pub fn recurrence(identity_hint: Option<String>, detail: impl Into<String>) -> Self {
        Self {
            kind: FeedIssueKind::RecurrenceParse,
            identity_hint,
            detail: detail.into(),
        }
    }
}
