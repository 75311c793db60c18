//! Feed parsing: Graph-style payloads, ICS feeds, recurrence expansion

pub mod error;
pub mod fetch;
pub mod graph;
pub mod ics;
pub mod pipeline;
pub mod raw_record;
pub mod recurrence;

pub use error::{FeedError, FeedIssue, FeedIssueKind, FeedResult};
pub use fetch::{BoxFuture, FailingFetch, FeedFetch, StaticFetch};
pub use graph::parse_graph_payload;
pub use ics::parse_ics_feed;
pub use pipeline::{ingest, Candidate, IngestOutcome};
pub use raw_record::{FeedParse, RawEventRecord};
pub use recurrence::{expand_series, Expansion, ExpansionLimits, DEFAULT_MAX_OCCURRENCES};
