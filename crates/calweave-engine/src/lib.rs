//! Sync engine: identity resolution, deduplication, ignore filtering,
//! overlap detection

pub mod error;
pub mod identity;
pub mod ignore;
pub mod overlap;
pub mod report;
pub mod resolve;
pub mod store;
pub mod sync;

pub use error::{EngineError, EngineResult};
pub use identity::{composite_identity, native_identity};
pub use ignore::filter_ignored;
pub use overlap::detect_overlaps;
pub use report::{IssueKind, RecordIssue, SourceReport, SyncReport};
pub use resolve::{resolve, DiscardReason, Resolution, SnapshotIndex};
pub use store::{EventStore, JsonFileStore, MemoryStore, StoreError, StoreResult};
pub use sync::{QueriedEvent, SyncConfig, SyncEngine, SyncSource};
