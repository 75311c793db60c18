//! Core types: time, normalization, canonical records, ignore entries

pub mod normalize;
pub mod record;
pub mod time;
pub mod tracing;

pub use normalize::{NormalizeError, Normalizer, RawTime};
pub use record::{ConflictAnnotation, Domain, EventRecord, IgnoreEntry, SourceKind};
pub use time::{DateRange, EventTime};
pub use tracing::{init_tracing, TracingConfig, TracingError, TracingOutputFormat};
