//! The ignore filter.
//!
//! Removes records the user has suppressed, either a whole series or a
//! single occurrence. Pure and order-independent: entries are only ever
//! consulted, never modified here.

use calweave_core::{EventRecord, IgnoreEntry};

/// Filters out suppressed records.
///
/// Idempotent: applying the filter twice yields the same result as once.
pub fn filter_ignored(records: Vec<EventRecord>, entries: &[IgnoreEntry]) -> Vec<EventRecord> {
    if entries.is_empty() {
        return records;
    }
    records
        .into_iter()
        .filter(|record| !entries.iter().any(|entry| entry.suppresses(record)))
        .collect()
}
