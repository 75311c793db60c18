//! Persistence collaborator.
//!
//! The engine never assumes a storage technology; it talks to an
//! [`EventStore`] trait object. Two reference implementations are provided:
//! [`MemoryStore`] for tests and embedding, and [`JsonFileStore`], a
//! whole-file JSON store matching the logical schema (records plus the two
//! ignore-entry shapes).
//!
//! Ignore entries are mutated only through the explicit user-action methods
//! here; the sync pipeline never touches them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use calweave_core::{Domain, EventRecord, IgnoreEntry};

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// An error from the persistence collaborator.
///
/// Any of these is fatal for the current run; nothing can be committed
/// without the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying IO failure.
    #[error("store IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The store file is not readable as the expected schema.
    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A writer panicked while holding the store lock.
    #[error("store lock poisoned")]
    Poisoned,
}

/// The persistence interface the engine depends on.
pub trait EventStore: Send + Sync {
    /// Returns the stored records, optionally restricted to one domain,
    /// ordered by start time.
    fn snapshot(&self, domain: Option<Domain>) -> StoreResult<Vec<EventRecord>>;

    /// Returns the record stored under the given identity.
    fn get(&self, identity: &str) -> StoreResult<Option<EventRecord>>;

    /// Inserts or replaces the record under its identity.
    fn upsert(&self, record: EventRecord) -> StoreResult<()>;

    /// Removes the record with the given identity. Returns whether a record
    /// was removed.
    fn remove(&self, identity: &str) -> StoreResult<bool>;

    /// Returns all ignore entries.
    fn ignore_entries(&self) -> StoreResult<Vec<IgnoreEntry>>;

    /// Adds an ignore entry, replacing an existing entry with the same key.
    fn add_ignore_entry(&self, entry: IgnoreEntry) -> StoreResult<()>;

    /// Removes the ignore entry with the given key. Returns whether an
    /// entry was removed.
    fn remove_ignore_entry(&self, key: &str) -> StoreResult<bool>;
}

/// The serializable store contents.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreState {
    records: BTreeMap<String, EventRecord>,
    ignore_entries: Vec<IgnoreEntry>,
}

impl StoreState {
    fn snapshot(&self, domain: Option<Domain>) -> Vec<EventRecord> {
        let mut records: Vec<EventRecord> = self
            .records
            .values()
            .filter(|r| domain.is_none_or(|d| r.domain == d))
            .cloned()
            .collect();
        records.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.identity.cmp(&b.identity)));
        records
    }

    fn add_ignore_entry(&mut self, entry: IgnoreEntry) {
        self.ignore_entries
            .retain(|existing| entry_key(existing) != entry_key(&entry));
        self.ignore_entries.push(entry);
    }

    fn remove_ignore_entry(&mut self, key: &str) -> bool {
        let before = self.ignore_entries.len();
        self.ignore_entries.retain(|entry| entry_key(entry) != key);
        self.ignore_entries.len() != before
    }
}

fn entry_key(entry: &IgnoreEntry) -> &str {
    match entry {
        IgnoreEntry::Series { series_key, .. } => series_key,
        IgnoreEntry::Occurrence { key, .. } => key,
    }
}

/// An in-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventStore for MemoryStore {
    fn snapshot(&self, domain: Option<Domain>) -> StoreResult<Vec<EventRecord>> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        Ok(state.snapshot(domain))
    }

    fn get(&self, identity: &str) -> StoreResult<Option<EventRecord>> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        Ok(state.records.get(identity).cloned())
    }

    fn upsert(&self, record: EventRecord) -> StoreResult<()> {
        let mut state = self.state.write().map_err(|_| StoreError::Poisoned)?;
        state.records.insert(record.identity.clone(), record);
        Ok(())
    }

    fn remove(&self, identity: &str) -> StoreResult<bool> {
        let mut state = self.state.write().map_err(|_| StoreError::Poisoned)?;
        Ok(state.records.remove(identity).is_some())
    }

    fn ignore_entries(&self) -> StoreResult<Vec<IgnoreEntry>> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        Ok(state.ignore_entries.clone())
    }

    fn add_ignore_entry(&self, entry: IgnoreEntry) -> StoreResult<()> {
        let mut state = self.state.write().map_err(|_| StoreError::Poisoned)?;
        state.add_ignore_entry(entry);
        Ok(())
    }

    fn remove_ignore_entry(&self, key: &str) -> StoreResult<bool> {
        let mut state = self.state.write().map_err(|_| StoreError::Poisoned)?;
        Ok(state.remove_ignore_entry(key))
    }
}

/// A whole-file JSON store.
///
/// Loads the file once on open and rewrites it after every mutation. This is
/// the single-file stand-in for the logical schema; callers wanting a real
/// database implement [`EventStore`] over it instead.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    state: RwLock<StoreState>,
}

impl JsonFileStore {
    /// Opens (or initializes) the store at the given path.
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let state = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            StoreState::default()
        };
        debug!(path = %path.display(), "Opened JSON store");
        Ok(Self {
            path,
            state: RwLock::new(state),
        })
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, state: &StoreState) -> StoreResult<()> {
        let contents = serde_json::to_string_pretty(state)?;
        std::fs::write(&self.path, contents)?;
        Ok(())
    }
}

impl EventStore for JsonFileStore {
    fn snapshot(&self, domain: Option<Domain>) -> StoreResult<Vec<EventRecord>> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        Ok(state.snapshot(domain))
    }

    fn get(&self, identity: &str) -> StoreResult<Option<EventRecord>> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        Ok(state.records.get(identity).cloned())
    }

    fn upsert(&self, record: EventRecord) -> StoreResult<()> {
        let mut state = self.state.write().map_err(|_| StoreError::Poisoned)?;
        state.records.insert(record.identity.clone(), record);
        self.persist(&state)
    }

    fn remove(&self, identity: &str) -> StoreResult<bool> {
        let mut state = self.state.write().map_err(|_| StoreError::Poisoned)?;
        let removed = state.records.remove(identity).is_some();
        if removed {
            self.persist(&state)?;
        }
        Ok(removed)
    }

    fn ignore_entries(&self) -> StoreResult<Vec<IgnoreEntry>> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        Ok(state.ignore_entries.clone())
    }

    fn add_ignore_entry(&self, entry: IgnoreEntry) -> StoreResult<()> {
        let mut state = self.state.write().map_err(|_| StoreError::Poisoned)?;
        state.add_ignore_entry(entry);
        self.persist(&state)
    }

    fn remove_ignore_entry(&self, key: &str) -> StoreResult<bool> {
        let mut state = self.state.write().map_err(|_| StoreError::Poisoned)?;
        let removed = state.remove_ignore_entry(key);
        if removed {
            self.persist(&state)?;
        }
        Ok(removed)
    }
}
