//! Feed fetch collaborator trait.
//!
//! Fetching owns authentication, retries, and network timeouts; none of that
//! lives in this repository. The sync engine only needs the payload text for
//! a source, so the boundary is one async method.

use std::future::Future;
use std::pin::Pin;

use crate::error::FeedError;

/// A boxed future for async trait methods.
///
/// Async functions in traits do not yet mix well with dynamic dispatch;
/// boxed futures keep the trait object-safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Fetches the raw payload for one feed source.
pub trait FeedFetch: Send + Sync {
    /// A short name for logs and reports (e.g. "work-graph", "family-ics").
    fn name(&self) -> &str;

    /// Fetches the payload text.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::Fetch`] on network or auth failure; the engine
    /// records the failure and lets the other sources proceed.
    fn fetch(&self) -> BoxFuture<'_, Result<String, FeedError>>;
}

/// A fetcher that serves a fixed payload.
///
/// Used in tests and for offline ingestion of exported files.
#[derive(Debug, Clone)]
pub struct StaticFetch {
    name: String,
    payload: String,
}

impl StaticFetch {
    /// Creates a static fetcher.
    pub fn new(name: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: payload.into(),
        }
    }
}

impl FeedFetch for StaticFetch {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self) -> BoxFuture<'_, Result<String, FeedError>> {
        let payload = self.payload.clone();
        Box::pin(async move { Ok(payload) })
    }
}

/// A fetcher that always fails.
///
/// Useful for testing partial-success runs and as a placeholder when a
/// source fails to initialize.
#[derive(Debug, Clone)]
pub struct FailingFetch {
    name: String,
    message: String,
}

impl FailingFetch {
    /// Creates a failing fetcher.
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

impl FeedFetch for FailingFetch {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self) -> BoxFuture<'_, Result<String, FeedError>> {
        let message = self.message.clone();
        Box::pin(async move { Err(FeedError::fetch(message)) })
    }
}
