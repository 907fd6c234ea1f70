//! Metrics store adapters
//!
//! The dashboard never writes training data. Everything it shows comes through
//! the [`MetricsStore`] trait, which exposes bounded recency windows over the
//! step and episode records produced by the collector.

mod connection;
mod memory;
mod migrations;
pub mod queries;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::error::{Result, ScopeError};
use crate::types::{EpisodeRecord, StepRecord};

pub use connection::{RunWriter, SqliteStore, DEFAULT_BUSY_TIMEOUT, DEFAULT_POOL_SIZE};
pub use memory::MemoryStore;
pub use migrations::{run_migrations, SCHEMA_VERSION};

/// Read-only access to collector records.
///
/// Implementations must make every write committed before a call visible to
/// that call. Reads may block; async callers go through
/// [`fetch_recent_steps`] and [`fetch_recent_episodes`].
pub trait MetricsStore: Send + Sync {
    /// The `n` most recent steps by step id, oldest first, at most `n` long
    fn recent_steps(&self, n: usize) -> Result<Vec<StepRecord>>;

    /// The `n` most recent episodes, oldest first, at most `n` long
    fn recent_episodes(&self, n: usize) -> Result<Vec<EpisodeRecord>>;

    /// Short description of the backend for logs and health output
    fn describe(&self) -> String;
}

/// Shared handle to a store
pub type SharedStore = Arc<dyn MetricsStore>;

/// A store read running on the blocking pool.
///
/// Dropping it detaches the read; the blocking thread stays busy until the
/// read returns. Callers that poll on a schedule hold on to an expired read
/// and check [`StoreRead::is_finished`] before starting another.
pub struct StoreRead<T> {
    handle: JoinHandle<Result<T>>,
}

impl<T: Send + 'static> StoreRead<T> {
    pub fn spawn<F>(f: F) -> Self
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        Self {
            handle: tokio::task::spawn_blocking(f),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait up to `timeout` for the result.
    ///
    /// On expiry the still-running read is handed back. A panic inside the
    /// read surfaces as `QueryFailed`.
    pub async fn wait(mut self, timeout: Duration) -> std::result::Result<Result<T>, Self> {
        match tokio::time::timeout(timeout, &mut self.handle).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(join_err)) => Ok(Err(ScopeError::QueryFailed(format!(
                "store read aborted: {}",
                join_err
            )))),
            Err(_) => Err(self),
        }
    }
}

impl StoreRead<Vec<StepRecord>> {
    /// Recent steps from `store`
    pub fn recent_steps(store: &SharedStore, n: usize) -> Self {
        let store = Arc::clone(store);
        Self::spawn(move || store.recent_steps(n))
    }
}

impl StoreRead<Vec<EpisodeRecord>> {
    /// Recent episodes from `store`
    pub fn recent_episodes(store: &SharedStore, n: usize) -> Self {
        let store = Arc::clone(store);
        Self::spawn(move || store.recent_episodes(n))
    }
}

/// Read recent steps off the async runtime, bounded by `timeout`
pub async fn fetch_recent_steps(
    store: &SharedStore,
    n: usize,
    timeout: Duration,
) -> Result<Vec<StepRecord>> {
    run_bounded(StoreRead::<Vec<StepRecord>>::recent_steps(store, n), timeout).await
}

/// Read recent episodes off the async runtime, bounded by `timeout`
pub async fn fetch_recent_episodes(
    store: &SharedStore,
    n: usize,
    timeout: Duration,
) -> Result<Vec<EpisodeRecord>> {
    run_bounded(StoreRead::<Vec<EpisodeRecord>>::recent_episodes(store, n), timeout).await
}

/// Wait for a read, abandoning it on expiry
async fn run_bounded<T: Send + 'static>(read: StoreRead<T>, timeout: Duration) -> Result<T> {
    match read.wait(timeout).await {
        Ok(result) => result,
        Err(_abandoned) => Err(timed_out(timeout)),
    }
}

pub(crate) fn timed_out(timeout: Duration) -> ScopeError {
    ScopeError::QueryFailed(format!(
        "store read timed out after {}ms",
        timeout.as_millis()
    ))
}
