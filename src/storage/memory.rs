//! In-process metrics store
//!
//! Holds records in memory. Used when the collector lives in the same process
//! as the dashboard, and to simulate collector outages in tests.

use parking_lot::RwLock;

use super::MetricsStore;
use crate::error::{Result, ScopeError};
use crate::types::{EpisodeRecord, StepRecord};

#[derive(Default)]
struct Records {
    steps: Vec<StepRecord>,
    episodes: Vec<EpisodeRecord>,
    offline: bool,
}

/// Metrics store backed by in-memory vectors kept sorted by id
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<Records>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step, keeping steps ordered by step id
    pub fn push_step(&self, step: StepRecord) {
        let mut records = self.records.write();
        let idx = records.steps.partition_point(|s| s.step <= step.step);
        records.steps.insert(idx, step);
    }

    /// Append an episode, keeping episodes ordered by episode id
    pub fn push_episode(&self, episode: EpisodeRecord) {
        let mut records = self.records.write();
        let idx = records
            .episodes
            .partition_point(|e| e.episode <= episode.episode);
        records.episodes.insert(idx, episode);
    }

    /// Make every read fail with `AdapterUnavailable` until switched back
    pub fn set_offline(&self, offline: bool) {
        self.records.write().offline = offline;
    }

    pub fn step_count(&self) -> usize {
        self.records.read().steps.len()
    }
}

fn tail<T: Clone>(items: &[T], n: usize) -> Vec<T> {
    items[items.len().saturating_sub(n)..].to_vec()
}

impl MetricsStore for MemoryStore {
    fn recent_steps(&self, n: usize) -> Result<Vec<StepRecord>> {
        let records = self.records.read();
        if records.offline {
            return Err(ScopeError::AdapterUnavailable(
                "Collector is offline".to_string(),
            ));
        }
        Ok(tail(&records.steps, n))
    }

    fn recent_episodes(&self, n: usize) -> Result<Vec<EpisodeRecord>> {
        let records = self.records.read();
        if records.offline {
            return Err(ScopeError::AdapterUnavailable(
                "Collector is offline".to_string(),
            ));
        }
        Ok(tail(&records.episodes, n))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
