//! Response payloads for the query endpoints
//!
//! All views are recomputed from the store window on every request.

use serde::{Deserialize, Serialize};

use crate::types::{Alert, EpisodeId, EpisodeRecord, StepId, StepRecord};

/// Steps read by the reward and component endpoints when `n` is omitted
pub const DEFAULT_STEP_WINDOW: usize = 100;

/// Episodes read by the episode endpoint when `n` is omitted
pub const DEFAULT_EPISODE_WINDOW: usize = 50;

/// Episodes scanned for alerts
pub const ALERT_WINDOW: usize = 10;

/// Index-aligned reward timeline, oldest first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RewardHistory {
    pub steps: Vec<StepId>,
    pub rewards: Vec<f64>,
    pub episodes: Vec<EpisodeId>,
}

impl RewardHistory {
    pub fn from_steps(steps: &[StepRecord]) -> Self {
        Self {
            steps: steps.iter().map(|s| s.step).collect(),
            rewards: steps.iter().map(|s| s.reward).collect(),
            episodes: steps.iter().map(|s| s.episode).collect(),
        }
    }
}

/// Magnitude of each reward component over a window of steps
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentBreakdown {
    pub components: Vec<String>,
    pub values: Vec<f64>,
}

impl ComponentBreakdown {
    /// Sum absolute contributions per component name.
    ///
    /// Names appear in first-seen order across the window. Absolute values
    /// keep opposing contributions from cancelling out in the chart.
    pub fn from_steps(steps: &[StepRecord]) -> Self {
        let mut breakdown = Self::default();

        for step in steps {
            for (name, value) in &step.reward_components {
                match breakdown.components.iter().position(|c| c == name) {
                    Some(idx) => breakdown.values[idx] += value.abs(),
                    None => {
                        breakdown.components.push(name.clone());
                        breakdown.values.push(value.abs());
                    }
                }
            }
        }

        breakdown
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.components
            .iter()
            .position(|c| c == name)
            .map(|idx| self.values[idx])
    }
}

/// Index-aligned episode summaries, oldest first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpisodeHistory {
    pub episodes: Vec<EpisodeId>,
    pub total_rewards: Vec<f64>,
    pub lengths: Vec<i64>,
    pub hacking_scores: Vec<f64>,
}

impl EpisodeHistory {
    pub fn from_episodes(episodes: &[EpisodeRecord]) -> Self {
        Self {
            episodes: episodes.iter().map(|e| e.episode).collect(),
            total_rewards: episodes.iter().map(|e| e.total_reward).collect(),
            lengths: episodes.iter().map(|e| e.length).collect(),
            hacking_scores: episodes.iter().map(|e| e.hacking_score).collect(),
        }
    }
}

/// Hacking alerts, episode order then flag order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertFeed {
    pub alerts: Vec<Alert>,
}

impl AlertFeed {
    pub fn from_episodes(episodes: &[EpisodeRecord]) -> Self {
        Self {
            alerts: episodes.iter().flat_map(EpisodeRecord::alerts).collect(),
        }
    }
}
