//! Core types for RewardScope

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Identifier of a training step
pub type StepId = i64;

/// Identifier of an episode
pub type EpisodeId = i64;

/// One environment timestep as written by the collector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Monotonically non-decreasing step identifier
    pub step: StepId,
    /// Total reward for this step
    pub reward: f64,
    /// Per-component contributions to the reward
    #[serde(default)]
    pub reward_components: RewardComponents,
    /// Episode this step belongs to
    pub episode: EpisodeId,
}

impl StepRecord {
    pub fn new(step: StepId, episode: EpisodeId, reward: f64) -> Self {
        Self {
            step,
            reward,
            reward_components: RewardComponents::new(),
            episode,
        }
    }

    /// Builder-style helper for attaching a reward component
    pub fn with_component(mut self, name: impl Into<String>, value: f64) -> Self {
        self.reward_components.insert(name.into(), value);
        self
    }
}

/// Named reward contributions, in the order the collector recorded them.
///
/// Serialized as a JSON object; key order survives a round trip through the
/// run database. Setting an existing name keeps its position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RewardComponents(Vec<(String, f64)>);

impl RewardComponents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        let name = name.into();
        match self.0.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| *value)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, (String, f64)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a RewardComponents {
    type Item = &'a (String, f64);
    type IntoIter = std::slice::Iter<'a, (String, f64)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for RewardComponents {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        let mut components = Self::new();
        for (name, value) in iter {
            components.insert(name, value);
        }
        components
    }
}

impl Serialize for RewardComponents {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(name, value)| (name, value)))
    }
}

impl<'de> Deserialize<'de> for RewardComponents {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct ComponentsVisitor;

        impl<'de> Visitor<'de> for ComponentsVisitor {
            type Value = RewardComponents;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of component names to numbers")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut map: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut components = RewardComponents::new();
                while let Some((name, value)) = map.next_entry::<String, f64>()? {
                    components.insert(name, value);
                }
                Ok(components)
            }
        }

        deserializer.deserialize_map(ComponentsVisitor)
    }
}

/// Summary of a finished episode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeRecord {
    pub episode: EpisodeId,
    pub total_reward: f64,
    /// Number of steps in the episode
    pub length: i64,
    /// Anomaly severity reported by the hacking detectors
    pub hacking_score: f64,
    /// Detector tags raised for this episode, in detection order
    #[serde(default)]
    pub hacking_flags: Vec<String>,
}

impl EpisodeRecord {
    pub fn new(episode: EpisodeId, total_reward: f64, length: i64) -> Self {
        Self {
            episode,
            total_reward,
            length,
            hacking_score: 0.0,
            hacking_flags: Vec::new(),
        }
    }

    pub fn with_hacking(mut self, score: f64, flags: &[&str]) -> Self {
        self.hacking_score = score;
        self.hacking_flags = flags.iter().map(|f| f.to_string()).collect();
        self
    }

    /// Materialize one alert per hacking flag, in flag order
    pub fn alerts(&self) -> Vec<Alert> {
        self.hacking_flags
            .iter()
            .map(|flag| Alert {
                episode: self.episode,
                alert_type: flag.clone(),
                severity: self.hacking_score,
                description: describe_flag(flag),
            })
            .collect()
    }
}

/// A hacking alert derived from an episode flag. Never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub episode: EpisodeId,
    #[serde(rename = "type")]
    pub alert_type: String,
    pub severity: f64,
    pub description: String,
}

/// Turn a detector tag into a human-readable title.
///
/// Underscores become spaces; the first letter of every run of letters is
/// upper-cased and the rest lower-cased ("reward_hacking" -> "Reward Hacking").
pub fn describe_flag(flag: &str) -> String {
    let mut out = String::with_capacity(flag.len());
    let mut in_word = false;

    for c in flag.chars() {
        let c = if c == '_' { ' ' } else { c };
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }

    out
}

/// Timing knobs for live sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveConfig {
    /// Time between two polls of the store
    pub poll_interval: Duration,
    /// How many recent steps each poll looks at
    pub poll_window: usize,
    /// Upper bound on a single store read
    pub query_timeout: Duration,
    /// Upper bound on pushing one message to a client
    pub send_timeout: Duration,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            poll_window: DEFAULT_POLL_WINDOW,
            query_timeout: Duration::from_millis(DEFAULT_QUERY_TIMEOUT_MS),
            send_timeout: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

/// 10 Hz
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
pub const DEFAULT_POLL_WINDOW: usize = 10;
pub const DEFAULT_QUERY_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_PORT: u16 = 8050;

/// Server configuration, built once by the binary and handed to the server
#[derive(Debug, Clone)]
pub struct DashboardConfig {
    /// Name of the training run being displayed
    pub run_name: String,
    /// Directory holding the collector's run databases
    pub data_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub live: LiveConfig,
}

impl DashboardConfig {
    pub fn new(run_name: impl Into<String>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            run_name: run_name.into(),
            data_dir: data_dir.into(),
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            live: LiveConfig::default(),
        }
    }

    /// Location of the run database written by the collector
    pub fn db_path(&self) -> PathBuf {
        run_db_path(&self.data_dir, &self.run_name)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// `<data_dir>/<run_name>.db`
pub fn run_db_path(data_dir: &Path, run_name: &str) -> PathBuf {
    data_dir.join(format!("{}.db", run_name))
}
