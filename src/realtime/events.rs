//! Live channel wire messages

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScopeError};
use crate::types::{EpisodeId, RewardComponents, StepId, StepRecord};

/// A message pushed to live viewers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveMessage {
    /// Freshest step seen by the session's poller
    StepUpdate {
        step: StepId,
        reward: f64,
        components: RewardComponents,
        episode: EpisodeId,
    },
}

impl LiveMessage {
    /// Build a step update, rejecting records JSON cannot represent
    pub fn step_update(record: &StepRecord) -> Result<Self> {
        if !record.reward.is_finite() {
            return Err(ScopeError::SerializationFailed(format!(
                "step {} has non-finite reward {}",
                record.step, record.reward
            )));
        }
        if let Some((name, value)) = record
            .reward_components
            .iter()
            .find(|(_, value)| !value.is_finite())
        {
            return Err(ScopeError::SerializationFailed(format!(
                "step {} has non-finite component {}={}",
                record.step, name, value
            )));
        }

        Ok(LiveMessage::StepUpdate {
            step: record.step,
            reward: record.reward,
            components: record.reward_components.clone(),
            episode: record.episode,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Serialize a step straight to its wire form
pub fn encode_step(record: &StepRecord) -> Result<String> {
    LiveMessage::step_update(record)?.to_json()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_step_update_shape() {
        let record = StepRecord::new(42, 3, 1.5)
            .with_component("distance", 2.0)
            .with_component("energy", -0.5);

        let value: Value = serde_json::from_str(&encode_step(&record).unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "step_update",
                "step": 42,
                "reward": 1.5,
                "components": {"distance": 2.0, "energy": -0.5},
                "episode": 3
            })
        );
    }

    #[test]
    fn test_empty_components_serialize_as_object() {
        let value: Value =
            serde_json::from_str(&encode_step(&StepRecord::new(1, 0, 0.0)).unwrap()).unwrap();
        assert_eq!(value["components"], json!({}));
    }

    #[test]
    fn test_non_finite_values_are_rejected() {
        let err = encode_step(&StepRecord::new(1, 0, f64::NAN)).unwrap_err();
        assert_eq!(err.kind(), "serialization_failed");

        let err = encode_step(&StepRecord::new(2, 0, 0.0).with_component("x", f64::INFINITY))
            .unwrap_err();
        assert!(err.to_string().contains("x=inf"));
    }

    #[test]
    fn test_message_parses_back() {
        let record = StepRecord::new(7, 1, 0.25).with_component("a", 1.0);
        let message = LiveMessage::step_update(&record).unwrap();
        let parsed: LiveMessage = serde_json::from_str(&message.to_json().unwrap()).unwrap();
        assert_eq!(parsed, message);
    }
}
