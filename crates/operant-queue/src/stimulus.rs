use std::time::Duration;

use serde::{Deserialize, Serialize};

use operant_core::config::{ConditionConfig, ExpectedResponse, RepetitionPolicy, StimulusConfig};

/// One playable stimulus. Immutable once loaded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stimulus {
    pub path: String,
    pub label: ExpectedResponse,
    pub duration: Duration,
    pub gain_db: f32,
}

impl Stimulus {
    pub fn from_config(config: &StimulusConfig) -> Self {
        Self {
            path: config.path.clone(),
            label: config.label,
            duration: Duration::from_millis(config.duration_ms),
            gain_db: config.gain_db,
        }
    }
}

/// A named pool of stimuli with a selection weight and per-block draw cap.
/// Built from configuration at block start and immutable for the block's
/// lifetime.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub name: String,
    pub stimuli: Vec<Stimulus>,
    pub weight: f64,
    pub max_items: Option<u32>,
    pub gain_db: f32,
    pub repetition: RepetitionPolicy,
    /// Probe conditions clear these so their trials are never consequated.
    pub is_rewarded: bool,
    pub is_punished: bool,
}

impl Condition {
    pub fn from_config(config: &ConditionConfig) -> Self {
        Self {
            name: config.name.clone(),
            stimuli: config.stimuli.iter().map(Stimulus::from_config).collect(),
            weight: config.weight,
            max_items: config.max_items,
            gain_db: config.gain_db,
            repetition: config.repetition,
            is_rewarded: config.is_rewarded,
            is_punished: config.is_punished,
        }
    }
}
