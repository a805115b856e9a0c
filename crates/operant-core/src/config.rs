use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::channel::ChannelAddress;

/// What the subject is expected to do for a stimulus. `Neutral` marks probe
/// stimuli that are scored like no-reward stimuli but never consequated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedResponse {
    Reward,
    NoReward,
    Neutral,
}

/// What happens when a condition's stimulus pool runs dry mid-block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepetitionPolicy {
    /// Refill the pool from the full stimulus set (repeat-with-shuffle).
    #[default]
    Recycle,
    /// The condition exhausts once every stimulus has been emitted.
    NonRepeating,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StimulusConfig {
    pub path: String,
    pub label: ExpectedResponse,
    pub duration_ms: u64,
    #[serde(default)]
    pub gain_db: f32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConditionConfig {
    pub name: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub max_items: Option<u32>,
    #[serde(default)]
    pub gain_db: f32,
    #[serde(default)]
    pub repetition: RepetitionPolicy,
    #[serde(default = "default_true")]
    pub is_rewarded: bool,
    #[serde(default = "default_true")]
    pub is_punished: bool,
    pub stimuli: Vec<StimulusConfig>,
}

fn default_weight() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

/// Which scheduler a block runs.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueueKind {
    /// Weighted random draw over conditions with per-condition draw budgets.
    Weighted,
    /// Every (condition, stimulus) pair emitted `repetitions` times, in
    /// listed or shuffled order.
    Ordered { repetitions: u32, shuffle: bool },
    /// Kaernbach staircase over one condition's ordered stimuli.
    Staircase {
        step_up: usize,
        step_down: usize,
        criterion_trials: u32,
    },
}

impl Default for QueueKind {
    fn default() -> Self {
        QueueKind::Weighted
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockConfig {
    pub conditions: Vec<ConditionConfig>,
    #[serde(default)]
    pub queue: QueueKind,
    #[serde(default)]
    pub max_trials: Option<u32>,
    #[serde(default)]
    pub max_duration_ms: Option<u64>,
}

/// Every bounded wait in the core, resolved up front. No module reads a
/// process-wide default.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimeoutConfig {
    pub response_ms: u64,
    pub actuation_confirm_ms: u64,
    pub debounce_ms: u64,
    pub poll_interval_ms: u64,
    pub feed_ms: u64,
    pub punish_ms: u64,
}

impl TimeoutConfig {
    pub fn response(&self) -> Duration {
        Duration::from_millis(self.response_ms)
    }

    pub fn actuation_confirm(&self) -> Duration {
        Duration::from_millis(self.actuation_confirm_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn feed(&self) -> Duration {
        Duration::from_millis(self.feed_ms)
    }

    pub fn punish(&self) -> Duration {
        Duration::from_millis(self.punish_ms)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            response_ms: 5_000,
            actuation_confirm_ms: 500,
            debounce_ms: 20,
            poll_interval_ms: 15,
            feed_ms: 2_000,
            punish_ms: 10_000,
        }
    }
}

/// One component declaration: a registered device kind plus the named lines
/// it owns (e.g. `solenoid`, `ir_beam`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComponentSpec {
    pub role: String,
    pub kind: String,
    #[serde(default)]
    pub channels: BTreeMap<String, ChannelAddress>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PanelConfig {
    pub id: String,
    pub components: Vec<ComponentSpec>,
}

/// Fully-resolved session configuration. Parsing and schema validation live
/// outside the core; this is what the trial engine consumes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionConfig {
    pub panel: PanelConfig,
    pub subject: String,
    pub blocks: Vec<BlockConfig>,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default = "default_retry_budget")]
    pub fault_retry_budget: u32,
    #[serde(default = "default_response_roles")]
    pub response_roles: Vec<String>,
    #[serde(default = "default_speaker_role")]
    pub speaker_role: String,
    #[serde(default = "default_hopper_role")]
    pub hopper_role: String,
    #[serde(default = "default_house_light_role")]
    pub house_light_role: String,
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

fn default_retry_budget() -> u32 {
    3
}

fn default_response_roles() -> Vec<String> {
    vec!["peck_key".to_string()]
}

fn default_speaker_role() -> String {
    "speaker".to_string()
}

fn default_hopper_role() -> String {
    "hopper".to_string()
}

fn default_house_light_role() -> String {
    "house_light".to_string()
}
