use serde::{Deserialize, Serialize};

use crate::scoring::Outcome;

/// What the box does to the subject after scoring.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Consequence {
    Reward,
    Punish,
    None,
}

/// Maps an outcome to a consequence, honoring the condition's consequated
/// flags so probe conditions stay silent. Stateful implementations carry the
/// reinforcement schedule.
pub trait ConsequencePolicy: Send {
    fn consequence(&mut self, outcome: Outcome, is_rewarded: bool, is_punished: bool)
        -> Consequence;
}

/// Every correct go is rewarded, every incorrect go is punished.
pub struct ContinuousReinforcement;

impl ConsequencePolicy for ContinuousReinforcement {
    fn consequence(
        &mut self,
        outcome: Outcome,
        is_rewarded: bool,
        is_punished: bool,
    ) -> Consequence {
        match outcome {
            Outcome::Hit if is_rewarded => Consequence::Reward,
            Outcome::Miss | Outcome::FalseAlarm if is_punished => Consequence::Punish,
            _ => Consequence::None,
        }
    }
}

/// Fixed-ratio schedule: every `ratio`-th hit is rewarded; punishment stays
/// continuous.
pub struct FixedRatioReinforcement {
    ratio: u32,
    hits_since_reward: u32,
}

impl FixedRatioReinforcement {
    pub fn new(ratio: u32) -> Self {
        Self {
            ratio: ratio.max(1),
            hits_since_reward: 0,
        }
    }
}

impl ConsequencePolicy for FixedRatioReinforcement {
    fn consequence(
        &mut self,
        outcome: Outcome,
        is_rewarded: bool,
        is_punished: bool,
    ) -> Consequence {
        match outcome {
            Outcome::Hit if is_rewarded => {
                self.hits_since_reward += 1;
                if self.hits_since_reward >= self.ratio {
                    self.hits_since_reward = 0;
                    Consequence::Reward
                } else {
                    Consequence::None
                }
            }
            Outcome::Miss | Outcome::FalseAlarm if is_punished => Consequence::Punish,
            _ => Consequence::None,
        }
    }
}
