use std::time::Duration;

use serde::{Deserialize, Serialize};

use operant_core::config::ExpectedResponse;

/// What the subject actually did during the response window.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ObservedResponse {
    Peck { role: String, latency: Duration },
    Timeout,
}

/// Trial outcome class from the scoring decision table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Hit,
    Miss,
    FalseAlarm,
    CorrectRejection,
    NoResponse,
}

impl Outcome {
    pub fn is_correct(self) -> bool {
        matches!(self, Outcome::Hit | Outcome::CorrectRejection)
    }
}

/// Fixed decision table keyed by (expected label, observed response).
/// Behavior variants are policies plugged into one engine, not engine
/// subclasses.
pub trait ScoringPolicy: Send {
    fn score(&self, expected: ExpectedResponse, observed: &ObservedResponse) -> Outcome;
}

/// Single-key go/no-go: any peck is "go". Neutral probe stimuli score like
/// no-reward stimuli; the consequence layer keeps them unconsequated.
pub struct GoNoGoScoring;

impl ScoringPolicy for GoNoGoScoring {
    fn score(&self, expected: ExpectedResponse, observed: &ObservedResponse) -> Outcome {
        match (expected, observed) {
            (ExpectedResponse::Reward, ObservedResponse::Peck { .. }) => Outcome::Hit,
            (ExpectedResponse::Reward, ObservedResponse::Timeout) => Outcome::NoResponse,
            (_, ObservedResponse::Peck { .. }) => Outcome::FalseAlarm,
            (_, ObservedResponse::Timeout) => Outcome::CorrectRejection,
        }
    }
}

/// Two-alternative choice: each expected label maps to one response key.
pub struct TwoAltChoiceScoring {
    pub reward_role: String,
    pub noreward_role: String,
}

impl ScoringPolicy for TwoAltChoiceScoring {
    fn score(&self, expected: ExpectedResponse, observed: &ObservedResponse) -> Outcome {
        match (expected, observed) {
            (ExpectedResponse::Reward, ObservedResponse::Peck { role, .. }) => {
                if role == &self.reward_role {
                    Outcome::Hit
                } else {
                    Outcome::Miss
                }
            }
            (_, ObservedResponse::Peck { role, .. }) => {
                if role == &self.noreward_role {
                    Outcome::CorrectRejection
                } else {
                    Outcome::FalseAlarm
                }
            }
            (_, ObservedResponse::Timeout) => Outcome::NoResponse,
        }
    }
}
