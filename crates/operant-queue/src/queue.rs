use std::collections::VecDeque;
use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use thiserror::Error;
use tracing::debug;

use operant_core::config::{ExpectedResponse, RepetitionPolicy};

use crate::stimulus::{Condition, Stimulus};

/// Normal end-of-block signal: no condition has an eligible item left.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("no condition has remaining eligible items in this block")]
pub struct BlockExhausted;

/// Queue construction errors. All of these are detected at block start so a
/// bad configuration refuses to run rather than failing mid-block.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("a queue needs at least one condition")]
    NoConditions,
    #[error("condition {condition:?} has invalid weight {weight}")]
    InvalidWeight { condition: String, weight: f64 },
    #[error("condition {condition:?} has an empty stimulus pool")]
    EmptyPool { condition: String },
    #[error("an ordered queue with zero repetitions would never emit")]
    ZeroRepetitions,
    #[error("a staircase queue runs over exactly one condition, got {got}")]
    StaircaseConditionCount { got: usize },
}

/// The (condition, stimulus) pair a trial runs with.
#[derive(Clone, Debug, PartialEq)]
pub struct ScheduledStimulus {
    pub condition: Arc<Condition>,
    pub stimulus: Stimulus,
}

impl ScheduledStimulus {
    pub fn expected(&self) -> ExpectedResponse {
        self.stimulus.label
    }

    /// Condition attenuation stacked on the stimulus's own gain.
    pub fn gain_db(&self) -> f32 {
        self.condition.gain_db + self.stimulus.gain_db
    }
}

/// Outcome feedback for adaptive queues, reported once per completed trial.
#[derive(Clone, Copy, Debug)]
pub struct OutcomeFeedback {
    pub correct: bool,
    pub no_response: bool,
}

/// Produces the ordered (condition, stimulus) sequence for one block.
///
/// Schedulers are pure functions over their own state and the supplied RNG:
/// the same construction and the same seed replay the same sequence.
pub trait Scheduler: Send {
    fn next(&mut self, rng: &mut dyn RngCore) -> Result<ScheduledStimulus, BlockExhausted>;

    /// Feedback hook for adaptive queues; non-adaptive queues ignore it.
    fn record_outcome(&mut self, _feedback: OutcomeFeedback) {}
}

struct WeightedEntry {
    condition: Arc<Condition>,
    /// Remaining draw budget; `None` is unbounded.
    budget: Option<u32>,
    /// Indices into the condition's stimulus set not yet emitted this cycle.
    pool: Vec<usize>,
    exhausted: bool,
}

/// Weighted random scheduler: conditions drawn proportionally to weight,
/// stimuli drawn uniformly without replacement within a cycle, per-condition
/// draw budgets from `max_items`.
pub struct WeightedScheduler {
    entries: Vec<WeightedEntry>,
}

impl WeightedScheduler {
    pub fn new(conditions: Vec<Condition>) -> Result<Self, QueueError> {
        if conditions.is_empty() {
            return Err(QueueError::NoConditions);
        }
        for condition in &conditions {
            if !condition.weight.is_finite() || condition.weight < 0.0 {
                return Err(QueueError::InvalidWeight {
                    condition: condition.name.clone(),
                    weight: condition.weight,
                });
            }
            if condition.stimuli.is_empty() {
                return Err(QueueError::EmptyPool {
                    condition: condition.name.clone(),
                });
            }
        }
        let entries = conditions
            .into_iter()
            .map(|condition| {
                let pool = (0..condition.stimuli.len()).collect();
                WeightedEntry {
                    budget: condition.max_items,
                    pool,
                    exhausted: false,
                    condition: Arc::new(condition),
                }
            })
            .collect();
        Ok(Self { entries })
    }

    fn eligible(&self) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.exhausted && e.budget != Some(0))
            .map(|(i, _)| i)
            .collect()
    }

    /// Weighted draw over the eligible set; uniform when every eligible
    /// weight is zero.
    fn select(&self, eligible: &[usize], rng: &mut dyn RngCore) -> usize {
        let total: f64 = eligible
            .iter()
            .map(|&i| self.entries[i].condition.weight)
            .sum();
        if total <= 0.0 {
            return eligible[rng.gen_range(0..eligible.len())];
        }
        let mut roll = rng.gen_range(0.0..total);
        for &i in eligible {
            let weight = self.entries[i].condition.weight;
            if roll < weight {
                return i;
            }
            roll -= weight;
        }
        // Floating-point residue lands on the last eligible condition.
        *eligible.last().unwrap()
    }
}

impl Scheduler for WeightedScheduler {
    fn next(&mut self, rng: &mut dyn RngCore) -> Result<ScheduledStimulus, BlockExhausted> {
        loop {
            let eligible = self.eligible();
            if eligible.is_empty() {
                return Err(BlockExhausted);
            }
            let picked = self.select(&eligible, rng);
            let entry = &mut self.entries[picked];

            if entry.pool.is_empty() {
                match entry.condition.repetition {
                    // Repeat-with-shuffle: a fresh cycle over the full set.
                    RepetitionPolicy::Recycle => {
                        entry.pool = (0..entry.condition.stimuli.len()).collect();
                    }
                    // This draw exhausts the condition instead; other
                    // conditions stay eligible.
                    RepetitionPolicy::NonRepeating => {
                        debug!(condition = %entry.condition.name, "condition exhausted");
                        entry.exhausted = true;
                        continue;
                    }
                }
            }

            let slot = rng.gen_range(0..entry.pool.len());
            let index = entry.pool.swap_remove(slot);
            if let Some(budget) = &mut entry.budget {
                *budget -= 1;
            }
            debug!(
                condition = %entry.condition.name,
                stimulus = %entry.condition.stimuli[index].path,
                remaining_budget = ?entry.budget,
                "scheduled"
            );
            return Ok(ScheduledStimulus {
                condition: entry.condition.clone(),
                stimulus: entry.condition.stimuli[index].clone(),
            });
        }
    }
}

/// Deterministic block ordering: every (condition, stimulus) pair emitted
/// `repetitions` times, in listed order or shuffled once at construction.
pub struct OrderedScheduler {
    items: VecDeque<ScheduledStimulus>,
}

impl OrderedScheduler {
    pub fn new(
        conditions: Vec<Condition>,
        repetitions: u32,
        shuffle: bool,
        rng: &mut dyn RngCore,
    ) -> Result<Self, QueueError> {
        if conditions.is_empty() {
            return Err(QueueError::NoConditions);
        }
        if repetitions == 0 {
            return Err(QueueError::ZeroRepetitions);
        }
        for condition in &conditions {
            if condition.stimuli.is_empty() {
                return Err(QueueError::EmptyPool {
                    condition: condition.name.clone(),
                });
            }
        }

        let conditions: Vec<Arc<Condition>> = conditions.into_iter().map(Arc::new).collect();
        let mut items = Vec::new();
        for _ in 0..repetitions {
            for condition in &conditions {
                for stimulus in &condition.stimuli {
                    items.push(ScheduledStimulus {
                        condition: condition.clone(),
                        stimulus: stimulus.clone(),
                    });
                }
            }
        }
        if shuffle {
            items.shuffle(rng);
        }
        Ok(Self {
            items: items.into(),
        })
    }

    pub fn remaining(&self) -> usize {
        self.items.len()
    }
}

impl Scheduler for OrderedScheduler {
    fn next(&mut self, _rng: &mut dyn RngCore) -> Result<ScheduledStimulus, BlockExhausted> {
        self.items.pop_front().ok_or(BlockExhausted)
    }
}

/// Kaernbach (1991) staircase over one condition's ordered stimuli, easiest
/// last. A correct trial steps toward the hard end, an incorrect or missed
/// trial steps back; the block ends after the criterion trial count.
pub struct StaircaseScheduler {
    condition: Arc<Condition>,
    index: usize,
    step_up: usize,
    step_down: usize,
    criterion_trials: u32,
    emitted: u32,
    updated: bool,
}

impl StaircaseScheduler {
    pub fn new(
        condition: Condition,
        step_up: usize,
        step_down: usize,
        criterion_trials: u32,
    ) -> Result<Self, QueueError> {
        if condition.stimuli.is_empty() {
            return Err(QueueError::EmptyPool {
                condition: condition.name.clone(),
            });
        }
        let start = condition.stimuli.len() - 1;
        Ok(Self {
            condition: Arc::new(condition),
            index: start,
            step_up,
            step_down,
            criterion_trials,
            emitted: 0,
            updated: true,
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

impl Scheduler for StaircaseScheduler {
    fn next(&mut self, _rng: &mut dyn RngCore) -> Result<ScheduledStimulus, BlockExhausted> {
        if self.emitted >= self.criterion_trials {
            return Err(BlockExhausted);
        }
        debug_assert!(self.updated, "staircase advanced without outcome feedback");
        self.updated = false;
        self.emitted += 1;
        Ok(ScheduledStimulus {
            condition: self.condition.clone(),
            stimulus: self.condition.stimuli[self.index].clone(),
        })
    }

    fn record_outcome(&mut self, feedback: OutcomeFeedback) {
        self.updated = true;
        if feedback.correct && !feedback.no_response {
            self.index = self.index.saturating_sub(self.step_down);
        } else {
            let top = self.condition.stimuli.len() - 1;
            self.index = (self.index + self.step_up).min(top);
        }
    }
}
