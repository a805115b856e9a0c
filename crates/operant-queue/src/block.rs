use std::time::Duration;

use rand::RngCore;
use tracing::info;

use operant_core::config::{BlockConfig, QueueKind};

use crate::queue::{
    BlockExhausted, OrderedScheduler, OutcomeFeedback, QueueError, ScheduledStimulus, Scheduler,
    StaircaseScheduler, WeightedScheduler,
};
use crate::stimulus::Condition;

/// A bounded run of trials sharing one scheduler instance. The scheduler is
/// owned here for the block's whole lifetime; construction validates the
/// configuration eagerly so a bad block refuses to start.
pub struct Block {
    index: u32,
    scheduler: Box<dyn Scheduler>,
    max_trials: Option<u32>,
    max_duration: Option<Duration>,
    emitted: u32,
}

impl Block {
    pub fn from_config(
        index: u32,
        config: &BlockConfig,
        rng: &mut dyn RngCore,
    ) -> Result<Self, QueueError> {
        let conditions: Vec<Condition> =
            config.conditions.iter().map(Condition::from_config).collect();

        let scheduler: Box<dyn Scheduler> = match config.queue {
            QueueKind::Weighted => Box::new(WeightedScheduler::new(conditions)?),
            QueueKind::Ordered {
                repetitions,
                shuffle,
            } => Box::new(OrderedScheduler::new(conditions, repetitions, shuffle, rng)?),
            QueueKind::Staircase {
                step_up,
                step_down,
                criterion_trials,
            } => {
                if conditions.len() != 1 {
                    return Err(QueueError::StaircaseConditionCount {
                        got: conditions.len(),
                    });
                }
                let condition = conditions.into_iter().next().unwrap();
                Box::new(StaircaseScheduler::new(
                    condition,
                    step_up,
                    step_down,
                    criterion_trials,
                )?)
            }
        };

        info!(block = index, "block constructed");
        Ok(Self {
            index,
            scheduler,
            max_trials: config.max_trials,
            max_duration: config.max_duration_ms.map(Duration::from_millis),
            emitted: 0,
        })
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn emitted(&self) -> u32 {
        self.emitted
    }

    /// Next scheduled trial, or `BlockExhausted` once the scheduler or the
    /// block's own trial budget runs out.
    pub fn next(&mut self, rng: &mut dyn RngCore) -> Result<ScheduledStimulus, BlockExhausted> {
        if let Some(max) = self.max_trials {
            if self.emitted >= max {
                return Err(BlockExhausted);
            }
        }
        let item = self.scheduler.next(rng)?;
        self.emitted += 1;
        Ok(item)
    }

    pub fn record_outcome(&mut self, feedback: OutcomeFeedback) {
        self.scheduler.record_outcome(feedback);
    }

    /// True once the configured wall-clock budget for this block is spent.
    pub fn over_duration(&self, elapsed: Duration) -> bool {
        match self.max_duration {
            Some(limit) => elapsed >= limit,
            None => false,
        }
    }
}
