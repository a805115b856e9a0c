use std::sync::Arc;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use operant_core::clock::Clock;
use operant_core::config::{SessionConfig, TimeoutConfig};
use operant_core::fault::ComponentFault;
use operant_panel::panel::{Panel, PanelError};
use operant_queue::block::Block;
use operant_queue::queue::{BlockExhausted, OutcomeFeedback, QueueError, ScheduledStimulus};

use crate::consequence::{Consequence, ConsequencePolicy};
use crate::record::{SinkError, TrialRecord, TrialSink};
use crate::scoring::{ObservedResponse, Outcome, ScoringPolicy};
use crate::session::StopHandle;

/// Per-trial state machine phases. The engine always walks forward through
/// these and ends a trial back at `Idle`, faults included.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialPhase {
    Idle,
    Presenting,
    AwaitingResponse,
    Scoring,
    Consequating,
    Logging,
}

/// Panel roles the engine drives.
#[derive(Clone, Debug)]
pub struct EngineRoles {
    pub speaker: String,
    pub response: Vec<String>,
    pub hopper: String,
    pub house_light: String,
}

impl EngineRoles {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            speaker: config.speaker_role.clone(),
            response: config.response_roles.clone(),
            hopper: config.hopper_role.clone(),
            house_light: config.house_light_role.clone(),
        }
    }
}

/// Session-fatal errors. Component faults are not here: they are contained
/// per-trial and only escalate once the recovery budget is spent.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("block refused to start: {0}")]
    Queue(#[from] QueueError),
    #[error("panel misconfigured for engine: {0}")]
    Panel(#[from] PanelError),
    #[error("data sink failed: {0}")]
    Sink(#[from] SinkError),
    #[error("fault recovery budget spent after {recoveries} consecutive resets")]
    FaultBudgetExhausted { recoveries: u32 },
}

/// How one block finished.
#[derive(Clone, Copy, Debug)]
pub struct BlockSummary {
    pub trials: u32,
    pub stopped: bool,
}

/// Synchronous per-panel trial loop. Exactly one trial is in flight at a
/// time; every suspension point is a bounded poll.
pub struct TrialEngine<S: TrialSink> {
    panel: Panel,
    roles: EngineRoles,
    timeouts: TimeoutConfig,
    fault_retry_budget: u32,
    scoring: Box<dyn ScoringPolicy>,
    reinforcement: Box<dyn ConsequencePolicy>,
    sink: S,
    stop: StopHandle,
    clock: Arc<dyn Clock>,
    rng: StdRng,
    phase: TrialPhase,
    trial_index: u64,
}

impl<S: TrialSink> TrialEngine<S> {
    pub fn new(
        panel: Panel,
        config: &SessionConfig,
        scoring: Box<dyn ScoringPolicy>,
        reinforcement: Box<dyn ConsequencePolicy>,
        sink: S,
        stop: StopHandle,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            panel,
            roles: EngineRoles::from_config(config),
            timeouts: config.timeouts.clone(),
            fault_retry_budget: config.fault_retry_budget,
            scoring,
            reinforcement,
            sink,
            stop,
            clock,
            rng,
            phase: TrialPhase::Idle,
            trial_index: 0,
        }
    }

    pub fn phase(&self) -> TrialPhase {
        self.phase
    }

    pub fn panel_mut(&mut self) -> &mut Panel {
        &mut self.panel
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub(crate) fn rng_mut(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.stop.is_requested()
    }

    /// Run trials until the block exhausts, its budget is spent, or a stop
    /// request lands on a trial boundary.
    pub fn run_block(&mut self, block: &mut Block) -> Result<BlockSummary, SessionError> {
        let block_start = self.clock.elapsed();
        let mut trials = 0u32;
        let mut consecutive_recoveries = 0u32;

        loop {
            // Stop requests are honored here, between trials, and inside the
            // response wait; never mid-actuation.
            if self.stop.is_requested() {
                info!(block = block.index(), "stop honored at trial boundary");
                return Ok(BlockSummary {
                    trials,
                    stopped: true,
                });
            }
            if block.over_duration(self.clock.elapsed() - block_start) {
                info!(block = block.index(), "block duration budget reached");
                break;
            }
            let scheduled = match block.next(&mut self.rng) {
                Ok(scheduled) => scheduled,
                Err(BlockExhausted) => {
                    info!(block = block.index(), "block exhausted");
                    break;
                }
            };

            let record = self.run_trial(block.index(), &scheduled)?;
            trials += 1;
            block.record_outcome(OutcomeFeedback {
                correct: record.outcome.is_correct(),
                no_response: record.outcome == Outcome::NoResponse,
            });

            if record.fault {
                // Local recovery: drive the panel safe and charge the retry
                // budget; a clean trial pays it back down.
                consecutive_recoveries += 1;
                let report = self.panel.reset();
                if !report.is_clean() {
                    warn!(
                        faults = report.faults.len(),
                        "post-trial reset left faults"
                    );
                }
                if consecutive_recoveries > self.fault_retry_budget {
                    return Err(SessionError::FaultBudgetExhausted {
                        recoveries: consecutive_recoveries,
                    });
                }
            } else {
                consecutive_recoveries = 0;
            }

            if self.stop.is_requested() {
                info!(block = block.index(), "stop honored after logging");
                return Ok(BlockSummary {
                    trials,
                    stopped: true,
                });
            }
        }

        Ok(BlockSummary {
            trials,
            stopped: false,
        })
    }

    /// One full pass of the trial state machine. Component faults mark the
    /// trial and are contained; the engine always reaches `Logging` and
    /// returns to `Idle`.
    fn run_trial(
        &mut self,
        block_index: u32,
        scheduled: &ScheduledStimulus,
    ) -> Result<TrialRecord, SessionError> {
        self.trial_index += 1;
        let onset = Utc::now();
        let mut fault = false;

        // Present the stimulus and note the onset.
        self.phase = TrialPhase::Presenting;
        debug!(
            trial = self.trial_index,
            condition = %scheduled.condition.name,
            stimulus = %scheduled.stimulus.path,
            "presenting"
        );
        let speaker_role = self.roles.speaker.clone();
        match self.panel.speaker(&speaker_role) {
            Ok(speaker) => {
                if let Err(f) = speaker.play(&scheduled.stimulus.path, scheduled.gain_db()) {
                    self.note_fault(&speaker_role, &f);
                    fault = true;
                }
            }
            Err(err) => {
                warn!(%err, "stimulus output unavailable");
                fault = true;
            }
        }

        // Wait for a qualifying response; a timeout is a normal outcome.
        // The key light marks the response window.
        self.phase = TrialPhase::AwaitingResponse;
        if let Err(f) = self.panel.ready() {
            warn!(%f, "key light fault");
        }
        let (observed, response_fault) = self.await_response();
        fault |= response_fault;
        if let Err(f) = self.panel.idle() {
            warn!(%f, "key light fault");
        }
        if matches!(observed, ObservedResponse::Peck { .. }) {
            // A response interrupts whatever is still playing.
            if let Ok(speaker) = self.panel.speaker(&speaker_role) {
                let _ = speaker.stop();
            }
        }

        // Classify against the expected label.
        self.phase = TrialPhase::Scoring;
        let outcome = self.scoring.score(scheduled.expected(), &observed);

        // Deliver the consequence. Fault-affected trials are excluded from
        // consequation entirely; a fault raised here is recorded, never
        // propagated past logging.
        self.phase = TrialPhase::Consequating;
        let consequence = if fault {
            Consequence::None
        } else {
            self.reinforcement.consequence(
                outcome,
                scheduled.condition.is_rewarded,
                scheduled.condition.is_punished,
            )
        };
        match consequence {
            Consequence::Reward => {
                let role = self.roles.hopper.clone();
                let feed_for = self.timeouts.feed();
                match self.panel.hopper(&role) {
                    Ok(hopper) => {
                        if let Err(f) = hopper.feed(feed_for) {
                            self.note_fault(&role, &f);
                            fault = true;
                        }
                    }
                    Err(err) => {
                        warn!(%err, "reward device unavailable");
                        fault = true;
                    }
                }
            }
            Consequence::Punish => {
                let role = self.roles.house_light.clone();
                let dark_for = self.timeouts.punish();
                match self.panel.house_light(&role) {
                    Ok(light) => {
                        if let Err(f) = light.timeout(dark_for) {
                            self.note_fault(&role, &f);
                            fault = true;
                        }
                    }
                    Err(err) => {
                        warn!(%err, "punishment device unavailable");
                        fault = true;
                    }
                }
            }
            Consequence::None => {}
        }

        // Persist the immutable record.
        self.phase = TrialPhase::Logging;
        let latency_ms = match &observed {
            ObservedResponse::Peck { latency, .. } => Some(latency.as_millis() as u64),
            ObservedResponse::Timeout => None,
        };
        let record = TrialRecord {
            index: self.trial_index,
            timestamp_utc: onset,
            block_index,
            condition: scheduled.condition.name.clone(),
            stimulus: scheduled.stimulus.path.clone(),
            expected: scheduled.expected(),
            response: observed,
            outcome,
            consequence,
            fault,
            latency_ms,
        };
        self.sink.append(&record)?;
        debug!(trial = record.index, outcome = ?record.outcome, fault = record.fault, "logged");

        self.phase = TrialPhase::Idle;
        Ok(record)
    }

    /// Poll the response keys until a peck, a stop request, or the response
    /// timeout. Returns the observation plus whether a response component
    /// faulted during the wait.
    fn await_response(&mut self) -> (ObservedResponse, bool) {
        let timeout = self.timeouts.response();
        let poll = self.timeouts.poll_interval();
        let roles = self.roles.response.clone();
        let start = self.clock.elapsed();
        let mut fault = false;

        loop {
            if self.stop.is_requested() {
                info!("stop honored during response window");
                return (ObservedResponse::Timeout, fault);
            }
            for role in &roles {
                match self.panel.peck_port(role) {
                    Ok(port) => match port.status() {
                        Ok(true) => {
                            let latency = self.clock.elapsed() - start;
                            return (
                                ObservedResponse::Peck {
                                    role: role.clone(),
                                    latency,
                                },
                                fault,
                            );
                        }
                        Ok(false) => {}
                        Err(f) => {
                            self.note_fault(role, &f);
                            fault = true;
                        }
                    },
                    Err(_) => {
                        // Already out of service; the wait still times out
                        // on schedule.
                        fault = true;
                    }
                }
            }
            if self.clock.elapsed() - start >= timeout {
                return (ObservedResponse::Timeout, fault);
            }
            self.clock.sleep(poll);
        }
    }

    fn note_fault(&mut self, role: &str, fault: &ComponentFault) {
        warn!(role, %fault, "component fault");
        if fault.is_fatal() {
            self.panel.mark_unusable(role);
        }
    }
}
