use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use operant_core::clock::Clock;
use operant_core::config::SessionConfig;
use operant_panel::panel::Panel;
use operant_queue::block::Block;

use crate::consequence::ConsequencePolicy;
use crate::engine::{SessionError, TrialEngine};
use crate::record::TrialSink;
use crate::scoring::ScoringPolicy;

/// External stop signal. Cloneable so the CLI layer can hold one while the
/// session runs; honored at trial boundaries and inside the response wait,
/// never mid-actuation.
#[derive(Clone, Default)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Debug)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub subject: String,
    pub blocks_completed: u32,
    pub trials: u64,
    pub stopped: bool,
}

/// Drives one panel through the configured sequence of blocks. Blocks are
/// constructed eagerly, one at a time, so a malformed block refuses to start
/// before any of its trials run.
pub struct SessionRunner<S: TrialSink> {
    engine: TrialEngine<S>,
    config: SessionConfig,
    stop: StopHandle,
}

impl<S: TrialSink> SessionRunner<S> {
    pub fn new(
        panel: Panel,
        config: SessionConfig,
        scoring: Box<dyn ScoringPolicy>,
        reinforcement: Box<dyn ConsequencePolicy>,
        sink: S,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let stop = StopHandle::new();
        let engine = TrialEngine::new(
            panel,
            &config,
            scoring,
            reinforcement,
            sink,
            stop.clone(),
            clock,
        );
        Self {
            engine,
            config,
            stop,
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn sink(&self) -> &S {
        self.engine.sink()
    }

    pub fn engine(&self) -> &TrialEngine<S> {
        &self.engine
    }

    /// Run every configured block. On any session-fatal error the panel is
    /// left in its safe reset state and every record appended so far stays
    /// persisted.
    pub fn run(&mut self) -> Result<SessionSummary, SessionError> {
        let session_id = Uuid::new_v4();
        info!(%session_id, subject = %self.config.subject, "session start");

        let mut summary = SessionSummary {
            session_id,
            subject: self.config.subject.clone(),
            blocks_completed: 0,
            trials: 0,
            stopped: false,
        };

        for (index, block_config) in self.config.blocks.iter().enumerate() {
            if self.engine.stop_requested() {
                summary.stopped = true;
                break;
            }

            let mut block = match Block::from_config(index as u32, block_config, self.engine.rng_mut())
            {
                Ok(block) => block,
                Err(err) => {
                    warn!(block = index, %err, "block refused to start");
                    self.engine.panel_mut().reset();
                    return Err(err.into());
                }
            };

            match self.engine.run_block(&mut block) {
                Ok(outcome) => {
                    summary.trials += u64::from(outcome.trials);
                    summary.blocks_completed += 1;
                    if outcome.stopped {
                        summary.stopped = true;
                        break;
                    }
                }
                Err(err) => {
                    warn!(block = index, %err, "session abort");
                    self.engine.panel_mut().reset();
                    return Err(err);
                }
            }
        }

        self.engine.panel_mut().reset();
        info!(
            %session_id,
            trials = summary.trials,
            blocks = summary.blocks_completed,
            stopped = summary.stopped,
            "session finished"
        );
        Ok(summary)
    }
}
