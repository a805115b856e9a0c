use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use operant_core::channel::{InputChannel, OutputChannel};
use operant_core::clock::Clock;
use operant_core::fault::ComponentFault;

/// Interlocked feeder state. `Fault` is terminal until an explicit `reset`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HopperState {
    Down,
    Raising,
    Up,
    Lowering,
    Fault,
}

/// Timing returned by a successful feed.
#[derive(Clone, Copy, Debug)]
pub struct FeedSummary {
    /// Requested hold duration.
    pub commanded: Duration,
    /// Time the hopper actually spent raised, confirmation included.
    pub raised_for: Duration,
}

/// Food hopper: a solenoid actuator and an independent position sensor.
///
/// Every transition cross-checks the commanded value against the sensor
/// within a bounded confirmation window. Command path and feedback path must
/// agree or the hopper latches `Fault`; a jammed feeder must never be
/// mistaken for a subject response.
pub struct Hopper {
    solenoid: OutputChannel,
    position: InputChannel,
    confirm_timeout: Duration,
    poll_interval: Duration,
    clock: Arc<dyn Clock>,
    state: HopperState,
}

impl Hopper {
    pub fn new(
        solenoid: OutputChannel,
        position: InputChannel,
        confirm_timeout: Duration,
        poll_interval: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            solenoid,
            position,
            confirm_timeout,
            poll_interval,
            clock,
            state: HopperState::Down,
        }
    }

    pub fn state(&self) -> HopperState {
        self.state
    }

    /// Compare commanded and sensed position right now. A disagreement
    /// latches `Fault` immediately.
    pub fn check(&mut self) -> Result<bool, ComponentFault> {
        let sensed = self.position.read()?;
        let commanded = self.solenoid.commanded();
        if sensed != commanded {
            self.state = HopperState::Fault;
            return Err(ComponentFault::ActuationMismatch {
                commanded,
                sensed,
                waited_ms: 0,
            });
        }
        Ok(sensed)
    }

    /// Raise the hopper, hold it for `duration`, lower it again, verifying
    /// the position sensor at every step.
    pub fn feed(&mut self, duration: Duration) -> Result<FeedSummary, ComponentFault> {
        // 1. Precheck before acting: aborts, never transitions state.
        if self.state == HopperState::Fault {
            return Err(ComponentFault::PrecheckFailed {
                detail: "hopper latched in fault, reset required".to_string(),
            });
        }
        if self.position.read()? {
            return Err(ComponentFault::PrecheckFailed {
                detail: "position sensor reads raised before feed".to_string(),
            });
        }

        // 2. Command up and verify the sensor agrees within the window.
        self.solenoid.write(true)?;
        self.state = HopperState::Raising;
        debug!(timeout_ms = self.confirm_timeout.as_millis() as u64, "hopper raising");
        let raise_latency = self.confirm(true)?;
        self.state = HopperState::Up;

        // 3. Hold raised, re-verifying the interlock each poll.
        let hold_start = self.clock.elapsed();
        while self.clock.elapsed() - hold_start < duration {
            self.clock.sleep(self.poll_interval);
            if !self.position.read()? {
                warn!("hopper dropped while commanded up");
                let _ = self.solenoid.write(false);
                self.state = HopperState::Fault;
                return Err(ComponentFault::ActuationMismatch {
                    commanded: true,
                    sensed: false,
                    waited_ms: (self.clock.elapsed() - hold_start).as_millis() as u64,
                });
            }
        }

        // 4. Command down and verify again.
        self.solenoid.write(false)?;
        self.state = HopperState::Lowering;
        debug!("hopper lowering");
        self.confirm(false)?;
        self.state = HopperState::Down;

        Ok(FeedSummary {
            commanded: duration,
            raised_for: raise_latency + (self.clock.elapsed() - hold_start),
        })
    }

    /// Drop the hopper and confirm it is down. This is the only way out of
    /// `Fault`.
    pub fn reset(&mut self) -> Result<(), ComponentFault> {
        self.solenoid.write(false)?;
        self.state = HopperState::Lowering;
        self.confirm(false)?;
        self.state = HopperState::Down;
        Ok(())
    }

    /// Poll the position sensor until it reads `want` or the confirmation
    /// window elapses. Timeout and channel loss both latch `Fault`.
    fn confirm(&mut self, want: bool) -> Result<Duration, ComponentFault> {
        let start = self.clock.elapsed();
        loop {
            match self.position.read() {
                Ok(sensed) if sensed == want => return Ok(self.clock.elapsed() - start),
                Ok(sensed) => {
                    if self.clock.elapsed() - start >= self.confirm_timeout {
                        self.state = HopperState::Fault;
                        return Err(ComponentFault::ActuationMismatch {
                            commanded: want,
                            sensed,
                            waited_ms: self.confirm_timeout.as_millis() as u64,
                        });
                    }
                    self.clock.sleep(self.poll_interval);
                }
                Err(err) => {
                    self.state = HopperState::Fault;
                    return Err(err.into());
                }
            }
        }
    }
}
