use std::sync::Arc;
use std::time::Duration;

use operant_core::channel::{InputChannel, OutputChannel};
use operant_core::clock::Clock;
use operant_core::fault::ComponentFault;

/// Response key: an IR beam the subject breaks by pecking, plus an LED cue.
/// Same owned-channel structure as the hopper, without a verified actuator.
pub struct PeckPort {
    ir: InputChannel,
    led: OutputChannel,
    poll_interval: Duration,
    clock: Arc<dyn Clock>,
}

impl PeckPort {
    pub fn new(
        ir: InputChannel,
        led: OutputChannel,
        poll_interval: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ir,
            led,
            poll_interval,
            clock,
        }
    }

    /// Debounced state of the IR beam.
    pub fn status(&mut self) -> Result<bool, ComponentFault> {
        Ok(self.ir.read()?)
    }

    pub fn on(&mut self) -> Result<(), ComponentFault> {
        self.led.write(true)?;
        Ok(())
    }

    pub fn off(&mut self) -> Result<(), ComponentFault> {
        self.led.write(false)?;
        Ok(())
    }

    /// Flash the LED for `dur` at the given inter-switch interval, restoring
    /// the previous LED state afterwards.
    pub fn flash(&mut self, dur: Duration, isi: Duration) -> Result<(), ComponentFault> {
        let restore = self.led.commanded();
        let start = self.clock.elapsed();
        while self.clock.elapsed() - start < dur {
            self.led.toggle()?;
            self.clock.sleep(isi);
        }
        self.led.write(restore)?;
        Ok(())
    }

    /// Poll the beam until a peck or `timeout`; returns the latency of the
    /// first peck, or `None` on timeout. Timeout is a normal outcome here.
    pub fn poll(&mut self, timeout: Duration) -> Result<Option<Duration>, ComponentFault> {
        let start = self.clock.elapsed();
        loop {
            if self.ir.read()? {
                return Ok(Some(self.clock.elapsed() - start));
            }
            if self.clock.elapsed() - start >= timeout {
                return Ok(None);
            }
            self.clock.sleep(self.poll_interval);
        }
    }
}
