use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use operant_core::channel::OutputChannel;
use operant_core::clock::Clock;
use operant_core::fault::ComponentFault;

/// Overhead box light. Simple pass-through component; doubles as the
/// punishment device via `timeout`.
pub struct HouseLight {
    light: OutputChannel,
    clock: Arc<dyn Clock>,
}

impl HouseLight {
    pub fn new(light: OutputChannel, clock: Arc<dyn Clock>) -> Self {
        Self { light, clock }
    }

    pub fn on(&mut self) -> Result<(), ComponentFault> {
        self.light.write(true)?;
        Ok(())
    }

    pub fn off(&mut self) -> Result<(), ComponentFault> {
        self.light.write(false)?;
        Ok(())
    }

    pub fn is_on(&self) -> bool {
        self.light.commanded()
    }

    /// Lights-off punishment: dark for `dur`, then back on.
    pub fn timeout(&mut self, dur: Duration) -> Result<(), ComponentFault> {
        debug!(dur_ms = dur.as_millis() as u64, "house light timeout");
        self.light.write(false)?;
        self.clock.sleep(dur);
        self.light.write(true)?;
        Ok(())
    }
}

/// Three-LED cue light. At most one color is lit at a time.
pub struct CueLight {
    red: OutputChannel,
    green: OutputChannel,
    blue: OutputChannel,
}

impl CueLight {
    pub fn new(red: OutputChannel, green: OutputChannel, blue: OutputChannel) -> Self {
        Self { red, green, blue }
    }

    pub fn red(&mut self) -> Result<(), ComponentFault> {
        self.green.write(false)?;
        self.blue.write(false)?;
        self.red.write(true)?;
        Ok(())
    }

    pub fn green(&mut self) -> Result<(), ComponentFault> {
        self.red.write(false)?;
        self.blue.write(false)?;
        self.green.write(true)?;
        Ok(())
    }

    pub fn blue(&mut self) -> Result<(), ComponentFault> {
        self.red.write(false)?;
        self.green.write(false)?;
        self.blue.write(true)?;
        Ok(())
    }

    pub fn off(&mut self) -> Result<(), ComponentFault> {
        self.red.write(false)?;
        self.green.write(false)?;
        self.blue.write(false)?;
        Ok(())
    }
}
