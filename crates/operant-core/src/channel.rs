use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::fault::ChannelError;

/// Physical line address on a box controller (e.g. an Arduino pin).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelAddress {
    pub device: String,
    pub line: u16,
}

impl ChannelAddress {
    pub fn new(device: impl Into<String>, line: u16) -> Self {
        Self {
            device: device.into(),
            line,
        }
    }
}

impl fmt::Display for ChannelAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.device, self.line)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelDirection {
    Input,
    Output,
}

/// Capability boundary to the digital I/O driver. The rest of the workspace
/// never touches a raw driver except through this trait.
///
/// Implementations keep their own interior synchronization; one panel is the
/// only writer of its lines.
pub trait DioDriver: Send + Sync {
    fn read_line(&self, address: &ChannelAddress) -> Result<bool, ChannelError>;
    fn write_line(&self, address: &ChannelAddress, value: bool) -> Result<(), ChannelError>;
}

/// Debounced boolean input line. Owned exclusively by one component.
pub struct InputChannel {
    address: ChannelAddress,
    debounce: Duration,
    driver: Arc<dyn DioDriver>,
    clock: Arc<dyn Clock>,
    last_value: bool,
}

impl InputChannel {
    pub fn new(
        address: ChannelAddress,
        debounce: Duration,
        driver: Arc<dyn DioDriver>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            address,
            debounce,
            driver,
            clock,
            last_value: false,
        }
    }

    pub fn address(&self) -> &ChannelAddress {
        &self.address
    }

    /// Most recent debounced sample. A changed reading is confirmed with a
    /// second sample one debounce window later, so this never blocks longer
    /// than the configured window.
    pub fn read(&mut self) -> Result<bool, ChannelError> {
        let sample = self.driver.read_line(&self.address)?;
        if sample == self.last_value {
            return Ok(sample);
        }
        self.clock.sleep(self.debounce);
        let confirmed = self.driver.read_line(&self.address)?;
        if confirmed == sample {
            self.last_value = confirmed;
        }
        Ok(self.last_value)
    }

    pub fn last_value(&self) -> bool {
        self.last_value
    }
}

/// Commanded boolean output line. `write` returns once the command has been
/// issued, not once the device has settled; settling is the owning
/// component's interlock to verify.
pub struct OutputChannel {
    address: ChannelAddress,
    driver: Arc<dyn DioDriver>,
    commanded: bool,
}

impl OutputChannel {
    pub fn new(address: ChannelAddress, driver: Arc<dyn DioDriver>) -> Self {
        Self {
            address,
            driver,
            commanded: false,
        }
    }

    pub fn address(&self) -> &ChannelAddress {
        &self.address
    }

    pub fn write(&mut self, value: bool) -> Result<(), ChannelError> {
        self.driver.write_line(&self.address, value)?;
        self.commanded = value;
        Ok(())
    }

    pub fn toggle(&mut self) -> Result<(), ChannelError> {
        self.write(!self.commanded)
    }

    /// Last value commanded on this line, mirrored locally.
    pub fn commanded(&self) -> bool {
        self.commanded
    }
}
