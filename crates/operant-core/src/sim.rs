//! Simulated drivers and clock backing the workspace test suites. Real
//! hardware sits behind the same traits; nothing here is reachable from a
//! production panel unless wired in explicitly.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use std::time::Duration;

use crate::audio::AudioDriver;
use crate::channel::{ChannelAddress, ChannelDirection, DioDriver};
use crate::clock::Clock;
use crate::fault::{AudioError, ChannelError};

/// Clock whose time only moves when something sleeps, so interlock timelines
/// run instantly in tests.
pub struct SimClock {
    now: Mutex<Duration>,
}

impl SimClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Duration::ZERO),
        }
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SimClock {
    fn elapsed(&self) -> Duration {
        *self.now.lock().unwrap()
    }

    fn sleep(&self, dur: Duration) {
        *self.now.lock().unwrap() += dur;
    }
}

#[derive(Clone, Debug)]
enum InputPlan {
    /// Holds whatever `set_input` last wrote.
    Manual,
    /// Mirrors an output line after `settle_reads` reads of this input,
    /// emulating a mechanical device settling into position.
    Follows {
        output: ChannelAddress,
        settle_reads: u32,
        countdown: u32,
    },
    /// Goes high for `width_reads` reads after `after_reads` reads,
    /// emulating a scripted peck.
    PulseAfter { after_reads: u32, width_reads: u32 },
}

#[derive(Clone, Debug)]
struct InputSim {
    value: bool,
    plan: InputPlan,
}

#[derive(Default)]
struct SimDioInner {
    outputs: BTreeMap<ChannelAddress, bool>,
    inputs: BTreeMap<ChannelAddress, InputSim>,
    unavailable: BTreeSet<ChannelAddress>,
}

/// Scriptable digital I/O driver. Unknown lines auto-register on first use:
/// reads create manual inputs, writes create outputs.
pub struct SimDio {
    inner: Mutex<SimDioInner>,
}

impl SimDio {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SimDioInner::default()),
        }
    }

    pub fn set_input(&self, address: ChannelAddress, value: bool) {
        let mut inner = self.inner.lock().unwrap();
        inner.inputs.insert(
            address,
            InputSim {
                value,
                plan: InputPlan::Manual,
            },
        );
    }

    /// Couple a sensor input to an actuator output with a settle delay
    /// measured in reads. `settle_reads == 0` settles immediately.
    pub fn follow(&self, input: ChannelAddress, output: ChannelAddress, settle_reads: u32) {
        let mut inner = self.inner.lock().unwrap();
        inner.inputs.insert(
            input,
            InputSim {
                value: false,
                plan: InputPlan::Follows {
                    output,
                    settle_reads,
                    countdown: 0,
                },
            },
        );
    }

    /// Script a response pulse on an input line.
    pub fn pulse_after(&self, address: ChannelAddress, after_reads: u32, width_reads: u32) {
        let mut inner = self.inner.lock().unwrap();
        inner.inputs.insert(
            address,
            InputSim {
                value: false,
                plan: InputPlan::PulseAfter {
                    after_reads,
                    width_reads,
                },
            },
        );
    }

    pub fn make_unavailable(&self, address: ChannelAddress) {
        self.inner.lock().unwrap().unavailable.insert(address);
    }

    pub fn output_value(&self, address: &ChannelAddress) -> bool {
        self.inner
            .lock()
            .unwrap()
            .outputs
            .get(address)
            .copied()
            .unwrap_or(false)
    }
}

impl Default for SimDio {
    fn default() -> Self {
        Self::new()
    }
}

impl DioDriver for SimDio {
    fn read_line(&self, address: &ChannelAddress) -> Result<bool, ChannelError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.unavailable.contains(address) {
            return Err(ChannelError::Unavailable(address.clone()));
        }
        if let Some(value) = inner.outputs.get(address) {
            // Output lines read back their commanded value.
            return Ok(*value);
        }

        let target = match inner.inputs.get(address).map(|i| i.plan.clone()) {
            Some(InputPlan::Follows { ref output, .. }) => {
                inner.outputs.get(output).copied().unwrap_or(false)
            }
            _ => false,
        };

        let input = inner.inputs.entry(address.clone()).or_insert(InputSim {
            value: false,
            plan: InputPlan::Manual,
        });

        match &mut input.plan {
            InputPlan::Manual => {}
            InputPlan::Follows {
                settle_reads,
                countdown,
                ..
            } => {
                // `settle_reads` reads still see the old position before the
                // sensor flips to the commanded one.
                if input.value != target {
                    if *countdown == 0 {
                        *countdown = *settle_reads + 1;
                    }
                    *countdown -= 1;
                    if *countdown == 0 {
                        input.value = target;
                    }
                } else {
                    *countdown = 0;
                }
            }
            InputPlan::PulseAfter {
                after_reads,
                width_reads,
            } => {
                if *after_reads > 0 {
                    *after_reads -= 1;
                    input.value = false;
                } else if *width_reads > 0 {
                    *width_reads -= 1;
                    input.value = true;
                } else {
                    input.value = false;
                }
            }
        }

        Ok(input.value)
    }

    fn write_line(&self, address: &ChannelAddress, value: bool) -> Result<(), ChannelError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.unavailable.contains(address) {
            return Err(ChannelError::Unavailable(address.clone()));
        }
        if inner.inputs.contains_key(address) {
            return Err(ChannelError::WrongDirection {
                address: address.clone(),
                required: ChannelDirection::Output,
                actual: ChannelDirection::Input,
            });
        }
        inner.outputs.insert(address.clone(), value);
        Ok(())
    }
}

/// Audio driver that records what it was asked to play.
pub struct SimAudio {
    played: Mutex<Vec<(String, f32)>>,
    playing: Mutex<bool>,
    fail: bool,
}

impl SimAudio {
    pub fn new() -> Self {
        Self {
            played: Mutex::new(Vec::new()),
            playing: Mutex::new(false),
            fail: false,
        }
    }

    /// An audio device that refuses every playback.
    pub fn unavailable() -> Self {
        Self {
            played: Mutex::new(Vec::new()),
            playing: Mutex::new(false),
            fail: true,
        }
    }

    pub fn played(&self) -> Vec<(String, f32)> {
        self.played.lock().unwrap().clone()
    }
}

impl Default for SimAudio {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioDriver for SimAudio {
    fn play(&self, source: &str, gain_db: f32) -> Result<(), AudioError> {
        if self.fail {
            return Err(AudioError::DeviceUnavailable);
        }
        self.played
            .lock()
            .unwrap()
            .push((source.to_string(), gain_db));
        *self.playing.lock().unwrap() = true;
        Ok(())
    }

    fn stop(&self) -> Result<(), AudioError> {
        *self.playing.lock().unwrap() = false;
        Ok(())
    }

    fn is_playing(&self) -> bool {
        *self.playing.lock().unwrap()
    }
}
