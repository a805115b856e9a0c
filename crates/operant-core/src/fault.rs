use thiserror::Error;

use crate::channel::{ChannelAddress, ChannelDirection};

/// Errors raised at the raw line level. `Unavailable` is fatal for the
/// component that owns the line.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel {0} cannot be addressed")]
    Unavailable(ChannelAddress),
    #[error("channel {address} is {actual:?}, operation requires {required:?}")]
    WrongDirection {
        address: ChannelAddress,
        required: ChannelDirection,
        actual: ChannelDirection,
    },
}

/// Errors raised by the audio playback boundary.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("audio device cannot be addressed")]
    DeviceUnavailable,
    #[error("stimulus source {0} cannot be opened")]
    BadSource(String),
}

/// Device-level fault taxonomy shared by every component.
///
/// `PrecheckFailed` aborts before acting and does not transition state.
/// `ActuationMismatch` means command and sensor feedback disagreed past the
/// confirmation timeout; the component latches in its fault state until an
/// explicit reset.
#[derive(Debug, Error)]
pub enum ComponentFault {
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),
    #[error("audio error: {0}")]
    Audio(#[from] AudioError),
    #[error("device in unexpected position before actuation: {detail}")]
    PrecheckFailed { detail: String },
    #[error("actuator commanded {commanded} but sensor read {sensed} after {waited_ms} ms")]
    ActuationMismatch {
        commanded: bool,
        sensed: bool,
        waited_ms: u64,
    },
}

impl ComponentFault {
    /// Faults that make the owning component unusable for the rest of the
    /// session, as opposed to faults a reset can recover.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ComponentFault::Channel(ChannelError::Unavailable(_))
                | ComponentFault::Audio(AudioError::DeviceUnavailable)
        )
    }
}
