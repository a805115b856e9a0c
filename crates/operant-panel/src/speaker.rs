use std::sync::Arc;

use tracing::debug;

use operant_core::audio::AudioDriver;
use operant_core::fault::ComponentFault;

/// Stimulus output component over the audio playback boundary.
pub struct Speaker {
    audio: Arc<dyn AudioDriver>,
}

impl Speaker {
    pub fn new(audio: Arc<dyn AudioDriver>) -> Self {
        Self { audio }
    }

    pub fn play(&mut self, source: &str, gain_db: f32) -> Result<(), ComponentFault> {
        debug!(source, gain_db, "playback start");
        self.audio.play(source, gain_db)?;
        Ok(())
    }

    /// Cut playback short, e.g. when a response interrupts the stimulus.
    pub fn stop(&mut self) -> Result<(), ComponentFault> {
        self.audio.stop()?;
        Ok(())
    }

    pub fn is_playing(&self) -> bool {
        self.audio.is_playing()
    }
}
