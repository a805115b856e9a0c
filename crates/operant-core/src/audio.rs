use crate::fault::AudioError;

/// Playback boundary to the sound hardware. `play` returns once playback has
/// started; the caller decides how long to let it run and may cut it short
/// with `stop` (e.g. when a response interrupts the stimulus).
pub trait AudioDriver: Send + Sync {
    fn play(&self, source: &str, gain_db: f32) -> Result<(), AudioError>;
    fn stop(&self) -> Result<(), AudioError>;
    fn is_playing(&self) -> bool;
}
