use crate::models::audio_models::AudioLevels;
use crate::models::error::CaptureError;
use crate::models::recording_result::RecordingResult;
use crate::models::state::CaptureState;

/// Event delegate for recording session notifications.
///
/// All methods are called from the session worker thread, never from the
/// audio thread. Implementations should marshal to the UI thread if needed.
pub trait CaptureDelegate: Send + Sync {
    /// Called when the session state changes.
    fn on_state_changed(&self, state: CaptureState);

    /// Called each time the elapsed-seconds counter advances.
    fn on_elapsed(&self, _elapsed_secs: u64) {}

    /// Called each second with the levels of the audio written in that second.
    fn on_levels_updated(&self, _levels: &AudioLevels) {}

    /// Called when an error is recorded during capture.
    fn on_error(&self, error: &CaptureError);

    /// Called once the file has been finalized.
    fn on_capture_finished(&self, result: &RecordingResult);
}
