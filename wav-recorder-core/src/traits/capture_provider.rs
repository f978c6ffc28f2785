use crate::models::audio_models::{AudioSource, CaptureFormat};
use crate::models::error::CaptureError;

/// Receiver of captured audio, invoked from the device's audio thread.
///
/// `samples` holds whole frames of interleaved 16-bit PCM in delivery order.
/// Implementations run under real-time constraints: they must not allocate,
/// block on locks shared with non-real-time code, or perform I/O.
pub trait FrameSink: Send {
    fn on_frames_delivered(&mut self, samples: &[i16]);
}

/// Interface for platform-specific audio input devices.
///
/// Implemented by:
/// - `CpalInputCapture` (wav-recorder-cpal)
pub trait CaptureProvider: Send {
    /// Whether this capture source is currently available.
    fn is_available(&self) -> bool;

    /// Open the device with `format` and start delivering frames to `sink`.
    ///
    /// Fails with a device error if the device cannot be opened or started;
    /// in that case no delivery ever reaches `sink`.
    fn start(&mut self, format: CaptureFormat, sink: Box<dyn FrameSink>) -> Result<(), CaptureError>;

    /// Stop capturing and release the device.
    ///
    /// When this returns, no further deliveries are pending.
    fn stop(&mut self) -> Result<(), CaptureError>;

    /// Information about the audio device backing this provider.
    fn device_info(&self) -> AudioSource;
}
