use serde::{Deserialize, Serialize};

/// Frame layout negotiated with the capture device.
///
/// Samples are always delivered as interleaved 16-bit PCM; backends
/// convert from the device's native sample type before delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaptureFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// An audio input device available for capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioSource {
    pub id: String,
    pub name: String,
    pub is_default: bool,
}

/// Recorded amplitude, normalized to full scale (0.0..=1.0).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AudioLevels {
    /// Largest absolute sample.
    pub peak_level: f32,
    /// Mean absolute sample.
    pub mean_level: f32,
}

/// Delivery counters for debugging a capture session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CaptureSessionDiagnostics {
    /// Number of device callbacks that delivered frames.
    pub callback_count: u64,
    /// Samples accepted into the hand-off queue.
    pub samples_delivered: u64,
    /// Samples dropped because the hand-off queue was full.
    pub samples_dropped: u64,
    /// Payload bytes appended to the WAV data chunk.
    pub bytes_written: u64,
    /// Appends that failed and were skipped.
    pub write_errors: u64,
}
