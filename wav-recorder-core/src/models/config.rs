use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::audio_models::CaptureFormat;
use super::error::CaptureError;

/// Upper bound on interleaved channels a session accepts.
pub const MAX_CHANNELS: u16 = 32;

/// Configuration for a recording session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfiguration {
    /// Frame rate in Hz (default: 44100).
    pub sample_rate: u32,

    /// Number of interleaved channels (default: 2).
    pub channels: u16,

    /// Bit depth of the written PCM. Only 16 is supported.
    pub bit_depth: u16,

    /// Specific input device ID, or None for the system default.
    pub device_id: Option<String>,

    /// Stop automatically after this many whole seconds (None = until stopped).
    pub max_duration_secs: Option<u64>,

    /// Seconds of audio the hand-off queue can hold before dropping samples.
    pub queue_capacity_secs: f64,

    /// How often the session worker moves queued samples into the file.
    #[serde(with = "duration_millis")]
    pub drain_interval: Duration,
}

impl CaptureConfiguration {
    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.sample_rate == 0 {
            return Err(CaptureError::InvalidArgument("sample rate must be positive".into()));
        }
        if self.channels == 0 || self.channels > MAX_CHANNELS {
            return Err(CaptureError::InvalidArgument(format!(
                "unsupported channel count: {}",
                self.channels
            )));
        }
        if self.bit_depth != 16 {
            return Err(CaptureError::InvalidArgument(format!(
                "unsupported bit depth: {} (only 16-bit PCM is written)",
                self.bit_depth
            )));
        }
        if self.queue_capacity_secs.is_nan() || self.queue_capacity_secs <= 0.0 {
            return Err(CaptureError::InvalidArgument("queue capacity must be positive".into()));
        }
        if self.drain_interval.is_zero() {
            return Err(CaptureError::InvalidArgument("drain interval must be non-zero".into()));
        }
        Ok(())
    }

    pub fn format(&self) -> CaptureFormat {
        CaptureFormat {
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }

    /// Hand-off queue capacity in samples, rounded up to whole frames.
    pub fn queue_capacity_samples(&self) -> usize {
        let frames = (self.sample_rate as f64 * self.queue_capacity_secs).ceil() as usize;
        frames.max(1) * self.channels as usize
    }
}

impl Default for CaptureConfiguration {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 2,
            bit_depth: 16,
            device_id: None,
            max_duration_secs: None,
            queue_capacity_secs: 2.0,
            drain_interval: Duration::from_millis(20),
        }
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
