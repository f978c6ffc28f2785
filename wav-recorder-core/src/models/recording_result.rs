use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::audio_models::{AudioLevels, CaptureFormat, CaptureSessionDiagnostics};

/// Result returned when a recording has been finalized.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordingResult {
    pub session_id: Uuid,
    pub file_path: PathBuf,
    pub format: CaptureFormat,
    /// Size of the WAV `data` chunk in bytes.
    pub data_bytes: u64,
    pub started_at: DateTime<Utc>,
    /// SHA-256 hex digest of the finalized file.
    pub checksum: String,
    pub diagnostics: CaptureSessionDiagnostics,
    /// Peak and mean amplitude over everything written.
    pub levels: AudioLevels,
}

impl RecordingResult {
    /// Number of complete frames in the data chunk.
    pub fn frames(&self) -> u64 {
        self.data_bytes / (self.format.channels as u64 * 2)
    }

    /// Playback duration derived from the frame count.
    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.format.sample_rate as f64
    }
}
