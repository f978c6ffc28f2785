//! Peak and mean-absolute amplitude of recorded PCM.
//!
//! Computed by the session worker as it drains the queue, never on the audio
//! thread.

use crate::models::audio_models::AudioLevels;

/// Full scale used to normalize 16-bit amplitudes to 0.0..=1.0.
const FULL_SCALE: f32 = 32768.0;

/// Running amplitude statistics over a stream of samples.
#[derive(Debug, Clone, Copy, Default)]
pub struct LevelMeter {
    peak: u16,
    sum_abs: u64,
    count: u64,
}

impl LevelMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, samples: &[i16]) {
        for sample in samples {
            let magnitude = sample.unsigned_abs();
            self.peak = self.peak.max(magnitude);
            self.sum_abs += magnitude as u64;
        }
        self.count += samples.len() as u64;
    }

    /// Largest absolute sample seen (0..=32768).
    pub fn peak(&self) -> u16 {
        self.peak
    }

    /// Mean absolute sample value, zero when nothing was observed.
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.sum_abs as f64 / self.count as f64
    }

    pub fn levels(&self) -> AudioLevels {
        AudioLevels {
            peak_level: self.peak as f32 / FULL_SCALE,
            mean_level: (self.mean() / FULL_SCALE as f64) as f32,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
