//! Conversion of device-native samples into 16-bit PCM.

use crate::traits::capture_provider::FrameSink;

/// Samples converted per chunk by [`deliver_as_pcm16`].
pub const CONVERT_CHUNK: usize = 1024;

/// A device sample type that can be written as 16-bit signed PCM.
pub trait ToPcm16: Copy {
    fn to_pcm16(self) -> i16;
}

impl ToPcm16 for i16 {
    fn to_pcm16(self) -> i16 {
        self
    }
}

impl ToPcm16 for u16 {
    fn to_pcm16(self) -> i16 {
        (self ^ 0x8000) as i16
    }
}

impl ToPcm16 for i32 {
    fn to_pcm16(self) -> i16 {
        (self >> 16) as i16
    }
}

impl ToPcm16 for f32 {
    /// Clamps to `[-1.0, 1.0]`; NaN becomes silence.
    fn to_pcm16(self) -> i16 {
        if self.is_nan() {
            return 0;
        }
        (self.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
    }
}

/// Convert `samples` and hand them to `sink` in order.
///
/// Uses a fixed stack buffer so it is safe to call from a real-time
/// callback: nothing is allocated regardless of the input length. Chunks
/// are cut on frame boundaries of `channels`.
pub fn deliver_as_pcm16<T: ToPcm16>(samples: &[T], channels: u16, sink: &mut dyn FrameSink) {
    let channels = (channels.max(1) as usize).min(CONVERT_CHUNK);
    let chunk_len = CONVERT_CHUNK - CONVERT_CHUNK % channels;
    let mut scratch = [0i16; CONVERT_CHUNK];
    for chunk in samples.chunks(chunk_len) {
        for (out, &sample) in scratch.iter_mut().zip(chunk) {
            *out = sample.to_pcm16();
        }
        sink.on_frames_delivered(&scratch[..chunk.len()]);
    }
}
