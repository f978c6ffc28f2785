//! # wav-recorder-core
//!
//! Platform-agnostic core of the recorder.
//!
//! Captures interleaved 16-bit PCM from a device backend and streams it into a
//! WAV file whose header is written up front and patched on close. Device
//! backends implement the `CaptureProvider` trait and plug into the generic
//! `RecordingSession`.
//!
//! ## Architecture
//!
//! ```text
//! wav-recorder-core (this crate)
//! ├── traits/       ← CaptureProvider, FrameSink, CaptureDelegate
//! ├── models/       ← CaptureError, CaptureState, CaptureConfiguration, RecordingResult
//! ├── processing/   ← WAV header layout, lock-free SampleQueue, PCM conversion
//! ├── session/      ← RecordingSession state machine, elapsed timing, fixed-duration capture
//! └── storage/      ← WavWriter
//! ```

pub mod models;
pub mod processing;
pub mod session;
pub mod storage;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use models::audio_models::{AudioLevels, AudioSource, CaptureFormat, CaptureSessionDiagnostics};
pub use models::config::CaptureConfiguration;
pub use models::error::CaptureError;
pub use models::recording_result::RecordingResult;
pub use models::state::CaptureState;
pub use processing::convert::{deliver_as_pcm16, ToPcm16};
pub use processing::levels::LevelMeter;
pub use processing::sample_queue::{sample_queue, SampleConsumer, SampleProducer};
pub use processing::wav_format::{WavHeader, WavSpec, WAV_HEADER_SIZE};
pub use session::fixed::record_fixed_duration;
pub use session::recorder::{RecordingSession, SessionHandle};
pub use storage::wav_writer::WavWriter;
pub use traits::capture_delegate::CaptureDelegate;
pub use traits::capture_provider::{CaptureProvider, FrameSink};
