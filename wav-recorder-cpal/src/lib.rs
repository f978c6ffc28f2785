//! # wav-recorder-cpal
//!
//! Cross-platform input-device backend for wav-recorder, built on cpal.
//!
//! Provides:
//! - `CpalInputCapture`: microphone/line-in capture through the host's default audio API
//! - `DeviceEnumerator`: input device listing and lookup
//!
//! ## Usage
//! ```ignore
//! use wav_recorder_cpal::CpalInputCapture;
//! use wav_recorder_core::{CaptureConfiguration, RecordingSession};
//!
//! let input = CpalInputCapture::default_device()?;
//! let session = RecordingSession::new(input, CaptureConfiguration::default())?;
//! let handle = session.begin_session("take.wav")?;
//! ```

pub mod cpal_input;
pub mod device_enumerator;

pub use cpal_input::CpalInputCapture;
pub use device_enumerator::DeviceEnumerator;
