//! cpal input capture provider.
//!
//! Opens an input stream in the requested format and converts every device
//! buffer to interleaved 16-bit PCM before handing it to the `FrameSink`.
//! The cpal `Stream` is not `Send`, so it is built, played, and dropped on a
//! dedicated thread that parks until stop is requested.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleFormat, SizedSample, StreamConfig, SupportedStreamConfigRange};
use parking_lot::Mutex;

use wav_recorder_core::models::audio_models::{AudioSource, CaptureFormat};
use wav_recorder_core::models::error::CaptureError;
use wav_recorder_core::processing::convert::{deliver_as_pcm16, ToPcm16};
use wav_recorder_core::traits::capture_provider::{CaptureProvider, FrameSink};

use crate::device_enumerator::DeviceEnumerator;

/// Input capture through cpal.
///
/// The device is looked up by name when capture starts, so a provider can be
/// created before the device is plugged in.
pub struct CpalInputCapture {
    device_id: Option<String>,
    device_name: String,
    is_default: bool,
    stop_tx: Option<mpsc::Sender<()>>,
    capture_handle: Option<thread::JoinHandle<()>>,
    stream_error: Arc<Mutex<Option<String>>>,
}

impl CpalInputCapture {
    /// Create a capture for the system default input device.
    pub fn default_device() -> Result<Self, CaptureError> {
        let name = DeviceEnumerator::new()
            .default_input_device_name()
            .ok_or(CaptureError::DeviceNotAvailable)?;
        Ok(Self::new(None, name, true))
    }

    /// Create a capture for a specific input device by id (its cpal name).
    pub fn with_device(id: String) -> Self {
        let name = id.clone();
        Self::new(Some(id), name, false)
    }

    fn new(device_id: Option<String>, device_name: String, is_default: bool) -> Self {
        Self {
            device_id,
            device_name,
            is_default,
            stop_tx: None,
            capture_handle: None,
            stream_error: Arc::new(Mutex::new(None)),
        }
    }

    fn is_running(&self) -> bool {
        self.stop_tx.is_some()
    }
}

impl CaptureProvider for CpalInputCapture {
    fn is_available(&self) -> bool {
        DeviceEnumerator::new()
            .find_input_device(self.device_id.as_deref())
            .is_ok()
    }

    fn start(&mut self, format: CaptureFormat, sink: Box<dyn FrameSink>) -> Result<(), CaptureError> {
        if self.is_running() {
            return Err(CaptureError::InvalidState("input capture already running".into()));
        }

        *self.stream_error.lock() = None;
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(), CaptureError>>(1);
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let device_id = self.device_id.clone();
        let stream_error = Arc::clone(&self.stream_error);

        let handle = thread::Builder::new()
            .name("cpal-input-capture".into())
            .spawn(move || match open_stream(device_id.as_deref(), format, sink, stream_error) {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    // Either an explicit stop or the provider being dropped.
                    let _ = stop_rx.recv();
                    drop(stream);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| CaptureError::Internal(format!("failed to spawn capture thread: {}", e)))?;

        let opened = ready_rx
            .recv()
            .unwrap_or_else(|_| Err(CaptureError::Internal("capture thread exited during start".into())));
        if let Err(e) = opened {
            let _ = handle.join();
            return Err(e);
        }

        log::info!(
            "input capture started on {} ({} Hz, {} ch)",
            self.device_name,
            format.sample_rate,
            format.channels
        );
        self.stop_tx = Some(stop_tx);
        self.capture_handle = Some(handle);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        let Some(stop_tx) = self.stop_tx.take() else {
            return Ok(());
        };
        let _ = stop_tx.send(());
        if let Some(handle) = self.capture_handle.take() {
            if handle.join().is_err() {
                return Err(CaptureError::Internal("capture thread panicked".into()));
            }
        }
        log::info!("input capture stopped on {}", self.device_name);

        match self.stream_error.lock().take() {
            Some(message) => Err(CaptureError::Device(message)),
            None => Ok(()),
        }
    }

    fn device_info(&self) -> AudioSource {
        AudioSource {
            id: self.device_id.clone().unwrap_or_else(|| "default-input".into()),
            name: self.device_name.clone(),
            is_default: self.is_default,
        }
    }
}

impl Drop for CpalInputCapture {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::error!("failed to stop input capture: {}", e);
        }
    }
}

/// Find the device, pick a native sample format, and start a stream.
fn open_stream(
    device_id: Option<&str>,
    format: CaptureFormat,
    sink: Box<dyn FrameSink>,
    stream_error: Arc<Mutex<Option<String>>>,
) -> Result<cpal::Stream, CaptureError> {
    let device = DeviceEnumerator::new().find_input_device(device_id)?;

    let ranges = device
        .supported_input_configs()
        .map_err(|e| CaptureError::Device(format!("failed to query input configs: {}", e)))?;
    let sample_format = choose_sample_format(ranges, format).ok_or_else(|| {
        CaptureError::Device(format!(
            "device does not support {} Hz with {} channels",
            format.sample_rate, format.channels
        ))
    })?;

    let config = StreamConfig {
        channels: format.channels,
        sample_rate: cpal::SampleRate(format.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };
    log::debug!("opening input stream: {:?} as {:?}", config, sample_format);

    let stream = match sample_format {
        SampleFormat::I16 => build_stream_typed::<i16>(&device, &config, sink, stream_error),
        SampleFormat::F32 => build_stream_typed::<f32>(&device, &config, sink, stream_error),
        SampleFormat::I32 => build_stream_typed::<i32>(&device, &config, sink, stream_error),
        SampleFormat::U16 => build_stream_typed::<u16>(&device, &config, sink, stream_error),
        other => Err(CaptureError::Device(format!("unsupported sample format {:?}", other))),
    }?;

    stream
        .play()
        .map_err(|e| CaptureError::Device(format!("failed to start input stream: {}", e)))?;
    Ok(stream)
}

fn build_stream_typed<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut sink: Box<dyn FrameSink>,
    stream_error: Arc<Mutex<Option<String>>>,
) -> Result<cpal::Stream, CaptureError>
where
    T: SizedSample + ToPcm16 + Send + 'static,
{
    let channels = config.channels;
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                deliver_as_pcm16(data, channels, sink.as_mut());
            },
            move |err| {
                log::error!("input stream error: {}", err);
                *stream_error.lock() = Some(err.to_string());
            },
            None,
        )
        .map_err(|e| CaptureError::Device(format!("failed to build input stream: {}", e)))
}

/// Preference order among the formats the sink can take natively.
fn format_rank(format: SampleFormat) -> Option<u8> {
    match format {
        SampleFormat::I16 => Some(0),
        SampleFormat::F32 => Some(1),
        SampleFormat::I32 => Some(2),
        SampleFormat::U16 => Some(3),
        _ => None,
    }
}

/// Pick the best sample format among ranges matching the channel count and rate.
fn choose_sample_format<I>(ranges: I, format: CaptureFormat) -> Option<SampleFormat>
where
    I: IntoIterator<Item = SupportedStreamConfigRange>,
{
    ranges
        .into_iter()
        .filter(|r| r.channels() == format.channels)
        .filter(|r| {
            r.min_sample_rate().0 <= format.sample_rate && format.sample_rate <= r.max_sample_rate().0
        })
        .filter_map(|r| format_rank(r.sample_format()).map(|rank| (rank, r.sample_format())))
        .min_by_key(|(rank, _)| *rank)
        .map(|(_, sample_format)| sample_format)
}
