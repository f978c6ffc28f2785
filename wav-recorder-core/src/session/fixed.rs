//! Fixed-duration capture: record a known number of frames into memory,
//! then write the whole buffer in one pass.

use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use uuid::Uuid;

use crate::models::audio_models::CaptureSessionDiagnostics;
use crate::models::config::CaptureConfiguration;
use crate::models::error::CaptureError;
use crate::models::recording_result::RecordingResult;
use crate::processing::levels::LevelMeter;
use crate::processing::sample_queue::sample_queue;
use crate::processing::wav_format::{WavSpec, BYTES_PER_SAMPLE, MAX_DATA_SIZE};
use crate::storage::wav_writer;
use crate::traits::capture_provider::CaptureProvider;

/// Extra time allowed for the device to deliver the last buffers.
const DELIVERY_GRACE: Duration = Duration::from_secs(1);

/// Record `duration` of audio from `provider` into `path`.
///
/// The hand-off queue is sized to exactly the requested number of frames, so
/// deliveries past that point are dropped and counted. If the device delivers
/// fewer frames before the grace period runs out, the file holds what arrived.
pub fn record_fixed_duration<P: CaptureProvider>(
    provider: &mut P,
    path: &Path,
    config: &CaptureConfiguration,
    duration: Duration,
) -> Result<RecordingResult, CaptureError> {
    config.validate()?;
    let spec = WavSpec::new(config.sample_rate, config.channels)?;

    let total_samples = fixed_sample_count(spec, duration)?;

    let (producer, mut consumer) = sample_queue(total_samples, spec.channels);
    let stats = producer.stats();
    let started_at = Utc::now();

    provider.start(config.format(), Box::new(producer))?;
    log::info!(
        "fixed-duration capture started: {} frames to {}",
        total_samples / spec.channels as usize,
        path.display()
    );

    let deadline = Instant::now() + duration + DELIVERY_GRACE;
    while consumer.len() < total_samples && Instant::now() < deadline {
        thread::sleep(config.drain_interval);
    }

    let stop_result = provider.stop();

    let mut samples = vec![0i16; total_samples];
    let captured = consumer.pop(&mut samples);
    samples.truncate(captured);
    if captured < total_samples {
        log::warn!(
            "fixed-duration capture short: {} of {} samples delivered",
            captured,
            total_samples
        );
    }

    let mut meter = LevelMeter::new();
    meter.observe(&samples);

    // Persist what was captured even if the device failed to stop cleanly.
    let data_bytes = wav_writer::write_wav_file(path, spec, &samples)?;
    stop_result?;

    let mut diagnostics = CaptureSessionDiagnostics {
        bytes_written: data_bytes,
        ..Default::default()
    };
    stats.fill(&mut diagnostics);

    Ok(RecordingResult {
        session_id: Uuid::new_v4(),
        file_path: path.to_path_buf(),
        format: config.format(),
        data_bytes,
        started_at,
        checksum: wav_writer::sha256_file(path)?,
        diagnostics,
        levels: meter.levels(),
    })
}

/// Samples needed for `duration`, checked against the WAV size limit before
/// anything is allocated.
fn fixed_sample_count(spec: WavSpec, duration: Duration) -> Result<usize, CaptureError> {
    // Float-to-int casts saturate, so an absurd duration lands on u64::MAX.
    let frames = (duration.as_secs_f64() * spec.frame_rate as f64).round() as u64;
    if frames == 0 {
        return Err(CaptureError::InvalidArgument("duration is shorter than one frame".into()));
    }
    let too_long = || {
        CaptureError::InvalidArgument(format!(
            "{:.1}s at {} Hz x {} ch exceeds the {} byte WAV data limit",
            duration.as_secs_f64(),
            spec.frame_rate,
            spec.channels,
            MAX_DATA_SIZE
        ))
    };
    let samples = frames.checked_mul(spec.channels as u64).ok_or_else(too_long)?;
    let bytes = samples.checked_mul(BYTES_PER_SAMPLE as u64).ok_or_else(too_long)?;
    if bytes > MAX_DATA_SIZE {
        return Err(too_long());
    }
    usize::try_from(samples).map_err(|_| too_long())
}
