mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use approx::assert_abs_diff_eq;

use common::{read_samples, wait_until, RecordingDelegate, Script, ScriptedProvider};
use wav_recorder_core::processing::wav_format::read_header;
use wav_recorder_core::{
    CaptureConfiguration, CaptureError, CaptureState, RecordingSession, WAV_HEADER_SIZE,
};

fn config(sample_rate: u32, channels: u16) -> CaptureConfiguration {
    CaptureConfiguration {
        sample_rate,
        channels,
        ..Default::default()
    }
}

#[test]
fn begin_then_stop_produces_valid_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("take.wav");
    let (provider, stats) = ScriptedProvider::new(Script::Chunks(vec![vec![1, -1, 2, -2], vec![3, -3]]));
    let session = RecordingSession::new(provider, config(8000, 2)).unwrap();

    let handle = session.begin_session(&path).unwrap();
    assert_eq!(handle.state(), CaptureState::Recording);
    assert!(wait_until(Duration::from_secs(5), || stats.deliveries.load(Ordering::SeqCst) == 2));

    let result = session.stop().unwrap();
    assert_eq!(session.state(), CaptureState::Stopped);
    assert_eq!(result.data_bytes, 12);
    assert_eq!(result.frames(), 3);
    assert_eq!(result.session_id, handle.id());
    assert_eq!(result.checksum.len(), 64);
    assert_eq!(result.diagnostics.samples_delivered, 6);
    assert_eq!(result.diagnostics.samples_dropped, 0);

    assert_eq!(std::fs::metadata(&path).unwrap().len(), WAV_HEADER_SIZE as u64 + 12);
    assert_eq!(read_samples(&path), vec![1, -1, 2, -2, 3, -3]);

    let header = read_header(&path).unwrap();
    assert_eq!(header.spec.frame_rate, 8000);
    assert_eq!(header.spec.channels, 2);
    assert_eq!(header.data_size, 12);
    assert_eq!(header.riff_size, 48);

    assert_eq!(stats.starts.load(Ordering::SeqCst), 1);
    assert_eq!(stats.stops.load(Ordering::SeqCst), 1);
    let format = (*stats.last_format.lock()).unwrap();
    assert_eq!(format.sample_rate, 8000);
    assert_eq!(format.channels, 2);
}

#[test]
fn stop_before_any_frames_leaves_empty_valid_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("silent.wav");
    let (provider, _stats) = ScriptedProvider::new(Script::Silent);
    let session = RecordingSession::new(provider, config(44100, 1)).unwrap();

    session.begin_session(&path).unwrap();
    let result = session.stop().unwrap();

    assert_eq!(result.data_bytes, 0);
    assert_eq!(std::fs::metadata(&path).unwrap().len(), WAV_HEADER_SIZE as u64);
    let header = read_header(&path).unwrap();
    assert_eq!(header.data_size, 0);
    assert_eq!(header.riff_size, 36);
    assert!(read_samples(&path).is_empty());
}

#[test]
fn signal_stop_twice_finalizes_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("twice.wav");
    let (provider, stats) = ScriptedProvider::new(Script::Chunks(vec![vec![7; 16]]));
    let session = RecordingSession::new(provider, config(16000, 1)).unwrap();

    let handle = session.begin_session(&path).unwrap();
    assert!(wait_until(Duration::from_secs(5), || stats.deliveries.load(Ordering::SeqCst) == 1));
    handle.signal_stop();
    handle.signal_stop();
    session.signal_stop();

    let first = session.wait().unwrap();
    let second = session.wait().unwrap();
    assert_eq!(first.checksum, second.checksum);
    assert_eq!(first.data_bytes, 32);
    assert_eq!(stats.stops.load(Ordering::SeqCst), 1);

    // Stopped sessions ignore further stop requests.
    handle.signal_stop();
    assert_eq!(handle.state(), CaptureState::Stopped);
    assert_eq!(read_samples(&path), vec![7; 16]);
}

#[test]
fn begin_while_recording_returns_existing_handle() {
    let dir = tempfile::tempdir().unwrap();
    let (provider, stats) = ScriptedProvider::new(Script::Silent);
    let session = RecordingSession::new(provider, config(8000, 1)).unwrap();

    let first = session.begin_session(dir.path().join("a.wav")).unwrap();
    let second = session.begin_session(dir.path().join("b.wav")).unwrap();
    assert_eq!(first.id(), second.id());
    assert_eq!(stats.starts.load(Ordering::SeqCst), 1);
    assert!(!dir.path().join("b.wav").exists());

    session.stop().unwrap();
}

#[test]
fn begin_while_stopped_requires_reset() {
    let dir = tempfile::tempdir().unwrap();
    let (provider, _stats) = ScriptedProvider::new(Script::Silent);
    let session = RecordingSession::new(provider, config(8000, 1)).unwrap();

    session.begin_session(dir.path().join("a.wav")).unwrap();
    session.stop().unwrap();

    let err = session.begin_session(dir.path().join("b.wav")).unwrap_err();
    assert!(matches!(err, CaptureError::InvalidState(_)));
    assert_eq!(session.state(), CaptureState::Stopped);
}

#[test]
fn reset_then_begin_behaves_like_fresh_start() {
    let dir = tempfile::tempdir().unwrap();
    let (provider, stats) = ScriptedProvider::new(Script::Silent);
    let session = RecordingSession::new(provider, config(8000, 1)).unwrap();

    let old = session.begin_session(dir.path().join("a.wav")).unwrap();
    session.stop().unwrap();
    session.reset_session(&old).unwrap();

    assert_eq!(session.state(), CaptureState::Idle);
    assert_eq!(session.elapsed_seconds(), 0);
    assert!(session.handle().is_none());
    assert_eq!(old.state(), CaptureState::Idle);
    assert_eq!(old.elapsed_seconds(), 0);
    assert!(!old.take_success_indicator());
    assert!(!old.is_stop_requested());

    let fresh = session.begin_session(dir.path().join("b.wav")).unwrap();
    assert_ne!(fresh.id(), old.id());
    assert_eq!(fresh.elapsed_seconds(), 0);
    assert!(!fresh.is_stop_requested());
    assert!(!fresh.take_success_indicator());
    session.stop().unwrap();

    assert!(fresh.take_success_indicator());
    assert_eq!(stats.starts.load(Ordering::SeqCst), 2);
    assert!(dir.path().join("a.wav").exists());
}

#[test]
fn reset_while_recording_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (provider, _stats) = ScriptedProvider::new(Script::Silent);
    let session = RecordingSession::new(provider, config(8000, 1)).unwrap();

    // Idle reset is a no-op.
    session.reset().unwrap();

    let handle = session.begin_session(dir.path().join("a.wav")).unwrap();
    let err = session.reset_session(&handle).unwrap_err();
    assert!(matches!(err, CaptureError::InvalidState(_)));
    assert_eq!(handle.state(), CaptureState::Recording);

    session.stop().unwrap();
}

#[test]
fn reset_with_foreign_handle_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (provider_a, _) = ScriptedProvider::new(Script::Silent);
    let (provider_b, _) = ScriptedProvider::new(Script::Silent);
    let session_a = RecordingSession::new(provider_a, config(8000, 1)).unwrap();
    let session_b = RecordingSession::new(provider_b, config(8000, 1)).unwrap();

    session_a.begin_session(dir.path().join("a.wav")).unwrap();
    let foreign = session_b.begin_session(dir.path().join("b.wav")).unwrap();
    session_a.stop().unwrap();
    session_b.stop().unwrap();

    let err = session_a.reset_session(&foreign).unwrap_err();
    assert!(matches!(err, CaptureError::InvalidState(_)));
    assert_eq!(session_a.state(), CaptureState::Stopped);
}

#[test]
fn success_indicator_is_reported_once() {
    let dir = tempfile::tempdir().unwrap();
    let (provider, _stats) = ScriptedProvider::new(Script::Silent);
    let session = RecordingSession::new(provider, config(8000, 1)).unwrap();

    let handle = session.begin_session(dir.path().join("a.wav")).unwrap();
    assert!(!handle.take_success_indicator());
    session.stop().unwrap();

    assert!(handle.take_success_indicator());
    assert!(!handle.take_success_indicator());
}

#[test]
fn device_failure_leaves_session_idle_without_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("never.wav");
    let (provider, stats) = ScriptedProvider::new(Script::FailStart);
    let session = RecordingSession::new(provider, config(8000, 1)).unwrap();

    let err = session.begin_session(&path).unwrap_err();
    assert!(err.is_device_error());
    assert_eq!(session.state(), CaptureState::Idle);
    assert!(session.handle().is_none());
    assert!(!path.exists());
    assert_eq!(stats.starts.load(Ordering::SeqCst), 0);
}

#[test]
fn unwritable_path_fails_before_device_starts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("take.wav");
    let (provider, stats) = ScriptedProvider::new(Script::Silent);
    let session = RecordingSession::new(provider, config(8000, 1)).unwrap();

    let err = session.begin_session(&path).unwrap_err();
    assert!(matches!(err, CaptureError::Io(_)));
    assert_eq!(session.state(), CaptureState::Idle);
    assert_eq!(stats.starts.load(Ordering::SeqCst), 0);
}

#[test]
fn continuous_delivery_is_written_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stream.wav");
    let (provider, stats) = ScriptedProvider::new(Script::Counter {
        samples_per_delivery: 64,
        period: Duration::from_millis(1),
    });
    let session = RecordingSession::new(provider, config(8000, 1)).unwrap();

    session.begin_session(&path).unwrap();
    assert!(wait_until(Duration::from_secs(5), || stats.deliveries.load(Ordering::SeqCst) >= 100));
    let result = session.stop().unwrap();

    let samples = read_samples(&path);
    assert!(samples.len() >= 6400);
    assert_eq!(samples.len() as u64 * 2, result.data_bytes);
    assert_eq!(result.diagnostics.samples_dropped, 0);
    assert_eq!(result.diagnostics.samples_delivered, samples.len() as u64);
    assert_eq!(result.diagnostics.bytes_written, result.data_bytes);
    assert_eq!(result.diagnostics.write_errors, 0);
    for (i, pair) in samples.windows(2).enumerate() {
        assert_eq!(pair[1], pair[0].wrapping_add(1), "discontinuity at sample {}", i + 1);
    }
}

#[test]
fn max_duration_stops_recording_automatically() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("capped.wav");
    let (provider, stats) = ScriptedProvider::new(Script::Counter {
        samples_per_delivery: 80,
        period: Duration::from_millis(10),
    });
    let mut cfg = config(8000, 1);
    cfg.max_duration_secs = Some(1);
    let session = RecordingSession::new(provider, cfg).unwrap();

    let started = Instant::now();
    let handle = session.begin_session(&path).unwrap();
    let result = session.wait().unwrap();

    assert!(started.elapsed() >= Duration::from_secs(1));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(handle.state(), CaptureState::Stopped);
    assert_eq!(handle.elapsed_seconds(), 1);
    assert!(!handle.is_stop_requested());
    assert_eq!(stats.stops.load(Ordering::SeqCst), 1);
    assert!(result.data_bytes > 0);
}

#[test]
fn delegate_sees_lifecycle_events() {
    let dir = tempfile::tempdir().unwrap();
    let (provider, _stats) = ScriptedProvider::new(Script::Chunks(vec![vec![5; 8]]));
    let mut session = RecordingSession::new(provider, config(8000, 1)).unwrap();
    let delegate = Arc::new(RecordingDelegate::default());
    session.set_delegate(delegate.clone());

    session.begin_session(dir.path().join("a.wav")).unwrap();
    let result = session.stop().unwrap();
    session.reset().unwrap();

    assert_eq!(
        *delegate.states.lock(),
        vec![CaptureState::Recording, CaptureState::Stopped, CaptureState::Idle]
    );
    let finished = delegate.finished.lock();
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0].checksum, result.checksum);
    assert!(delegate.errors.lock().is_empty());
}

#[test]
fn dropping_a_recording_session_finalizes_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dropped.wav");
    let (provider, stats) = ScriptedProvider::new(Script::Chunks(vec![vec![9, 10, 11, 12]]));
    {
        let session = RecordingSession::new(provider, config(8000, 2)).unwrap();
        session.begin_session(&path).unwrap();
        assert!(wait_until(Duration::from_secs(5), || stats.deliveries.load(Ordering::SeqCst) == 1));
    }

    assert_eq!(stats.stops.load(Ordering::SeqCst), 1);
    let header = read_header(&path).unwrap();
    assert_eq!(header.data_size, 8);
    assert_eq!(read_samples(&path), vec![9, 10, 11, 12]);
}

#[test]
fn invalid_configuration_is_rejected() {
    let (provider, _stats) = ScriptedProvider::new(Script::Silent);
    let err = RecordingSession::new(provider, config(0, 1)).err().unwrap();
    assert!(matches!(err, CaptureError::InvalidArgument(_)));
}

#[test]
fn levels_cover_written_audio() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("levels.wav");
    let (provider, _stats) = ScriptedProvider::new(Script::Chunks(vec![vec![-1000; 400], vec![1000; 400]]));
    let mut cfg = config(8000, 1);
    cfg.max_duration_secs = Some(1);
    let mut session = RecordingSession::new(provider, cfg).unwrap();
    let delegate = Arc::new(RecordingDelegate::default());
    session.set_delegate(delegate.clone());

    let handle = session.begin_session(&path).unwrap();
    let result = session.wait().unwrap();

    let expected = 1000.0 / 32768.0;
    assert_abs_diff_eq!(result.levels.peak_level, expected, epsilon = 1e-6);
    assert_abs_diff_eq!(result.levels.mean_level, expected, epsilon = 1e-6);

    let ticks = delegate.levels.lock();
    assert_eq!(ticks.len(), 1);
    assert_abs_diff_eq!(ticks[0].peak_level, expected, epsilon = 1e-6);
    assert_eq!(handle.current_levels(), ticks[0]);
}

#[cfg(target_os = "linux")]
#[test]
fn write_failures_are_counted_and_close_error_is_returned() {
    let path = std::path::Path::new("/dev/full");
    if !path.exists() {
        return;
    }
    let (provider, stats) = ScriptedProvider::new(Script::Counter {
        samples_per_delivery: 512,
        period: Duration::from_millis(1),
    });
    let mut session = RecordingSession::new(provider, config(8000, 1)).unwrap();
    let delegate = Arc::new(RecordingDelegate::default());
    session.set_delegate(delegate.clone());

    let handle = session.begin_session(path).unwrap();
    assert!(wait_until(Duration::from_secs(10), || handle.diagnostics().write_errors > 0));
    // Recording carries on after a failed append.
    assert_eq!(handle.state(), CaptureState::Recording);

    let err = session.stop().unwrap_err();
    assert!(matches!(err, CaptureError::Io(_)));
    assert_eq!(handle.state(), CaptureState::Stopped);
    assert!(!handle.take_success_indicator());
    assert_eq!(stats.stops.load(Ordering::SeqCst), 1);
    assert!(!delegate.errors.lock().is_empty());
    assert!(delegate.finished.lock().is_empty());
    assert!(matches!(session.outcome(), Some(Err(CaptureError::Io(_)))));
}

#[test]
fn state_stays_readable_while_device_opens() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("slow.wav");
    let (provider, stats) = ScriptedProvider::new(Script::Silent);
    let provider = provider.with_start_delay(Duration::from_millis(600));
    let session = RecordingSession::new(provider, config(8000, 1)).unwrap();

    thread::scope(|scope| {
        let first = scope.spawn(|| session.begin_session(&path));
        assert!(wait_until(Duration::from_secs(5), || stats.starts.load(Ordering::SeqCst) == 1));

        let polled = Instant::now();
        assert_eq!(session.state(), CaptureState::Idle);
        assert_eq!(session.elapsed_seconds(), 0);
        assert!(session.handle().is_none());
        assert!(polled.elapsed() < Duration::from_millis(300));

        // A concurrent begin waits for the first and joins its recording.
        let second = scope.spawn(|| session.begin_session(&path));
        let first = first.join().unwrap().unwrap();
        let second = second.join().unwrap().unwrap();
        assert_eq!(first.id(), second.id());
    });

    assert_eq!(stats.starts.load(Ordering::SeqCst), 1);
    session.stop().unwrap();
}
