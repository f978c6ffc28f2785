use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex};
use uuid::Uuid;

use crate::models::audio_models::{AudioLevels, CaptureSessionDiagnostics};
use crate::models::config::CaptureConfiguration;
use crate::models::error::CaptureError;
use crate::models::recording_result::RecordingResult;
use crate::models::state::CaptureState;
use crate::processing::levels::LevelMeter;
use crate::processing::sample_queue::{sample_queue, DeliveryStats, SampleConsumer};
use crate::session::timing::{self, ElapsedCounter};
use crate::storage::wav_writer::{self, WavWriter};
use crate::traits::capture_delegate::CaptureDelegate;
use crate::traits::capture_provider::CaptureProvider;

/// Samples moved from the queue to the writer per append.
const DRAIN_CHUNK: usize = 4096;

/// State shared between the control side, the session worker, and handles.
///
/// The audio thread never touches this; it only sees the queue producer.
struct SessionShared {
    id: Uuid,
    state: Mutex<CaptureState>,
    stop_requested: Mutex<bool>,
    stop_signal: Condvar,
    elapsed: ElapsedCounter,
    success: AtomicBool,
    stats: Arc<DeliveryStats>,
    bytes_written: AtomicU64,
    write_errors: AtomicU64,
    levels: Mutex<AudioLevels>,
}

impl SessionShared {
    fn new(stats: Arc<DeliveryStats>) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: Mutex::new(CaptureState::Recording),
            stop_requested: Mutex::new(false),
            stop_signal: Condvar::new(),
            elapsed: ElapsedCounter::new(),
            success: AtomicBool::new(false),
            stats,
            bytes_written: AtomicU64::new(0),
            write_errors: AtomicU64::new(0),
            levels: Mutex::new(AudioLevels::default()),
        }
    }

    fn state(&self) -> CaptureState {
        *self.state.lock()
    }

    /// Block until stop is requested or `timeout` passes.
    fn wait_for_stop(&self, timeout: std::time::Duration) -> bool {
        let mut requested = self.stop_requested.lock();
        if !*requested {
            self.stop_signal.wait_for(&mut requested, timeout);
        }
        *requested
    }

    fn diagnostics(&self) -> CaptureSessionDiagnostics {
        let mut diagnostics = CaptureSessionDiagnostics {
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
            ..Default::default()
        };
        self.stats.fill(&mut diagnostics);
        diagnostics
    }
}

/// Cheap, cloneable view of one recording for the control/UI side.
#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<SessionShared>,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn state(&self) -> CaptureState {
        self.shared.state()
    }

    /// Ask the worker to stop and finalize. Idempotent; a no-op unless recording.
    pub fn signal_stop(&self) {
        if !self.state().is_recording() {
            return;
        }
        let mut requested = self.shared.stop_requested.lock();
        if !*requested {
            *requested = true;
            self.shared.stop_signal.notify_all();
            log::info!("stop requested for session {}", self.shared.id);
        }
    }

    pub fn is_stop_requested(&self) -> bool {
        *self.shared.stop_requested.lock()
    }

    /// Whole seconds recorded so far; zero once the session is reset.
    pub fn elapsed_seconds(&self) -> u64 {
        self.shared.elapsed.get()
    }

    /// Returns true exactly once after a successful recording.
    pub fn take_success_indicator(&self) -> bool {
        self.shared.success.swap(false, Ordering::AcqRel)
    }

    pub fn diagnostics(&self) -> CaptureSessionDiagnostics {
        self.shared.diagnostics()
    }

    /// Levels of the most recent whole second written.
    pub fn current_levels(&self) -> AudioLevels {
        *self.shared.levels.lock()
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.shared.id)
            .field("state", &self.state())
            .field("elapsed_secs", &self.elapsed_seconds())
            .finish()
    }
}

type WorkerResult = Result<RecordingResult, CaptureError>;

struct ActiveRecording {
    handle: SessionHandle,
    worker: Option<thread::JoinHandle<WorkerResult>>,
    outcome: Option<WorkerResult>,
}

/// Recording session state machine over a single capture device.
///
/// Data flow:
/// ```text
/// [CaptureProvider] → FrameSink (audio thread, lock-free push)
///                          ↓
///                    [SampleQueue]
///                          ↓
/// [session worker] → drain → [WavWriter] → close on stop
/// ```
///
/// One worker thread per recording owns the writer: it drains the queue,
/// advances the elapsed counter, and on stop tears down the device before
/// finalizing the file. Its outcome is collected by [`RecordingSession::wait`].
pub struct RecordingSession<P: CaptureProvider + 'static> {
    provider: Arc<Mutex<P>>,
    config: CaptureConfiguration,
    delegate: Option<Arc<dyn CaptureDelegate>>,
    current: Mutex<Option<ActiveRecording>>,
    /// Serializes `begin_session` without blocking readers of `current`.
    begin_guard: Mutex<()>,
}

impl<P: CaptureProvider + 'static> RecordingSession<P> {
    pub fn new(provider: P, config: CaptureConfiguration) -> Result<Self, CaptureError> {
        config.validate()?;
        Ok(Self {
            provider: Arc::new(Mutex::new(provider)),
            config,
            delegate: None,
            current: Mutex::new(None),
            begin_guard: Mutex::new(()),
        })
    }

    pub fn set_delegate(&mut self, delegate: Arc<dyn CaptureDelegate>) {
        self.delegate = Some(delegate);
    }

    pub fn config(&self) -> &CaptureConfiguration {
        &self.config
    }

    pub fn state(&self) -> CaptureState {
        self.current
            .lock()
            .as_ref()
            .map(|active| active.handle.state())
            .unwrap_or(CaptureState::Idle)
    }

    /// Handle of the current recording, if any.
    pub fn handle(&self) -> Option<SessionHandle> {
        self.current.lock().as_ref().map(|active| active.handle.clone())
    }

    /// Elapsed seconds of the current recording; zero when idle.
    pub fn elapsed_seconds(&self) -> u64 {
        self.handle().map(|h| h.elapsed_seconds()).unwrap_or(0)
    }

    /// Open `path`, start the device, and begin recording.
    ///
    /// Transitions: idle → recording. Calling this while recording returns
    /// the existing handle. Calling it while stopped is an error until
    /// [`reset_session`](Self::reset_session) is called.
    pub fn begin_session(&self, path: impl AsRef<Path>) -> Result<SessionHandle, CaptureError> {
        let path = path.as_ref();
        // Opening the device can block; state polling must not wait on it.
        let _begin = self.begin_guard.lock();

        if let Some(active) = self.current.lock().as_ref() {
            match active.handle.state() {
                CaptureState::Recording => {
                    log::debug!("begin ignored: session {} already recording", active.handle.id());
                    return Ok(active.handle.clone());
                }
                CaptureState::Stopped => {
                    return Err(CaptureError::InvalidState(
                        "previous recording must be reset before starting another".into(),
                    ));
                }
                CaptureState::Idle => {}
            }
        }

        let format = self.config.format();
        let mut writer = WavWriter::new();
        writer.open(path, format.sample_rate, format.channels)?;

        let (producer, consumer) = sample_queue(self.config.queue_capacity_samples(), format.channels);
        let shared = Arc::new(SessionShared::new(producer.stats()));

        if let Err(e) = self.provider.lock().start(format, Box::new(producer)) {
            log::error!("failed to start capture device: {}", e);
            discard_partial_file(writer, path);
            return Err(e);
        }

        let worker = SessionWorker {
            shared: Arc::clone(&shared),
            provider: Arc::clone(&self.provider),
            delegate: self.delegate.clone(),
            config: self.config.clone(),
            path: path.to_path_buf(),
            started_at: Utc::now(),
            writer,
            consumer,
            total_levels: LevelMeter::new(),
            tick_levels: LevelMeter::new(),
        };

        let spawned = thread::Builder::new()
            .name("wav-recorder-session".into())
            .spawn(move || worker.run());

        let worker = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                // The worker closure (and with it the writer) was dropped by the
                // failed spawn, which finalized the file.
                if let Err(stop_err) = self.provider.lock().stop() {
                    log::error!("failed to release capture device: {}", stop_err);
                }
                if let Err(rm_err) = fs::remove_file(path) {
                    log::warn!("failed to remove {}: {}", path.display(), rm_err);
                }
                return Err(CaptureError::Internal(format!("failed to spawn session worker: {}", e)));
            }
        };

        let handle = SessionHandle { shared };
        log::info!(
            "recording session {} started: {} ({} Hz, {} ch)",
            handle.id(),
            path.display(),
            format.sample_rate,
            format.channels
        );
        *self.current.lock() = Some(ActiveRecording {
            handle: handle.clone(),
            worker: Some(worker),
            outcome: None,
        });

        if let Some(delegate) = &self.delegate {
            delegate.on_state_changed(CaptureState::Recording);
        }
        Ok(handle)
    }

    /// Signal the current recording to stop. Idempotent.
    pub fn signal_stop(&self) {
        if let Some(handle) = self.handle() {
            handle.signal_stop();
        }
    }

    /// Wait for the current recording's worker and return its outcome.
    ///
    /// Blocks until the recording stops (by signal or max duration). Repeated
    /// calls return the same outcome.
    pub fn wait(&self) -> Result<RecordingResult, CaptureError> {
        let worker = {
            let mut current = self.current.lock();
            let active = current
                .as_mut()
                .ok_or_else(|| CaptureError::InvalidState("no recording to wait for".into()))?;
            if let Some(outcome) = &active.outcome {
                return outcome.clone();
            }
            active.worker.take().ok_or_else(|| {
                CaptureError::InvalidState("another caller is already waiting".into())
            })?
        };

        let outcome = match worker.join() {
            Ok(outcome) => outcome,
            Err(_) => {
                log::error!("session worker panicked; releasing capture device");
                if let Err(e) = self.provider.lock().stop() {
                    log::error!("failed to release capture device: {}", e);
                }
                Err(CaptureError::Internal("session worker panicked".into()))
            }
        };

        let mut current = self.current.lock();
        if let Some(active) = current.as_mut() {
            // A panicked worker never reached its own transition.
            *active.handle.shared.state.lock() = CaptureState::Stopped;
            active.outcome = Some(outcome.clone());
        }
        outcome
    }

    /// Signal stop and wait for the file to be finalized.
    pub fn stop(&self) -> Result<RecordingResult, CaptureError> {
        self.signal_stop();
        self.wait()
    }

    /// Outcome of the current recording once it has been collected.
    pub fn outcome(&self) -> Option<Result<RecordingResult, CaptureError>> {
        self.current.lock().as_ref().and_then(|active| active.outcome.clone())
    }

    /// Return a stopped session to idle.
    ///
    /// Transitions: stopped → idle. A no-op when already idle; an error
    /// while recording. Closed files are left untouched.
    pub fn reset_session(&self, handle: &SessionHandle) -> Result<(), CaptureError> {
        match self.handle() {
            Some(current) if current.id() != handle.id() => Err(CaptureError::InvalidState(
                "handle does not belong to the current recording".into(),
            )),
            Some(_) => self.reset(),
            None => Ok(()),
        }
    }

    /// Reset whatever recording is current. See [`reset_session`](Self::reset_session).
    pub fn reset(&self) -> Result<(), CaptureError> {
        let state = self.state();
        match state {
            CaptureState::Idle => return Ok(()),
            CaptureState::Recording => {
                return Err(CaptureError::InvalidState("cannot reset while recording".into()));
            }
            CaptureState::Stopped => {}
        }

        // The worker flips to Stopped as its last step, so this join is short.
        if let Err(e) = self.wait() {
            log::debug!("resetting after failed recording: {}", e);
        }

        let mut current = self.current.lock();
        if let Some(active) = current.take() {
            let shared = &active.handle.shared;
            *shared.stop_requested.lock() = false;
            shared.success.store(false, Ordering::Release);
            shared.elapsed.reset();
            *shared.state.lock() = CaptureState::Idle;
            log::info!("recording session {} reset", shared.id);
        }
        drop(current);

        if let Some(delegate) = &self.delegate {
            delegate.on_state_changed(CaptureState::Idle);
        }
        Ok(())
    }
}

impl<P: CaptureProvider + 'static> Drop for RecordingSession<P> {
    fn drop(&mut self) {
        if self.state().is_recording() {
            log::warn!("recording session dropped while recording; finalizing");
            if let Err(e) = self.stop() {
                log::error!("failed to finalize recording on drop: {}", e);
            }
        }
    }
}

/// Close and delete a file whose recording never started.
fn discard_partial_file(mut writer: WavWriter, path: &Path) {
    if let Err(e) = writer.close() {
        log::warn!("failed to close {}: {}", path.display(), e);
    }
    if let Err(e) = fs::remove_file(path) {
        log::warn!("failed to remove {}: {}", path.display(), e);
    }
}

/// Everything the worker thread owns for one recording.
struct SessionWorker<P: CaptureProvider + 'static> {
    shared: Arc<SessionShared>,
    provider: Arc<Mutex<P>>,
    delegate: Option<Arc<dyn CaptureDelegate>>,
    config: CaptureConfiguration,
    path: PathBuf,
    started_at: DateTime<Utc>,
    writer: WavWriter,
    consumer: SampleConsumer,
    total_levels: LevelMeter,
    tick_levels: LevelMeter,
}

impl<P: CaptureProvider + 'static> SessionWorker<P> {
    fn run(mut self) -> WorkerResult {
        let start = Instant::now();
        let mut scratch = vec![0i16; DRAIN_CHUNK];
        let mut reported_drops = 0u64;

        loop {
            let timeout = self
                .config
                .drain_interval
                .min(timing::until_next_second(start, Instant::now()));
            let stop = self.shared.wait_for_stop(timeout);

            self.drain(&mut scratch);

            if let Some(secs) = self.shared.elapsed.advance_to(start, Instant::now()) {
                log::debug!("session {}: {}s", self.shared.id, secs);
                let levels = self.tick_levels.levels();
                self.tick_levels.reset();
                *self.shared.levels.lock() = levels;
                if let Some(delegate) = &self.delegate {
                    delegate.on_elapsed(secs);
                    delegate.on_levels_updated(&levels);
                }
                let dropped = self.shared.stats.dropped();
                if dropped > reported_drops {
                    log::warn!(
                        "session {}: {} samples dropped (queue full)",
                        self.shared.id,
                        dropped - reported_drops
                    );
                    reported_drops = dropped;
                }
            }

            if stop {
                break;
            }
            if timing::duration_reached(self.shared.elapsed.get(), self.config.max_duration_secs) {
                log::info!("session {}: maximum duration reached", self.shared.id);
                break;
            }
        }

        self.finish(&mut scratch)
    }

    /// Tear down the device, flush the queue, and finalize the file.
    fn finish(mut self, scratch: &mut [i16]) -> WorkerResult {
        // The device must be fully stopped before the last drain and close.
        let device_result = self.provider.lock().stop();
        if let Err(e) = &device_result {
            log::error!("failed to stop capture device: {}", e);
        }
        self.drain(scratch);

        let outcome = self
            .writer
            .close()
            .and_then(|data_bytes| self.build_result(data_bytes))
            .and_then(|result| device_result.map(|_| result));

        self.shared.success.store(outcome.is_ok(), Ordering::Release);
        *self.shared.state.lock() = CaptureState::Stopped;

        match &outcome {
            Ok(result) => log::info!(
                "recording session {} saved {} ({} bytes, {:.2}s)",
                result.session_id,
                result.file_path.display(),
                result.data_bytes,
                result.duration_secs()
            ),
            Err(e) => log::error!("recording session {} failed to finalize: {}", self.shared.id, e),
        }

        if let Some(delegate) = &self.delegate {
            delegate.on_state_changed(CaptureState::Stopped);
            match &outcome {
                Ok(result) => delegate.on_capture_finished(result),
                Err(e) => delegate.on_error(e),
            }
        }
        outcome
    }

    /// Move everything queued so far into the writer.
    ///
    /// Append failures are recorded and skipped; the recording carries on.
    fn drain(&mut self, scratch: &mut [i16]) {
        loop {
            let n = self.consumer.pop(scratch);
            if n == 0 {
                break;
            }
            match self.writer.append(&scratch[..n]) {
                Ok(bytes) => {
                    self.shared.bytes_written.fetch_add(bytes, Ordering::Relaxed);
                    self.total_levels.observe(&scratch[..n]);
                    self.tick_levels.observe(&scratch[..n]);
                }
                Err(e) => {
                    self.shared.write_errors.fetch_add(1, Ordering::Relaxed);
                    log::error!("failed to write audio data: {}", e);
                    if let Some(delegate) = &self.delegate {
                        delegate.on_error(&e);
                    }
                }
            }
        }
    }

    fn build_result(&self, data_bytes: u64) -> WorkerResult {
        let checksum = wav_writer::sha256_file(&self.path)?;
        Ok(RecordingResult {
            session_id: self.shared.id,
            file_path: self.path.clone(),
            format: self.config.format(),
            data_bytes,
            started_at: self.started_at,
            checksum,
            diagnostics: self.shared.diagnostics(),
            levels: self.total_levels.levels(),
        })
    }
}
