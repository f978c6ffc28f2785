#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use wav_recorder_core::{
    AudioLevels, AudioSource, CaptureDelegate, CaptureError, CaptureFormat, CaptureProvider, CaptureState,
    FrameSink, RecordingResult,
};

/// What a [`ScriptedProvider`] delivers once started.
#[derive(Clone)]
pub enum Script {
    /// Never delivers anything.
    Silent,
    /// Delivers each buffer once, in order.
    Chunks(Vec<Vec<i16>>),
    /// Delivers `samples_per_delivery` sequential sample values every `period` until stopped.
    Counter { samples_per_delivery: usize, period: Duration },
    /// Fails to open the device.
    FailStart,
}

/// Observation side of a [`ScriptedProvider`], kept by the test.
#[derive(Clone, Default)]
pub struct ProviderStats {
    pub starts: Arc<AtomicUsize>,
    pub stops: Arc<AtomicUsize>,
    pub deliveries: Arc<AtomicUsize>,
    pub last_format: Arc<Mutex<Option<CaptureFormat>>>,
}

/// In-process device that plays a [`Script`] from its own thread.
pub struct ScriptedProvider {
    script: Script,
    stats: ProviderStats,
    start_delay: Duration,
    running: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl ScriptedProvider {
    pub fn new(script: Script) -> (Self, ProviderStats) {
        let stats = ProviderStats::default();
        (
            Self {
                script,
                stats: stats.clone(),
                start_delay: Duration::ZERO,
                running: Arc::new(AtomicBool::new(false)),
                thread: None,
            },
            stats,
        )
    }

    /// Make `start` block for `delay`, like a slow device open.
    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = delay;
        self
    }
}

impl CaptureProvider for ScriptedProvider {
    fn is_available(&self) -> bool {
        !matches!(self.script, Script::FailStart)
    }

    fn start(&mut self, format: CaptureFormat, mut sink: Box<dyn FrameSink>) -> Result<(), CaptureError> {
        if let Script::FailStart = self.script {
            return Err(CaptureError::Device("scripted open failure".into()));
        }
        self.stats.starts.fetch_add(1, Ordering::SeqCst);
        *self.stats.last_format.lock() = Some(format);
        thread::sleep(self.start_delay);
        self.running.store(true, Ordering::SeqCst);

        let running = Arc::clone(&self.running);
        let deliveries = Arc::clone(&self.stats.deliveries);
        let script = self.script.clone();

        self.thread = Some(thread::spawn(move || match script {
            Script::Chunks(chunks) => {
                for chunk in chunks {
                    sink.on_frames_delivered(&chunk);
                    deliveries.fetch_add(1, Ordering::SeqCst);
                }
                while running.load(Ordering::SeqCst) {
                    thread::sleep(Duration::from_millis(1));
                }
            }
            Script::Counter {
                samples_per_delivery,
                period,
            } => {
                let mut next = 0i16;
                let mut buffer = vec![0i16; samples_per_delivery];
                while running.load(Ordering::SeqCst) {
                    for sample in buffer.iter_mut() {
                        *sample = next;
                        next = next.wrapping_add(1);
                    }
                    sink.on_frames_delivered(&buffer);
                    deliveries.fetch_add(1, Ordering::SeqCst);
                    thread::sleep(period);
                }
            }
            Script::Silent | Script::FailStart => {
                while running.load(Ordering::SeqCst) {
                    thread::sleep(Duration::from_millis(1));
                }
            }
        }));
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
        self.stats.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn device_info(&self) -> AudioSource {
        AudioSource {
            id: "scripted".into(),
            name: "Scripted Input".into(),
            is_default: true,
        }
    }
}

/// Delegate that records every callback for later assertions.
#[derive(Default)]
pub struct RecordingDelegate {
    pub states: Mutex<Vec<CaptureState>>,
    pub elapsed: Mutex<Vec<u64>>,
    pub levels: Mutex<Vec<AudioLevels>>,
    pub errors: Mutex<Vec<CaptureError>>,
    pub finished: Mutex<Vec<RecordingResult>>,
}

impl CaptureDelegate for RecordingDelegate {
    fn on_state_changed(&self, state: CaptureState) {
        self.states.lock().push(state);
    }

    fn on_elapsed(&self, elapsed_secs: u64) {
        self.elapsed.lock().push(elapsed_secs);
    }

    fn on_levels_updated(&self, levels: &AudioLevels) {
        self.levels.lock().push(*levels);
    }

    fn on_error(&self, error: &CaptureError) {
        self.errors.lock().push(error.clone());
    }

    fn on_capture_finished(&self, result: &RecordingResult) {
        self.finished.lock().push(result.clone());
    }
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

pub fn read_samples(path: &std::path::Path) -> Vec<i16> {
    hound::WavReader::open(path)
        .unwrap()
        .samples::<i16>()
        .map(|s| s.unwrap())
        .collect()
}
