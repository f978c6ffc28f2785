//! Bounded lock-free hand-off between the audio callback and the writer.
//!
//! Built on `ringbuf::HeapRb<i16>`: the producer half lives in the device
//! callback and never blocks or allocates; the consumer half is drained by
//! the session worker, which owns the file. When the queue is full, incoming
//! frames are dropped whole and counted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use crate::models::audio_models::CaptureSessionDiagnostics;
use crate::traits::capture_provider::FrameSink;

/// Counters written by the audio callback and read by the control side.
#[derive(Debug, Default)]
pub struct DeliveryStats {
    callbacks: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl DeliveryStats {
    pub fn callbacks(&self) -> u64 {
        self.callbacks.load(Ordering::Relaxed)
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Copy the delivery counters into a diagnostics snapshot.
    pub fn fill(&self, diagnostics: &mut CaptureSessionDiagnostics) {
        diagnostics.callback_count = self.callbacks();
        diagnostics.samples_delivered = self.delivered();
        diagnostics.samples_dropped = self.dropped();
    }
}

/// Create a queue holding up to `capacity` samples of `channels`-interleaved audio.
///
/// The capacity is rounded up to a whole number of frames.
pub fn sample_queue(capacity: usize, channels: u16) -> (SampleProducer, SampleConsumer) {
    let channels = channels.max(1) as usize;
    let frames = capacity.div_ceil(channels).max(1);
    let (producer, consumer) = HeapRb::<i16>::new(frames * channels).split();
    let stats = Arc::new(DeliveryStats::default());
    (
        SampleProducer {
            inner: producer,
            channels,
            stats: Arc::clone(&stats),
        },
        SampleConsumer { inner: consumer, stats },
    )
}

/// Real-time half of the queue.
pub struct SampleProducer {
    inner: HeapProd<i16>,
    channels: usize,
    stats: Arc<DeliveryStats>,
}

impl SampleProducer {
    /// Push whole frames, dropping the tail that does not fit.
    ///
    /// Wait-free. Returns the number of samples accepted.
    pub fn push(&mut self, samples: &[i16]) -> usize {
        let vacant = self.inner.vacant_len();
        let accepted = if samples.len() <= vacant {
            samples.len()
        } else {
            vacant - vacant % self.channels
        };
        let pushed = self.inner.push_slice(&samples[..accepted]);

        self.stats.callbacks.fetch_add(1, Ordering::Relaxed);
        self.stats.delivered.fetch_add(pushed as u64, Ordering::Relaxed);
        if pushed < samples.len() {
            self.stats
                .dropped
                .fetch_add((samples.len() - pushed) as u64, Ordering::Relaxed);
        }
        pushed
    }

    pub fn stats(&self) -> Arc<DeliveryStats> {
        Arc::clone(&self.stats)
    }
}

impl FrameSink for SampleProducer {
    fn on_frames_delivered(&mut self, samples: &[i16]) {
        if !samples.is_empty() {
            self.push(samples);
        }
    }
}

/// Non-real-time half of the queue.
pub struct SampleConsumer {
    inner: HeapCons<i16>,
    stats: Arc<DeliveryStats>,
}

impl SampleConsumer {
    /// Move up to `out.len()` queued samples into `out`, oldest first.
    pub fn pop(&mut self, out: &mut [i16]) -> usize {
        self.inner.pop_slice(out)
    }

    pub fn len(&self) -> usize {
        self.inner.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity().get()
    }

    pub fn stats(&self) -> Arc<DeliveryStats> {
        Arc::clone(&self.stats)
    }
}
