use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Whole seconds spent recording, shared between the worker and the UI.
///
/// Derived from a monotonic start instant rather than counted sleeps, so it
/// advances exactly once per wall-clock second regardless of how often the
/// worker wakes up.
#[derive(Debug, Default)]
pub struct ElapsedCounter {
    secs: AtomicU64,
}

impl ElapsedCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> u64 {
        self.secs.load(Ordering::Acquire)
    }

    /// Bring the counter up to the whole seconds between `start` and `now`.
    ///
    /// Returns the new value if it advanced. Never moves backwards.
    pub fn advance_to(&self, start: Instant, now: Instant) -> Option<u64> {
        let secs = now.saturating_duration_since(start).as_secs();
        let previous = self.secs.fetch_max(secs, Ordering::AcqRel);
        (secs > previous).then_some(secs)
    }

    pub fn reset(&self) {
        self.secs.store(0, Ordering::Release);
    }
}

/// Whether a session capped at `max_secs` has run long enough to stop.
pub fn duration_reached(elapsed_secs: u64, max_secs: Option<u64>) -> bool {
    max_secs.is_some_and(|max| elapsed_secs >= max)
}

/// Time left until the start of the next whole second.
pub fn until_next_second(start: Instant, now: Instant) -> Duration {
    let elapsed = now.saturating_duration_since(start);
    Duration::from_secs(elapsed.as_secs() + 1) - elapsed
}
