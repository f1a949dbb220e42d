/// Time source abstraction, so the timeout- and staleness-driven logic
/// in `exchange`, `engine`, and `worker` can be exercised deterministically
/// in tests without sleeping for real seconds.
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// A source of "now" and a blocking sleep, abstracted so tests can
/// substitute a fake clock that advances instantly.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

/// The real wall clock, backed by `std::time`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// A deterministic clock for tests: `now()` is a monotonically
/// increasing counter advanced explicitly by the test, and `sleep`
/// advances it by the requested duration instead of blocking.
#[derive(Clone)]
pub struct FakeClock {
    inner: Arc<Mutex<Instant>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Move the clock forward without blocking the calling thread.
    pub fn advance(&self, duration: Duration) {
        let mut guard = self.inner.lock().unwrap();
        *guard += duration;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        *self.inner.lock().unwrap()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}
