use std::time::{Duration, Instant};

/// Monotonic time source behind every bounded wait.
///
/// All polling loops in the workspace sleep through a `Clock` so tests can
/// substitute a simulated clock and run interlock timelines instantly.
pub trait Clock: Send + Sync {
    /// Time elapsed since this clock was created.
    fn elapsed(&self) -> Duration;
    fn sleep(&self, dur: Duration);
}

/// Wall clock used on real hardware.
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    fn sleep(&self, dur: Duration) {
        std::thread::sleep(dur);
    }
}
