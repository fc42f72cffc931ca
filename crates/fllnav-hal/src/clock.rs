//! Time source used for tick pacing.  Simulated robots advance their own
//! clock so tests never sleep.

use std::time::{Duration, Instant};

pub trait Clock: Send + Sync {
    /// Time elapsed since the clock was created.
    fn now(&self) -> Duration;

    /// Block for `duration`.
    fn wait(&mut self, duration: Duration);
}

/// Wall-clock implementation backed by [`Instant`].
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn wait(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_monotonic() {
        let mut clock = SystemClock::new();
        let before = clock.now();
        clock.wait(Duration::from_millis(2));
        assert!(clock.now() >= before + Duration::from_millis(2));
    }
}
