//! [`Cadence`] – periodic task pacing against a robot [`Clock`][fllnav_hal::Clock].
//!
//! The orchestrator loop runs faster than any of its periodic jobs.  Each job
//! is registered with a period; [`Cadence::run_if_due`] reports whether the
//! period has elapsed since the job last ran and, if so, records the run.
//! Times are clock readings (`Duration` since clock start), so a simulated
//! clock paces the loop exactly like a wall clock.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use fllnav_runtime::cadence::Cadence;
//!
//! let mut cadence = Cadence::new();
//! cadence.register("odometry", Duration::from_millis(20));
//!
//! assert!(cadence.run_if_due("odometry", Duration::from_millis(0)));
//! assert!(!cadence.run_if_due("odometry", Duration::from_millis(10)));
//! assert!(cadence.run_if_due("odometry", Duration::from_millis(20)));
//! ```

use std::collections::HashMap;
use std::time::Duration;

/// Odometry integration and particle prediction.
pub const ODOMETRY: &str = "odometry";
/// Landmark correction and conditional resampling.
pub const LOCALIZATION: &str = "localization";
/// Status push to the operator.
pub const STATUS: &str = "status";

struct TaskEntry {
    period: Duration,
    last_run: Option<Duration>,
}

/// Tracks when each registered periodic task last ran.
#[derive(Default)]
pub struct Cadence {
    tasks: HashMap<&'static str, TaskEntry>,
}

impl Cadence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `task` with `period`.  A newly registered task is due
    /// immediately.  Re-registering resets it.
    pub fn register(&mut self, task: &'static str, period: Duration) {
        self.tasks.insert(task, TaskEntry { period, last_run: None });
    }

    /// Whether `task` is due at `now`.  Unknown tasks are never due.
    pub fn is_due(&self, task: &str, now: Duration) -> bool {
        match self.tasks.get(task) {
            Some(TaskEntry { last_run: None, .. }) => true,
            Some(TaskEntry {
                period,
                last_run: Some(last),
            }) => now.saturating_sub(*last) >= *period,
            None => false,
        }
    }

    /// If `task` is due at `now`, record the run and return `true`.
    pub fn run_if_due(&mut self, task: &str, now: Duration) -> bool {
        if !self.is_due(task, now) {
            return false;
        }
        if let Some(entry) = self.tasks.get_mut(task) {
            entry.last_run = Some(now);
        }
        true
    }

    /// Make every task due again.
    pub fn reset(&mut self) {
        for entry in self.tasks.values_mut() {
            entry.last_run = None;
        }
    }

    pub fn period(&self, task: &str) -> Option<Duration> {
        self.tasks.get(task).map(|e| e.period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_task_is_never_due() {
        let mut cadence = Cadence::new();
        assert!(!cadence.run_if_due("ghost", Duration::from_secs(10)));
    }

    #[test]
    fn slow_and_fast_tasks_interleave() {
        let mut cadence = Cadence::new();
        cadence.register(ODOMETRY, Duration::from_millis(20));
        cadence.register(LOCALIZATION, Duration::from_millis(200));

        let (mut fast, mut slow) = (0, 0);
        for ms in (0..1000).step_by(10) {
            let now = Duration::from_millis(ms);
            if cadence.run_if_due(ODOMETRY, now) {
                fast += 1;
            }
            if cadence.run_if_due(LOCALIZATION, now) {
                slow += 1;
            }
        }
        assert_eq!(fast, 50);
        assert_eq!(slow, 5);
    }

    #[test]
    fn reset_makes_tasks_due() {
        let mut cadence = Cadence::new();
        cadence.register(STATUS, Duration::from_secs(1));
        assert!(cadence.run_if_due(STATUS, Duration::ZERO));
        assert!(!cadence.is_due(STATUS, Duration::from_millis(500)));
        cadence.reset();
        assert!(cadence.is_due(STATUS, Duration::from_millis(500)));
        assert_eq!(cadence.period(STATUS), Some(Duration::from_secs(1)));
    }
}
