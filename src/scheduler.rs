//! Fixed-interval run scheduling
//!
//! Runs a cycle immediately and then once per interval, measured from the
//! start of the previous run. Everything happens on the calling thread, so
//! runs never overlap; a run that overruns skips the ticks it missed.

use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Single-worker scheduler with a fixed interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scheduler {
    interval: Duration,
}

impl Scheduler {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Runs `cycle` forever
    ///
    /// The first run starts immediately. Each following run starts one
    /// interval after the previous one started, or right away when the
    /// previous run took longer than the interval.
    pub fn run<F>(&self, mut cycle: F) -> !
    where
        F: FnMut(),
    {
        loop {
            let started = Instant::now();
            cycle();

            let finished = Instant::now();
            let deadline = next_deadline(started, self.interval, finished);
            if deadline == finished {
                warn!(
                    elapsed_secs = finished.duration_since(started).as_secs(),
                    "Run took longer than the scan interval, starting next run now"
                );
            } else {
                debug!(
                    wait_secs = deadline.duration_since(finished).as_secs(),
                    "Waiting for next run"
                );
            }

            thread::sleep(deadline.saturating_duration_since(Instant::now()));
        }
    }
}

/// Computes when the next run should start
///
/// # Arguments
///
/// * `previous_start` - When the previous run started
/// * `interval` - The scan interval
/// * `now` - The current instant
///
/// # Returns
///
/// `previous_start + interval`, or `now` when that point already passed
pub fn next_deadline(previous_start: Instant, interval: Duration, now: Instant) -> Instant {
    match previous_start.checked_add(interval) {
        Some(deadline) if deadline > now => deadline,
        _ => now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_deadline_is_one_interval_after_start() {
        let start = Instant::now();
        let interval = Duration::from_secs(60 * 60);
        let now = start + Duration::from_secs(5 * 60);

        assert_eq!(next_deadline(start, interval, now), start + interval);
    }

    #[test]
    fn test_overrun_starts_next_run_immediately() {
        let start = Instant::now();
        let interval = Duration::from_secs(60);

        // Three missed ticks collapse into one immediate run
        let now = start + Duration::from_secs(200);
        assert_eq!(next_deadline(start, interval, now), now);

        let exact = start + interval;
        assert_eq!(next_deadline(start, interval, exact), exact);
    }

    #[test]
    fn test_interval_accessor() {
        let scheduler = Scheduler::new(Duration::from_secs(90));
        assert_eq!(scheduler.interval(), Duration::from_secs(90));
    }
}
