// src/task/clock.rs

//! Processing time tracking.
//!
//! No timer runs in the background: the clock remembers when the current run
//! started and computes the elapsed time whenever it is asked.

use std::time::{Duration, Instant};

/// Reported when the task has no processing time to show.
pub const UNTRACKED: i64 = -1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessingClock {
    started: Option<Instant>,
    frozen: Option<Duration>,
}

impl ProcessingClock {
    pub fn start(&mut self, now: Instant) {
        self.started = Some(now);
        self.frozen = None;
    }

    /// Stop tracking and keep the elapsed time readable.
    pub fn stop(&mut self, now: Instant) {
        if let Some(started) = self.started.take() {
            self.frozen = Some(now.saturating_duration_since(started));
        }
    }

    /// Stop tracking and forget the elapsed time.
    pub fn reset(&mut self) {
        self.started = None;
        self.frozen = None;
    }

    /// Elapsed milliseconds, or [`UNTRACKED`].
    pub fn elapsed_ms(&self, now: Instant) -> i64 {
        let elapsed = match (self.started, self.frozen) {
            (Some(started), _) => now.saturating_duration_since(started),
            (None, Some(frozen)) => frozen,
            (None, None) => return UNTRACKED,
        };
        i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX)
    }
}
