//! Time source for the engine
//!
//! Monotonic time is `tokio::time::Instant`, so a paused tokio runtime
//! (`#[tokio::test(start_paused = true)]`) drives both the tick interval and
//! every elapsed-time measurement deterministically.

use chrono::{DateTime, Local, Utc};
use tokio::time::Instant;

/// Source of monotonic and wall-clock time
pub trait Clock: Send + Sync {
    /// Monotonic timestamp used for intervals and rate computation
    fn now(&self) -> Instant;

    /// Wall-clock time used for record timestamps
    fn wall_time(&self) -> DateTime<Utc>;

    /// Human-readable `HH:MM:SS` label for the current moment
    fn wall_clock_label(&self) -> String {
        wall_clock_label(self.wall_time())
    }
}

/// Clock backed by tokio time and the system wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall_time(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Format a timestamp as a local `HH:MM:SS` label
pub fn wall_clock_label(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M:%S").to_string()
}
