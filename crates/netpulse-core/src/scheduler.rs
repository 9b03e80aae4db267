//! Session scheduling
//!
//! [`Scheduler`] decides what a tick does. It is a pure function of `now` and
//! its next-fire timestamps, so it can be driven with synthetic instants.
//! [`SampleSlot`] enforces the one-sample-at-a-time rule: a sample can only be
//! launched with a [`SampleTicket`], and at most one ticket exists at a time.
//!
//! # Slot lifecycle
//!
//! ```text
//! ┌──────┐  try_begin()  ┌──────────┐  ticket dropped  ┌──────┐
//! │ Idle │ ────────────► │ InFlight │ ───────────────► │ Idle │
//! └──────┘               └──────────┘                  └──────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::{SessionConfig, MAX_TIMING};

/// What a single tick should do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickPlan {
    /// Session duration elapsed; stop and do nothing else
    Expire,
    /// Issue a latency probe, and a throughput sample if one is due
    Measure { sample_due: bool },
}

/// Next-fire bookkeeping for a running session
#[derive(Debug, Clone)]
pub struct Scheduler {
    ends_at: Instant,
    next_speed_at: Instant,
    speed_interval: Duration,
}

impl Scheduler {
    /// Schedule for a session starting at `started_at`; the first sample is due immediately
    pub fn new(started_at: Instant, config: &SessionConfig) -> Self {
        Self {
            ends_at: saturating_add(started_at, config.duration),
            next_speed_at: started_at,
            speed_interval: config.speed_interval,
        }
    }

    pub fn ends_at(&self) -> Instant {
        self.ends_at
    }

    pub fn next_speed_at(&self) -> Instant {
        self.next_speed_at
    }

    pub fn plan(&self, now: Instant) -> TickPlan {
        if now >= self.ends_at {
            return TickPlan::Expire;
        }
        TickPlan::Measure {
            sample_due: now >= self.next_speed_at,
        }
    }

    /// Record that a sample was launched at `now`
    ///
    /// Only called when a sample actually starts. A due sample that is
    /// skipped because another is in flight leaves the schedule untouched, so
    /// it fires on the next tick where the slot is free.
    pub fn mark_sample_launched(&mut self, now: Instant) {
        self.next_speed_at = saturating_add(now, self.speed_interval);
    }
}

/// `at + duration`, clamped to the latest representable instant nearby
fn saturating_add(at: Instant, duration: Duration) -> Instant {
    at.checked_add(duration)
        .or_else(|| at.checked_add(MAX_TIMING))
        .unwrap_or(at)
}

/// Guard allowing at most one throughput sample in flight
#[derive(Debug, Clone, Default)]
pub struct SampleSlot {
    in_flight: Arc<Mutex<Option<CancellationToken>>>,
}

impl SampleSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move Idle -> InFlight, or return `None` if a sample is already running
    ///
    /// The ticket's token is a child of `parent`, so cancelling the session
    /// also cancels the sample.
    pub fn try_begin(&self, parent: &CancellationToken) -> Option<SampleTicket> {
        let mut in_flight = self.in_flight.lock();
        if in_flight.is_some() {
            return None;
        }

        let token = parent.child_token();
        *in_flight = Some(token.clone());
        Some(SampleTicket {
            slot: Arc::clone(&self.in_flight),
            token,
        })
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.lock().is_some()
    }

    /// Cancel the running sample, if any; returns whether one was cancelled
    pub fn cancel_in_flight(&self) -> bool {
        match self.in_flight.lock().as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

/// Ownership of the sample slot for one sample invocation
///
/// Dropping the ticket returns the slot to Idle on every path: completion,
/// failure, cancellation, or a panicking task.
#[derive(Debug)]
pub struct SampleTicket {
    slot: Arc<Mutex<Option<CancellationToken>>>,
    token: CancellationToken,
}

impl SampleTicket {
    /// Cancellation token for this sample
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Drop for SampleTicket {
    fn drop(&mut self) {
        *self.slot.lock() = None;
    }
}
