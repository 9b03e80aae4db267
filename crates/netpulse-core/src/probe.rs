//! Latency prober
//!
//! One probe is one cache-busted request, timed from just before it is issued
//! until the response head arrives or the transport fails. Every invocation
//! yields exactly one [`ProbeRecord`]; failures are never retried.

use std::sync::Arc;

use tracing::{debug, warn};
use url::Url;

use crate::clock::Clock;
use crate::record::ProbeRecord;
use crate::transport::{cache_busted, ProbeTransport};

/// Issues latency probes against a target
#[derive(Clone)]
pub struct LatencyProber {
    transport: Arc<dyn ProbeTransport>,
    clock: Arc<dyn Clock>,
}

impl LatencyProber {
    pub fn new(transport: Arc<dyn ProbeTransport>, clock: Arc<dyn Clock>) -> Self {
        Self { transport, clock }
    }

    /// Run one probe and return its record
    pub async fn probe(&self, target: &Url) -> ProbeRecord {
        let issued_at = self.clock.wall_time();
        let url = cache_busted(target, issued_at.timestamp_millis());

        let start = self.clock.now();
        let result = self.transport.round_trip(&url).await;
        let elapsed = self.clock.now().saturating_duration_since(start);
        let label = self.clock.wall_clock_label();

        match result {
            Ok(()) => {
                let latency_ms = (elapsed.as_secs_f64() * 1000.0).round() as u64;
                debug!(target = %target, latency_ms, "Latency probe completed");
                ProbeRecord::ok(issued_at, label, latency_ms)
            }
            Err(e) => {
                warn!(target = %target, error = %e, "Latency probe failed");
                ProbeRecord::error(issued_at, label)
            }
        }
    }
}
