//! Streaming throughput sampler
//!
//! A sample opens one streaming download, consumes it chunk by chunk and
//! derives rates from the byte counts:
//!
//! ```text
//! instant_mbps = bytes_since_last_snapshot * 8 / secs_since_last_snapshot / 2^20
//! average_mbps = received_bytes * 8 / total_secs / 2^20
//! ```
//!
//! Snapshots are throttled to one per [`PROGRESS_THROTTLE`]. Each one is kept
//! in the sample's history and published on a watch channel for live display.
//! Cancellation discards the partial result and drops the stream, which
//! releases the underlying connection.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::clock::Clock;
use crate::error::{MonitorError, Result};
use crate::record::{HistoryPoint, MeasurementStatus, SampleRecord};
use crate::transport::{cache_busted, DownloadSource};

/// Binary mebibyte; all rates are bits scaled by this
pub const BYTES_PER_MIB: f64 = 1_048_576.0;

/// Minimum spacing between progress snapshots
pub const PROGRESS_THROTTLE: Duration = Duration::from_millis(150);

/// Expected size when neither the server nor the URL declares one (100 MiB)
///
/// Only used for the progress percentage, never for rates.
pub const DEFAULT_EXPECTED_BYTES: u64 = 100 * 1024 * 1024;

/// Query parameter carrying a requested byte count (Cloudflare `__down`)
const BYTES_PARAM: &str = "bytes";

/// Convert a byte count over a duration into Mbit/s (binary scaling)
pub fn mbps(bytes: u64, secs: f64) -> f64 {
    if secs <= 0.0 {
        return 0.0;
    }
    (bytes as f64 * 8.0) / secs / BYTES_PER_MIB
}

/// Expected download size: declared length, else `bytes` query, else default
pub fn resolve_expected_total(content_length: Option<u64>, target: &Url) -> u64 {
    content_length
        .filter(|len| *len > 0)
        .or_else(|| {
            target
                .query_pairs()
                .find(|(key, _)| key == BYTES_PARAM)
                .and_then(|(_, value)| value.parse::<u64>().ok())
                .filter(|len| *len > 0)
        })
        .unwrap_or(DEFAULT_EXPECTED_BYTES)
}

/// Live state of the current download
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DownloadProgress {
    pub active: bool,
    /// Share of the expected size received, clamped to 0..=100
    pub percent: u8,
    pub current_mbps: f64,
    pub downloaded_mb: f64,
    pub total_mb: f64,
}

impl DownloadProgress {
    fn started() -> Self {
        Self {
            active: true,
            ..Default::default()
        }
    }
}

/// Result of a completed download
#[derive(Debug, Clone, PartialEq)]
pub struct SampleSummary {
    pub average_mbps: f64,
    pub bytes_transferred: u64,
    pub duration_secs: f64,
    pub history: Vec<HistoryPoint>,
}

/// Rate bookkeeping for one download
#[derive(Debug)]
pub struct SampleAccumulator {
    started_at: Instant,
    expected_total: u64,
    received: u64,
    last_snapshot_at: Instant,
    last_snapshot_bytes: u64,
    history: Vec<HistoryPoint>,
}

impl SampleAccumulator {
    pub fn new(started_at: Instant, expected_total: u64) -> Self {
        Self {
            started_at,
            expected_total: expected_total.max(1),
            received: 0,
            last_snapshot_at: started_at,
            last_snapshot_bytes: 0,
            history: Vec::new(),
        }
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn history(&self) -> &[HistoryPoint] {
        &self.history
    }

    /// Share of the expected size received, clamped to 0..=100
    pub fn percent(&self) -> u8 {
        let percent = (self.received as f64 / self.expected_total as f64 * 100.0).round();
        percent.clamp(0.0, 100.0) as u8
    }

    /// Account for a chunk; returns a snapshot when the throttle window passed
    pub fn record_chunk(&mut self, len: usize, now: Instant) -> Option<DownloadProgress> {
        self.received += len as u64;

        let since_last = now.saturating_duration_since(self.last_snapshot_at);
        if since_last < PROGRESS_THROTTLE {
            return None;
        }

        let chunk_bytes = self.received - self.last_snapshot_bytes;
        let instant_mbps = mbps(chunk_bytes, since_last.as_secs_f64());
        let cumulative_mb = self.received as f64 / BYTES_PER_MIB;
        let elapsed = now.saturating_duration_since(self.started_at);

        self.history.push(HistoryPoint {
            elapsed_ms: elapsed.as_millis() as u64,
            instant_mbps,
            cumulative_mb,
        });
        self.last_snapshot_at = now;
        self.last_snapshot_bytes = self.received;

        Some(DownloadProgress {
            active: true,
            percent: self.percent(),
            current_mbps: instant_mbps,
            downloaded_mb: cumulative_mb,
            total_mb: self.expected_total as f64 / BYTES_PER_MIB,
        })
    }

    /// Close out the download at `now`
    pub fn finish(self, now: Instant) -> Result<SampleSummary> {
        let duration_secs = now.saturating_duration_since(self.started_at).as_secs_f64();
        if duration_secs <= 0.0 {
            return Err(MonitorError::sample("download completed too fast to measure"));
        }

        Ok(SampleSummary {
            average_mbps: mbps(self.received, duration_secs),
            bytes_transferred: self.received,
            duration_secs,
            history: self.history,
        })
    }
}

/// Runs throughput samples against a download source
#[derive(Clone)]
pub struct ThroughputSampler {
    source: Arc<dyn DownloadSource>,
    clock: Arc<dyn Clock>,
    progress: Arc<watch::Sender<DownloadProgress>>,
}

impl ThroughputSampler {
    pub fn new(source: Arc<dyn DownloadSource>, clock: Arc<dyn Clock>) -> Self {
        let (progress, _) = watch::channel(DownloadProgress::default());
        Self {
            source,
            clock,
            progress: Arc::new(progress),
        }
    }

    /// Receive live progress of the current download
    pub fn subscribe(&self) -> watch::Receiver<DownloadProgress> {
        self.progress.subscribe()
    }

    /// Run one sample
    ///
    /// Returns `None` only when `cancel` fired; any other failure produces an
    /// error record with zeroed metrics.
    pub async fn sample(&self, target: &Url, cancel: CancellationToken) -> Option<SampleRecord> {
        let issued_at = self.clock.wall_time();
        self.progress.send_replace(DownloadProgress::started());

        let outcome = self
            .measure(&cache_busted(target, issued_at.timestamp_millis()), target, &cancel)
            .await;

        self.progress.send_modify(|p| p.active = false);
        let label = self.clock.wall_clock_label();

        match outcome {
            Ok(summary) => {
                info!(
                    target = %target,
                    average_mbps = summary.average_mbps,
                    bytes = summary.bytes_transferred,
                    duration_secs = summary.duration_secs,
                    "Throughput sample completed"
                );
                Some(SampleRecord {
                    issued_at,
                    wall_clock_label: label,
                    average_mbps: summary.average_mbps,
                    bytes_transferred: summary.bytes_transferred,
                    duration_secs: summary.duration_secs,
                    history: summary.history,
                    status: MeasurementStatus::Ok,
                })
            }
            Err(MonitorError::Cancelled) => {
                debug!(target = %target, "Throughput sample cancelled, discarding partial result");
                None
            }
            Err(e) => {
                warn!(target = %target, error = %e, "Throughput sample failed");
                Some(SampleRecord::error(issued_at, label))
            }
        }
    }

    async fn measure(
        &self,
        url: &Url,
        target: &Url,
        cancel: &CancellationToken,
    ) -> Result<SampleSummary> {
        let started_at = self.clock.now();

        let download = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(MonitorError::Cancelled),
            download = self.source.open(url) => download?,
        };

        let expected_total = resolve_expected_total(download.content_length, target);
        let mut accumulator = SampleAccumulator::new(started_at, expected_total);
        let mut chunks = download.chunks;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(MonitorError::Cancelled),
                next = chunks.next() => next,
            };

            match next {
                Some(Ok(len)) => {
                    if let Some(snapshot) = accumulator.record_chunk(len, self.clock.now()) {
                        trace!(
                            percent = snapshot.percent,
                            current_mbps = snapshot.current_mbps,
                            "Download progress"
                        );
                        self.progress.send_replace(snapshot);
                    }
                }
                Some(Err(e)) => return Err(e),
                None => break,
            }
        }

        accumulator.finish(self.clock.now())
    }
}
