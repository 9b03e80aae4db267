//! Append-only measurement log and derived statistics
//!
//! The log is the single source of truth for a session. [`SessionStats`] is a
//! pure function of its entries and is never stored on its own.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::export::ExportRow;
use crate::record::{HistoryPoint, Measurement, MeasurementStatus};

/// Bounded, completion-ordered sequence of measurements
///
/// Appending past the capacity evicts the oldest entry first, so the relative
/// order of the retained entries never changes.
#[derive(Debug, Clone)]
pub struct MeasurementLog {
    entries: VecDeque<Measurement>,
    capacity: usize,
}

impl Default for MeasurementLog {
    fn default() -> Self {
        Self::new()
    }
}

impl MeasurementLog {
    /// Maximum number of retained entries
    pub const DEFAULT_CAPACITY: usize = 2000;

    pub fn new() -> Self {
        Self::with_capacity_limit(Self::DEFAULT_CAPACITY)
    }

    /// Create a log with a custom retention cap (at least 1)
    pub fn with_capacity_limit(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(Self::DEFAULT_CAPACITY)),
            capacity,
        }
    }

    /// Append a completed measurement, evicting the oldest entry when full
    pub fn append(&mut self, measurement: impl Into<Measurement>) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(measurement.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Measurement> {
        self.entries.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Measurement> {
        self.entries.get(index)
    }

    /// Most recently completed measurement
    pub fn latest(&self) -> Option<&Measurement> {
        self.entries.back()
    }

    /// Progress history of the sample at `index`, for drill-down views
    ///
    /// Returns `None` when the entry does not exist or is a probe. Failed
    /// samples yield an empty slice.
    pub fn sample_history(&self, index: usize) -> Option<&[HistoryPoint]> {
        self.entries
            .get(index)
            .and_then(Measurement::as_sample)
            .map(|s| s.history.as_slice())
    }

    /// Rows for an external exporter, in log order
    pub fn export_rows(&self) -> Vec<ExportRow> {
        self.entries.iter().map(ExportRow::from).collect()
    }

    pub fn to_vec(&self) -> Vec<Measurement> {
        self.entries.iter().cloned().collect()
    }

    /// Derive summary statistics from the current entries
    pub fn compute_stats(&self) -> SessionStats {
        SessionStats::from_measurements(self.entries.iter())
    }
}

/// Summary statistics over a measurement log
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Successful probes
    pub ping_count: usize,
    /// Failed probes
    pub ping_errors: usize,
    /// Mean latency over successful probes, rounded to whole milliseconds
    pub avg_latency_ms: u64,
    /// Successful samples
    pub speed_count: usize,
    /// Failed samples
    pub speed_errors: usize,
    pub avg_mbps: f64,
    pub min_mbps: f64,
    pub max_mbps: f64,
}

impl SessionStats {
    /// Compute statistics; zero-valued when there is nothing to average
    pub fn from_measurements<'a>(measurements: impl IntoIterator<Item = &'a Measurement>) -> Self {
        let mut stats = SessionStats::default();
        let mut latency_sum: u64 = 0;
        let mut speed_sum = 0.0;
        let mut min_mbps = f64::INFINITY;
        let mut max_mbps = f64::NEG_INFINITY;

        for measurement in measurements {
            match measurement {
                Measurement::Probe(p) => match p.status {
                    MeasurementStatus::Ok => {
                        stats.ping_count += 1;
                        latency_sum += p.latency_ms;
                    }
                    MeasurementStatus::Error => stats.ping_errors += 1,
                },
                Measurement::Sample(s) => match s.status {
                    MeasurementStatus::Ok => {
                        stats.speed_count += 1;
                        speed_sum += s.average_mbps;
                        min_mbps = min_mbps.min(s.average_mbps);
                        max_mbps = max_mbps.max(s.average_mbps);
                    }
                    MeasurementStatus::Error => stats.speed_errors += 1,
                },
            }
        }

        if stats.ping_count > 0 {
            stats.avg_latency_ms =
                (latency_sum as f64 / stats.ping_count as f64).round() as u64;
        }

        if stats.speed_count > 0 {
            stats.avg_mbps = speed_sum / stats.speed_count as f64;
            stats.min_mbps = min_mbps;
            stats.max_mbps = max_mbps;
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ProbeRecord, SampleRecord};
    use chrono::Utc;

    fn ping_ok(latency_ms: u64) -> ProbeRecord {
        ProbeRecord::ok(Utc::now(), "10:00:00".to_string(), latency_ms)
    }

    fn ping_err() -> ProbeRecord {
        ProbeRecord::error(Utc::now(), "10:00:00".to_string())
    }

    fn speed_ok(mbps: f64) -> SampleRecord {
        SampleRecord {
            issued_at: Utc::now(),
            wall_clock_label: "10:00:00".to_string(),
            average_mbps: mbps,
            bytes_transferred: 1024,
            duration_secs: 1.0,
            history: vec![HistoryPoint {
                elapsed_ms: 150,
                instant_mbps: mbps,
                cumulative_mb: 0.5,
            }],
            status: MeasurementStatus::Ok,
        }
    }

    #[test]
    fn test_stats_on_mixed_log() {
        let mut log = MeasurementLog::new();
        log.append(ping_ok(10));
        log.append(ping_err());
        log.append(speed_ok(50.0));
        log.append(speed_ok(70.0));

        let stats = log.compute_stats();
        assert_eq!(stats.avg_latency_ms, 10);
        assert_eq!(stats.ping_count, 1);
        assert_eq!(stats.ping_errors, 1);
        assert_eq!(stats.speed_count, 2);
        assert!((stats.avg_mbps - 60.0).abs() < f64::EPSILON);
        assert_eq!(stats.max_mbps, 70.0);
        assert_eq!(stats.min_mbps, 50.0);
    }

    #[test]
    fn test_stats_on_empty_log() {
        let stats = MeasurementLog::new().compute_stats();
        assert_eq!(stats, SessionStats::default());
        assert_eq!(stats.avg_mbps, 0.0);
        assert_eq!(stats.avg_latency_ms, 0);
    }

    #[test]
    fn test_stats_ignore_error_values() {
        let mut log = MeasurementLog::new();
        log.append(ping_err());
        log.append(SampleRecord::error(Utc::now(), "10:00:00".to_string()));

        let stats = log.compute_stats();
        assert_eq!(stats.ping_count, 0);
        assert_eq!(stats.ping_errors, 1);
        assert_eq!(stats.speed_errors, 1);
        assert_eq!(stats.min_mbps, 0.0);
        assert_eq!(stats.max_mbps, 0.0);
    }

    #[test]
    fn test_average_latency_rounds() {
        let mut log = MeasurementLog::new();
        log.append(ping_ok(10));
        log.append(ping_ok(11));
        assert_eq!(log.compute_stats().avg_latency_ms, 11);
    }

    #[test]
    fn test_cap_evicts_oldest_first() {
        let mut log = MeasurementLog::new();
        for i in 0..(MeasurementLog::DEFAULT_CAPACITY as u64 + 1) {
            log.append(ping_ok(i));
        }

        assert_eq!(log.len(), MeasurementLog::DEFAULT_CAPACITY);
        let latencies: Vec<u64> = log
            .iter()
            .map(|m| match m {
                Measurement::Probe(p) => p.latency_ms,
                Measurement::Sample(_) => unreachable!(),
            })
            .collect();
        assert_eq!(latencies.first(), Some(&1));
        assert_eq!(latencies.last(), Some(&2000));
        assert!(latencies.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_custom_capacity() {
        let mut log = MeasurementLog::with_capacity_limit(3);
        for i in 0..5 {
            log.append(ping_ok(i));
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.capacity(), 3);
        assert!(matches!(log.latest(), Some(Measurement::Probe(p)) if p.latency_ms == 4));
    }

    #[test]
    fn test_sample_history() {
        let mut log = MeasurementLog::new();
        log.append(ping_ok(5));
        log.append(speed_ok(40.0));
        log.append(SampleRecord::error(Utc::now(), "10:00:00".to_string()));

        assert!(log.sample_history(0).is_none());
        assert_eq!(log.sample_history(1).map(|h| h.len()), Some(1));
        assert_eq!(log.sample_history(2), Some(&[][..]));
        assert!(log.sample_history(3).is_none());
    }

    #[test]
    fn test_clear() {
        let mut log = MeasurementLog::new();
        log.append(ping_ok(5));
        log.clear();
        assert!(log.is_empty());
        assert!(log.latest().is_none());
    }
}
