// Measurement records
//
// Records are immutable once built; the log only ever appends or evicts them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementKind {
    /// Latency probe
    Ping,
    /// Throughput sample
    Speed,
}

impl std::fmt::Display for MeasurementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ping => write!(f, "ping"),
            Self::Speed => write!(f, "speed"),
        }
    }
}

/// Outcome of a measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementStatus {
    Ok,
    Error,
}

impl MeasurementStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl std::fmt::Display for MeasurementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// One latency probe
///
/// `latency_ms` is 0 on error and must be ignored by consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeRecord {
    pub issued_at: DateTime<Utc>,
    pub wall_clock_label: String,
    pub latency_ms: u64,
    pub status: MeasurementStatus,
}

impl ProbeRecord {
    pub fn ok(issued_at: DateTime<Utc>, wall_clock_label: String, latency_ms: u64) -> Self {
        Self {
            issued_at,
            wall_clock_label,
            latency_ms,
            status: MeasurementStatus::Ok,
        }
    }

    pub fn error(issued_at: DateTime<Utc>, wall_clock_label: String) -> Self {
        Self {
            issued_at,
            wall_clock_label,
            latency_ms: 0,
            status: MeasurementStatus::Error,
        }
    }
}

/// One throttled progress snapshot taken during a throughput sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    /// Milliseconds since the download started
    pub elapsed_ms: u64,
    /// Rate over the interval since the previous snapshot, in Mbit/s
    pub instant_mbps: f64,
    /// Total received so far, in MiB
    pub cumulative_mb: f64,
}

/// One throughput sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    pub issued_at: DateTime<Utc>,
    pub wall_clock_label: String,
    pub average_mbps: f64,
    pub bytes_transferred: u64,
    pub duration_secs: f64,
    pub history: Vec<HistoryPoint>,
    pub status: MeasurementStatus,
}

impl SampleRecord {
    /// Failed sample with zeroed metrics and no history
    pub fn error(issued_at: DateTime<Utc>, wall_clock_label: String) -> Self {
        Self {
            issued_at,
            wall_clock_label,
            average_mbps: 0.0,
            bytes_transferred: 0,
            duration_secs: 0.0,
            history: Vec::new(),
            status: MeasurementStatus::Error,
        }
    }
}

/// Entry of the measurement log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Measurement {
    #[serde(rename = "ping")]
    Probe(ProbeRecord),
    #[serde(rename = "speed")]
    Sample(SampleRecord),
}

impl Measurement {
    pub fn kind(&self) -> MeasurementKind {
        match self {
            Self::Probe(_) => MeasurementKind::Ping,
            Self::Sample(_) => MeasurementKind::Speed,
        }
    }

    pub fn status(&self) -> MeasurementStatus {
        match self {
            Self::Probe(p) => p.status,
            Self::Sample(s) => s.status,
        }
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        match self {
            Self::Probe(p) => p.issued_at,
            Self::Sample(s) => s.issued_at,
        }
    }

    pub fn wall_clock_label(&self) -> &str {
        match self {
            Self::Probe(p) => &p.wall_clock_label,
            Self::Sample(s) => &s.wall_clock_label,
        }
    }

    pub fn as_sample(&self) -> Option<&SampleRecord> {
        match self {
            Self::Sample(s) => Some(s),
            Self::Probe(_) => None,
        }
    }
}

impl From<ProbeRecord> for Measurement {
    fn from(record: ProbeRecord) -> Self {
        Measurement::Probe(record)
    }
}

impl From<SampleRecord> for Measurement {
    fn from(record: SampleRecord) -> Self {
        Measurement::Sample(record)
    }
}
