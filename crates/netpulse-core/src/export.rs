// Export rows
//
// Flat view of the log for external exporters (CSV, spreadsheets). Formatting
// the rows is left to the consumer.

use serde::{Deserialize, Serialize};

use crate::record::{Measurement, MeasurementKind, MeasurementStatus};

/// One exported measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRow {
    /// Issue time as unix milliseconds
    pub timestamp_ms: i64,
    pub wall_clock_label: String,
    pub kind: MeasurementKind,
    /// Latency in ms for probes, average Mbit/s for samples
    pub value: f64,
    pub status: MeasurementStatus,
}

impl ExportRow {
    /// Column names, in field order
    pub const COLUMNS: [&'static str; 5] =
        ["timestamp", "wall_clock_label", "kind", "value", "status"];
}

impl From<&Measurement> for ExportRow {
    fn from(measurement: &Measurement) -> Self {
        let value = match measurement {
            Measurement::Probe(p) => p.latency_ms as f64,
            Measurement::Sample(s) => s.average_mbps,
        };

        Self {
            timestamp_ms: measurement.issued_at().timestamp_millis(),
            wall_clock_label: measurement.wall_clock_label().to_string(),
            kind: measurement.kind(),
            value,
            status: measurement.status(),
        }
    }
}
