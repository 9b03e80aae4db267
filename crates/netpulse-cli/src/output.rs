// Output formatting for CLI
//
// Text output is tables of measurement records and key-value summaries;
// json/yaml output serializes whole reports.

use anyhow::Result;
use netpulse_core::{Measurement, MeasurementStatus};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
    Yaml,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Self {
        match s {
            "json" => OutputFormat::Json,
            "yaml" => OutputFormat::Yaml,
            _ => OutputFormat::Text,
        }
    }

    pub fn print_value<T: Serialize>(&self, value: &T) -> Result<()> {
        match self {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(value)?);
            }
            OutputFormat::Yaml => {
                println!("{}", serde_yaml::to_string(value)?);
            }
            OutputFormat::Text => {
                // Text format is handled by each command
            }
        }
        Ok(())
    }

    pub fn is_text(&self) -> bool {
        matches!(self, OutputFormat::Text)
    }
}

/// Print a simple key-value pair for text output
pub fn print_field(label: &str, value: &str) {
    println!("{:<14} {}", format!("{}:", label), value);
}

/// Print a table header
pub fn print_table_header(columns: &[(&str, usize)]) {
    let header: String = columns
        .iter()
        .map(|(name, width)| format!("{:<width$}", name, width = width))
        .collect::<Vec<_>>()
        .join("  ");
    println!("{}", header);
}

/// Print a table row
pub fn print_table_row(values: &[(&str, usize)]) {
    let row: String = values
        .iter()
        .map(|(val, width)| format!("{:<width$}", truncate(val, *width), width = width))
        .collect::<Vec<_>>()
        .join("  ");
    println!("{}", row);
}

fn truncate(value: &str, width: usize) -> String {
    if value.chars().count() <= width || width < 3 {
        return value.to_string();
    }
    let kept: String = value.chars().take(width - 3).collect();
    format!("{}...", kept)
}

/// Column layout shared by live and final record listings
pub const RECORD_COLUMNS: [(&str, usize); 4] =
    [("TIME", 8), ("KIND", 5), ("VALUE", 14), ("STATUS", 6)];

pub fn print_record_header() {
    print_table_header(&RECORD_COLUMNS);
}

/// Print one measurement as a table row
pub fn print_measurement(measurement: &Measurement) {
    let value = match measurement {
        _ if measurement.status() == MeasurementStatus::Error => "-".to_string(),
        Measurement::Probe(probe) => format!("{} ms", probe.latency_ms),
        Measurement::Sample(sample) => format!("{:.2} Mbps", sample.average_mbps),
    };
    print_row(
        measurement.wall_clock_label(),
        &measurement.kind().to_string(),
        &value,
        &measurement.status().to_string(),
    );
}

fn print_row(time: &str, kind: &str, value: &str, status: &str) {
    let [time_col, kind_col, value_col, status_col] = RECORD_COLUMNS;
    print_table_row(&[
        (time, time_col.1),
        (kind, kind_col.1),
        (value, value_col.1),
        (status, status_col.1),
    ]);
}
