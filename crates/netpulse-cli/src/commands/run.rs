// Run a monitoring session

use std::time::Duration;

use crate::commands::presets::find_preset;
use crate::output::{print_field, print_measurement, print_record_header, OutputFormat};
use anyhow::{Context, Result};
use clap::Args;
use netpulse_core::{
    ExportRow, SessionConfig, SessionController, SessionStats, StopReason, TransportConfig,
};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

/// How often new records and download progress are printed
const REFRESH_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Args)]
pub struct RunArgs {
    /// Session length in hours
    #[arg(long, env = "NETPULSE_DURATION_HOURS", default_value = "3")]
    pub duration_hours: u64,

    /// Seconds between latency probes
    #[arg(long, env = "NETPULSE_PING_INTERVAL_SECS", default_value = "2")]
    pub ping_interval: u64,

    /// Seconds between throughput samples
    #[arg(long, env = "NETPULSE_SPEED_INTERVAL_SECS", default_value = "300")]
    pub speed_interval: u64,

    /// Latency probe target
    #[arg(long, env = "NETPULSE_PING_URL")]
    pub ping_url: Option<String>,

    /// Throughput download target
    #[arg(long, env = "NETPULSE_DOWNLOAD_URL")]
    pub download_url: Option<String>,

    /// Preset download target; overrides --download-url
    #[arg(long, value_parser = ["cf-100mb", "cf-500mb", "cf-1gb"])]
    pub preset: Option<String>,

    /// Latency probe timeout in seconds
    #[arg(long, env = "NETPULSE_PROBE_TIMEOUT_SECS", default_value = "10")]
    pub probe_timeout: u64,
}

impl RunArgs {
    fn session_config(&self) -> Result<SessionConfig> {
        let download_url = match self.preset.as_deref().and_then(find_preset) {
            Some(preset) => preset.url(),
            None => self.download_url.as_deref().unwrap_or_default(),
        };

        SessionConfig::new(
            self.duration_hours,
            self.ping_interval,
            self.speed_interval,
            self.ping_url.as_deref().unwrap_or_default(),
            download_url,
        )
        .context("Invalid session configuration")
    }

    fn transport_config(&self) -> TransportConfig {
        TransportConfig::from_env().with_probe_timeout(Duration::from_secs(self.probe_timeout))
    }
}

/// Final report for json/yaml output
#[derive(Debug, Serialize)]
struct SessionReport<'a> {
    session_id: Uuid,
    stop_reason: Option<StopReason>,
    config: &'a SessionConfig,
    stats: SessionStats,
    probe_errors: u64,
    records: Vec<ExportRow>,
}

pub async fn run(args: RunArgs, output: OutputFormat, quiet: bool) -> Result<()> {
    let config = args.session_config()?;
    let controller = SessionController::http(&args.transport_config())
        .context("Failed to build HTTP transport")?;

    let session_id = controller
        .start(config.clone())
        .context("Failed to start session")?;
    let live = output.is_text() && !quiet;

    if live {
        println!("Started session: {}", session_id);
        print_field("Duration", &format!("{}h", args.duration_hours));
        print_field("Ping", &format!("{} every {}s", config.ping_target, args.ping_interval));
        print_field(
            "Download",
            &format!("{} every {}s", config.download_target, args.speed_interval),
        );
        println!();
        print_record_header();
    }

    let stopped = controller.wait_until_stopped();
    tokio::pin!(stopped);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut refresh = tokio::time::interval(REFRESH_INTERVAL);
    let mut cursor = 0;

    let stop_reason = loop {
        tokio::select! {
            reason = &mut stopped => break reason,
            result = &mut ctrl_c => {
                result.context("Failed to listen for Ctrl-C")?;
                info!(%session_id, "Interrupted, stopping session");
                controller.stop(StopReason::UserRequested);
                break Some(StopReason::UserRequested);
            }
            _ = refresh.tick() => {
                if live {
                    cursor = print_new_records(&controller, cursor);
                    print_progress(&controller);
                }
            }
        }
    };

    if live {
        print_new_records(&controller, cursor);
        println!();
    }

    let stats = controller.stats();
    if output.is_text() {
        if quiet {
            println!("{}", session_id);
        } else {
            print_summary(stop_reason, &stats);
        }
        return Ok(());
    }

    output.print_value(&SessionReport {
        session_id,
        stop_reason,
        config: &config,
        stats,
        probe_errors: controller.probe_errors(),
        records: controller.export_rows(),
    })
}

fn print_new_records(controller: &SessionController, cursor: u64) -> u64 {
    let (next, records) = controller.records_since(cursor);
    for record in &records {
        print_measurement(record);
    }
    next
}

fn print_progress(controller: &SessionController) {
    let progress = controller.progress().borrow().clone();
    if progress.active {
        println!(
            "  downloading {:>3}%  {:.2} Mbps  ({:.1}/{:.1} MB)",
            progress.percent, progress.current_mbps, progress.downloaded_mb, progress.total_mb
        );
    }
}

fn print_summary(stop_reason: Option<StopReason>, stats: &SessionStats) {
    let reason = match stop_reason {
        Some(StopReason::DurationElapsed) => "duration elapsed",
        Some(StopReason::UserRequested) => "stopped by user",
        None => "not started",
    };

    print_field("Session", reason);
    print_field(
        "Pings",
        &format!("{} ok, {} failed", stats.ping_count, stats.ping_errors),
    );
    print_field("Avg latency", &format!("{} ms", stats.avg_latency_ms));
    print_field(
        "Samples",
        &format!("{} ok, {} failed", stats.speed_count, stats.speed_errors),
    );
    if stats.speed_count > 0 {
        print_field("Avg speed", &format!("{:.2} Mbps", stats.avg_mbps));
        print_field(
            "Range",
            &format!("{:.2} - {:.2} Mbps", stats.min_mbps, stats.max_mbps),
        );
    }
}
