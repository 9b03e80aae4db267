// Netpulse CLI
//
// Design Decision: Use clap derive for ergonomic argument parsing.
// Design Decision: Support text/json/yaml output formats for scripting.
// Design Decision: Current-thread runtime; the engine runs everything as
// cooperative tasks on one thread.

mod commands;
mod output;

use clap::{Parser, Subcommand};
use netpulse_core::{init_telemetry, TelemetryConfig};

#[derive(Parser)]
#[command(name = "netpulse")]
#[command(about = "Netpulse - Monitor latency and download throughput over time")]
#[command(version)]
pub struct Cli {
    /// Output format
    #[arg(long, short, default_value = "text", value_parser = ["text", "json", "yaml"])]
    pub output: String,

    /// Suppress non-essential output
    #[arg(long, short)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a monitoring session until it elapses or Ctrl-C is pressed
    Run(commands::run::RunArgs),

    /// List preset download targets
    Presets,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_telemetry(TelemetryConfig::from_env().with_service_name("netpulse-cli"));

    let cli = Cli::parse();
    let output_format = output::OutputFormat::parse(&cli.output);

    match cli.command {
        Commands::Run(args) => commands::run::run(args, output_format, cli.quiet).await,
        Commands::Presets => commands::presets::run(output_format),
    }
}
