//! haul-field: on-board tracking client for haul trucks.

mod commands;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use haul_tracker::{init_logging, LogLevel};

#[derive(Parser)]
#[command(name = "haul-field")]
#[command(about = "Track haul truck position and report telemetry", long_about = None)]
struct Cli {
    /// Log level (overridden by RUST_LOG)
    #[arg(long, global = true, default_value = "info")]
    log_level: LogLevel,

    /// JSON options file using client field names (enableHighAccuracy, timeout, vehicleId, ...)
    #[arg(long, global = true)]
    options: Option<PathBuf>,

    #[arg(long, global = true)]
    operation_id: Option<String>,

    #[arg(long, global = true)]
    vehicle_id: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Track live fixes from the GNSS bridge until interrupted
    Track {
        /// UDP address the GNSS bridge sends fixes to
        #[arg(long, default_value = "0.0.0.0:5790")]
        bind: String,

        /// Fleet API base URL; telemetry stays local when omitted
        #[arg(long)]
        uplink: Option<String>,

        /// Re-send the whole telemetry log in one batch after stopping
        #[arg(long)]
        resend: bool,

        /// Directory for the session export (default: local data dir)
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// Seconds between status lines
        #[arg(long, default_value = "30")]
        status_every: u64,
    },
    /// Re-run a recorded telemetry log (NDJSON) through the tracker
    Replay {
        input: PathBuf,

        /// Export file (default: <input>.export.json)
        #[arg(long)]
        out: Option<PathBuf>,

        /// Also write the reconstructed route as CSV
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Feed recorded speed and heading as device-reported values
        #[arg(long)]
        reported: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_level);

    let cfg = match commands::load_config(cli.options.as_deref(), cli.operation_id, cli.vehicle_id) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e:#}");
            process::exit(2);
        }
    };

    let result = match cli.command {
        Command::Track { bind, uplink, resend, out_dir, status_every } => {
            commands::track(cfg, commands::TrackArgs { bind, uplink, resend, out_dir, status_every }).await
        }
        Command::Replay { input, out, csv, reported } => {
            commands::replay(cfg, &input, out, csv, reported).await
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
