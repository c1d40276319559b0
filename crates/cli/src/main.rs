//! Field Report CLI
//!
//! Frame extraction from a timestamps file, and the HTTP server.

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

mod commands;

use commands::extract::ExtractCommand;
use commands::serve::ServeCommand;

#[derive(Parser)]
#[command(
    name = "field-report",
    version,
    about = "Daily field reports from site videos",
    after_help = "EXAMPLES:\n  \
                  # Extract the frames listed in a timestamps file\n  \
                  field-report extract --video walk.mp4 --timestamps frame_timestamps.json --output-dir ./frames\n\n  \
                  # Run the HTTP API with a YAML config\n  \
                  field-report serve --config server.yaml"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract frames at the timestamps listed in a JSON file
    Extract(ExtractCommand),

    /// Start the HTTP API server
    Serve(ServeCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    match cli.command {
        Commands::Extract(cmd) => cmd.execute().await,
        Commands::Serve(cmd) => cmd.execute().await,
    }
}
