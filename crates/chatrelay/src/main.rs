//! chatrelay - credential-aware reverse proxy for the ChatGPT web and platform APIs
//!
//! Main entry point for the chatrelay CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};

mod commands;

use commands::{config, start};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// chatrelay - credential-aware reverse proxy for the ChatGPT web and platform APIs
#[derive(Parser)]
#[command(name = "chatrelay")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file (overrides discovery and CHATRELAY_CONFIG)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the relay server
    Start(start::StartArgs),

    /// Configuration management
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let ctx = commands::Context {
        config_path: cli.config,
        verbose: cli.verbose,
    };

    // Console (human-readable) + daily JSON file
    let log_dir = ctx
        .load_config()
        .ok()
        .and_then(|loaded| loaded.config.logging.dir)
        .unwrap_or_else(default_log_dir);
    let _guard = init_tracing(ctx.verbose, &log_dir);

    match cli.command {
        Commands::Start(args) => start::run(args, &ctx).await,
        Commands::Config(args) => config::run(args, &ctx).await,
    }
}

fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("chatrelay").join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"))
}

/// Install the global subscriber. The file layer is skipped when the log
/// directory cannot be created.
fn init_tracing(verbose: bool, log_dir: &std::path::Path) -> Option<WorkerGuard> {
    use tracing_subscriber::prelude::*;

    let filter = if verbose {
        "chatrelay=debug,chatrelay_proxy=debug,chatrelay_config=debug,tower_http=debug,info"
    } else {
        "chatrelay=info,chatrelay_proxy=info,warn"
    };

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("chatrelay.log")
        .build(log_dir);

    let (file_layer, guard) = match appender {
        Ok(appender) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "chatrelay=trace,chatrelay_proxy=trace,chatrelay_config=trace,tower_http=debug,info",
                ));
            (Some(layer), Some(guard))
        }
        Err(e) => {
            eprintln!(
                "warning: file logging disabled ({}): {}",
                log_dir.display(),
                e
            );
            (None, None)
        }
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(file_layer)
        .init();

    guard
}
