//! Cachet - request-interception caching runtime
//!
//! Main entry point for the Cachet CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::warn;

mod app;
mod commands;
mod logging;

use commands::{check, fetch, index};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Cachet - route requests through caching strategies
#[derive(Parser)]
#[command(name = "cachet")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Config file to use instead of discovery
    #[arg(short, long, global = true, env = "CACHET_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate the configuration and list its routes
    Check(check::CheckArgs),

    /// Send a request through the configured routes
    Fetch(fetch::FetchArgs),

    /// Inspect or clear the expiration index
    Index(index::IndexArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, warnings) = match &cli.config {
        Some(path) => (cachet_config::load_config_file(path)?, Vec::new()),
        None => {
            let loaded = cachet_config::load_config(None)?;
            (loaded.config, loaded.warnings)
        }
    };

    let _guard = logging::init(cli.verbose, config.logging.as_ref());
    for warning in &warnings {
        warn!("{warning}");
    }

    let ctx = commands::Context {
        config,
        json_output: cli.json,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Check(args) => check::run(args, &ctx).await,
        Commands::Fetch(args) => fetch::run(args, &ctx).await,
        Commands::Index(args) => index::run(args, &ctx).await,
    }
}
