//! Converge - declarative reconciliation of Waldur resources
//!
//! Main entry point for the Converge CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{modules, run, validate};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Converge - declarative reconciliation of Waldur resources
#[derive(Parser)]
#[command(name = "converge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Extra config file layered over the discovered ones
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// API base URL (overrides [connection] api_url)
    #[arg(long, global = true, env = "CONVERGE_API_URL")]
    pub api_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Reconcile one resource against its declared state
    Run(run::RunArgs),

    /// List configured modules
    Modules(modules::ModulesArgs),

    /// Check configuration and module definitions
    Validate(validate::ValidateArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Console on stderr (stdout carries results) + rotating JSON file
    let filter = if cli.verbose {
        "converge=debug,converge_engine=debug,converge_client=debug,converge_config=debug,info"
    } else {
        "converge=info,converge_engine=info,converge_client=warn,converge_config=warn,warn"
    };

    let log_dir = converge_config::user_config_dir()
        .map(|d| d.join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "converge.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "converge=trace,converge_engine=trace,converge_client=trace,converge_config=trace,info",
                )),
        )
        .init();

    let ctx = commands::Context::load(cli.config.as_deref(), cli.api_url, cli.verbose)?;

    match cli.command {
        Commands::Run(args) => run::run(args, &ctx),
        Commands::Modules(args) => modules::run(args, &ctx),
        Commands::Validate(args) => validate::run(args, &ctx),
    }
}
