//! # daygrid
//!
//! Command-line front end for daygrid staging.
//!
//! - `daygrid show <subject> <day>`: print committed records for a day
//! - `daygrid apply <script.json>`: run an edit script through a staging
//!   session and print the resulting staged state as JSON
//!
//! Logs go to stderr; stdout carries only JSON.

mod commands;
mod script;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dg_staging::StagingConfig;
use tracing_subscriber::EnvFilter;

/// daygrid: stage day-record edits and commit them as one batch.
#[derive(Parser)]
#[command(name = "daygrid", version, about)]
struct Cli {
    /// Config file (missing file means defaults).
    #[arg(long, default_value = "daygrid.toml")]
    config: PathBuf,

    /// Base dataset JSON file (overrides `[dataset].path`).
    #[arg(long)]
    dataset: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the committed records for one subject and day.
    Show {
        /// Subject id.
        subject: String,
        /// Day key, e.g. 2025-01-05.
        day: String,
    },
    /// Run an edit script against a fresh staging session.
    Apply {
        /// JSON array of edit steps.
        script: PathBuf,
        /// Make every commit step fail, to exercise rollback.
        #[arg(long)]
        fail_commit: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = StagingConfig::load_or_default(&cli.config);
    init_tracing(&config.logging.filter)?;

    let dataset_path = cli.dataset.unwrap_or_else(|| config.dataset.path.clone());
    tracing::debug!(
        "daygrid: config={} dataset={}",
        cli.config.display(),
        dataset_path.display()
    );

    match &cli.command {
        Commands::Show { subject, day } => commands::show::execute(&dataset_path, subject, day),
        Commands::Apply {
            script,
            fail_commit,
        } => commands::apply::execute(&config, &dataset_path, script, *fail_commit).await,
    }
}

/// `RUST_LOG` wins over the configured filter.
fn init_tracing(configured: &str) -> anyhow::Result<()> {
    let filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(_) => EnvFilter::from_default_env(),
        Err(_) => EnvFilter::try_new(configured)?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
    Ok(())
}
