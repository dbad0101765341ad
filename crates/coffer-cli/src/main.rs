//! Coffer CLI - Multi-source personal-finance ledger builder
//!
//! Usage:
//!   coffer process 2026-01          Build ledger, views and summary
//!   coffer process 2026 --dry-run   Parse a whole year without writing
//!   coffer rates --refresh          Fetch today's exchange rates
//!   coffer files 2026               Show how raw files are routed
//!   coffer categorize -s bank-sms -m "WOLT TBILISI"

mod cli;
mod commands;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let categories = cli.categories.as_deref();

    match cli.command {
        Commands::Process {
            period,
            dry_run,
            rates_url,
            json,
        } => {
            let options = commands::process_options(&cli.root, &rates_url, dry_run);
            commands::cmd_process(&options, categories, &period, json).await
        }
        Commands::Rates { refresh, rates_url } => {
            let options = commands::process_options(&cli.root, &rates_url, false);
            commands::cmd_rates(&options, refresh).await
        }
        Commands::Files { year } => commands::cmd_files(&cli.root, year),
        Commands::Categorize {
            source,
            flow,
            category,
            merchant,
            payee,
        } => commands::cmd_categorize(
            categories,
            &source,
            &flow,
            category.as_deref(),
            merchant.as_deref(),
            payee.as_deref(),
        ),
    }
}
