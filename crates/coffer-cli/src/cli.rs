//! CLI argument definitions using clap
//!
//! This module contains the clap structs and enums for parsing CLI arguments.
//! The command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use coffer_core::rates::DEFAULT_RATES_URL;

/// Coffer - One ledger out of many finance exports
#[derive(Parser)]
#[command(name = "coffer")]
#[command(about = "Multi-source personal-finance ledger builder", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Storage root containing finance/raw/<year>/
    #[arg(long, env = "COFFER_ROOT", default_value = ".", global = true)]
    pub root: PathBuf,

    /// Category rules file (defaults to the data-directory override, then
    /// the built-in rules)
    #[arg(long, global = true)]
    pub categories: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build the ledger, views and summary for a period
    Process {
        /// Period: YYYY-MM (month) or YYYY (year)
        period: String,

        /// Parse and reconcile but write nothing
        #[arg(long)]
        dry_run: bool,

        /// Daily exchange rate feed
        #[arg(long, env = "COFFER_RATES_URL", default_value = DEFAULT_RATES_URL)]
        rates_url: String,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the exchange rates in effect
    Rates {
        /// Ignore the cache and fetch from the feed
        #[arg(long)]
        refresh: bool,

        /// Daily exchange rate feed
        #[arg(long, env = "COFFER_RATES_URL", default_value = DEFAULT_RATES_URL)]
        rates_url: String,
    },

    /// List raw files for a year and the source each routes to
    Files {
        /// Year, e.g. 2026
        year: i32,
    },

    /// Evaluate the category rules for one input
    Categorize {
        /// Source: personal-ledger, payment-processor, bank-sms, delivery-service
        #[arg(short, long)]
        source: String,

        /// Direction: expense, income or transfer
        #[arg(short, long, default_value = "expense")]
        flow: String,

        /// The source's own category label (or transaction/SMS type)
        #[arg(short, long)]
        category: Option<String>,

        /// Merchant or counterparty name
        #[arg(short, long)]
        merchant: Option<String>,

        /// Payee (personal ledger)
        #[arg(short, long)]
        payee: Option<String>,
    },
}
