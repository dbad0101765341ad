//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `process` - Run the ledger pipeline for a period
//! - `rates` - Show or refresh exchange rates
//! - `files` - Raw file discovery and routing
//! - `categorize` - Evaluate the category rules for one input

pub mod categorize;
pub mod files;
pub mod process;
pub mod rates;

// Re-export command functions for main.rs
pub use categorize::*;
pub use files::*;
pub use process::*;
pub use rates::*;

use std::path::Path;

use anyhow::{Context, Result};
use coffer_core::pipeline::ProcessOptions;
use coffer_core::CategoryConfig;
use tracing::debug;

/// Load category rules: explicit path, data-directory override, built-in
pub fn load_config(categories: Option<&Path>) -> Result<CategoryConfig> {
    let config = CategoryConfig::load(categories).context("Failed to load category rules")?;
    debug!("Category rules version {}", config.version);
    Ok(config)
}

/// Options for a run rooted at `root`
pub fn process_options(root: &Path, rates_url: &str, dry_run: bool) -> ProcessOptions {
    ProcessOptions {
        root: root.to_path_buf(),
        dry_run,
        rates_url: rates_url.to_string(),
        ..ProcessOptions::default()
    }
}

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Whole-number amount with thousands separators
pub fn format_amount(value: f64) -> String {
    let rounded = value.round();
    let sign = if rounded < 0.0 { "-" } else { "" };
    format!("{}{}", sign, format_num::format_num!(",.0f", rounded.abs()))
}
