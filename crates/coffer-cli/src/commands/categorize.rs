//! Category rule evaluation command

use std::path::Path;

use anyhow::{bail, Result};
use coffer_core::{Category, CategoryConfig, SourceKind, TxType};

use super::load_config;

pub fn cmd_categorize(
    categories: Option<&Path>,
    source: &str,
    flow: &str,
    category: Option<&str>,
    merchant: Option<&str>,
    payee: Option<&str>,
) -> Result<()> {
    let config = load_config(categories)?;
    let result = categorize(&config, source, flow, category, merchant, payee)?;

    let marker = if result.is_sentinel() { "❓" } else { "🏷️ " };
    println!("{} {} ({})", marker, result.as_str(), config.display_name(result));
    Ok(())
}

/// Parse the source and direction names and apply the rules
pub fn categorize(
    config: &CategoryConfig,
    source: &str,
    flow: &str,
    category: Option<&str>,
    merchant: Option<&str>,
    payee: Option<&str>,
) -> Result<Category> {
    let source: SourceKind = match source.parse() {
        Ok(source) => source,
        Err(e) => bail!(
            "{}\nUse one of: personal-ledger, payment-processor, bank-sms, delivery-service",
            e
        ),
    };
    let flow: TxType = match flow.parse() {
        Ok(flow) => flow,
        Err(e) => bail!("{}\nUse one of: expense, income, transfer", e),
    };
    Ok(config.categorize(source, flow, category, merchant, payee))
}
