//! Exchange rate command

use anyhow::Result;
use coffer_core::rates::REPORTING_CURRENCY;
use coffer_core::{ProcessOptions, RateOrigin, RateTable};

pub async fn cmd_rates(options: &ProcessOptions, refresh: bool) -> Result<()> {
    let provider = options.rate_provider()?;
    let table = if refresh {
        provider.refresh().await
    } else {
        provider.get_rates().await
    };

    print_table(&table);
    if let Some(path) = provider.cache_path() {
        println!("   Cache: {}", path.display());
    }
    Ok(())
}

fn print_table(table: &RateTable) {
    let origin = match table.origin {
        RateOrigin::Cache => "📦 cached",
        RateOrigin::Remote => "🌐 fetched",
        RateOrigin::Fallback => "⚠️  fallback",
    };
    println!(
        "💱 Exchange rates ({}, {})",
        origin,
        table.fetched_at.format("%Y-%m-%d %H:%M UTC")
    );
    for (currency, rate) in &table.rates {
        println!("   1 {} = {:>10.4} {}", currency, rate, REPORTING_CURRENCY);
    }
}
