//! Ledger pipeline command

use std::path::Path;

use anyhow::{Context, Result};
use coffer_core::{process, NoDataReason, Period, ProcessOptions, RunOutcome, RunReport, UnrecognizedRow};

use super::{format_amount, load_config, truncate};

pub async fn cmd_process(
    options: &ProcessOptions,
    categories: Option<&Path>,
    period: &str,
    json: bool,
) -> Result<()> {
    let outcome = run_process(options, categories, period).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome(&outcome);
    }
    Ok(())
}

/// Run the pipeline under `options` and return its outcome
pub async fn run_process(
    options: &ProcessOptions,
    categories: Option<&Path>,
    period: &str,
) -> Result<RunOutcome> {
    let period: Period = period
        .parse()
        .with_context(|| format!("Invalid period '{}': use YYYY-MM or YYYY", period))?;
    let config = load_config(categories)?;
    let storage = options.storage();
    let rates = options.rate_provider()?;

    process(period, &storage, &config, &rates, options.dry_run)
        .await
        .with_context(|| format!("Processing {} failed", period))
}

fn print_outcome(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::NoData {
            period,
            reason,
            directory,
        } => match reason {
            NoDataReason::NoRawFiles => {
                println!("📭 No raw files for {} in {}/", period, directory);
            }
            NoDataReason::NoTransactions => {
                println!("📭 No transactions for {} in {}/", period, directory);
            }
        },
        RunOutcome::Processed(report) => print_report(report),
    }
}

fn print_report(report: &RunReport) {
    let mode = if report.dry_run { " (dry run)" } else { "" };
    println!("📊 Ledger for {}{}", report.period, mode);
    println!("   Rates: {}", report.rate_origin.as_str());
    println!();

    println!("📥 Sources:");
    for source in &report.sources {
        println!(
            "   {:<18} {:>5} tx  ({} rows, {} malformed, {} out of period, {} dropped)",
            source.source.as_str(),
            source.transactions,
            source.stats.rows_read,
            source.stats.malformed,
            source.stats.out_of_period,
            source.stats.dropped
        );
        for file in &source.files {
            println!("      {}", file);
        }
    }

    let drops = &report.reconcile;
    if drops.sms_replaced_by_delivery > 0
        || drops.local_currency_ledger_dropped > 0
        || drops.duplicate_processor_ids > 0
    {
        println!();
        println!("🔀 Reconciliation:");
        if drops.sms_replaced_by_delivery > 0 {
            println!(
                "   {} SMS delivery charges replaced by order history",
                drops.sms_replaced_by_delivery
            );
        }
        if drops.local_currency_ledger_dropped > 0 {
            println!(
                "   {} local-currency ledger rows covered by SMS",
                drops.local_currency_ledger_dropped
            );
        }
        if drops.duplicate_processor_ids > 0 {
            println!(
                "   {} duplicate processor transactions",
                drops.duplicate_processor_ids
            );
        }
    }

    println!();
    println!("   Transactions: {}", report.transactions);
    println!("   Income:       {:>12}", format_amount(report.total_income));
    println!("   Expenses:     {:>12}", format_amount(report.total_expense));
    println!("   ─────────────────────────");
    println!("   Balance:      {:>12}", format_amount(report.balance));
    println!("   Transfers:    {:>12}", report.transfer_count);

    print_unrecognized(
        "❓ Unrecognized expenses",
        report.unrecognized_expense_count,
        &report.unrecognized_expenses,
    );
    print_unrecognized(
        "❓ Unrecognized income",
        report.unrecognized_income_count,
        &report.unrecognized_income,
    );

    if !report.superseded_files.is_empty() {
        println!();
        println!("🗂  Older dumps ignored: {}", report.superseded_files.join(", "));
    }
    if !report.unrecognized_files.is_empty() {
        println!("⚠️  Files not recognized: {}", report.unrecognized_files.join(", "));
    }

    println!();
    if report.dry_run {
        println!("📝 Would write:");
    } else {
        println!("✅ Wrote:");
    }
    for path in &report.outputs {
        println!("   {}", path);
    }
}

fn print_unrecognized(title: &str, count: usize, sample: &[UnrecognizedRow]) {
    if count == 0 {
        return;
    }
    println!();
    println!("{} ({}):", title, count);
    for row in sample {
        println!(
            "   {}  {:<40} {:>10.2} {}",
            row.date,
            truncate(&row.description, 40),
            row.amount,
            row.currency
        );
    }
    if count > sample.len() {
        println!("   ... and {} more", count - sample.len());
    }
}
