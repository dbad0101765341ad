//! Ledger output files
//!
//! Three CSV documents per period, all rebuilt from scratch every run:
//! - `finance/processed/<period>.csv`: the canonical ledger
//! - `<period>-findoc.csv`: flat view, one signed row per income/expense
//! - `<period>-findoc-pie.csv`: one row per (type, category) with the total
//!
//! Rendering produces bytes only; the pipeline writes them once every output
//! of the run has rendered.

use std::collections::BTreeMap;

use csv::Writer;

use crate::categories::CategoryConfig;
use crate::error::{Error, Result};
use crate::models::{round2, Category, NormalizedTransaction, Period, TxType};
use crate::reconcile::Ledger;

/// Canonical CSV header
pub const CANONICAL_FIELDS: [&str; 9] = [
    "date",
    "type",
    "category",
    "description",
    "amount",
    "currency",
    "amount_rub",
    "source",
    "account",
];

/// Header shared by both views
pub const VIEW_FIELDS: [&str; 5] = ["Category", "Subcategory", "Value", "TimeStamp", "Extra"];

const PROCESSED_DIR: &str = "finance/processed";

pub fn canonical_path(period: Period) -> String {
    format!("{}/{}.csv", PROCESSED_DIR, period)
}

pub fn flat_view_path(period: Period) -> String {
    format!("{}/{}-findoc.csv", PROCESSED_DIR, period)
}

pub fn pie_view_path(period: Period) -> String {
    format!("{}/{}-findoc-pie.csv", PROCESSED_DIR, period)
}

/// A rendered file waiting to be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFile {
    pub path: String,
    pub content: Vec<u8>,
}

/// Render the canonical ledger and both views
pub fn render(ledger: &Ledger, period: Period, config: &CategoryConfig) -> Result<Vec<RenderedFile>> {
    Ok(vec![
        RenderedFile {
            path: canonical_path(period),
            content: render_canonical(&ledger.transactions)?,
        },
        RenderedFile {
            path: flat_view_path(period),
            content: render_flat_view(&ledger.transactions, config)?,
        },
        RenderedFile {
            path: pie_view_path(period),
            content: render_pie_view(&ledger.transactions, period, config)?,
        },
    ])
}

fn finish(writer: Writer<Vec<u8>>) -> Result<Vec<u8>> {
    writer.into_inner().map_err(|e| Error::Io(e.into_error()))
}

fn money(value: f64) -> String {
    format!("{:.2}", round2(value))
}

/// Canonical ledger, rows in ledger order
pub fn render_canonical(transactions: &[NormalizedTransaction]) -> Result<Vec<u8>> {
    let mut writer = Writer::from_writer(Vec::new());
    writer.write_record(CANONICAL_FIELDS)?;
    for tx in transactions {
        writer.write_record([
            tx.date.format("%Y-%m-%d").to_string(),
            tx.tx_type.to_string(),
            tx.category.to_string(),
            tx.description.clone(),
            money(tx.amount),
            tx.currency.clone(),
            money(tx.amount_reporting),
            tx.source.to_string(),
            tx.account.clone(),
        ])?;
    }
    finish(writer)
}

/// Rows that appear in the views: income and expense, never the transfer
/// category even when typed income or expense
fn in_views(tx: &NormalizedTransaction) -> bool {
    (tx.is_income() || tx.is_expense()) && tx.category != Category::Transfer
}

fn type_label(tx_type: TxType) -> &'static str {
    match tx_type {
        TxType::Income => "Income",
        TxType::Expense => "Expenses",
        TxType::Transfer => "Transfer",
    }
}

/// Flat view: income positive, expenses negative
pub fn render_flat_view(transactions: &[NormalizedTransaction], config: &CategoryConfig) -> Result<Vec<u8>> {
    let mut writer = Writer::from_writer(Vec::new());
    writer.write_record(VIEW_FIELDS)?;
    for tx in transactions.iter().filter(|t| in_views(t)) {
        let value = if tx.is_income() {
            tx.amount_reporting
        } else {
            -tx.amount_reporting
        };
        let value = money(value);
        let date = tx.date.format("%Y-%m-%d").to_string();
        writer.write_record([
            type_label(tx.tx_type),
            config.display_name(tx.category),
            value.as_str(),
            date.as_str(),
            tx.description.as_str(),
        ])?;
    }
    finish(writer)
}

/// Pie view: totals per (type, category), largest first
pub fn render_pie_view(
    transactions: &[NormalizedTransaction],
    period: Period,
    config: &CategoryConfig,
) -> Result<Vec<u8>> {
    let mut totals: BTreeMap<(&'static str, &str), f64> = BTreeMap::new();
    let mut first_date = None;

    for tx in transactions.iter().filter(|t| in_views(t)) {
        let extra = if tx.is_expense() { "расход" } else { "доход" };
        *totals
            .entry((extra, config.display_name(tx.category)))
            .or_default() += tx.amount_reporting;
        first_date = match first_date {
            Some(d) if d <= tx.date => Some(d),
            _ => Some(tx.date),
        };
    }

    let timestamp = first_date
        .unwrap_or_else(|| period.first_day())
        .format("%Y-%m-%d")
        .to_string();

    let mut rows: Vec<_> = totals.into_iter().collect();
    rows.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mut writer = Writer::from_writer(Vec::new());
    writer.write_record(VIEW_FIELDS)?;
    for ((extra, name), total) in rows {
        let value = money(total.abs());
        writer.write_record([name, name, value.as_str(), timestamp.as_str(), extra])?;
    }
    finish(writer)
}
