//! Period summaries
//!
//! [`summarize`] builds a [`SummaryReport`] data object from a ledger;
//! [`render_markdown`] turns it into the Markdown document stored at
//! `finance/summaries/<period>.md`. Amounts are in the reporting currency.

use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::categories::CategoryConfig;
use crate::models::{Category, NormalizedTransaction, Period, SourceKind};
use crate::rates::REPORTING_CURRENCY;
use crate::reconcile::Ledger;

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

pub fn summary_path(period: Period) -> String {
    format!("finance/summaries/{}.md", period)
}

pub fn month_name(month: u32) -> &'static str {
    month
        .checked_sub(1)
        .and_then(|i| MONTH_NAMES.get(i as usize))
        .copied()
        .unwrap_or("?")
}

/// Subtotal for one category
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTotal {
    pub category: Category,
    pub display_name: String,
    pub amount: f64,
    /// Percent of the direction's total (expenses only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub share: Option<f64>,
    /// Yearly reports only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly_average: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceTotal {
    pub source: SourceKind,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopExpense {
    pub date: NaiveDate,
    pub description: String,
    pub amount: f64,
    pub currency: String,
    pub amount_reporting: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthRow {
    pub month: u32,
    pub income: f64,
    pub expense: f64,
    pub balance: f64,
}

/// Year-only section
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearBreakdown {
    /// Always twelve rows, January first
    pub months: Vec<MonthRow>,
    pub average_income: f64,
    pub average_expense: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryReport {
    pub period: Period,
    pub total_income: f64,
    pub total_expense: f64,
    pub balance: f64,
    pub transfer_count: usize,
    pub income_by_category: Vec<CategoryTotal>,
    pub expense_by_category: Vec<CategoryTotal>,
    pub expense_by_source: Vec<SourceTotal>,
    pub top_expenses: Vec<TopExpense>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<YearBreakdown>,
}

/// Largest first; ties keep key order
fn sorted_desc<K: Ord>(totals: BTreeMap<K, f64>) -> Vec<(K, f64)> {
    let mut rows: Vec<_> = totals.into_iter().collect();
    rows.sort_by(|a, b| b.1.total_cmp(&a.1));
    rows
}

fn by_category<'a>(rows: impl Iterator<Item = &'a NormalizedTransaction>) -> BTreeMap<Category, f64> {
    let mut totals = BTreeMap::new();
    for tx in rows {
        *totals.entry(tx.category).or_default() += tx.amount_reporting;
    }
    totals
}

fn category_table(
    totals: BTreeMap<Category, f64>,
    config: &CategoryConfig,
    with_share: bool,
    yearly: bool,
) -> Vec<CategoryTotal> {
    let grand: f64 = totals.values().sum();
    sorted_desc(totals)
        .into_iter()
        .map(|(category, amount)| CategoryTotal {
            category,
            display_name: config.display_name(category).to_string(),
            amount,
            share: with_share.then(|| if grand > 0.0 { amount * 100.0 / grand } else { 0.0 }),
            monthly_average: yearly.then_some(amount / 12.0),
        })
        .collect()
}

/// Aggregate a ledger for `period`
pub fn summarize(ledger: &Ledger, period: Period, config: &CategoryConfig) -> SummaryReport {
    let txs = &ledger.transactions;
    let yearly = period.is_year();

    let income_by_category = category_table(
        by_category(txs.iter().filter(|t| t.is_income())),
        config,
        false,
        yearly,
    );
    let expense_by_category = category_table(
        by_category(txs.iter().filter(|t| t.is_expense())),
        config,
        true,
        yearly,
    );

    let mut sources: BTreeMap<SourceKind, f64> = BTreeMap::new();
    for tx in txs.iter().filter(|t| t.is_expense()) {
        *sources.entry(tx.source).or_default() += tx.amount_reporting;
    }
    let expense_by_source = sorted_desc(sources)
        .into_iter()
        .map(|(source, amount)| SourceTotal { source, amount })
        .collect();

    let mut expenses: Vec<&NormalizedTransaction> = txs.iter().filter(|t| t.is_expense()).collect();
    expenses.sort_by(|a, b| b.amount_reporting.total_cmp(&a.amount_reporting));
    let top_expenses = expenses
        .into_iter()
        .take(config.reporting.top_expenses)
        .map(|t| TopExpense {
            date: t.date,
            description: t.description.clone(),
            amount: t.amount,
            currency: t.currency.clone(),
            amount_reporting: t.amount_reporting,
        })
        .collect();

    let total_income = ledger.total_income();
    let total_expense = ledger.total_expense();

    let year = yearly.then(|| {
        let mut months: Vec<MonthRow> = (1..=12)
            .map(|month| MonthRow {
                month,
                income: 0.0,
                expense: 0.0,
                balance: 0.0,
            })
            .collect();
        for tx in txs {
            let row = &mut months[tx.date.month0() as usize];
            if tx.is_income() {
                row.income += tx.amount_reporting;
            } else if tx.is_expense() {
                row.expense += tx.amount_reporting;
            }
        }
        for row in &mut months {
            row.balance = row.income - row.expense;
        }
        YearBreakdown {
            months,
            average_income: total_income / 12.0,
            average_expense: total_expense / 12.0,
        }
    });

    SummaryReport {
        period,
        total_income,
        total_expense,
        balance: total_income - total_expense,
        transfer_count: ledger.transfer_count(),
        income_by_category,
        expense_by_category,
        expense_by_source,
        top_expenses,
        year,
    }
}

fn whole(value: f64) -> String {
    format_num::format_num!(",.0f", value)
}

fn cents(value: f64) -> String {
    format_num::format_num!(",.2f", value)
}

fn signed(value: f64) -> String {
    if value >= 0.0 {
        format!("+{}", whole(value))
    } else {
        format!("-{}", whole(value.abs()))
    }
}

/// Render a report as Markdown
pub fn render_markdown(report: &SummaryReport, generated_at: NaiveDateTime) -> String {
    let mut out = String::new();
    let cur = REPORTING_CURRENCY;

    let title = match report.period {
        Period::Month { year, month } => format!("{} {}", month_name(month), year),
        Period::Year(year) => format!("Financial summary {}", year),
    };
    let _ = writeln!(out, "# {}\n", title);
    let _ = writeln!(out, "*Generated: {}*\n", generated_at.format("%Y-%m-%d %H:%M"));

    if let Some(year) = &report.year {
        render_year(&mut out, report, year);
        return out;
    }

    let _ = writeln!(out, "## Balance: {} {}\n", signed(report.balance), cur);
    let _ = writeln!(out, "- Income: **{} {}**", whole(report.total_income), cur);
    let _ = writeln!(out, "- Expenses: **{} {}**", whole(report.total_expense), cur);
    let _ = writeln!(out, "- Transfers between accounts: {}\n", report.transfer_count);

    let _ = writeln!(out, "## Income\n");
    let _ = writeln!(out, "| Category | Amount {} |", cur);
    let _ = writeln!(out, "|----------|--------|");
    for row in &report.income_by_category {
        let _ = writeln!(out, "| {} | {} |", row.display_name, whole(row.amount));
    }
    let _ = writeln!(out, "| **Total** | **{}** |\n", whole(report.total_income));

    let _ = writeln!(out, "## Expenses\n");
    let _ = writeln!(out, "| Category | Amount {} | % |", cur);
    let _ = writeln!(out, "|----------|--------|---|");
    for row in &report.expense_by_category {
        let _ = writeln!(
            out,
            "| {} | {} | {:.1}% |",
            row.display_name,
            whole(row.amount),
            row.share.unwrap_or_default()
        );
    }
    let _ = writeln!(out, "| **Total** | **{}** | |\n", whole(report.total_expense));

    let _ = writeln!(out, "## Expenses by source\n");
    let _ = writeln!(out, "| Source | Amount {} |", cur);
    let _ = writeln!(out, "|--------|--------|");
    for row in &report.expense_by_source {
        let _ = writeln!(out, "| {} | {} |", row.source, whole(row.amount));
    }
    out.push('\n');

    let _ = writeln!(out, "## Top {} expenses\n", report.top_expenses.len());
    let _ = writeln!(out, "| Date | Description | Amount | Currency | {} |", cur);
    let _ = writeln!(out, "|------|-------------|--------|----------|-----|");
    for row in &report.top_expenses {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | {} |",
            row.date,
            row.description.replace('|', "/"),
            cents(row.amount),
            row.currency,
            whole(row.amount_reporting)
        );
    }
    out.push('\n');

    let _ = writeln!(out, "## Notes\n");
    let _ = writeln!(out, "- ");
    out
}

fn render_year(out: &mut String, report: &SummaryReport, year: &YearBreakdown) {
    let cur = REPORTING_CURRENCY;

    let _ = writeln!(out, "## Monthly balance\n");
    let _ = writeln!(out, "| Month | Income | Expenses | Balance |");
    let _ = writeln!(out, "|-------|--------|----------|---------|");
    for row in &year.months {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} |",
            month_name(row.month),
            whole(row.income),
            whole(row.expense),
            signed(row.balance)
        );
    }
    let _ = writeln!(
        out,
        "| **Total** | **{}** | **{}** | **{}** |",
        whole(report.total_income),
        whole(report.total_expense),
        signed(report.balance)
    );
    let _ = writeln!(
        out,
        "| *Average/month* | *{}* | *{}* | |\n",
        whole(year.average_income),
        whole(year.average_expense)
    );
    let _ = writeln!(out, "- Transfers between accounts: {}\n", report.transfer_count);

    let _ = writeln!(out, "## Expenses by category (year)\n");
    let _ = writeln!(out, "| Category | Amount {} | Average/month | % |", cur);
    let _ = writeln!(out, "|----------|--------|---------------|---|");
    for row in &report.expense_by_category {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {:.1}% |",
            row.display_name,
            whole(row.amount),
            whole(row.monthly_average.unwrap_or_default()),
            row.share.unwrap_or_default()
        );
    }
    out.push('\n');

    let _ = writeln!(out, "## Income by category (year)\n");
    let _ = writeln!(out, "| Category | Amount {} | Average/month |", cur);
    let _ = writeln!(out, "|----------|--------|---------------|");
    for row in &report.income_by_category {
        let _ = writeln!(
            out,
            "| {} | {} | {} |",
            row.display_name,
            whole(row.amount),
            whole(row.monthly_average.unwrap_or_default())
        );
    }
}
