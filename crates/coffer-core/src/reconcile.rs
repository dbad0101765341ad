//! Merge the four parsed sources into one ledger.
//!
//! Priority is bank SMS > delivery > personal ledger > payment processor.
//! The rules run in a fixed order:
//!
//! 1. Bank SMS rows form the base.
//! 2. When delivery rows exist, SMS rows mentioning the delivery marker are
//!    replaced by the delivery detail.
//! 3. When SMS rows exist, personal-ledger rows in the local currency are
//!    dropped unless they are transfers (the bank already reported them).
//! 4. Processor rows are appended, first occurrence of each transaction ID
//!    wins.
//!
//! Matching is by these rules only; there is no fuzzy amount or date matching.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{info, warn};

use crate::categories::CategoryConfig;
use crate::models::{Category, NormalizedTransaction};
use crate::sources::ProcessorTransaction;

/// Per-source parser output, in any order
#[derive(Debug, Clone, Default)]
pub struct SourceOutputs {
    pub bank_sms: Vec<NormalizedTransaction>,
    pub delivery: Vec<NormalizedTransaction>,
    pub personal_ledger: Vec<NormalizedTransaction>,
    pub payment_processor: Vec<ProcessorTransaction>,
}

/// Rows removed while merging
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileStats {
    pub sms_replaced_by_delivery: usize,
    pub local_currency_ledger_dropped: usize,
    pub duplicate_processor_ids: usize,
}

/// Deduplicated transactions for a period, ordered by date
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Ledger {
    pub transactions: Vec<NormalizedTransaction>,
}

impl Ledger {
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn total_income(&self) -> f64 {
        self.transactions
            .iter()
            .filter(|t| t.is_income())
            .map(|t| t.amount_reporting)
            .sum()
    }

    pub fn total_expense(&self) -> f64 {
        self.transactions
            .iter()
            .filter(|t| t.is_expense())
            .map(|t| t.amount_reporting)
            .sum()
    }

    pub fn balance(&self) -> f64 {
        self.total_income() - self.total_expense()
    }

    pub fn transfer_count(&self) -> usize {
        self.transactions.iter().filter(|t| t.is_transfer()).count()
    }

    /// Expense rows left in `other_expense`
    pub fn unrecognized_expenses(&self) -> impl Iterator<Item = &NormalizedTransaction> {
        self.transactions
            .iter()
            .filter(|t| t.is_expense() && t.category == Category::OtherExpense)
    }

    /// Income rows left in `other_income`
    pub fn unrecognized_income(&self) -> impl Iterator<Item = &NormalizedTransaction> {
        self.transactions
            .iter()
            .filter(|t| t.is_income() && t.category == Category::OtherIncome)
    }
}

/// Merge parser outputs into a ledger
pub fn reconcile(outputs: SourceOutputs, config: &CategoryConfig) -> (Ledger, ReconcileStats) {
    let SourceOutputs {
        bank_sms,
        delivery,
        personal_ledger,
        payment_processor,
    } = outputs;

    let mut stats = ReconcileStats::default();
    let has_sms = !bank_sms.is_empty();
    let mut merged = bank_sms;

    if !delivery.is_empty() {
        let marker = config.delivery_service.marker.to_lowercase();
        let before = merged.len();
        if !marker.is_empty() {
            merged.retain(|t| !t.description.to_lowercase().contains(&marker));
        }
        stats.sms_replaced_by_delivery = before - merged.len();
        merged.extend(delivery);
    }

    if has_sms {
        let local = &config.reporting.local_currency;
        let before = personal_ledger.len();
        let kept: Vec<_> = personal_ledger
            .into_iter()
            .filter(|t| t.is_transfer() || !t.currency.eq_ignore_ascii_case(local))
            .collect();
        stats.local_currency_ledger_dropped = before - kept.len();
        merged.extend(kept);
    } else {
        merged.extend(personal_ledger);
    }

    let mut seen: HashSet<String> = HashSet::new();
    for row in payment_processor {
        if !row.transaction_id.is_empty() && !seen.insert(row.transaction_id.clone()) {
            warn!("Duplicate processor transaction ID {}, skipping", row.transaction_id);
            stats.duplicate_processor_ids += 1;
            continue;
        }
        merged.push(row.tx);
    }

    // Stable: rows on the same day keep source priority order
    merged.sort_by_key(|t| t.date);

    if stats != ReconcileStats::default() {
        info!(
            "Reconciliation dropped {} SMS rows (delivery detail), {} local-currency ledger rows, {} duplicate processor rows",
            stats.sms_replaced_by_delivery,
            stats.local_currency_ledger_dropped,
            stats.duplicate_processor_ids
        );
    }

    (
        Ledger {
            transactions: merged,
        },
        stats,
    )
}
