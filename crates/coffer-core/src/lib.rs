//! Coffer Core Library
//!
//! Builds one canonical ledger per period out of overlapping personal-finance
//! exports:
//! - Source detection and parsers for a budgeting app, a payment processor,
//!   bank SMS notifications and a food-delivery service
//! - Declarative category rules loaded from a versioned TOML artifact
//! - Exchange rates with cache and fallback, converted into one reporting
//!   currency
//! - Reconciliation of the four sources into a deduplicated ledger
//! - Canonical CSV, chart-friendly views and Markdown summaries
//! - A storage boundary with filesystem and in-memory backends

pub mod anonymize;
pub mod categories;
pub mod error;
pub mod ledger;
pub mod models;
pub mod pipeline;
pub mod rates;
pub mod reconcile;
pub mod sources;
pub mod storage;
pub mod summary;

/// Test utilities including a mock exchange rate feed
#[cfg(test)]
pub mod test_utils;

pub use categories::{CategoryConfig, CategoryRuleSet, RuleTable};
pub use error::{Error, Result};
pub use ledger::RenderedFile;
pub use models::{Category, NormalizedTransaction, Period, RawSourceFile, SourceKind, TxType};
pub use pipeline::{
    process, process_with_rates, NoDataReason, ProcessOptions, RunOutcome, RunReport,
    SourceReport, UnrecognizedRow,
};
pub use rates::{FloatRatesSource, RateOrigin, RateProvider, RateSource, RateTable, StaticRateSource};
pub use reconcile::{reconcile, Ledger, ReconcileStats, SourceOutputs};
pub use sources::{collect_raw_files, detect_source, ParseStats, RawFileSet};
pub use storage::{LocalStorage, MemoryStorage, Storage, StoredFile};
pub use summary::{summarize, SummaryReport};
