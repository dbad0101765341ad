//! One processing run for a period
//!
//! discover raw files → acquire rates → parse each source → reconcile →
//! render ledger, views and summary → write.
//!
//! Every output is rendered before the first write, so a parse or render
//! failure leaves previous outputs untouched. Dry runs stop after rendering.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::Serialize;
use tracing::{info, warn};

use crate::categories::CategoryConfig;
use crate::error::{Error, Result};
use crate::ledger::{self, RenderedFile};
use crate::models::{NormalizedTransaction, Period, RawSourceFile, SourceKind};
use crate::rates::{
    default_cache_path, FloatRatesSource, RateOrigin, RateProvider, RateTable, DEFAULT_MAX_AGE,
    DEFAULT_RATES_URL, DEFAULT_TIMEOUT,
};
use crate::reconcile::{reconcile, ReconcileStats, SourceOutputs};
use crate::sources::{
    collect_raw_files, parse_bank_sms, parse_delivery, parse_payment_processor,
    parse_personal_ledger, raw_dir, ParseOutput, ParseStats, RawFileSet,
};
use crate::storage::{LocalStorage, Storage};
use crate::summary::{self, SummaryReport};

/// Unrecognized rows listed per direction in a run report
pub const UNRECOGNIZED_SAMPLE: usize = 5;

/// Runtime options for a run
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    /// Storage root holding `finance/`
    pub root: PathBuf,
    pub dry_run: bool,
    /// Rate cache file; None disables caching
    pub rate_cache: Option<PathBuf>,
    pub rates_url: String,
    pub rate_timeout: Duration,
    pub rate_max_age: Duration,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            dry_run: false,
            rate_cache: default_cache_path(),
            rates_url: DEFAULT_RATES_URL.to_string(),
            rate_timeout: DEFAULT_TIMEOUT,
            rate_max_age: DEFAULT_MAX_AGE,
        }
    }
}

impl ProcessOptions {
    pub fn storage(&self) -> LocalStorage {
        LocalStorage::new(&self.root)
    }

    /// Rate provider over the configured feed and cache
    pub fn rate_provider(&self) -> Result<RateProvider> {
        let source = FloatRatesSource::new(&self.rates_url, self.rate_timeout)?;
        let mut provider = RateProvider::new(Box::new(source)).with_max_age(self.rate_max_age);
        if let Some(path) = &self.rate_cache {
            provider = provider.with_cache(path);
        }
        Ok(provider)
    }
}

/// Rows and counters for one source
#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub source: SourceKind,
    pub files: Vec<String>,
    /// Rows the parser produced for the period
    pub transactions: usize,
    pub stats: ParseStats,
}

/// A row left in a catch-all category
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnrecognizedRow {
    pub date: NaiveDate,
    pub description: String,
    pub amount: f64,
    pub currency: String,
}

impl From<&NormalizedTransaction> for UnrecognizedRow {
    fn from(tx: &NormalizedTransaction) -> Self {
        Self {
            date: tx.date,
            description: tx.description.clone(),
            amount: tx.amount,
            currency: tx.currency.clone(),
        }
    }
}

/// What a run did
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub period: Period,
    pub dry_run: bool,
    pub rate_origin: RateOrigin,
    pub sources: Vec<SourceReport>,
    pub reconcile: ReconcileStats,
    pub transactions: usize,
    pub total_income: f64,
    pub total_expense: f64,
    pub balance: f64,
    pub transfer_count: usize,
    pub unrecognized_expense_count: usize,
    pub unrecognized_income_count: usize,
    /// First few unrecognized expense rows
    pub unrecognized_expenses: Vec<UnrecognizedRow>,
    pub unrecognized_income: Vec<UnrecognizedRow>,
    /// Older dumps of single-file sources that were ignored
    pub superseded_files: Vec<String>,
    /// Files no detection rule matched
    pub unrecognized_files: Vec<String>,
    /// Paths written, or that would be written on a dry run
    pub outputs: Vec<String>,
}

/// Why a run produced nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoDataReason {
    /// `finance/raw/<year>/` has no routable files
    NoRawFiles,
    /// Files exist but no row falls inside the period
    NoTransactions,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    NoData {
        period: Period,
        reason: NoDataReason,
        directory: String,
    },
    Processed(Box<RunReport>),
}

/// Run the pipeline, acquiring rates from `rates`
pub async fn process(
    period: Period,
    storage: &dyn Storage,
    config: &CategoryConfig,
    rates: &RateProvider,
    dry_run: bool,
) -> Result<RunOutcome> {
    let raw = collect_raw_files(storage, period.year())?;
    if raw.is_empty() {
        return Ok(no_raw_files(period));
    }

    let table = rates.get_rates().await;
    let generated_at = Local::now().naive_local();
    process_files(period, raw, storage, config, &table, dry_run, generated_at)
}

/// Run the pipeline with a known rate table and report timestamp
pub fn process_with_rates(
    period: Period,
    storage: &dyn Storage,
    config: &CategoryConfig,
    rates: &RateTable,
    dry_run: bool,
    generated_at: NaiveDateTime,
) -> Result<RunOutcome> {
    let raw = collect_raw_files(storage, period.year())?;
    if raw.is_empty() {
        return Ok(no_raw_files(period));
    }
    process_files(period, raw, storage, config, rates, dry_run, generated_at)
}

fn no_raw_files(period: Period) -> RunOutcome {
    let directory = raw_dir(period.year());
    info!("No raw files in {}", directory);
    RunOutcome::NoData {
        period,
        reason: NoDataReason::NoRawFiles,
        directory,
    }
}

fn parse_files<T>(
    files: &[&RawSourceFile],
    parse: impl Fn(&[u8]) -> Result<ParseOutput<T>>,
) -> Result<ParseOutput<T>> {
    let mut merged = ParseOutput::default();
    for file in files {
        let output = parse(&file.content)
            .map_err(|e| Error::InvalidData(format!("{} ({}): {}", file.name, file.source, e)))?;
        merged.rows.extend(output.rows);
        merged.stats.merge(&output.stats);
    }
    Ok(merged)
}

fn source_report(source: SourceKind, files: &[&RawSourceFile], transactions: usize, stats: ParseStats) -> SourceReport {
    info!(
        "{}: {} transactions ({} rows read, {} malformed, {} dropped)",
        source, transactions, stats.rows_read, stats.malformed, stats.dropped
    );
    SourceReport {
        source,
        files: files.iter().map(|f| f.name.clone()).collect(),
        transactions,
        stats,
    }
}

#[allow(clippy::too_many_arguments)]
fn process_files(
    period: Period,
    raw: RawFileSet,
    storage: &dyn Storage,
    config: &CategoryConfig,
    rates: &RateTable,
    dry_run: bool,
    generated_at: NaiveDateTime,
) -> Result<RunOutcome> {
    let sms_files: Vec<&RawSourceFile> = raw.bank_sms.iter().collect();
    let delivery_files: Vec<&RawSourceFile> = raw.delivery_service.iter().collect();
    let ledger_files: Vec<&RawSourceFile> = raw.personal_ledger.iter().collect();
    let processor_files: Vec<&RawSourceFile> = raw.payment_processor.iter().collect();

    let sms = parse_files(&sms_files, |c| parse_bank_sms(c, config, rates, period))?;
    let delivery = parse_files(&delivery_files, |c| parse_delivery(c, config, rates, period))?;
    let personal = parse_files(&ledger_files, |c| parse_personal_ledger(c, config, rates, period))?;
    let processor = parse_files(&processor_files, |c| {
        parse_payment_processor(c, config, rates, period)
    })?;

    let mut sources = Vec::new();
    for (source, files, count, stats) in [
        (SourceKind::BankSms, &sms_files, sms.rows.len(), sms.stats.clone()),
        (SourceKind::DeliveryService, &delivery_files, delivery.rows.len(), delivery.stats.clone()),
        (SourceKind::PersonalLedger, &ledger_files, personal.rows.len(), personal.stats.clone()),
        (SourceKind::PaymentProcessor, &processor_files, processor.rows.len(), processor.stats.clone()),
    ] {
        if !files.is_empty() {
            sources.push(source_report(source, files, count, stats));
        }
    }

    let (ledger, reconcile_stats) = reconcile(
        SourceOutputs {
            bank_sms: sms.rows,
            delivery: delivery.rows,
            personal_ledger: personal.rows,
            payment_processor: processor.rows,
        },
        config,
    );

    if ledger.is_empty() {
        info!("No transactions for {}", period);
        return Ok(RunOutcome::NoData {
            period,
            reason: NoDataReason::NoTransactions,
            directory: raw_dir(period.year()),
        });
    }

    let report: SummaryReport = summary::summarize(&ledger, period, config);
    let mut files: Vec<RenderedFile> = ledger::render(&ledger, period, config)?;
    files.push(RenderedFile {
        path: summary::summary_path(period),
        content: summary::render_markdown(&report, generated_at).into_bytes(),
    });

    if dry_run {
        info!("Dry run: {} files not written", files.len());
    } else {
        write_all(storage, &files)?;
    }

    let unrecognized_expenses: Vec<_> = ledger.unrecognized_expenses().collect();
    let unrecognized_income: Vec<_> = ledger.unrecognized_income().collect();

    let run = RunReport {
        period,
        dry_run,
        rate_origin: rates.origin,
        sources,
        reconcile: reconcile_stats,
        transactions: ledger.len(),
        total_income: report.total_income,
        total_expense: report.total_expense,
        balance: report.balance,
        transfer_count: report.transfer_count,
        unrecognized_expense_count: unrecognized_expenses.len(),
        unrecognized_income_count: unrecognized_income.len(),
        unrecognized_expenses: unrecognized_expenses
            .into_iter()
            .take(UNRECOGNIZED_SAMPLE)
            .map(UnrecognizedRow::from)
            .collect(),
        unrecognized_income: unrecognized_income
            .into_iter()
            .take(UNRECOGNIZED_SAMPLE)
            .map(UnrecognizedRow::from)
            .collect(),
        superseded_files: raw.superseded.iter().map(|f| f.name.clone()).collect(),
        unrecognized_files: raw.unrecognized.clone(),
        outputs: files.into_iter().map(|f| f.path).collect(),
    };

    info!(
        "Processed {}: {} transactions, balance {:.2}",
        period, run.transactions, run.balance
    );
    Ok(RunOutcome::Processed(Box::new(run)))
}

/// Write the rendered outputs, the canonical ledger (rendered first) last.
///
/// A failed write leaves the previous canonical ledger in place.
fn write_all(storage: &dyn Storage, files: &[RenderedFile]) -> Result<()> {
    let Some((canonical, derived)) = files.split_first() else {
        return Ok(());
    };

    for (i, file) in derived.iter().chain(std::iter::once(canonical)).enumerate() {
        if let Err(e) = storage.write(&file.path, &file.content) {
            if i > 0 {
                warn!(
                    "Write of {} failed after {} of {} outputs were replaced",
                    file.path,
                    i,
                    files.len()
                );
            }
            return Err(e);
        }
        info!("Wrote {} ({} bytes)", file.path, file.content.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rates::StaticRateSource;
    use crate::storage::MemoryStorage;
    use chrono::{TimeZone, Utc};

    fn rates() -> RateTable {
        RateTable::fallback(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap())
    }

    fn at() -> NaiveDateTime {
        "2026-02-01T10:00:00".parse().unwrap()
    }

    const LEDGER: &str = "date;categoryName;payee;comment;outcomeAccountName;outcome;outcomeCurrencyShortTitle;incomeAccountName;income;incomeCurrencyShortTitle\n\
2026-01-10;Продукты;Пятёрочка;;Card;1500;RUB;;0;\n\
2026-01-11;;Unknown Shop;;Card;200;RUB;;0;\n";

    #[test]
    fn test_empty_year_is_no_data() {
        let storage = MemoryStorage::new();
        let outcome = process_with_rates("2026-01".parse().unwrap(), &storage, &CategoryConfig::embedded().unwrap(), &rates(), false, at()).unwrap();
        assert!(matches!(
            outcome,
            RunOutcome::NoData {
                reason: NoDataReason::NoRawFiles,
                ..
            }
        ));
        assert!(storage.paths().is_empty());
    }

    #[test]
    fn test_no_rows_in_period() {
        let storage = MemoryStorage::new();
        storage.insert("finance/raw/2026/zen_2026-02-01.csv", LEDGER);
        let outcome = process_with_rates("2026-03".parse().unwrap(), &storage, &CategoryConfig::embedded().unwrap(), &rates(), false, at()).unwrap();
        assert!(matches!(
            outcome,
            RunOutcome::NoData {
                reason: NoDataReason::NoTransactions,
                ..
            }
        ));
        assert_eq!(storage.paths().len(), 1);
    }

    #[test]
    fn test_report_lists_unrecognized_rows() {
        let storage = MemoryStorage::new();
        storage.insert("finance/raw/2026/zen_2026-02-01.csv", LEDGER);
        let outcome = process_with_rates("2026-01".parse().unwrap(), &storage, &CategoryConfig::embedded().unwrap(), &rates(), false, at()).unwrap();
        let RunOutcome::Processed(report) = outcome else {
            panic!("expected a processed run");
        };
        assert_eq!(report.transactions, 2);
        assert_eq!(report.unrecognized_expense_count, 1);
        assert_eq!(report.unrecognized_expenses[0].description, "Unknown Shop");
        assert_eq!(report.sources.len(), 1);
        assert_eq!(report.sources[0].files, vec!["zen_2026-02-01.csv".to_string()]);
        assert_eq!(report.outputs.len(), 4);
        assert_eq!(report.rate_origin, RateOrigin::Fallback);
    }

    #[test]
    fn test_header_error_fails_before_writing() {
        let storage = MemoryStorage::new();
        storage.insert("finance/raw/2026/zen_2026-02-01.csv", LEDGER);
        // Invalid UTF-8 in the header row
        storage.insert("finance/raw/2026/pp_bad.csv", b"Date,\xff\xfe,Gross\n01/01/2026,x,-1\n".to_vec());
        let result = process_with_rates("2026-01".parse().unwrap(), &storage, &CategoryConfig::embedded().unwrap(), &rates(), false, at());
        assert!(matches!(result, Err(Error::InvalidData(_))));
        assert_eq!(storage.paths().len(), 2);
    }

    /// Memory storage that rejects writes to one path
    struct RejectingStorage {
        inner: MemoryStorage,
        reject: String,
    }

    impl Storage for RejectingStorage {
        fn name(&self) -> &str {
            "rejecting"
        }

        fn list(&self, dir: &str) -> Result<Vec<crate::storage::StoredFile>> {
            self.inner.list(dir)
        }

        fn read(&self, path: &str) -> Result<Vec<u8>> {
            self.inner.read(path)
        }

        fn write(&self, path: &str, content: &[u8]) -> Result<()> {
            if path == self.reject {
                return Err(Error::Storage(format!("disk full: {}", path)));
            }
            self.inner.write(path, content)
        }
    }

    #[test]
    fn test_failed_view_write_keeps_previous_ledger() {
        let period: Period = "2026-01".parse().unwrap();
        let storage = RejectingStorage {
            inner: MemoryStorage::new(),
            reject: ledger::pie_view_path(period),
        };
        storage.inner.insert("finance/raw/2026/zen_2026-02-01.csv", LEDGER);
        storage.inner.insert(&ledger::canonical_path(period), "previous");

        let result = process_with_rates(period, &storage, &CategoryConfig::embedded().unwrap(), &rates(), false, at());
        assert!(matches!(result, Err(Error::Storage(_))));
        assert_eq!(storage.inner.get(&ledger::canonical_path(period)).unwrap(), b"previous".to_vec());
    }

    #[test]
    fn test_canonical_ledger_written_last() {
        let period: Period = "2026-01".parse().unwrap();
        let storage = RejectingStorage {
            inner: MemoryStorage::new(),
            reject: ledger::canonical_path(period),
        };
        storage.inner.insert("finance/raw/2026/zen_2026-02-01.csv", LEDGER);

        let result = process_with_rates(period, &storage, &CategoryConfig::embedded().unwrap(), &rates(), false, at());
        assert!(result.is_err());
        // Every derived output went out before the canonical write was attempted
        assert!(storage.inner.get(&ledger::flat_view_path(period)).is_some());
        assert!(storage.inner.get(&ledger::pie_view_path(period)).is_some());
        assert!(storage.inner.get(&summary::summary_path(period)).is_some());
    }

    #[tokio::test]
    async fn test_process_uses_provider() {
        let storage = MemoryStorage::new();
        storage.insert("finance/raw/2026/zen_2026-02-01.csv", LEDGER);
        let provider = RateProvider::new(Box::new(StaticRateSource::unavailable()));
        let outcome = process("2026-01".parse().unwrap(), &storage, &CategoryConfig::embedded().unwrap(), &provider, true)
            .await
            .unwrap();
        assert!(matches!(outcome, RunOutcome::Processed(ref r) if r.dry_run));
        assert_eq!(storage.paths().len(), 1);
    }
}
