//! Raw export discovery and the four source parsers
//!
//! Files live under `finance/raw/<year>/`. Each `.csv` file is routed to a
//! source by an ordered rule table: file-name prefixes first, then header
//! content for files with an unrecognised name.
//!
//! Every parser takes the file bytes, the category configuration, the rate
//! table and the period, and returns only rows inside the period. Malformed
//! rows are counted and skipped, never raised.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use csv::{ReaderBuilder, StringRecord};
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::Result;
use crate::models::{RawSourceFile, SourceKind};
use crate::storage::Storage;

pub mod bank_sms;
pub mod delivery;
pub mod payment_processor;
pub mod personal_ledger;

pub use bank_sms::parse_bank_sms;
pub use delivery::parse_delivery;
pub use payment_processor::{parse_payment_processor, ProcessorLayout, ProcessorTransaction};
pub use personal_ledger::parse_personal_ledger;

/// Longest description kept in the ledger
pub const MAX_DESCRIPTION_CHARS: usize = 80;

/// Directory holding the raw exports for a year
pub fn raw_dir(year: i32) -> String {
    format!("finance/raw/{:04}", year)
}

/// One routing rule
#[derive(Debug, Clone, Copy)]
pub enum DetectionRule {
    /// Case-insensitive file name prefix
    NamePrefix(&'static str, SourceKind),
    /// Case-insensitive substring of the header line
    HeaderContains(&'static str, SourceKind),
}

/// Evaluated top to bottom; name rules always win over header rules
pub const DETECTION_RULES: &[DetectionRule] = &[
    DetectionRule::NamePrefix("zen", SourceKind::PersonalLedger),
    DetectionRule::NamePrefix("credo_sms", SourceKind::BankSms),
    DetectionRule::NamePrefix("wolt", SourceKind::DeliveryService),
    DetectionRule::NamePrefix("paypal", SourceKind::PaymentProcessor),
    DetectionRule::NamePrefix("pp", SourceKind::PaymentProcessor),
    DetectionRule::NamePrefix("download", SourceKind::PaymentProcessor),
    DetectionRule::HeaderContains("categoryname", SourceKind::PersonalLedger),
    DetectionRule::HeaderContains("category_name", SourceKind::PersonalLedger),
    DetectionRule::HeaderContains("категория", SourceKind::PersonalLedger),
    DetectionRule::HeaderContains("paypal", SourceKind::PaymentProcessor),
    DetectionRule::HeaderContains("gross", SourceKind::PaymentProcessor),
    DetectionRule::HeaderContains("brutto", SourceKind::PaymentProcessor),
];

/// Source for a file name alone, if a name rule matches
pub fn detect_by_name(name: &str) -> Option<SourceKind> {
    let lower = name.to_lowercase();
    if !lower.ends_with(".csv") {
        return None;
    }
    DETECTION_RULES.iter().find_map(|rule| match rule {
        DetectionRule::NamePrefix(prefix, source) if lower.starts_with(prefix) => Some(*source),
        _ => None,
    })
}

/// Route a `.csv` file by name, then by its header line.
///
/// Returns None for non-CSV files and unrecognised content.
pub fn detect_source(name: &str, content: &[u8]) -> Option<SourceKind> {
    if !name.to_lowercase().ends_with(".csv") {
        return None;
    }
    if let Some(source) = detect_by_name(name) {
        return Some(source);
    }

    let text = String::from_utf8_lossy(strip_bom(content));
    let header = text.lines().next().unwrap_or_default().to_lowercase();
    DETECTION_RULES.iter().find_map(|rule| match rule {
        DetectionRule::HeaderContains(needle, source) if header.contains(needle) => Some(*source),
        _ => None,
    })
}

/// Raw files for one year, grouped by source
#[derive(Debug, Default)]
pub struct RawFileSet {
    pub personal_ledger: Option<RawSourceFile>,
    pub bank_sms: Option<RawSourceFile>,
    pub payment_processor: Vec<RawSourceFile>,
    pub delivery_service: Vec<RawSourceFile>,
    /// Older dumps of single-file sources that were not used
    pub superseded: Vec<RawSourceFile>,
    /// Files no rule routed
    pub unrecognized: Vec<String>,
}

impl RawFileSet {
    /// True when no source has any file
    pub fn is_empty(&self) -> bool {
        self.personal_ledger.is_none()
            && self.bank_sms.is_none()
            && self.payment_processor.is_empty()
            && self.delivery_service.is_empty()
    }

    /// Every file that will be parsed
    pub fn effective_files(&self) -> Vec<&RawSourceFile> {
        self.bank_sms
            .iter()
            .chain(self.delivery_service.iter())
            .chain(self.personal_ledger.iter())
            .chain(self.payment_processor.iter())
            .collect()
    }
}

/// Read and route every raw file for `year`
pub fn collect_raw_files(storage: &dyn Storage, year: i32) -> Result<RawFileSet> {
    let dir = raw_dir(year);
    let listing = storage.list(&dir)?;
    let date_re = Regex::new(r"(\d{4}-\d{2}-\d{2})")?;

    let mut grouped: BTreeMap<SourceKind, Vec<RawSourceFile>> = BTreeMap::new();
    let mut set = RawFileSet::default();

    for file in listing {
        if !file.name.to_lowercase().ends_with(".csv") {
            set.unrecognized.push(file.name);
            continue;
        }

        let content = storage.read(&file.path)?;
        match detect_source(&file.name, &content) {
            Some(source) => {
                info!("Found {} file: {} ({} bytes)", source, file.name, content.len());
                grouped.entry(source).or_default().push(RawSourceFile {
                    source,
                    name: file.name,
                    content,
                    modified: file.modified,
                });
            }
            None => {
                debug!("No source matches {}", file.name);
                set.unrecognized.push(file.name);
            }
        }
    }

    for &source in SourceKind::all() {
        let Some(mut files) = grouped.remove(&source) else {
            continue;
        };
        // Name order makes multi-file dedup deterministic
        files.sort_by(|a, b| a.name.cmp(&b.name));

        if !source.reads_all_files() {
            let count = files.len();
            let (latest, rest) = select_latest(files, &date_re);
            if count > 1 {
                if let Some(ref chosen) = latest {
                    info!("{} {} files found, using {}", count, source, chosen.name);
                }
            }
            set.superseded.extend(rest);
            files = latest.into_iter().collect();
        }

        match source {
            SourceKind::PaymentProcessor => set.payment_processor = files,
            SourceKind::DeliveryService => set.delivery_service = files,
            SourceKind::PersonalLedger => set.personal_ledger = files.pop(),
            SourceKind::BankSms => set.bank_sms = files.pop(),
        }
    }

    Ok(set)
}

/// Ordering key: files with an embedded date beat files without; then the
/// date itself, then modification time, then name
fn selection_key(
    file: &RawSourceFile,
    date_re: &Regex,
) -> (bool, Option<String>, Option<DateTime<Utc>>, String) {
    let embedded = date_re
        .captures(&file.name)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").is_ok());
    (
        embedded.is_some(),
        embedded,
        file.modified,
        file.name.clone(),
    )
}

/// Newest file and the rest
fn select_latest(
    files: Vec<RawSourceFile>,
    date_re: &Regex,
) -> (Option<RawSourceFile>, Vec<RawSourceFile>) {
    let mut keyed: Vec<_> = files
        .into_iter()
        .map(|f| (selection_key(&f, date_re), f))
        .collect();
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    let latest = keyed.pop().map(|(_, f)| f);
    (latest, keyed.into_iter().map(|(_, f)| f).collect())
}

/// Row counters shared by all parsers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParseStats {
    /// Data rows read from the file(s)
    pub rows_read: usize,
    /// Rows with a missing or unparseable date or amount
    pub malformed: usize,
    /// Rows outside the requested period
    pub out_of_period: usize,
    /// Rows dropped by a source rule (duplicates, processor rows, service fees)
    pub dropped: usize,
}

impl ParseStats {
    pub fn merge(&mut self, other: &ParseStats) {
        self.rows_read += other.rows_read;
        self.malformed += other.malformed;
        self.out_of_period += other.out_of_period;
        self.dropped += other.dropped;
    }
}

/// Parser result
#[derive(Debug, Clone)]
pub struct ParseOutput<T> {
    pub rows: Vec<T>,
    pub stats: ParseStats,
}

impl<T> Default for ParseOutput<T> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            stats: ParseStats::default(),
        }
    }
}

/// Drop a UTF-8 byte-order mark
pub(crate) fn strip_bom(content: &[u8]) -> &[u8] {
    content.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(content)
}

/// CSV reader over file bytes with a header row
pub(crate) fn csv_reader(content: &[u8], delimiter: u8) -> csv::Reader<&[u8]> {
    ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(strip_bom(content))
}

/// Column positions looked up by header name
pub(crate) struct Columns {
    index: BTreeMap<String, usize>,
}

impl Columns {
    pub(crate) fn new(headers: &StringRecord) -> Self {
        let index = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (clean(h).to_string(), i))
            .collect();
        Self { index }
    }

    pub(crate) fn has(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Trimmed, unquoted field value; empty when the column or cell is absent
    pub(crate) fn get<'r>(&self, record: &'r StringRecord, name: &str) -> &'r str {
        self.index
            .get(name)
            .and_then(|i| record.get(*i))
            .map(clean)
            .unwrap_or_default()
    }
}

/// Trim whitespace and stray quotes
pub(crate) fn clean(value: &str) -> &str {
    value.trim().trim_matches('"').trim()
}

/// Parse a decimal that may use a comma separator.
///
/// `-8,00` and `1500,5` are read as decimal commas; in `1,234.56` the comma is
/// a thousands separator.
pub(crate) fn parse_decimal(s: &str) -> Option<f64> {
    let s: String = clean(s)
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}')
        .collect();
    if s.is_empty() {
        return None;
    }
    let normalized = if s.contains(',') && !s.contains('.') {
        s.replace(',', ".")
    } else {
        s.replace(',', "")
    };
    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// ISO `YYYY-MM-DD`; a trailing time part is ignored
pub(crate) fn parse_iso_date(s: &str) -> Option<NaiveDate> {
    let s = clean(s);
    let day = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}
