//! CLI command tests
//!
//! Runs go against temp storage roots with an unreachable rate feed, so the
//! fallback table is always in effect.

use std::path::{Path, PathBuf};
use std::time::Duration;

use coffer_core::ledger::canonical_path;
use coffer_core::summary::summary_path;
use coffer_core::{Category, CategoryConfig, ProcessOptions, RateOrigin, RunOutcome, SourceKind};
use tempfile::TempDir;

use crate::commands::{self, format_amount, truncate};

const LEDGER_HEADER: &str = "date;categoryName;payee;comment;outcomeAccountName;outcome;outcomeCurrencyShortTitle;incomeAccountName;income;incomeCurrencyShortTitle";

fn categories_file() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/categories.toml")
}

fn config() -> CategoryConfig {
    CategoryConfig::embedded().unwrap()
}

fn options(root: &Path, dry_run: bool) -> ProcessOptions {
    ProcessOptions {
        root: root.to_path_buf(),
        dry_run,
        rate_cache: None,
        rates_url: "http://127.0.0.1:9/daily/rub.json".to_string(),
        rate_timeout: Duration::from_millis(500),
        ..ProcessOptions::default()
    }
}

fn write_raw(root: &Path, name: &str, content: &str) {
    let dir = root.join("finance/raw/2026");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(name), content).unwrap();
}

fn ledger_root() -> TempDir {
    let root = TempDir::new().unwrap();
    write_raw(
        root.path(),
        "zen_2026-02-01.csv",
        &format!(
            "{}\n\
2026-01-02;Зарплата;;;;0;;Card;100000;RUB\n\
2026-01-10;Продукты;Пятёрочка;;Card;1500;RUB;;0;\n",
            LEDGER_HEADER
        ),
    );
    root
}

// ========== Process Command Tests ==========

#[tokio::test]
async fn test_run_process_writes_outputs() {
    let root = ledger_root();
    let categories = categories_file();
    let outcome = commands::run_process(&options(root.path(), false), Some(categories.as_path()), "2026-01")
        .await
        .unwrap();

    let report = match outcome {
        RunOutcome::Processed(report) => report,
        other => panic!("expected a processed run, got {:?}", other),
    };
    assert_eq!(report.rate_origin, RateOrigin::Fallback);
    assert_eq!(report.transactions, 2);
    assert_eq!(report.balance, 98500.0);

    let period = "2026-01".parse().unwrap();
    assert!(root.path().join(canonical_path(period)).exists());
    assert!(root.path().join(summary_path(period)).exists());
}

#[tokio::test]
async fn test_run_process_dry_run_writes_nothing() {
    let root = ledger_root();
    let categories = categories_file();
    let outcome = commands::run_process(&options(root.path(), true), Some(categories.as_path()), "2026-01")
        .await
        .unwrap();

    assert!(matches!(outcome, RunOutcome::Processed(_)));
    assert!(!root.path().join("finance/processed").exists());
    assert!(!root.path().join("finance/summaries").exists());
}

#[tokio::test]
async fn test_run_process_no_raw_files() {
    let root = TempDir::new().unwrap();
    let categories = categories_file();
    let outcome = commands::run_process(&options(root.path(), false), Some(categories.as_path()), "2026")
        .await
        .unwrap();

    assert!(matches!(outcome, RunOutcome::NoData { .. }));
}

#[tokio::test]
async fn test_run_process_rejects_bad_period() {
    let root = ledger_root();
    let categories = categories_file();
    let result =
        commands::run_process(&options(root.path(), false), Some(categories.as_path()), "2026-13").await;

    let message = format!("{:#}", result.unwrap_err());
    assert!(message.contains("Invalid period"));
}

#[tokio::test]
async fn test_run_process_missing_categories_file() {
    let root = ledger_root();
    let missing = root.path().join("nope.toml");
    let result = commands::run_process(&options(root.path(), false), Some(missing.as_path()), "2026-01").await;
    assert!(result.is_err());
}

// ========== Files Command Tests ==========

#[test]
fn test_list_files_routes_sources() {
    let root = ledger_root();
    write_raw(
        root.path(),
        "zen_2025-12-01.csv",
        &format!("{}\n2025-12-10;Продукты;Spar;;Card;100;RUB;;0;\n", LEDGER_HEADER),
    );
    write_raw(root.path(), "notes.txt", "hello");

    let set = commands::list_files(root.path(), 2026).unwrap();
    let ledger = set.personal_ledger.as_ref().unwrap();
    assert_eq!(ledger.source, SourceKind::PersonalLedger);
    assert_eq!(ledger.name, "zen_2026-02-01.csv");
    assert_eq!(set.superseded.len(), 1);
    assert_eq!(set.unrecognized, vec!["notes.txt".to_string()]);
}

#[test]
fn test_cmd_files_empty_year() {
    let root = TempDir::new().unwrap();
    assert!(commands::cmd_files(root.path(), 2030).is_ok());
}

// ========== Categorize Command Tests ==========

#[test]
fn test_categorize_payee_override() {
    let category = commands::categorize(
        &config(),
        "personal-ledger",
        "expense",
        Some("Продукты"),
        None,
        Some("Аптека"),
    )
    .unwrap();
    assert_eq!(category, Category::Health);
}

#[test]
fn test_categorize_bank_sms_merchant() {
    let category =
        commands::categorize(&config(), "bank-sms", "expense", Some("purchase"), Some("WOLT TBILISI"), None)
            .unwrap();
    assert_eq!(category, Category::FoodDelivery);
}

#[test]
fn test_categorize_unmatched_is_sentinel() {
    let category =
        commands::categorize(&config(), "bank-sms", "expense", None, Some("UNKNOWN SHOP"), None).unwrap();
    assert!(category.is_sentinel());
}

#[test]
fn test_categorize_rejects_unknown_source() {
    let result = commands::categorize(&config(), "bank", "expense", None, None, None);
    assert!(result.is_err());

    let result = commands::categorize(&config(), "bank-sms", "sideways", None, None, None);
    assert!(result.is_err());
}

#[test]
fn test_cmd_categorize_with_explicit_rules() {
    let categories = categories_file();
    let result = commands::cmd_categorize(
        Some(categories.as_path()),
        "delivery-service",
        "expense",
        Some("Еда"),
        None,
        None,
    );
    assert!(result.is_ok());
}

// ========== Helper Tests ==========

#[test]
fn test_truncate() {
    assert_eq!(truncate("short", 10), "short");
    assert_eq!(truncate("Пятёрочка на углу", 10), "Пятёроч...");
}

#[test]
fn test_format_amount() {
    assert_eq!(format_amount(98500.0), "98,500");
    assert_eq!(format_amount(-1500.4), "-1,500");
}
