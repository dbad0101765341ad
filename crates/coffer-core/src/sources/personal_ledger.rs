//! Personal-ledger export (budgeting app full dump)
//!
//! Semicolon-delimited, one row per operation with an outcome/income pair:
//! `date;categoryName;payee;comment;outcomeAccountName;outcome;
//! outcomeCurrencyShortTitle;incomeAccountName;income;incomeCurrencyShortTitle`
//!
//! - outcome > 0, income == 0 → expense
//! - income > 0, outcome == 0 → income
//! - both > 0 → transfer between the two accounts
//!
//! The export repeats some rows verbatim; identical (date, payee, outcome,
//! income, outcome account, income account) tuples collapse to one.

use std::collections::HashSet;

use tracing::debug;

use super::{
    clean, csv_reader, parse_decimal, parse_iso_date, Columns, ParseOutput, MAX_DESCRIPTION_CHARS,
};
use crate::anonymize::strip_surname;
use crate::categories::CategoryConfig;
use crate::error::Result;
use crate::models::{
    truncate_chars, Category, NormalizedTransaction, Period, SourceKind, TxType,
};
use crate::rates::RateTable;

const DATE: &str = "date";
const CATEGORY: &str = "categoryName";
const PAYEE: &str = "payee";
const COMMENT: &str = "comment";
const OUTCOME_ACCOUNT: &str = "outcomeAccountName";
const OUTCOME: &str = "outcome";
const OUTCOME_CURRENCY: &str = "outcomeCurrencyShortTitle";
const INCOME_ACCOUNT: &str = "incomeAccountName";
const INCOME: &str = "income";
const INCOME_CURRENCY: &str = "incomeCurrencyShortTitle";

/// Parse one personal-ledger file, keeping rows inside `period`
pub fn parse_personal_ledger(
    content: &[u8],
    config: &CategoryConfig,
    rates: &RateTable,
    period: Period,
) -> Result<ParseOutput<NormalizedTransaction>> {
    let rules = &config.personal_ledger;
    let rule_set = rules.rule_set();

    let mut rdr = csv_reader(content, b';');
    let columns = Columns::new(rdr.headers()?);

    let mut output = ParseOutput::default();
    let mut seen: HashSet<(String, String, String, String, String, String)> = HashSet::new();

    for result in rdr.records() {
        output.stats.rows_read += 1;
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                debug!("Skipping unreadable ledger row: {}", e);
                output.stats.malformed += 1;
                continue;
            }
        };

        let date_raw = columns.get(&record, DATE);
        let Some(date) = parse_iso_date(date_raw) else {
            output.stats.malformed += 1;
            continue;
        };
        if !period.contains(date) {
            output.stats.out_of_period += 1;
            continue;
        }

        let category_name = columns.get(&record, CATEGORY);
        let payee = columns.get(&record, PAYEE);
        let comment = columns.get(&record, COMMENT);
        let outcome_account = columns.get(&record, OUTCOME_ACCOUNT);
        let income_account = columns.get(&record, INCOME_ACCOUNT);
        let outcome_raw = columns.get(&record, OUTCOME);
        let income_raw = columns.get(&record, INCOME);

        let (Some(outcome), Some(income)) = (amount_or_zero(outcome_raw), amount_or_zero(income_raw))
        else {
            debug!("Skipping ledger row with bad amount on {}", date_raw);
            output.stats.malformed += 1;
            continue;
        };

        let key = (
            date_raw.to_string(),
            payee.to_string(),
            outcome_raw.to_string(),
            income_raw.to_string(),
            outcome_account.to_string(),
            income_account.to_string(),
        );
        if !seen.insert(key) {
            output.stats.dropped += 1;
            continue;
        }

        let base_description = [payee, comment, category_name]
            .into_iter()
            .find(|s| !s.is_empty())
            .map(|s| truncate_chars(s.trim(), MAX_DESCRIPTION_CHARS))
            .unwrap_or_default();

        let outcome_currency = currency(columns.get(&record, OUTCOME_CURRENCY));
        let income_currency = currency(columns.get(&record, INCOME_CURRENCY));

        let tx = if outcome > 0.0 && income > 0.0 {
            let description = format!(
                "{} → {}: {}",
                outcome_account,
                income_account,
                strip_surname(&base_description)
            );
            build(
                date,
                TxType::Transfer,
                Category::Transfer,
                description,
                outcome,
                outcome_currency,
                outcome_account,
                rates,
            )
        } else if outcome > 0.0 {
            let (tx_type, category) = if rules.is_transfer_payee(payee) {
                (TxType::Transfer, Category::Transfer)
            } else {
                let category = rule_set.categorize(
                    TxType::Expense,
                    Some(category_name),
                    None,
                    Some(payee),
                );
                if category.is_sentinel()
                    && category_name.is_empty()
                    && rules.is_internal_account(outcome_account)
                {
                    (TxType::Transfer, Category::Transfer)
                } else {
                    (TxType::Expense, category)
                }
            };
            build(
                date,
                tx_type,
                category,
                anonymized(&base_description, category),
                outcome,
                outcome_currency,
                outcome_account,
                rates,
            )
        } else if income > 0.0 {
            let category = rule_set.categorize(TxType::Income, Some(category_name), None, None);
            build(
                date,
                TxType::Income,
                category,
                anonymized(&base_description, category),
                income,
                income_currency,
                income_account,
                rates,
            )
        } else {
            output.stats.malformed += 1;
            continue;
        };

        output.rows.push(tx);
    }

    debug!(
        "Parsed {} personal-ledger transactions ({} duplicates)",
        output.rows.len(),
        output.stats.dropped
    );
    Ok(output)
}

/// Empty cells count as zero; garbage is None
fn amount_or_zero(raw: &str) -> Option<f64> {
    if clean(raw).is_empty() {
        Some(0.0)
    } else {
        parse_decimal(raw)
    }
}

fn currency(raw: &str) -> String {
    raw.trim().to_uppercase()
}

fn anonymized(description: &str, category: Category) -> String {
    if category.is_sentinel() {
        description.to_string()
    } else {
        strip_surname(description)
    }
}

#[allow(clippy::too_many_arguments)]
fn build(
    date: chrono::NaiveDate,
    tx_type: TxType,
    category: Category,
    description: String,
    amount: f64,
    currency: String,
    account: &str,
    rates: &RateTable,
) -> NormalizedTransaction {
    let amount_reporting = rates.to_reporting(amount, &currency);
    NormalizedTransaction {
        date,
        tx_type,
        category,
        description,
        amount,
        currency,
        amount_reporting,
        source: SourceKind::PersonalLedger,
        account: account.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    const HEADER: &str = "date;categoryName;payee;comment;outcomeAccountName;outcome;outcomeCurrencyShortTitle;incomeAccountName;income;incomeCurrencyShortTitle";

    fn parse(rows: &str, period: &str) -> ParseOutput<NormalizedTransaction> {
        let csv = format!("{}\n{}", HEADER, rows);
        let config = CategoryConfig::embedded().unwrap();
        let rates = RateTable::fallback(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
        parse_personal_ledger(csv.as_bytes(), &config, &rates, period.parse().unwrap()).unwrap()
    }

    #[test]
    fn test_expense_row() {
        let out = parse(
            "2026-01-10;Groceries;Supermarket;;Cash;1500;RUB;;0;",
            "2026-01",
        );
        assert_eq!(out.rows.len(), 1);
        let tx = &out.rows[0];
        assert_eq!(tx.date, NaiveDate::from_ymd_opt(2026, 1, 10).unwrap());
        assert_eq!(tx.tx_type, TxType::Expense);
        assert_eq!(tx.category, Category::Groceries);
        assert_eq!(tx.description, "Supermarket");
        assert_eq!(tx.amount, 1500.0);
        assert_eq!(tx.amount_reporting, 1500.0);
        assert_eq!(tx.account, "Cash");
        assert_eq!(tx.source, SourceKind::PersonalLedger);
    }

    #[test]
    fn test_income_row_converts_currency() {
        let out = parse(
            "2026-01-05;Зарплата;ООО Ромашка;;;0;;Tinkoff USD;1000;USD",
            "2026-01",
        );
        let tx = &out.rows[0];
        assert_eq!(tx.tx_type, TxType::Income);
        assert_eq!(tx.category, Category::Salary);
        assert_eq!(tx.currency, "USD");
        assert_eq!(tx.amount_reporting, 76700.0);
        assert_eq!(tx.account, "Tinkoff USD");
    }

    #[test]
    fn test_transfer_between_accounts() {
        let out = parse(
            "2026-01-07;;;Пополнение;Tinkoff;5000;RUB;Cash;5000;RUB",
            "2026-01",
        );
        let tx = &out.rows[0];
        assert_eq!(tx.tx_type, TxType::Transfer);
        assert_eq!(tx.category, Category::Transfer);
        assert_eq!(tx.description, "Tinkoff → Cash: Пополнение");
        assert_eq!(tx.account, "Tinkoff");
    }

    #[test]
    fn test_money_transfer_service_payee_is_transfer() {
        let out = parse(
            "2026-01-08;Подарки;Золотая Корона;;Cash;3000;RUB;;0;",
            "2026-01",
        );
        assert_eq!(out.rows[0].tx_type, TxType::Transfer);
        assert_eq!(out.rows[0].category, Category::Transfer);
    }

    #[test]
    fn test_uncategorized_internal_account_is_transfer() {
        let out = parse(
            "2026-01-09;;Перевод;;Ozon Карта;2000;RUB;;0;\n2026-01-09;;Кто-то;;Cash;700;RUB;;0;",
            "2026-01",
        );
        assert_eq!(out.rows[0].tx_type, TxType::Transfer);
        assert_eq!(out.rows[1].tx_type, TxType::Expense);
        assert_eq!(out.rows[1].category, Category::OtherExpense);
    }

    #[test]
    fn test_payee_override_wins() {
        let out = parse(
            "2026-01-11;Развлечения;Яндекс Плюс;;Cash;399;RUB;;0;",
            "2026-01",
        );
        assert_eq!(out.rows[0].category, Category::Subscriptions);
    }

    #[test]
    fn test_duplicate_rows_collapse() {
        let out = parse(
            "2026-01-10;Groceries;Supermarket;;Cash;1500;RUB;;0;\n\
             2026-01-10;Groceries;Supermarket;другой комментарий;Cash;1500;RUB;;0;\n\
             2026-01-10;Groceries;Supermarket;;Cash;1600;RUB;;0;",
            "2026-01",
        );
        assert_eq!(out.rows.len(), 2);
        assert_eq!(out.stats.dropped, 1);
    }

    #[test]
    fn test_period_filter_and_malformed_rows() {
        let out = parse(
            "2026-02-01;Groceries;Shop;;Cash;100;RUB;;0;\n\
             ;Groceries;Shop;;Cash;100;RUB;;0;\n\
             2026-01-03;Groceries;Shop;;Cash;abc;RUB;;0;\n\
             2026-01-04;Groceries;Shop;;Cash;0;RUB;;0;\n\
             2026-01-05;Groceries;Shop;;Cash;250,50;RUB;;0;",
            "2026-01",
        );
        assert_eq!(out.rows.len(), 1);
        assert_eq!(out.rows[0].amount, 250.5);
        assert_eq!(out.stats.out_of_period, 1);
        assert_eq!(out.stats.malformed, 3);
        assert_eq!(out.stats.rows_read, 5);
    }

    #[test]
    fn test_description_fallbacks_and_truncation() {
        let long = "X".repeat(120);
        let rows = format!(
            "2026-01-10;Groceries;;Рынок;Cash;100;RUB;;0;\n\
             2026-01-11;Groceries;;;Cash;100;RUB;;0;\n\
             2026-01-12;Groceries;{};;Cash;100;RUB;;0;",
            long
        );
        let out = parse(&rows, "2026");
        assert_eq!(out.rows[0].description, "Рынок");
        assert_eq!(out.rows[1].description, "Groceries");
        assert_eq!(out.rows[2].description.chars().count(), MAX_DESCRIPTION_CHARS);
    }

    #[test]
    fn test_bom_and_surname_stripping() {
        let csv = format!(
            "\u{feff}{}\n2026-01-10;Подарки;IVAN PETROV;;Cash;1000;RUB;;0;",
            HEADER
        );
        let config = CategoryConfig::embedded().unwrap();
        let rates = RateTable::fallback(Utc::now());
        let out = parse_personal_ledger(
            csv.as_bytes(),
            &config,
            &rates,
            "2026-01".parse().unwrap(),
        )
        .unwrap();
        assert_eq!(out.rows.len(), 1);
        assert_eq!(out.rows[0].category, Category::Gifts);
        assert_eq!(out.rows[0].description, "Ivan");
    }
}
