//! Payment-processor activity export
//!
//! Two layouts exist in the wild and are told apart by the header:
//! - EU: a `Type` column, dates `DD/MM/YYYY`, decimal commas (`-8,00`)
//! - US: a `Description` column, dates `MM/DD/YYYY`
//!
//! Schema detection yields a [`ProcessorLayout`]; one parser body consumes it.
//! Currency conversion and hold rows are dropped. Rows keep the processor's
//! transaction ID so overlapping exports can be deduplicated during
//! reconciliation; the ID never reaches the ledger.

use chrono::NaiveDate;
use tracing::debug;

use super::{csv_reader, parse_decimal, Columns, ParseOutput, MAX_DESCRIPTION_CHARS};
use crate::anonymize::strip_surname;
use crate::categories::CategoryConfig;
use crate::error::Result;
use crate::models::{truncate_chars, NormalizedTransaction, Period, SourceKind, TxType};
use crate::rates::RateTable;

const DATE: &str = "Date";
const NAME: &str = "Name";
const GROSS: &str = "Gross";
const CURRENCY: &str = "Currency";
const TRANSACTION_ID: &str = "Transaction ID";

/// Account label on every processor row
pub const ACCOUNT: &str = "PayPal";

/// Header layout of a processor export
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorLayout {
    Eu,
    Us,
}

impl ProcessorLayout {
    fn detect(columns: &Columns) -> Self {
        if columns.has("Type") && !columns.has("Description") {
            Self::Eu
        } else {
            Self::Us
        }
    }

    /// Column holding the transaction type
    pub fn type_column(&self) -> &'static str {
        match self {
            Self::Eu => "Type",
            Self::Us => "Description",
        }
    }

    /// Primary date format, then the alternate tried when it fails
    pub fn date_formats(&self) -> [&'static str; 2] {
        match self {
            Self::Eu => ["%d/%m/%Y", "%m/%d/%Y"],
            Self::Us => ["%m/%d/%Y", "%d/%m/%Y"],
        }
    }

    fn parse_date(&self, raw: &str) -> Option<NaiveDate> {
        self.date_formats()
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
    }
}

/// A processor row plus its dedup identifier
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessorTransaction {
    pub tx: NormalizedTransaction,
    /// Empty when the export has no ID column
    pub transaction_id: String,
}

/// Parse one processor export, keeping rows inside `period`
pub fn parse_payment_processor(
    content: &[u8],
    config: &CategoryConfig,
    rates: &RateTable,
    period: Period,
) -> Result<ParseOutput<ProcessorTransaction>> {
    let rules = &config.payment_processor;

    let mut rdr = csv_reader(content, b',');
    let columns = Columns::new(rdr.headers()?);
    let layout = ProcessorLayout::detect(&columns);
    let type_column = layout.type_column();
    debug!("Processor export layout: {:?}", layout);

    let mut output = ParseOutput::default();

    for result in rdr.records() {
        output.stats.rows_read += 1;
        let Ok(record) = result else {
            output.stats.malformed += 1;
            continue;
        };

        let tx_label = columns.get(&record, type_column);
        if rules.is_ignored(tx_label) {
            output.stats.dropped += 1;
            continue;
        }

        let Some(date) = layout.parse_date(columns.get(&record, DATE)) else {
            output.stats.malformed += 1;
            continue;
        };
        if !period.contains(date) {
            output.stats.out_of_period += 1;
            continue;
        }

        let Some(gross) = parse_decimal(columns.get(&record, GROSS)) else {
            output.stats.malformed += 1;
            continue;
        };
        if gross == 0.0 {
            output.stats.dropped += 1;
            continue;
        }

        let name = columns.get(&record, NAME);
        let currency = columns.get(&record, CURRENCY).to_uppercase();
        let description = if name.is_empty() { tx_label } else { name };

        let (tx_type, category) = if gross > 0.0 {
            (TxType::Income, rules.income_category)
        } else {
            (TxType::Expense, rules.expense_category(tx_label, name))
        };

        let description = if category.is_sentinel() {
            description.to_string()
        } else {
            strip_surname(description)
        };

        let amount = gross.abs();
        let amount_reporting = rates.to_reporting(amount, &currency);
        output.rows.push(ProcessorTransaction {
            tx: NormalizedTransaction {
                date,
                tx_type,
                category,
                description: truncate_chars(&description, MAX_DESCRIPTION_CHARS),
                amount,
                currency,
                amount_reporting,
                source: SourceKind::PaymentProcessor,
                account: ACCOUNT.to_string(),
            },
            transaction_id: columns.get(&record, TRANSACTION_ID).to_string(),
        });
    }

    debug!(
        "Parsed {} payment-processor transactions ({} dropped)",
        output.rows.len(),
        output.stats.dropped
    );
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;
    use chrono::{TimeZone, Utc};

    fn parse(csv: &str, period: &str) -> ParseOutput<ProcessorTransaction> {
        let config = CategoryConfig::embedded().unwrap();
        let rates = RateTable::fallback(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
        parse_payment_processor(csv.as_bytes(), &config, &rates, period.parse().unwrap()).unwrap()
    }

    #[test]
    fn test_eu_subscription_payment() {
        let csv = r#""Date","Time","TimeZone","Name","Type","Status","Currency","Gross","Fee","Net","Transaction ID"
"15/01/2026","10:00:00","CET","Netflix","Subscription Payment","Completed","EUR","-8,00","0,00","-8,00","1AB23456CD789012E""#;

        let out = parse(csv, "2026-01");
        assert_eq!(out.rows.len(), 1);
        let row = &out.rows[0];
        assert_eq!(row.tx.date, NaiveDate::from_ymd_opt(2026, 1, 15).unwrap());
        assert_eq!(row.tx.tx_type, TxType::Expense);
        assert_eq!(row.tx.category, Category::Subscriptions);
        assert_eq!(row.tx.amount, 8.0);
        assert_eq!(row.tx.currency, "EUR");
        assert_eq!(row.tx.amount_reporting, 723.2);
        assert_eq!(row.tx.account, "PayPal");
        assert_eq!(row.transaction_id, "1AB23456CD789012E");
    }

    #[test]
    fn test_us_layout_income_and_express_checkout() {
        let csv = r#"Date,Time,Name,Description,Currency,Gross,Transaction ID
01/20/2026,09:00:00,ANNA SMITH,Payment Received,USD,250.00,TX1
01/21/2026,09:00:00,Random Shop,Express Checkout Payment,USD,"-1,234.50",TX2
01/22/2026,09:00:00,Some Merchant,Mobile Payment,USD,-10.00,TX3"#;

        let out = parse(csv, "2026-01");
        assert_eq!(out.rows.len(), 3);

        assert_eq!(out.rows[0].tx.tx_type, TxType::Income);
        assert_eq!(out.rows[0].tx.category, Category::WorkIncome);
        assert_eq!(out.rows[0].tx.description, "Anna");

        assert_eq!(out.rows[1].tx.category, Category::Shopping);
        assert_eq!(out.rows[2].tx.category, Category::OtherExpense);
        assert_eq!(out.rows[2].tx.description, "Some Merchant");
    }

    #[test]
    fn test_conversion_hold_and_zero_rows_dropped() {
        let csv = r#"Date,Name,Type,Currency,Gross,Transaction ID
15/01/2026,,General Currency Conversion,EUR,8.00,C1
15/01/2026,,General Currency Conversion,USD,-8.70,C2
15/01/2026,,Account Hold for Open Authorization,EUR,-5.00,H1
16/01/2026,Steam,Express Checkout Payment,EUR,0.00,Z1
17/01/2026,Steam,Express Checkout Payment,EUR,-20.00,S1"#;

        let out = parse(csv, "2026-01");
        assert_eq!(out.rows.len(), 1);
        assert_eq!(out.rows[0].tx.category, Category::Entertainment);
        assert_eq!(out.stats.dropped, 4);
    }

    #[test]
    fn test_alternate_date_format_fallback() {
        // EU layout but a US-style date that cannot be read as DD/MM
        let csv = r#"Date,Name,Type,Currency,Gross,Transaction ID
01/25/2026,Spotify,Subscription Payment,EUR,-9.99,A1
bad-date,Spotify,Subscription Payment,EUR,-9.99,A2"#;

        let out = parse(csv, "2026-01");
        assert_eq!(out.rows.len(), 1);
        assert_eq!(
            out.rows[0].tx.date,
            NaiveDate::from_ymd_opt(2026, 1, 25).unwrap()
        );
        assert_eq!(out.stats.malformed, 1);
    }

    #[test]
    fn test_period_filter() {
        let csv = r#"Date,Name,Type,Currency,Gross,Transaction ID
15/02/2026,Netflix,Subscription Payment,EUR,-8.00,F1
15/01/2025,Netflix,Subscription Payment,EUR,-8.00,F0"#;

        let out = parse(csv, "2026-01");
        assert!(out.rows.is_empty());
        assert_eq!(out.stats.out_of_period, 2);
    }
}
