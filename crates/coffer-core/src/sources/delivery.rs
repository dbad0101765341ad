//! Food-delivery order history
//!
//! Format: `vendor,date,total,currency,items_count,file_name,month,year,category`.
//! Columns are looked up by header name and fall back to their position when
//! the header is missing or renamed. Platform fee and subscription rows are
//! dropped; every other order is an expense.

use csv::StringRecord;
use tracing::debug;

use super::{clean, csv_reader, parse_decimal, parse_iso_date, Columns, ParseOutput, MAX_DESCRIPTION_CHARS};
use crate::categories::CategoryConfig;
use crate::error::Result;
use crate::models::{truncate_chars, Category, NormalizedTransaction, Period, SourceKind, TxType};
use crate::rates::RateTable;

/// Account label on every delivery row
pub const ACCOUNT: &str = "Wolt";

const VENDOR: (&str, usize) = ("vendor", 0);
const DATE: (&str, usize) = ("date", 1);
const TOTAL: (&str, usize) = ("total", 2);
const CURRENCY: (&str, usize) = ("currency", 3);
const CATEGORY: (&str, usize) = ("category", 8);

fn field<'r>(columns: &Columns, record: &'r StringRecord, (name, index): (&str, usize)) -> &'r str {
    if columns.has(name) {
        columns.get(record, name)
    } else {
        record.get(index).map(clean).unwrap_or_default()
    }
}

/// Parse one delivery export, keeping rows inside `period`
pub fn parse_delivery(
    content: &[u8],
    config: &CategoryConfig,
    rates: &RateTable,
    period: Period,
) -> Result<ParseOutput<NormalizedTransaction>> {
    let rules = &config.delivery_service;

    let mut rdr = csv_reader(content, b',');
    let columns = Columns::new(rdr.headers()?);
    let mut output = ParseOutput::default();

    for result in rdr.records() {
        output.stats.rows_read += 1;
        let Ok(record) = result else {
            output.stats.malformed += 1;
            continue;
        };

        let Some(date) = parse_iso_date(field(&columns, &record, DATE)) else {
            output.stats.malformed += 1;
            continue;
        };
        if !period.contains(date) {
            output.stats.out_of_period += 1;
            continue;
        }

        let label = field(&columns, &record, CATEGORY);
        if rules.is_service_row(label) {
            output.stats.dropped += 1;
            continue;
        }

        let amount = match parse_decimal(field(&columns, &record, TOTAL)) {
            Some(amount) if amount > 0.0 => amount,
            _ => {
                output.stats.malformed += 1;
                continue;
            }
        };

        let category = rules
            .categories
            .exact(label)
            .unwrap_or(Category::OtherExpense);
        let currency = field(&columns, &record, CURRENCY).to_uppercase();
        let amount_reporting = rates.to_reporting(amount, &currency);

        // Vendors are venues, never people; two-word names like
        // "Shawarma House" would otherwise lose their second word.
        let description = truncate_chars(field(&columns, &record, VENDOR), MAX_DESCRIPTION_CHARS);

        output.rows.push(NormalizedTransaction {
            date,
            tx_type: TxType::Expense,
            category,
            description,
            amount,
            currency,
            amount_reporting,
            source: SourceKind::DeliveryService,
            account: ACCOUNT.to_string(),
        });
    }

    if output.stats.dropped > 0 {
        debug!("Delivery: skipped {} service rows", output.stats.dropped);
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn parse(csv: &str, period: &str) -> ParseOutput<NormalizedTransaction> {
        let config = CategoryConfig::embedded().unwrap();
        let rates = RateTable::fallback(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
        parse_delivery(csv.as_bytes(), &config, &rates, period.parse().unwrap()).unwrap()
    }

    #[test]
    fn test_orders_and_service_rows() {
        let csv = r#"vendor,date,total,currency,items_count,file_name,month,year,category
Shawarma House,2026-01-10,"25,50",GEL,2,order1.pdf,1,2026,Еда
Wolt,2026-01-10,"5,99",GEL,1,order2.pdf,1,2026,Подписка Wolt+
Wolt,2026-01-11,"2,00",GEL,1,order3.pdf,1,2026,Сервис Wolt
Nikora,2026-01-12,40,GEL,7,order4.pdf,1,2026,Продукты"#;

        let out = parse(csv, "2026-01");
        assert_eq!(out.rows.len(), 2);
        assert_eq!(out.stats.dropped, 2);

        let first = &out.rows[0];
        assert_eq!(first.date, NaiveDate::from_ymd_opt(2026, 1, 10).unwrap());
        assert_eq!(first.tx_type, TxType::Expense);
        assert_eq!(first.category, Category::FoodDelivery);
        assert_eq!(first.amount, 25.5);
        assert_eq!(first.amount_reporting, 726.75);
        assert_eq!(first.account, "Wolt");
        assert_eq!(first.source, SourceKind::DeliveryService);

        assert_eq!(out.rows[1].category, Category::Groceries);
    }

    #[test]
    fn test_vendor_names_are_not_anonymized() {
        let csv = r#"vendor,date,total,currency,items_count,file_name,month,year,category
Shawarma House,2026-01-10,20,GEL,2,order1.pdf,1,2026,Еда
Khinkali Bar,2026-01-11,30,GEL,3,order2.pdf,1,2026,Еда"#;
        let out = parse(csv, "2026-01");
        assert_eq!(out.rows[0].category, Category::FoodDelivery);
        assert_eq!(out.rows[0].description, "Shawarma House");
        assert_eq!(out.rows[1].description, "Khinkali Bar");
    }

    #[test]
    fn test_unknown_label_is_other_expense() {
        let csv = r#"vendor,date,total,currency,items_count,file_name,month,year,category
Mystery Shop,2026-01-10,10,GEL,1,x.pdf,1,2026,Разное"#;
        let out = parse(csv, "2026-01");
        assert_eq!(out.rows[0].category, Category::OtherExpense);
    }

    #[test]
    fn test_positional_columns_without_header_names() {
        let csv = r#"a,b,c,d,e,f,g,h,i
Pharmacy,2026-01-20,12,GEL,1,x.pdf,1,2026,Аптека"#;
        let out = parse(csv, "2026");
        assert_eq!(out.rows.len(), 1);
        assert_eq!(out.rows[0].category, Category::Health);
        assert_eq!(out.rows[0].description, "Pharmacy");
    }

    #[test]
    fn test_skips_bad_and_out_of_period_rows() {
        let csv = r#"vendor,date,total,currency,items_count,file_name,month,year,category
A,2026-02-01,10,GEL,1,x.pdf,2,2026,Еда
B,2026-01-05,0,GEL,1,x.pdf,1,2026,Еда
C,2026-01-05,abc,GEL,1,x.pdf,1,2026,Еда
D,,10,GEL,1,x.pdf,1,2026,Еда"#;
        let out = parse(csv, "2026-01");
        assert!(out.rows.is_empty());
        assert_eq!(out.stats.out_of_period, 1);
        assert_eq!(out.stats.malformed, 3);
    }
}
