//! Bank SMS notifications reconstructed into CSV
//!
//! Format: `date,time,type,amount,currency,merchant,card,balance,raw_body`
//!
//! The SMS type decides the direction. Rows whose merchant is the payment
//! processor are dropped because the processor's own export is more precise.

use tracing::debug;

use super::{csv_reader, parse_decimal, parse_iso_date, Columns, ParseOutput, MAX_DESCRIPTION_CHARS};
use crate::anonymize::strip_surname;
use crate::categories::CategoryConfig;
use crate::error::Result;
use crate::models::{truncate_chars, NormalizedTransaction, Period, SourceKind};
use crate::rates::RateTable;

const DATE: &str = "date";
const TYPE: &str = "type";
const AMOUNT: &str = "amount";
const CURRENCY: &str = "currency";
const MERCHANT: &str = "merchant";
const CARD: &str = "card";

/// Bank name used in account labels
pub const BANK: &str = "Credo";

/// Parse one bank SMS file, keeping rows inside `period`
pub fn parse_bank_sms(
    content: &[u8],
    config: &CategoryConfig,
    rates: &RateTable,
    period: Period,
) -> Result<ParseOutput<NormalizedTransaction>> {
    let rules = &config.bank_sms;

    let mut rdr = csv_reader(content, b',');
    let columns = Columns::new(rdr.headers()?);
    let mut output = ParseOutput::default();

    for result in rdr.records() {
        output.stats.rows_read += 1;
        let Ok(record) = result else {
            output.stats.malformed += 1;
            continue;
        };

        let Some(date) = parse_iso_date(columns.get(&record, DATE)) else {
            output.stats.malformed += 1;
            continue;
        };
        if !period.contains(date) {
            output.stats.out_of_period += 1;
            continue;
        }

        let amount = match parse_decimal(columns.get(&record, AMOUNT)) {
            Some(amount) if amount > 0.0 => amount,
            _ => {
                output.stats.malformed += 1;
                continue;
            }
        };

        let merchant = columns.get(&record, MERCHANT);
        if rules.is_processor_row(merchant) {
            output.stats.dropped += 1;
            continue;
        }

        let sms_type = columns.get(&record, TYPE);
        let tx_type = rules.direction(sms_type);
        let category = rules.category(tx_type, sms_type, merchant);

        let description = truncate_chars(merchant, MAX_DESCRIPTION_CHARS);
        let description = if category.is_sentinel() {
            description
        } else {
            strip_surname(&description)
        };

        let card = columns.get(&record, CARD);
        let account = if card.is_empty() {
            BANK.to_string()
        } else {
            format!("{} *{}", BANK, card)
        };

        let currency = columns.get(&record, CURRENCY).to_uppercase();
        let amount_reporting = rates.to_reporting(amount, &currency);
        output.rows.push(NormalizedTransaction {
            date,
            tx_type,
            category,
            description,
            amount,
            currency,
            amount_reporting,
            source: SourceKind::BankSms,
            account,
        });
    }

    if output.stats.dropped > 0 {
        debug!(
            "Bank SMS: skipped {} payment-processor rows",
            output.stats.dropped
        );
    }
    Ok(output)
}
