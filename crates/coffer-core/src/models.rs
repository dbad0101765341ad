//! Core data types: sources, periods, categories and normalized transactions

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The four raw export sources a period can be assembled from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    /// Budgeting app full dump (semicolon CSV, outcome/income pairs)
    PersonalLedger,
    /// Payment processor activity export (EU or US layout)
    PaymentProcessor,
    /// Bank notifications reconstructed into CSV rows
    BankSms,
    /// Food delivery order history
    DeliveryService,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PersonalLedger => "personal-ledger",
            Self::PaymentProcessor => "payment-processor",
            Self::BankSms => "bank-sms",
            Self::DeliveryService => "delivery-service",
        }
    }

    pub fn all() -> &'static [SourceKind] {
        &[
            Self::BankSms,
            Self::DeliveryService,
            Self::PersonalLedger,
            Self::PaymentProcessor,
        ]
    }

    /// Sources whose every file for the year is read.
    /// The others are full dumps where only the newest file counts.
    pub fn reads_all_files(&self) -> bool {
        matches!(self, Self::PaymentProcessor | Self::DeliveryService)
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "personal-ledger" | "personal_ledger" | "zen" | "zenmoney" => Ok(Self::PersonalLedger),
            "payment-processor" | "payment_processor" | "paypal" => Ok(Self::PaymentProcessor),
            "bank-sms" | "bank_sms" | "credo_sms" => Ok(Self::BankSms),
            "delivery-service" | "delivery_service" | "wolt" => Ok(Self::DeliveryService),
            _ => Err(format!("Unknown source: {}", s)),
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Direction of a money movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxType {
    Income,
    Expense,
    Transfer,
}

impl TxType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
            Self::Transfer => "transfer",
        }
    }
}

impl FromStr for TxType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "income" => Ok(Self::Income),
            "expense" => Ok(Self::Expense),
            "transfer" => Ok(Self::Transfer),
            _ => Err(format!("Unknown transaction type: {}", s)),
        }
    }
}

impl fmt::Display for TxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Canonical category vocabulary.
///
/// Every source-specific label is mapped onto one of these. `OtherExpense`
/// and `OtherIncome` are the sentinels meaning "no rule matched".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    // Expenses
    Groceries,
    Restaurants,
    FoodDelivery,
    Transport,
    Taxi,
    Car,
    Rent,
    Utilities,
    Communication,
    Health,
    Beauty,
    Clothing,
    Shopping,
    Electronics,
    Home,
    Subscriptions,
    Entertainment,
    Education,
    Travel,
    Sport,
    Pets,
    Gifts,
    Charity,
    Taxes,
    Interest,
    CashOut,
    OtherExpense,
    // Income
    Salary,
    WorkIncome,
    Cashback,
    Refund,
    GiftsReceived,
    InterestIncome,
    OtherIncome,
    // Either direction
    Transfer,
}

impl Category {
    pub const ALL: [Category; 35] = [
        Self::Groceries,
        Self::Restaurants,
        Self::FoodDelivery,
        Self::Transport,
        Self::Taxi,
        Self::Car,
        Self::Rent,
        Self::Utilities,
        Self::Communication,
        Self::Health,
        Self::Beauty,
        Self::Clothing,
        Self::Shopping,
        Self::Electronics,
        Self::Home,
        Self::Subscriptions,
        Self::Entertainment,
        Self::Education,
        Self::Travel,
        Self::Sport,
        Self::Pets,
        Self::Gifts,
        Self::Charity,
        Self::Taxes,
        Self::Interest,
        Self::CashOut,
        Self::OtherExpense,
        Self::Salary,
        Self::WorkIncome,
        Self::Cashback,
        Self::Refund,
        Self::GiftsReceived,
        Self::InterestIncome,
        Self::OtherIncome,
        Self::Transfer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Groceries => "groceries",
            Self::Restaurants => "restaurants",
            Self::FoodDelivery => "food_delivery",
            Self::Transport => "transport",
            Self::Taxi => "taxi",
            Self::Car => "car",
            Self::Rent => "rent",
            Self::Utilities => "utilities",
            Self::Communication => "communication",
            Self::Health => "health",
            Self::Beauty => "beauty",
            Self::Clothing => "clothing",
            Self::Shopping => "shopping",
            Self::Electronics => "electronics",
            Self::Home => "home",
            Self::Subscriptions => "subscriptions",
            Self::Entertainment => "entertainment",
            Self::Education => "education",
            Self::Travel => "travel",
            Self::Sport => "sport",
            Self::Pets => "pets",
            Self::Gifts => "gifts",
            Self::Charity => "charity",
            Self::Taxes => "taxes",
            Self::Interest => "interest",
            Self::CashOut => "cash_out",
            Self::OtherExpense => "other_expense",
            Self::Salary => "salary",
            Self::WorkIncome => "work_income",
            Self::Cashback => "cashback",
            Self::Refund => "refund",
            Self::GiftsReceived => "gifts_received",
            Self::InterestIncome => "interest_income",
            Self::OtherIncome => "other_income",
            Self::Transfer => "transfer",
        }
    }

    /// Fallback category for a direction when no rule matches
    pub fn sentinel(tx_type: TxType) -> Self {
        match tx_type {
            TxType::Income => Self::OtherIncome,
            TxType::Expense | TxType::Transfer => Self::OtherExpense,
        }
    }

    /// True for `other_expense` / `other_income`
    pub fn is_sentinel(&self) -> bool {
        matches!(self, Self::OtherExpense | Self::OtherIncome)
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let needle = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == needle)
            .ok_or_else(|| format!("Unknown category: {}", s))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Reporting period: a calendar month (`YYYY-MM`) or a year (`YYYY`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub enum Period {
    Month { year: i32, month: u32 },
    Year(i32),
}

impl Period {
    pub fn year(&self) -> i32 {
        match self {
            Self::Month { year, .. } => *year,
            Self::Year(year) => *year,
        }
    }

    pub fn is_year(&self) -> bool {
        matches!(self, Self::Year(_))
    }

    /// Whether a transaction dated `date` belongs to this period
    pub fn contains(&self, date: NaiveDate) -> bool {
        match self {
            Self::Month { year, month } => date.year() == *year && date.month() == *month,
            Self::Year(year) => date.year() == *year,
        }
    }

    /// First calendar day of the period
    pub fn first_day(&self) -> NaiveDate {
        let (year, month) = match self {
            Self::Month { year, month } => (*year, *month),
            Self::Year(year) => (*year, 1),
        };
        NaiveDate::from_ymd_opt(year, month, 1).unwrap_or_default()
    }
}

impl FromStr for Period {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = || Error::InvalidPeriod(s.to_string());
        let all_digits = |part: &str| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit());

        match s.len() {
            4 if all_digits(s) => Ok(Self::Year(s.parse().map_err(|_| invalid())?)),
            7 => {
                let (year, month) = s.split_once('-').ok_or_else(invalid)?;
                if year.len() != 4 || month.len() != 2 || !all_digits(year) || !all_digits(month) {
                    return Err(invalid());
                }
                let year: i32 = year.parse().map_err(|_| invalid())?;
                let month: u32 = month.parse().map_err(|_| invalid())?;
                if !(1..=12).contains(&month) {
                    return Err(invalid());
                }
                Ok(Self::Month { year, month })
            }
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Month { year, month } => write!(f, "{:04}-{:02}", year, month),
            Self::Year(year) => write!(f, "{:04}", year),
        }
    }
}

impl From<Period> for String {
    fn from(period: Period) -> Self {
        period.to_string()
    }
}

/// One raw export file as found at the storage boundary
#[derive(Debug, Clone)]
pub struct RawSourceFile {
    pub source: SourceKind,
    pub name: String,
    pub content: Vec<u8>,
    pub modified: Option<DateTime<Utc>>,
}

/// Canonical ledger entry.
///
/// `amount` is always positive; direction lives in `tx_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedTransaction {
    pub date: NaiveDate,
    #[serde(rename = "type")]
    pub tx_type: TxType,
    pub category: Category,
    pub description: String,
    /// Amount in the original currency
    pub amount: f64,
    pub currency: String,
    /// Amount converted to the reporting currency, 2 dp
    #[serde(rename = "amount_rub")]
    pub amount_reporting: f64,
    pub source: SourceKind,
    pub account: String,
}

impl NormalizedTransaction {
    pub fn is_income(&self) -> bool {
        self.tx_type == TxType::Income
    }

    pub fn is_expense(&self) -> bool {
        self.tx_type == TxType::Expense
    }

    pub fn is_transfer(&self) -> bool {
        self.tx_type == TxType::Transfer
    }
}

/// Round to cents
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Truncate to at most `max` characters without splitting a code point
pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
