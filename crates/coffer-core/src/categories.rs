//! Category configuration and the rule engine that applies it
//!
//! Every source maps its own labels (budget categories, processor transaction
//! types, bank SMS types, delivery categories) and counterparty strings onto
//! the canonical [`Category`] vocabulary. The mapping lives in a versioned TOML
//! artifact so it can be tuned without a rebuild.
//!
//! ## Configuration Resolution
//!
//! Config is loaded with a two-layer resolution:
//! 1. An explicit path (`--categories`), or the override in the data dir
//!    (~/.local/share/coffer/config/categories.toml)
//! 2. Fall back to embedded defaults (compiled into binary)
//!
//! ## Precedence
//!
//! For a single input the engine tries, in order: payee override (exact, expense
//! only), direct category name (exact), counterparty substring (case-insensitive,
//! first match in table order), then the `other_expense` / `other_income`
//! sentinel. The payment processor layers its subscription table in front of
//! this; see [`PaymentProcessorRules::expense_category`].

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer};

use crate::error::{Error, Result};
use crate::models::{Category, SourceKind, TxType};

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/categories.toml");

/// Highest artifact version this build understands
pub const SUPPORTED_VERSION: u32 = 1;

/// One pattern → category entry
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub pattern: String,
    needle: String,
    pub category: Category,
}

impl Rule {
    pub fn new(pattern: impl Into<String>, category: Category) -> Self {
        let pattern = pattern.into();
        let needle = pattern.to_lowercase();
        Self {
            pattern,
            needle,
            category,
        }
    }
}

/// Ordered rule table. Order is the document order of the TOML table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleTable {
    rules: Vec<Rule>,
}

impl RuleTable {
    /// Exact lookup of a label (after trimming)
    pub fn exact(&self, label: &str) -> Option<Category> {
        let label = label.trim();
        if label.is_empty() {
            return None;
        }
        self.rules
            .iter()
            .find(|r| r.pattern == label)
            .map(|r| r.category)
    }

    /// First rule whose pattern occurs in `text`, ignoring case
    pub fn containing(&self, text: &str) -> Option<Category> {
        if text.trim().is_empty() {
            return None;
        }
        let haystack = text.to_lowercase();
        self.rules
            .iter()
            .find(|r| !r.needle.is_empty() && haystack.contains(&r.needle))
            .map(|r| r.category)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }
}

impl<'de> Deserialize<'de> for RuleTable {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct RuleTableVisitor;

        impl<'de> Visitor<'de> for RuleTableVisitor {
            type Value = RuleTable;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a table of pattern = \"category\" entries")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<RuleTable, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut rules = Vec::new();
                while let Some((pattern, category)) = map.next_entry::<String, String>()? {
                    let category: Category = category.parse().map_err(de::Error::custom)?;
                    rules.push(Rule::new(pattern, category));
                }
                Ok(RuleTable { rules })
            }
        }

        deserializer.deserialize_map(RuleTableVisitor)
    }
}

/// Borrowed view over the tables one source contributes to the generic engine
#[derive(Debug, Clone, Copy)]
pub struct CategoryRuleSet<'a> {
    pub payee_overrides: Option<&'a RuleTable>,
    pub expense: Option<&'a RuleTable>,
    pub income: Option<&'a RuleTable>,
    pub merchants: Option<&'a RuleTable>,
}

impl CategoryRuleSet<'_> {
    /// Map one input onto a canonical category. Never fails.
    pub fn categorize(
        &self,
        tx_type: TxType,
        raw_category: Option<&str>,
        merchant: Option<&str>,
        payee: Option<&str>,
    ) -> Category {
        if tx_type == TxType::Transfer {
            return Category::Transfer;
        }

        if tx_type == TxType::Expense {
            if let (Some(table), Some(payee)) = (self.payee_overrides, payee) {
                if let Some(category) = table.exact(payee) {
                    return category;
                }
            }
        }

        let direct = match tx_type {
            TxType::Income => self.income,
            _ => self.expense,
        };
        if let (Some(table), Some(label)) = (direct, raw_category) {
            if let Some(category) = table.exact(label) {
                return category;
            }
        }

        if let (Some(table), Some(merchant)) = (self.merchants, merchant) {
            if let Some(category) = table.containing(merchant) {
                return category;
            }
        }

        Category::sentinel(tx_type)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportingConfig {
    pub local_currency: String,
    pub top_expenses: usize,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            local_currency: "GEL".to_string(),
            top_expenses: 10,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PersonalLedgerRules {
    /// Payee substrings (case-insensitive) of money-transfer services
    pub transfer_payees: Vec<String>,
    /// Account name substrings treated as internal when a row is uncategorized
    pub internal_accounts: Vec<String>,
    pub payee_overrides: RuleTable,
    pub expense: RuleTable,
    pub income: RuleTable,
}

impl PersonalLedgerRules {
    pub fn rule_set(&self) -> CategoryRuleSet<'_> {
        CategoryRuleSet {
            payee_overrides: Some(&self.payee_overrides),
            expense: Some(&self.expense),
            income: Some(&self.income),
            merchants: None,
        }
    }

    pub fn is_transfer_payee(&self, payee: &str) -> bool {
        let payee = payee.to_lowercase();
        self.transfer_payees
            .iter()
            .any(|p| !p.is_empty() && payee.contains(&p.to_lowercase()))
    }

    pub fn is_internal_account(&self, account: &str) -> bool {
        self.internal_accounts
            .iter()
            .any(|a| !a.is_empty() && account.contains(a.as_str()))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PaymentProcessorRules {
    pub income_category: Category,
    pub ignored_types: Vec<String>,
    pub subscription_types: Vec<String>,
    pub subscriptions: RuleTable,
    pub merchants: RuleTable,
    pub type_fallbacks: RuleTable,
}

impl Default for PaymentProcessorRules {
    fn default() -> Self {
        Self {
            income_category: Category::WorkIncome,
            ignored_types: Vec::new(),
            subscription_types: Vec::new(),
            subscriptions: RuleTable::default(),
            merchants: RuleTable::default(),
            type_fallbacks: RuleTable::default(),
        }
    }
}

impl PaymentProcessorRules {
    pub fn is_ignored(&self, tx_type: &str) -> bool {
        self.ignored_types.iter().any(|t| t == tx_type)
    }

    pub fn is_subscription_type(&self, tx_type: &str) -> bool {
        self.subscription_types.iter().any(|t| t == tx_type)
    }

    /// Category of an outgoing payment.
    ///
    /// Subscription types try the specific subscription table first and default
    /// to `subscriptions`; a merchant match may refine either the sentinel or
    /// that default. The type fallback applies only when nothing else did.
    pub fn expense_category(&self, tx_type: &str, name: &str) -> Category {
        let mut category = Category::OtherExpense;

        if self.is_subscription_type(tx_type) {
            category = self
                .subscriptions
                .containing(name)
                .unwrap_or(Category::Subscriptions);
        }

        if matches!(category, Category::OtherExpense | Category::Subscriptions) {
            if let Some(merchant) = self.merchants.containing(name) {
                category = merchant;
            }
        }

        if category == Category::OtherExpense {
            if let Some(fallback) = self.type_fallbacks.exact(tx_type) {
                category = fallback;
            }
        }

        category
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BankSmsRules {
    pub processor_marker: String,
    pub type_mapping: HashMap<String, TxType>,
    pub type_categories: RuleTable,
    pub merchants: RuleTable,
}

impl Default for BankSmsRules {
    fn default() -> Self {
        Self {
            processor_marker: "PAYPAL".to_string(),
            type_mapping: HashMap::new(),
            type_categories: RuleTable::default(),
            merchants: RuleTable::default(),
        }
    }
}

impl BankSmsRules {
    /// Direction for an SMS type; unknown types are expenses
    pub fn direction(&self, sms_type: &str) -> TxType {
        self.type_mapping
            .get(sms_type.trim())
            .copied()
            .unwrap_or(TxType::Expense)
    }

    pub fn is_processor_row(&self, merchant: &str) -> bool {
        !self.processor_marker.is_empty()
            && merchant
                .to_uppercase()
                .contains(&self.processor_marker.to_uppercase())
    }

    /// Category of one SMS row: transfers first, then fixed type categories,
    /// then merchant substrings (income rows included).
    pub fn category(&self, tx_type: TxType, sms_type: &str, merchant: &str) -> Category {
        if tx_type == TxType::Transfer {
            return Category::Transfer;
        }
        if let Some(category) = self.type_categories.exact(sms_type) {
            return category;
        }
        self.merchants
            .containing(merchant)
            .unwrap_or(Category::sentinel(tx_type))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeliveryRules {
    pub marker: String,
    pub service_labels: Vec<String>,
    pub categories: RuleTable,
}

impl Default for DeliveryRules {
    fn default() -> Self {
        Self {
            marker: "WOLT".to_string(),
            service_labels: Vec::new(),
            categories: RuleTable::default(),
        }
    }
}

impl DeliveryRules {
    pub fn rule_set(&self) -> CategoryRuleSet<'_> {
        CategoryRuleSet {
            payee_overrides: None,
            expense: Some(&self.categories),
            income: None,
            merchants: None,
        }
    }

    pub fn is_service_row(&self, label: &str) -> bool {
        let label = label.trim();
        self.service_labels.iter().any(|l| l == label)
    }
}

/// Raw document shape; display names are validated after parsing
#[derive(Debug, Deserialize)]
struct ConfigFile {
    version: u32,
    #[serde(default)]
    reporting: ReportingConfig,
    #[serde(default)]
    display_names: BTreeMap<String, String>,
    #[serde(default)]
    personal_ledger: PersonalLedgerRules,
    #[serde(default)]
    payment_processor: PaymentProcessorRules,
    #[serde(default)]
    bank_sms: BankSmsRules,
    #[serde(default)]
    delivery_service: DeliveryRules,
}

/// Immutable category configuration for one run
#[derive(Debug, Clone)]
pub struct CategoryConfig {
    pub version: u32,
    pub reporting: ReportingConfig,
    pub display_names: HashMap<Category, String>,
    pub personal_ledger: PersonalLedgerRules,
    pub payment_processor: PaymentProcessorRules,
    pub bank_sms: BankSmsRules,
    pub delivery_service: DeliveryRules,
}

impl CategoryConfig {
    /// Load the configuration (explicit path, then data dir override, then
    /// embedded defaults)
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            let content = fs::read_to_string(path).map_err(|e| {
                Error::Config(format!("Failed to read {}: {}", path.display(), e))
            })?;
            return Self::parse(&content);
        }

        if let Some(path) = default_config_path() {
            if path.exists() {
                tracing::debug!("Using category override at {}", path.display());
                let content = fs::read_to_string(&path).map_err(|e| {
                    Error::Config(format!("Failed to read {}: {}", path.display(), e))
                })?;
                return Self::parse(&content);
            }
        }

        Self::embedded()
    }

    /// The configuration compiled into the binary
    pub fn embedded() -> Result<Self> {
        Self::parse(DEFAULT_CONFIG)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid category config: {}", e)))?;

        if file.version == 0 || file.version > SUPPORTED_VERSION {
            return Err(Error::Config(format!(
                "Unsupported category config version {} (supported: {})",
                file.version, SUPPORTED_VERSION
            )));
        }

        let mut display_names = HashMap::new();
        for (key, name) in file.display_names {
            let category: Category = key.parse().map_err(Error::Config)?;
            display_names.insert(category, name);
        }

        Ok(Self {
            version: file.version,
            reporting: file.reporting,
            display_names,
            personal_ledger: file.personal_ledger,
            payment_processor: file.payment_processor,
            bank_sms: file.bank_sms,
            delivery_service: file.delivery_service,
        })
    }

    /// Human-readable category name, falling back to the canonical key
    pub fn display_name(&self, category: Category) -> &str {
        self.display_names
            .get(&category)
            .map(|s| s.as_str())
            .unwrap_or_else(|| category.as_str())
    }

    /// Categorize one input the way the named source's parser would.
    ///
    /// `raw_category` is the source's own label: budget category name,
    /// processor transaction type, SMS type or delivery category.
    pub fn categorize(
        &self,
        source: SourceKind,
        tx_type: TxType,
        raw_category: Option<&str>,
        merchant: Option<&str>,
        payee: Option<&str>,
    ) -> Category {
        match (source, tx_type) {
            (_, TxType::Transfer) => Category::Transfer,
            (SourceKind::PaymentProcessor, TxType::Income) => {
                self.payment_processor.income_category
            }
            (SourceKind::PaymentProcessor, TxType::Expense) => {
                let name = merchant.or(payee).unwrap_or_default();
                self.payment_processor
                    .expense_category(raw_category.unwrap_or_default(), name)
            }
            (SourceKind::BankSms, _) => self.bank_sms.category(
                tx_type,
                raw_category.unwrap_or_default(),
                merchant.unwrap_or_default(),
            ),
            (SourceKind::PersonalLedger, _) => self
                .personal_ledger
                .rule_set()
                .categorize(tx_type, raw_category, merchant, payee),
            (SourceKind::DeliveryService, _) => self
                .delivery_service
                .rule_set()
                .categorize(tx_type, raw_category, merchant, payee),
        }
    }
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("coffer").join("config").join("categories.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CategoryConfig {
        CategoryConfig::embedded().unwrap()
    }

    #[test]
    fn test_parse_default_config() {
        let config = config();
        assert_eq!(config.version, SUPPORTED_VERSION);
        assert_eq!(config.reporting.local_currency, "GEL");
        assert!(!config.personal_ledger.expense.is_empty());
        assert!(!config.bank_sms.merchants.is_empty());
        assert_eq!(config.display_name(Category::Groceries), "Продукты");
    }

    #[test]
    fn test_display_name_falls_back_to_key() {
        let config = CategoryConfig::parse("version = 1").unwrap();
        assert_eq!(config.display_name(Category::Taxi), "taxi");
    }

    #[test]
    fn test_rule_table_keeps_document_order() {
        let config = CategoryConfig::parse(
            r#"
version = 1

[bank_sms.merchants]
"YANDEX" = "shopping"
"YANDEX GO" = "taxi"
"#,
        )
        .unwrap();

        let patterns: Vec<&str> = config
            .bank_sms
            .merchants
            .iter()
            .map(|r| r.pattern.as_str())
            .collect();
        assert_eq!(patterns, vec!["YANDEX", "YANDEX GO"]);
        // First configured match wins, not the longest
        assert_eq!(
            config.bank_sms.merchants.containing("YANDEX GO TBILISI"),
            Some(Category::Shopping)
        );
    }

    #[test]
    fn test_unknown_category_is_config_error() {
        let result = CategoryConfig::parse(
            r#"
version = 1

[delivery_service.categories]
"Еда" = "fast_food"
"#,
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_unknown_display_name_key_is_config_error() {
        let result = CategoryConfig::parse(
            r#"
version = 1

[display_names]
snacks = "Снеки"
"#,
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_future_version_rejected() {
        let result = CategoryConfig::parse("version = 99");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_processor_merchant_beats_type_fallback() {
        let config = config();
        // "Express Checkout Payment" also has a type fallback to shopping
        let category = config.categorize(
            SourceKind::PaymentProcessor,
            TxType::Expense,
            Some("Express Checkout Payment"),
            Some("Booking.com BV"),
            None,
        );
        assert_eq!(category, Category::Travel);
        assert_eq!(
            category,
            config
                .payment_processor
                .expense_category("Express Checkout Payment", "Booking.com BV")
        );

        let category = config.categorize(
            SourceKind::PaymentProcessor,
            TxType::Expense,
            Some("Express Checkout Payment"),
            Some("Some Web Shop"),
            None,
        );
        assert_eq!(category, Category::Shopping);
    }

    #[test]
    fn test_bank_sms_categorize_matches_parser_rules() {
        let config = config();
        for (sms_type, merchant) in [("utility", "CARREFOUR"), ("purchase", "CARREFOUR"), ("purchase", "NOWHERE")] {
            let tx_type = config.bank_sms.direction(sms_type);
            assert_eq!(
                config.categorize(SourceKind::BankSms, tx_type, Some(sms_type), Some(merchant), None),
                config.bank_sms.category(tx_type, sms_type, merchant)
            );
        }
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let result = CategoryConfig::parse("version = = 1");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_payee_override_beats_direct_category() {
        let config = config();
        let category = config.categorize(
            SourceKind::PersonalLedger,
            TxType::Expense,
            Some("Продукты"),
            None,
            Some("Яндекс Плюс"),
        );
        assert_eq!(category, Category::Subscriptions);

        // Overrides only apply to expenses
        let category = config.categorize(
            SourceKind::PersonalLedger,
            TxType::Income,
            Some("Зарплата"),
            None,
            Some("Яндекс Плюс"),
        );
        assert_eq!(category, Category::Salary);
    }

    #[test]
    fn test_direct_then_sentinel() {
        let config = config();
        assert_eq!(
            config.categorize(
                SourceKind::PersonalLedger,
                TxType::Expense,
                Some("Groceries"),
                None,
                Some("Supermarket"),
            ),
            Category::Groceries
        );
        assert_eq!(
            config.categorize(
                SourceKind::PersonalLedger,
                TxType::Expense,
                Some("Нечто"),
                None,
                None,
            ),
            Category::OtherExpense
        );
        assert_eq!(
            config.categorize(
                SourceKind::PersonalLedger,
                TxType::Income,
                Some("Нечто"),
                None,
                None,
            ),
            Category::OtherIncome
        );
    }

    #[test]
    fn test_merchant_substring_is_case_insensitive() {
        let config = config();
        assert_eq!(
            config.categorize(
                SourceKind::BankSms,
                TxType::Expense,
                Some("purchase"),
                Some("Carrefour Tbilisi Mall"),
                None,
            ),
            Category::Groceries
        );
    }

    #[test]
    fn test_bank_sms_type_categories_and_income_merchants() {
        let rules = &config().bank_sms;
        assert_eq!(
            rules.category(TxType::Expense, "utility", "TELASI"),
            Category::Utilities
        );
        assert_eq!(
            rules.category(TxType::Expense, "commission", ""),
            Category::Interest
        );
        assert_eq!(
            rules.category(TxType::Income, "income", "KORONAPAY TRANSFER"),
            Category::Transfer
        );
        assert_eq!(
            rules.category(TxType::Income, "income", "SOMEONE"),
            Category::OtherIncome
        );
        assert_eq!(
            rules.category(TxType::Transfer, "transfer", "GLOVO"),
            Category::Transfer
        );
        assert_eq!(rules.direction("purchase"), TxType::Expense);
        assert_eq!(rules.direction("income"), TxType::Income);
        assert_eq!(rules.direction("mystery"), TxType::Expense);
    }

    #[test]
    fn test_processor_subscription_precedence() {
        let rules = &config().payment_processor;
        // Specific subscription
        assert_eq!(
            rules.expense_category("Subscription Payment", "Netflix International B.V."),
            Category::Subscriptions
        );
        assert_eq!(
            rules.expense_category("Subscription Payment", "Duolingo"),
            Category::Education
        );
        // Unknown subscription defaults to subscriptions
        assert_eq!(
            rules.expense_category("PreApproved Payment Bill User Payment", "Some SaaS"),
            Category::Subscriptions
        );
        // Merchant refines the subscription default
        assert_eq!(
            rules.expense_category("Subscription Payment", "Steam Games"),
            Category::Entertainment
        );
        // Type fallback
        assert_eq!(
            rules.expense_category("Express Checkout Payment", "Random Shop"),
            Category::Shopping
        );
        assert_eq!(
            rules.expense_category("Mobile Payment", "Random Shop"),
            Category::OtherExpense
        );
    }

    #[test]
    fn test_personal_ledger_helpers() {
        let rules = &config().personal_ledger;
        assert!(rules.is_transfer_payee("Золотая Корона"));
        assert!(rules.is_transfer_payee("KoronaPay transfer"));
        assert!(!rules.is_transfer_payee("Пятёрочка"));
        assert!(rules.is_internal_account("Ozon Карта"));
        assert!(!rules.is_internal_account("Наличные"));
    }

    #[test]
    fn test_categorize_is_deterministic() {
        let config = config();
        let first = config.categorize(
            SourceKind::BankSms,
            TxType::Expense,
            Some("purchase"),
            Some("WOLT TBILISI"),
            None,
        );
        for _ in 0..10 {
            let again = config.categorize(
                SourceKind::BankSms,
                TxType::Expense,
                Some("purchase"),
                Some("WOLT TBILISI"),
                None,
            );
            assert_eq!(first, again);
        }
        assert_eq!(first, Category::FoodDelivery);
    }
}
