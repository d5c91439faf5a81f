use cashpilot_core::{AnalysisConfig, Money, Transaction, TransactionType};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::util::similarity;

/// Built-in expense keywords, checked in order. The first hit names the primary suggestion.
pub const EXPENSE_KEYWORDS: &[(&str, &str)] = &[
    ("office", "Office Supplies"),
    ("staples", "Office Supplies"),
    ("stationery", "Office Supplies"),
    ("payroll", "Payroll"),
    ("salary", "Payroll"),
    ("wages", "Payroll"),
    ("gusto", "Payroll"),
    ("rent", "Rent & Lease"),
    ("lease", "Rent & Lease"),
    ("software", "Software & Subscriptions"),
    ("subscription", "Software & Subscriptions"),
    ("adobe", "Software & Subscriptions"),
    ("github", "Software & Subscriptions"),
    ("slack", "Software & Subscriptions"),
    ("aws", "Hosting & Infrastructure"),
    ("hosting", "Hosting & Infrastructure"),
    ("domain", "Hosting & Infrastructure"),
    ("google ads", "Marketing & Advertising"),
    ("facebook ads", "Marketing & Advertising"),
    ("advertising", "Marketing & Advertising"),
    ("marketing", "Marketing & Advertising"),
    ("insurance", "Insurance"),
    ("electric", "Utilities"),
    ("utility", "Utilities"),
    ("internet", "Utilities"),
    ("phone", "Utilities"),
    ("water", "Utilities"),
    ("taxi", "Travel"),
    ("uber", "Travel"),
    ("lyft", "Travel"),
    ("airline", "Travel"),
    ("flight", "Travel"),
    ("hotel", "Travel"),
    ("travel", "Travel"),
    ("restaurant", "Meals & Entertainment"),
    ("coffee", "Meals & Entertainment"),
    ("meal", "Meals & Entertainment"),
    ("lunch", "Meals & Entertainment"),
    ("legal", "Professional Services"),
    ("attorney", "Professional Services"),
    ("accounting", "Professional Services"),
    ("consultant", "Professional Services"),
    ("shipping", "Shipping & Fulfillment"),
    ("fedex", "Shipping & Fulfillment"),
    ("usps", "Shipping & Fulfillment"),
    ("dhl", "Shipping & Fulfillment"),
    ("inventory", "Inventory"),
    ("wholesale", "Inventory"),
    ("supplier", "Inventory"),
    ("equipment", "Equipment"),
    ("computer", "Equipment"),
    ("laptop", "Equipment"),
    ("bank fee", "Bank Fees"),
    ("merchant fee", "Bank Fees"),
    ("fee", "Bank Fees"),
    ("interest", "Bank Fees"),
    ("tax", "Taxes"),
    ("irs", "Taxes"),
];

/// Built-in income keywords, checked in order.
pub const INCOME_KEYWORDS: &[(&str, &str)] = &[
    ("subscription", "Subscription Revenue"),
    ("membership", "Subscription Revenue"),
    ("recurring", "Subscription Revenue"),
    ("retainer", "Retainer"),
    ("consulting", "Consulting"),
    ("service", "Services"),
    ("invoice", "Services"),
    ("shopify", "Product Sales"),
    ("order", "Product Sales"),
    ("sale", "Product Sales"),
    ("refund", "Refunds"),
    ("interest", "Interest Income"),
    ("dividend", "Investment Income"),
    ("grant", "Grants"),
    ("stripe", "Payments"),
    ("paypal", "Payments"),
    ("square", "Payments"),
    ("deposit", "Deposits"),
];

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("Failed to parse rules TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid regex in rule '{rule}': {source}")]
    InvalidRegex {
        rule: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryRule {
    pub name: String,
    #[serde(default)]
    pub priority: i32,
    pub pattern: String,
    /// `"contains"`, `"exact"`, `"regex"`, `"fuzzy:0.8"`, or a `{ fuzzy = { threshold } }` table.
    #[serde(default, deserialize_with = "match_type_from_str_or_table")]
    pub match_type: MatchType,
    pub category: String,
    /// Restricts the rule to one transaction type; `None` applies to all.
    #[serde(default, rename = "type")]
    pub kind: Option<TransactionType>,
    /// Bounds on the absolute amount. A bounded rule never matches a bare description.
    #[serde(default)]
    pub amount_min: Option<Money>,
    #[serde(default)]
    pub amount_max: Option<Money>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    #[default]
    Contains,
    Exact,
    Regex,
    Fuzzy {
        threshold: f32,
    },
}

impl std::str::FromStr for MatchType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "contains" => Ok(MatchType::Contains),
            "exact" => Ok(MatchType::Exact),
            "regex" => Ok(MatchType::Regex),
            s if s.starts_with("fuzzy:") => {
                let threshold = s[6..]
                    .parse::<f32>()
                    .map_err(|_| "Invalid fuzzy threshold".to_string())?;
                Ok(MatchType::Fuzzy { threshold })
            }
            other => Err(format!("Unknown match type: '{other}'")),
        }
    }
}

fn match_type_from_str_or_table<'de, D: Deserializer<'de>>(deserializer: D) -> Result<MatchType, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawMatchType {
        Text(String),
        Table(MatchType),
    }

    match RawMatchType::deserialize(deserializer)? {
        RawMatchType::Text(s) => s.parse().map_err(serde::de::Error::custom),
        RawMatchType::Table(m) => Ok(m),
    }
}

#[derive(Debug, Deserialize)]
struct RuleFile {
    #[serde(default)]
    rules: Vec<CategoryRule>,
}

/// Internal pairing of a rule with its precompiled regex (if applicable).
struct CompiledRule {
    rule: CategoryRule,
    compiled_regex: Option<regex::Regex>,
}

impl CompiledRule {
    fn compile(rule: CategoryRule) -> Result<Self, RuleError> {
        let compiled_regex = match &rule.match_type {
            MatchType::Regex => Some(regex::Regex::new(&rule.pattern).map_err(|source| {
                RuleError::InvalidRegex {
                    rule: rule.name.clone(),
                    source,
                }
            })?),
            _ => None,
        };
        Ok(CompiledRule { rule, compiled_regex })
    }

    fn keyword(keyword: &str, category: &str, kind: TransactionType) -> Self {
        CompiledRule {
            rule: CategoryRule {
                name: keyword.to_string(),
                priority: 0,
                pattern: keyword.to_string(),
                match_type: MatchType::Contains,
                category: category.to_string(),
                kind: Some(kind),
                amount_min: None,
                amount_max: None,
            },
            compiled_regex: None,
        }
    }

    fn matches(&self, description: &str, kind: TransactionType, amount: Option<Money>) -> bool {
        let rule = &self.rule;

        if rule.kind.is_some_and(|k| k != kind) {
            return false;
        }

        if rule.amount_min.is_some() || rule.amount_max.is_some() {
            let Some(amount) = amount.map(Money::abs) else {
                return false;
            };
            if rule.amount_min.is_some_and(|min| amount < min) {
                return false;
            }
            if rule.amount_max.is_some_and(|max| amount > max) {
                return false;
            }
        }

        let text = description.to_lowercase();
        let pattern = rule.pattern.to_lowercase();

        match &rule.match_type {
            MatchType::Contains => !pattern.is_empty() && text.contains(&pattern),
            MatchType::Exact => text.trim() == pattern,
            MatchType::Regex => self
                .compiled_regex
                .as_ref()
                .is_some_and(|re| re.is_match(description)),
            MatchType::Fuzzy { threshold } => similarity(text.trim(), &pattern) >= *threshold,
        }
    }
}

/// Suggests category labels for transaction descriptions.
///
/// User rules (highest priority first) are consulted before the built-in keyword
/// tables. Matching is case-insensitive; suggestions are distinct and keep rule order.
pub struct Categorizer {
    rules: Vec<CompiledRule>,
    config: AnalysisConfig,
}

impl Categorizer {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            rules: builtin_rules().collect(),
            config: config.clone(),
        }
    }

    pub fn with_rules(rules: Vec<CategoryRule>, config: &AnalysisConfig) -> Result<Self, RuleError> {
        let mut custom = rules
            .into_iter()
            .map(CompiledRule::compile)
            .collect::<Result<Vec<_>, _>>()?;
        // Highest priority first; equal priorities keep file order.
        custom.sort_by(|a, b| b.rule.priority.cmp(&a.rule.priority));
        custom.extend(builtin_rules());
        Ok(Self {
            rules: custom,
            config: config.clone(),
        })
    }

    /// Parses `[[rules]]` tables.
    pub fn from_toml(toml_content: &str, config: &AnalysisConfig) -> Result<Self, RuleError> {
        let file: RuleFile = toml::from_str(toml_content)?;
        Self::with_rules(file.rules, config)
    }

    pub fn suggest(&self, description: &str, kind: TransactionType) -> Vec<String> {
        self.collect_suggestions(description, kind, None)
    }

    pub fn suggest_for(&self, tx: &Transaction) -> Vec<String> {
        self.collect_suggestions(&tx.description, tx.kind, Some(tx.amount))
    }

    pub fn find_matching_rule(&self, tx: &Transaction) -> Option<&CategoryRule> {
        if tx.kind == TransactionType::Transfer {
            return None;
        }
        self.rules
            .iter()
            .find(|cr| cr.matches(&tx.description, tx.kind, Some(tx.amount)))
            .map(|cr| &cr.rule)
    }

    /// Fills in the category of an uncategorized transaction. Returns whether it changed.
    pub fn categorize(&self, tx: &mut Transaction) -> bool {
        if !self.config.is_uncategorized(&tx.category) {
            return false;
        }
        match self.find_matching_rule(tx) {
            Some(rule) => {
                tracing::debug!(tx = %tx.id, rule = %rule.name, category = %rule.category, "categorized");
                tx.category = rule.category.clone();
                true
            }
            None => false,
        }
    }

    /// Categorizes every uncategorized transaction in place; returns how many changed.
    pub fn apply(&self, transactions: &mut [Transaction]) -> usize {
        transactions
            .iter_mut()
            .map(|tx| self.categorize(tx))
            .filter(|changed| *changed)
            .count()
    }

    fn collect_suggestions(
        &self,
        description: &str,
        kind: TransactionType,
        amount: Option<Money>,
    ) -> Vec<String> {
        let mut suggestions: Vec<String> = Vec::new();
        if kind == TransactionType::Transfer {
            return suggestions;
        }
        for cr in &self.rules {
            if suggestions.len() >= self.config.max_suggestions {
                break;
            }
            if suggestions.contains(&cr.rule.category) {
                continue;
            }
            if cr.matches(description, kind, amount) {
                suggestions.push(cr.rule.category.clone());
            }
        }
        suggestions
    }
}

fn builtin_rules() -> impl Iterator<Item = CompiledRule> {
    let expense = EXPENSE_KEYWORDS
        .iter()
        .map(|(k, c)| CompiledRule::keyword(k, c, TransactionType::Expense));
    let income = INCOME_KEYWORDS
        .iter()
        .map(|(k, c)| CompiledRule::keyword(k, c, TransactionType::Income));
    expense.chain(income)
}
