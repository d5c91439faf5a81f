use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use super::money::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Income,
    Expense,
    Transfer,
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionType::Income => write!(f, "income"),
            TransactionType::Expense => write!(f, "expense"),
            TransactionType::Transfer => write!(f, "transfer"),
        }
    }
}

impl std::str::FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "income" => Ok(TransactionType::Income),
            "expense" => Ok(TransactionType::Expense),
            "transfer" => Ok(TransactionType::Transfer),
            other => Err(format!("Unknown transaction type: '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionSource {
    #[default]
    Manual,
    Shopify,
    Quickbooks,
}

impl TransactionSource {
    pub const ALL: [TransactionSource; 3] = [
        TransactionSource::Manual,
        TransactionSource::Shopify,
        TransactionSource::Quickbooks,
    ];
}

impl fmt::Display for TransactionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionSource::Manual => write!(f, "manual"),
            TransactionSource::Shopify => write!(f, "shopify"),
            TransactionSource::Quickbooks => write!(f, "quickbooks"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    #[default]
    Completed,
    Cancelled,
}

/// One financial event, as entered manually or produced by a sync converter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub user_id: String,
    #[serde(with = "flexible_date")]
    pub date: DateTime<Utc>,
    pub amount: Money,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub category: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    #[serde(default)]
    pub source: TransactionSource,
    #[serde(default)]
    pub status: TransactionStatus,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_currency() -> String {
    "USD".to_string()
}

impl Transaction {
    /// A completed manual transaction with empty description and category.
    pub fn new(id: impl Into<String>, date: DateTime<Utc>, amount: Money, kind: TransactionType) -> Self {
        Transaction {
            id: id.into(),
            user_id: String::new(),
            date,
            amount,
            currency: default_currency(),
            description: String::new(),
            category: String::new(),
            kind,
            source: TransactionSource::Manual,
            status: TransactionStatus::Completed,
            tags: BTreeSet::new(),
            created_at: None,
            updated_at: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_source(mut self, source: TransactionSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn day(&self) -> NaiveDate {
        self.date.date_naive()
    }

    /// Amount with its sign taken from the type: income positive, expense negative.
    pub fn signed_amount(&self) -> Money {
        match self.kind {
            TransactionType::Income => self.amount.abs(),
            TransactionType::Expense => -self.amount.abs(),
            TransactionType::Transfer => self.amount,
        }
    }

    /// True when the stored sign disagrees with the type.
    pub fn sign_mismatch(&self) -> bool {
        match self.kind {
            TransactionType::Income => self.amount.is_negative(),
            TransactionType::Expense => self.amount.is_positive(),
            TransactionType::Transfer => false,
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

/// Reads an explicit `null` as the type's default. Pair with `#[serde(default)]`
/// so a missing field behaves the same.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accepts RFC 3339 timestamps or bare `YYYY-MM-DD` days (taken as midnight UTC).
pub mod flexible_date {
    use chrono::{DateTime, NaiveDate, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn parse(value: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc())
    }

    pub fn serialize<S: Serializer>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&date.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid date: '{raw}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn deserializes_minimal_payload_with_defaults() {
        let json = r#"{"id":"t1","date":"2024-01-10","amount":2500,"type":"income"}"#;
        let tx: Transaction = serde_json::from_str(json).unwrap();
        assert_eq!(tx.date, at(2024, 1, 10));
        assert_eq!(tx.amount, Money::from_cents(250000));
        assert_eq!(tx.kind, TransactionType::Income);
        assert_eq!(tx.currency, "USD");
        assert_eq!(tx.source, TransactionSource::Manual);
        assert_eq!(tx.status, TransactionStatus::Completed);
        assert!(tx.tags.is_empty());
        assert!(tx.description.is_empty());
    }

    #[test]
    fn deserializes_full_payload() {
        let json = r#"{
            "id": "t2",
            "userId": "u1",
            "date": "2024-02-01T15:30:00Z",
            "amount": "-42.50",
            "currency": "EUR",
            "description": "Paper",
            "category": "Office Supplies",
            "type": "expense",
            "source": "quickbooks",
            "status": "pending",
            "tags": ["office", "q1"],
            "createdAt": "2024-02-01T15:31:00Z"
        }"#;
        let tx: Transaction = serde_json::from_str(json).unwrap();
        assert_eq!(tx.user_id, "u1");
        assert_eq!(tx.day(), NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(tx.amount, Money::from_cents(-4250));
        assert_eq!(tx.source, TransactionSource::Quickbooks);
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert!(tx.has_tag("Q1"));
        assert!(tx.created_at.is_some());
    }

    #[test]
    fn null_and_missing_optional_fields_become_empty() {
        let json = r#"{"id":null,"date":"2024-01-11","amount":-1300,"type":"expense",
            "description":null,"category":null,"tags":null,"userId":null}"#;
        let tx: Transaction = serde_json::from_str(json).unwrap();
        assert!(tx.id.is_empty());
        assert!(tx.description.is_empty());
        assert!(tx.category.is_empty());
        assert!(tx.tags.is_empty());

        let bare: Transaction = serde_json::from_str(r#"{"date":"2024-01-10","amount":2500,"type":"income"}"#).unwrap();
        assert!(bare.id.is_empty());
        assert_eq!(bare.amount, Money::from_cents(250000));
    }

    #[test]
    fn rejects_unparseable_date() {
        let json = r#"{"id":"t1","date":"last tuesday","amount":1,"type":"income"}"#;
        assert!(serde_json::from_str::<Transaction>(json).is_err());
    }

    #[test]
    fn signed_amount_follows_type() {
        let income = Transaction::new("a", at(2024, 1, 1), Money::from_cents(-500), TransactionType::Income);
        assert_eq!(income.signed_amount(), Money::from_cents(500));
        assert!(income.sign_mismatch());

        let expense = Transaction::new("b", at(2024, 1, 1), Money::from_cents(-500), TransactionType::Expense);
        assert_eq!(expense.signed_amount(), Money::from_cents(-500));
        assert!(!expense.sign_mismatch());
    }

    #[test]
    fn transaction_type_from_str() {
        assert_eq!("Income".parse::<TransactionType>().unwrap(), TransactionType::Income);
        assert!("refund".parse::<TransactionType>().is_err());
    }

    #[test]
    fn serializes_type_and_camel_case() {
        let tx = Transaction::new("a", at(2024, 1, 1), Money::from_cents(100), TransactionType::Expense)
            .with_description("Coffee");
        let value = serde_json::to_value(&tx).unwrap();
        assert_eq!(value["type"], "expense");
        assert_eq!(value["userId"], "");
        assert!(value.get("createdAt").is_none());
    }
}
