use cashpilot_core::transaction::flexible_date;
use cashpilot_core::{Money, Transaction, TransactionSource, TransactionStatus, TransactionType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::raw::{flexible_id, null_as_default};
use crate::rules::Categorizer;

const DEFAULT_CATEGORY: &str = "Product Sales";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawCustomer {
    #[serde(deserialize_with = "flexible_id")]
    pub id: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawLineItem {
    #[serde(deserialize_with = "flexible_id")]
    pub product_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(deserialize_with = "null_as_default")]
    pub quantity: u32,
    pub price: Option<Money>,
}

impl RawLineItem {
    /// Product identity: the product id, or the title for custom line items.
    pub fn product_key(&self) -> String {
        if self.product_id.is_empty() {
            self.title.clone()
        } else {
            self.product_id.clone()
        }
    }

    pub fn revenue(&self) -> Money {
        self.price.unwrap_or_default().times(self.quantity)
    }
}

/// A Shopify order as returned by the Admin REST API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawOrder {
    #[serde(deserialize_with = "flexible_id")]
    pub id: String,
    pub name: Option<String>,
    pub created_at: Option<String>,
    pub total_price: Option<Money>,
    pub currency: Option<String>,
    pub financial_status: Option<String>,
    pub cancelled_at: Option<String>,
    /// Comma-separated, as Shopify stores them.
    #[serde(deserialize_with = "null_as_default")]
    pub tags: String,
    pub customer: Option<RawCustomer>,
    #[serde(deserialize_with = "null_as_default")]
    pub line_items: Vec<RawLineItem>,
}

impl RawOrder {
    pub fn placed_at(&self) -> Option<DateTime<Utc>> {
        self.created_at.as_deref().and_then(flexible_date::parse)
    }

    /// Order total, falling back to the line-item sum when `total_price` is absent.
    pub fn total(&self) -> Money {
        self.total_price
            .unwrap_or_else(|| self.line_items.iter().map(RawLineItem::revenue).sum())
    }

    /// Customer identity: id, else lower-cased email.
    pub fn customer_key(&self) -> Option<String> {
        let customer = self.customer.as_ref()?;
        if !customer.id.is_empty() {
            return Some(customer.id.clone());
        }
        customer
            .email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_lowercase)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled_at.is_some()
            || matches!(
                self.financial_status.as_deref(),
                Some("refunded") | Some("voided")
            )
    }

    pub fn tag_list(&self) -> impl Iterator<Item = String> + '_ {
        self.tags
            .split(',')
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
    }

    fn status(&self) -> TransactionStatus {
        if self.is_cancelled() {
            return TransactionStatus::Cancelled;
        }
        match self.financial_status.as_deref() {
            Some("pending") | Some("authorized") | Some("partially_paid") => {
                TransactionStatus::Pending
            }
            _ => TransactionStatus::Completed,
        }
    }
}

/// Converts an order into an income transaction. Orders without a parseable
/// creation date are skipped.
pub fn order_to_transaction(
    order: &RawOrder,
    user_id: &str,
    categorizer: &Categorizer,
) -> Option<Transaction> {
    let date = order.placed_at()?;
    let label = order.name.clone().unwrap_or_else(|| format!("#{}", order.id));
    let description = match order.line_items.first() {
        Some(item) if !item.title.is_empty() => format!("Shopify order {label}: {}", item.title),
        _ => format!("Shopify order {label}"),
    };

    let mut tx = Transaction::new(
        format!("shopify-{}", order.id),
        date,
        order.total().abs(),
        TransactionType::Income,
    )
    .with_description(description)
    .with_source(TransactionSource::Shopify)
    .with_tag("shopify");
    tx.user_id = user_id.to_string();
    tx.status = order.status();
    tx.created_at = Some(date);
    if let Some(currency) = &order.currency {
        tx.currency = currency.clone();
    }
    tx.tags.extend(order.tag_list());

    tx.category = categorizer
        .suggest_for(&tx)
        .into_iter()
        .next()
        .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());
    Some(tx)
}

pub fn orders_to_transactions(
    orders: &[RawOrder],
    user_id: &str,
    categorizer: &Categorizer,
) -> Vec<Transaction> {
    let converted: Vec<Transaction> = orders
        .iter()
        .filter_map(|o| order_to_transaction(o, user_id, categorizer))
        .collect();
    if converted.len() < orders.len() {
        tracing::warn!(
            skipped = orders.len() - converted.len(),
            "Shopify orders without a creation date were skipped"
        );
    }
    converted
}

#[cfg(test)]
mod tests {
    use super::*;
    use cashpilot_core::AnalysisConfig;

    fn order_json() -> &'static str {
        r##"{
            "id": 450789469,
            "name": "#1001",
            "created_at": "2024-03-05T10:00:00-05:00",
            "total_price": "199.00",
            "currency": "CAD",
            "financial_status": "paid",
            "tags": "Subscription, VIP",
            "customer": {"id": 207119551, "email": "bob@example.com"},
            "line_items": [
                {"product_id": 632910392, "title": "Coffee Beans", "quantity": 2, "price": "49.50"},
                {"product_id": null, "title": "Gift wrap", "quantity": 1, "price": "100.00"}
            ]
        }"##
    }

    #[test]
    fn parses_rest_payload() {
        let order: RawOrder = serde_json::from_str(order_json()).unwrap();
        assert_eq!(order.id, "450789469");
        assert_eq!(order.total(), Money::from_cents(19900));
        assert_eq!(order.customer_key().as_deref(), Some("207119551"));
        assert_eq!(order.line_items[0].revenue(), Money::from_cents(9900));
        assert_eq!(order.line_items[1].product_key(), "Gift wrap");
        assert_eq!(order.tag_list().collect::<Vec<_>>(), vec!["subscription", "vip"]);
    }

    #[test]
    fn null_fields_read_as_empty() {
        let order: RawOrder = serde_json::from_str(
            r#"{
                "id": 5, "name": null, "created_at": "2024-03-01", "total_price": null,
                "tags": null, "customer": null,
                "line_items": [{"product_id": null, "title": null, "quantity": null, "price": "12.00"},
                               {"product_id": 9, "title": "Mug", "quantity": 2, "price": "5.00"}]
            }"#,
        )
        .unwrap();
        assert_eq!(order.tag_list().count(), 0);
        assert!(order.line_items[0].title.is_empty());
        assert_eq!(order.line_items[0].quantity, 0);
        assert_eq!(order.total(), Money::from_cents(1000));

        let bare: RawOrder = serde_json::from_str(r#"{"id": 6, "line_items": null}"#).unwrap();
        assert!(bare.line_items.is_empty());
    }

    #[test]
    fn converts_to_income_transaction() {
        let order: RawOrder = serde_json::from_str(order_json()).unwrap();
        let categorizer = Categorizer::new(&AnalysisConfig::default());
        let tx = order_to_transaction(&order, "u1", &categorizer).unwrap();
        assert_eq!(tx.id, "shopify-450789469");
        assert_eq!(tx.user_id, "u1");
        assert_eq!(tx.kind, TransactionType::Income);
        assert_eq!(tx.source, TransactionSource::Shopify);
        assert_eq!(tx.amount, Money::from_cents(19900));
        assert_eq!(tx.currency, "CAD");
        assert_eq!(tx.status, TransactionStatus::Completed);
        assert_eq!(tx.category, "Product Sales");
        assert!(tx.has_tag("subscription"));
        assert!(tx.has_tag("shopify"));
        assert_eq!(tx.date.to_rfc3339(), "2024-03-05T15:00:00+00:00");
    }

    #[test]
    fn missing_total_falls_back_to_line_items() {
        let order = RawOrder {
            line_items: vec![RawLineItem {
                product_id: "1".into(),
                title: "Mug".into(),
                quantity: 3,
                price: Some(Money::from_cents(1250)),
            }],
            ..RawOrder::default()
        };
        assert_eq!(order.total(), Money::from_cents(3750));
    }

    #[test]
    fn customer_key_falls_back_to_email() {
        let order = RawOrder {
            customer: Some(RawCustomer {
                id: String::new(),
                email: Some(" Ann@Example.com ".into()),
            }),
            ..RawOrder::default()
        };
        assert_eq!(order.customer_key().as_deref(), Some("ann@example.com"));
        assert!(RawOrder::default().customer_key().is_none());
    }

    #[test]
    fn status_mapping() {
        let mut order = RawOrder {
            created_at: Some("2024-01-01".into()),
            ..RawOrder::default()
        };
        order.financial_status = Some("pending".into());
        assert_eq!(order.status(), TransactionStatus::Pending);
        order.financial_status = Some("refunded".into());
        assert_eq!(order.status(), TransactionStatus::Cancelled);
        order.financial_status = Some("paid".into());
        order.cancelled_at = Some("2024-01-02".into());
        assert_eq!(order.status(), TransactionStatus::Cancelled);
    }

    #[test]
    fn undated_orders_are_skipped() {
        let categorizer = Categorizer::new(&AnalysisConfig::default());
        let orders = vec![
            RawOrder::default(),
            RawOrder {
                id: "7".into(),
                created_at: Some("2024-02-02".into()),
                total_price: Some(Money::from_cents(500)),
                ..RawOrder::default()
            },
        ];
        let txs = orders_to_transactions(&orders, "u1", &categorizer);
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].id, "shopify-7");
    }
}
