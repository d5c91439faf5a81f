use cashpilot_core::{AnalysisConfig, DateRange, Money, Transaction, TransactionType, YearMonth};
use cashpilot_import::{RawInvoice, RawOrder};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

const UNCATEGORIZED: &str = "Uncategorized";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueData {
    pub total_revenue: Money,
    pub revenue_by_period: BTreeMap<YearMonth, Money>,
    pub revenue_by_category: BTreeMap<String, Money>,
    pub recurring_revenue: Money,
    pub average_order_value: Money,
    pub transaction_count: usize,
}

impl RevenueData {
    pub fn growth_rate(&self) -> Option<f64> {
        period_growth_rate(&self.revenue_by_period)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseData {
    pub total_expenses: Money,
    pub expenses_by_period: BTreeMap<YearMonth, Money>,
    pub expenses_by_category: BTreeMap<String, Money>,
    pub recurring_expenses: Money,
    pub average_expense: Money,
    pub transaction_count: usize,
}

impl ExpenseData {
    pub fn growth_rate(&self) -> Option<f64> {
        period_growth_rate(&self.expenses_by_period)
    }

    /// Category with the largest total; the alphabetically first one wins a tie.
    pub fn largest_category(&self) -> Option<(&str, Money)> {
        self.expenses_by_category
            .iter()
            .fold(None, |best: Option<(&str, Money)>, (name, total)| match best {
                Some((_, best_total)) if best_total >= *total => best,
                _ => Some((name.as_str(), *total)),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerData {
    pub total_customers: usize,
    pub new_customers: usize,
    pub returning_customers: usize,
    pub customer_lifetime_value: Money,
    pub average_order_value: Money,
    /// Percentage of customers inactive for longer than the churn window.
    pub churn_rate: f64,
    pub order_count: usize,
    pub reference_period: YearMonth,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSales {
    pub product_id: String,
    pub title: String,
    pub revenue: Money,
    pub units_sold: u64,
    pub order_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductData {
    pub top_selling_products: Vec<ProductSales>,
    pub total_products: usize,
    pub total_product_revenue: Money,
}

impl ProductData {
    /// Share of product revenue taken by the best seller, as a percentage.
    pub fn top_product_share(&self) -> Option<f64> {
        let top = self.top_selling_products.first()?;
        top.revenue.percent_of(self.total_product_revenue)
    }
}

/// Mean of the last (up to) three periods against the mean of the (up to) three
/// before them, as a percentage change. `None` without a prior period or when the
/// prior mean is not positive.
pub fn period_growth_rate(by_period: &BTreeMap<YearMonth, Money>) -> Option<f64> {
    let values: Vec<f64> = by_period.values().map(|m| m.to_f64()).collect();
    if values.len() < 2 {
        return None;
    }
    let recent_len = 3.min(values.len() - 1);
    let (earlier, recent) = values.split_at(values.len() - recent_len);
    let prior = &earlier[earlier.len().saturating_sub(3)..];

    let recent_avg = recent.iter().sum::<f64>() / recent.len() as f64;
    let prior_avg = prior.iter().sum::<f64>() / prior.len() as f64;
    if prior_avg <= 0.0 {
        return None;
    }
    Some((recent_avg - prior_avg) / prior_avg * 100.0)
}

/// Normalizes transactions and connector records into the summary views.
///
/// Amounts are aggregated as magnitudes per transaction type, so a stored sign
/// that disagrees with the type does not cancel out totals.
pub struct DataAdapter<'a> {
    transactions: &'a [Transaction],
    orders: &'a [RawOrder],
    invoices: &'a [RawInvoice],
    config: &'a AnalysisConfig,
}

impl<'a> DataAdapter<'a> {
    pub fn new(transactions: &'a [Transaction], config: &'a AnalysisConfig) -> Self {
        for tx in transactions.iter().filter(|t| t.sign_mismatch()) {
            tracing::debug!(tx = %tx.id, kind = %tx.kind, amount = %tx.amount, "amount sign disagrees with type");
        }
        Self {
            transactions,
            orders: &[],
            invoices: &[],
            config,
        }
    }

    pub fn with_orders(mut self, orders: &'a [RawOrder]) -> Self {
        self.orders = orders;
        self
    }

    pub fn with_invoices(mut self, invoices: &'a [RawInvoice]) -> Self {
        self.invoices = invoices;
        self
    }

    /// Months spanned by every income and expense transaction.
    pub fn span(&self) -> Option<DateRange> {
        DateRange::covering(
            self.transactions
                .iter()
                .filter(|t| t.kind != TransactionType::Transfer)
                .map(Transaction::day),
        )
    }

    pub fn revenue_data(&self) -> RevenueData {
        let income: Vec<&Transaction> = self.of_kind(TransactionType::Income).collect();
        let total_revenue: Money = income.iter().map(|t| t.amount.abs()).sum();
        let recurring_revenue = income
            .iter()
            .filter(|t| self.is_recurring(t))
            .map(|t| t.amount.abs())
            .sum();

        RevenueData {
            total_revenue,
            revenue_by_period: self.by_period(&income),
            revenue_by_category: by_category(&income),
            recurring_revenue,
            average_order_value: total_revenue.mean_over(income.len()),
            transaction_count: income.len(),
        }
    }

    pub fn expense_data(&self) -> ExpenseData {
        let expenses: Vec<&Transaction> = self.of_kind(TransactionType::Expense).collect();
        let total_expenses: Money = expenses.iter().map(|t| t.amount.abs()).sum();
        let recurring_expenses = expenses
            .iter()
            .filter(|t| self.is_recurring(t))
            .map(|t| t.amount.abs())
            .sum();

        ExpenseData {
            total_expenses,
            expenses_by_period: self.by_period(&expenses),
            expenses_by_category: by_category(&expenses),
            recurring_expenses,
            average_expense: total_expenses.mean_over(expenses.len()),
            transaction_count: expenses.len(),
        }
    }

    /// Present only when some connector record identifies a customer.
    pub fn customer_data(&self) -> Option<CustomerData> {
        struct Activity {
            first: YearMonth,
            last: YearMonth,
            spend: Money,
            orders: usize,
        }

        let shopify = self.orders.iter().filter(|o| !o.is_cancelled()).filter_map(|o| {
            let key = o.customer_key()?;
            let placed = o.placed_at()?;
            Some((format!("shopify:{key}"), YearMonth::of(placed.date_naive()), o.total().abs()))
        });
        let quickbooks = self.invoices.iter().filter_map(|i| {
            let key = i.customer_key()?;
            let issued = i.issued_at()?;
            Some((format!("quickbooks:{key}"), YearMonth::of(issued.date_naive()), i.total().abs()))
        });

        let mut customers: HashMap<String, Activity> = HashMap::new();
        let mut order_count = 0usize;
        let mut total_spend = Money::zero();
        for (key, month, amount) in shopify.chain(quickbooks) {
            order_count += 1;
            total_spend += amount;
            customers
                .entry(key)
                .and_modify(|a| {
                    a.first = a.first.min(month);
                    a.last = a.last.max(month);
                    a.spend += amount;
                    a.orders += 1;
                })
                .or_insert(Activity {
                    first: month,
                    last: month,
                    spend: amount,
                    orders: 1,
                });
        }

        let reference_period = customers.values().map(|a| a.last).max()?;
        let total_customers = customers.len();
        let window = i64::from(self.config.churn_window_months);
        let churned = customers
            .values()
            .filter(|a| a.last.months_until(reference_period) > window)
            .count();

        Some(CustomerData {
            total_customers,
            new_customers: customers
                .values()
                .filter(|a| a.first == reference_period)
                .count(),
            returning_customers: customers.values().filter(|a| a.orders > 1).count(),
            customer_lifetime_value: total_spend.mean_over(total_customers),
            average_order_value: total_spend.mean_over(order_count),
            churn_rate: churned as f64 / total_customers as f64 * 100.0,
            order_count,
            reference_period,
        })
    }

    /// Present only when Shopify orders carry line items. Ties in revenue keep
    /// first-seen order.
    pub fn product_data(&self) -> Option<ProductData> {
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut products: Vec<ProductSales> = Vec::new();

        for order in self.orders.iter().filter(|o| !o.is_cancelled()) {
            for item in &order.line_items {
                let key = item.product_key();
                if key.is_empty() {
                    continue;
                }
                let slot = *index.entry(key.clone()).or_insert_with(|| {
                    products.push(ProductSales {
                        product_id: key,
                        title: item.title.clone(),
                        revenue: Money::zero(),
                        units_sold: 0,
                        order_count: 0,
                    });
                    products.len() - 1
                });
                let product = &mut products[slot];
                product.revenue += item.revenue();
                product.units_sold += u64::from(item.quantity);
                product.order_count += 1;
            }
        }

        if products.is_empty() {
            return None;
        }

        let total_product_revenue = products.iter().map(|p| p.revenue).sum();
        let total_products = products.len();
        // Stable: equal revenue keeps insertion order.
        products.sort_by(|a, b| b.revenue.cmp(&a.revenue));
        products.truncate(self.config.top_products);

        Some(ProductData {
            top_selling_products: products,
            total_products,
            total_product_revenue,
        })
    }

    fn of_kind(&self, kind: TransactionType) -> impl Iterator<Item = &'a Transaction> {
        self.transactions.iter().filter(move |t| t.kind == kind)
    }

    fn is_recurring(&self, tx: &Transaction) -> bool {
        tx.has_tag("subscription") || self.config.is_recurring_category(&tx.category)
    }

    /// Calendar-month sums, zero-filled across the whole data span.
    fn by_period(&self, transactions: &[&Transaction]) -> BTreeMap<YearMonth, Money> {
        let mut periods: BTreeMap<YearMonth, Money> = self
            .span()
            .map(|range| range.months().into_iter().map(|m| (m, Money::zero())).collect())
            .unwrap_or_default();
        for tx in transactions {
            *periods.entry(YearMonth::of(tx.day())).or_default() += tx.amount.abs();
        }
        periods
    }
}

fn by_category(transactions: &[&Transaction]) -> BTreeMap<String, Money> {
    let mut categories: BTreeMap<String, Money> = BTreeMap::new();
    for tx in transactions {
        let name = match tx.category.trim() {
            "" => UNCATEGORIZED,
            other => other,
        };
        *categories.entry(name.to_string()).or_default() += tx.amount.abs();
    }
    categories
}

#[cfg(test)]
mod tests {
    use super::*;
    use cashpilot_import::{RawCustomer, RawLineItem};
    use chrono::{TimeZone, Utc};

    fn tx(id: &str, (y, m, d): (i32, u32, u32), cents: i64, kind: TransactionType) -> Transaction {
        Transaction::new(id, Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap(), Money::from_cents(cents), kind)
    }

    fn month(y: i32, m: u32) -> YearMonth {
        YearMonth::new(y, m).unwrap()
    }

    fn order(id: &str, date: &str, customer: &str, items: &[(&str, u32, i64)]) -> RawOrder {
        RawOrder {
            id: id.to_string(),
            created_at: Some(date.to_string()),
            customer: Some(RawCustomer {
                id: customer.to_string(),
                email: None,
            }),
            line_items: items
                .iter()
                .map(|(product, qty, cents)| RawLineItem {
                    product_id: product.to_string(),
                    title: format!("Product {product}"),
                    quantity: *qty,
                    price: Some(Money::from_cents(*cents)),
                })
                .collect(),
            ..RawOrder::default()
        }
    }

    #[test]
    fn totals_and_net_cash_flow() {
        let config = AnalysisConfig::default();
        let txs = vec![
            tx("a", (2024, 1, 10), 250_000, TransactionType::Income),
            tx("b", (2024, 1, 11), -130_000, TransactionType::Expense),
        ];
        let adapter = DataAdapter::new(&txs, &config);
        let revenue = adapter.revenue_data();
        let expenses = adapter.expense_data();
        assert_eq!(revenue.total_revenue, Money::from_cents(250_000));
        assert_eq!(expenses.total_expenses, Money::from_cents(130_000));
        let net = revenue.total_revenue - expenses.total_expenses;
        assert!((net.to_f64() - 1200.0).abs() < 1e-6);
    }

    #[test]
    fn transfers_are_ignored() {
        let config = AnalysisConfig::default();
        let txs = vec![
            tx("a", (2024, 1, 10), 1_000, TransactionType::Income),
            tx("t", (2023, 6, 1), 50_000, TransactionType::Transfer),
        ];
        let adapter = DataAdapter::new(&txs, &config);
        assert_eq!(adapter.revenue_data().total_revenue, Money::from_cents(1_000));
        assert_eq!(adapter.revenue_data().revenue_by_period.len(), 1);
        assert!(adapter.expense_data().total_expenses.is_zero());
    }

    #[test]
    fn periods_are_zero_filled_across_span() {
        let config = AnalysisConfig::default();
        let txs = vec![
            tx("a", (2024, 1, 10), 1_000, TransactionType::Income),
            tx("b", (2024, 4, 2), 3_000, TransactionType::Income),
            tx("c", (2024, 5, 2), -500, TransactionType::Expense),
        ];
        let revenue = DataAdapter::new(&txs, &config).revenue_data();
        let labels: Vec<String> = revenue.revenue_by_period.keys().map(|k| k.to_string()).collect();
        assert_eq!(labels, vec!["2024-01", "2024-02", "2024-03", "2024-04", "2024-05"]);
        assert!(revenue.revenue_by_period[&month(2024, 2)].is_zero());
        assert_eq!(revenue.revenue_by_period[&month(2024, 4)], Money::from_cents(3_000));
    }

    #[test]
    fn recurring_by_tag_or_category() {
        let config = AnalysisConfig::default();
        let txs = vec![
            tx("a", (2024, 1, 1), 10_000, TransactionType::Income).with_tag("subscription"),
            tx("b", (2024, 1, 2), 20_000, TransactionType::Income).with_category("Monthly Retainer"),
            tx("c", (2024, 1, 3), 70_000, TransactionType::Income).with_category("Consulting"),
        ];
        let revenue = DataAdapter::new(&txs, &config).revenue_data();
        assert_eq!(revenue.recurring_revenue, Money::from_cents(30_000));
        assert_eq!(revenue.average_order_value, Money::from_cents(33_333));
        assert_eq!(revenue.transaction_count, 3);
    }

    #[test]
    fn negative_income_counts_as_magnitude() {
        let config = AnalysisConfig::default();
        let txs = vec![tx("a", (2024, 1, 1), -10_000, TransactionType::Income)];
        assert_eq!(
            DataAdapter::new(&txs, &config).revenue_data().total_revenue,
            Money::from_cents(10_000)
        );
    }

    #[test]
    fn expense_categories_and_largest() {
        let config = AnalysisConfig::default();
        let txs = vec![
            tx("a", (2024, 1, 1), -5_000, TransactionType::Expense).with_category("Rent"),
            tx("b", (2024, 1, 2), -3_000, TransactionType::Expense).with_category("Travel"),
            tx("c", (2024, 1, 3), -2_000, TransactionType::Expense),
            tx("d", (2024, 1, 4), -5_000, TransactionType::Expense).with_category("Payroll"),
        ];
        let expenses = DataAdapter::new(&txs, &config).expense_data();
        assert_eq!(expenses.expenses_by_category["Uncategorized"], Money::from_cents(2_000));
        assert_eq!(expenses.largest_category(), Some(("Payroll", Money::from_cents(5_000))));
        assert_eq!(expenses.average_expense, Money::from_cents(3_750));
    }

    #[test]
    fn empty_input_yields_empty_views() {
        let config = AnalysisConfig::default();
        let adapter = DataAdapter::new(&[], &config);
        let revenue = adapter.revenue_data();
        assert!(revenue.total_revenue.is_zero());
        assert!(revenue.average_order_value.is_zero());
        assert!(revenue.revenue_by_period.is_empty());
        assert!(adapter.expense_data().largest_category().is_none());
        assert!(adapter.customer_data().is_none());
        assert!(adapter.product_data().is_none());
    }

    #[test]
    fn growth_rate_compares_three_period_means() {
        let mut series = BTreeMap::new();
        for (i, cents) in [100, 100, 100, 120, 120, 120].iter().enumerate() {
            series.insert(month(2024, i as u32 + 1), Money::from_cents(*cents));
        }
        let rate = period_growth_rate(&series).unwrap();
        assert!((rate - 20.0).abs() < 1e-9);
    }

    #[test]
    fn growth_rate_needs_positive_prior() {
        let mut series = BTreeMap::new();
        series.insert(month(2024, 1), Money::zero());
        series.insert(month(2024, 2), Money::from_cents(500));
        assert!(period_growth_rate(&series).is_none());
        series.clear();
        series.insert(month(2024, 1), Money::from_cents(500));
        assert!(period_growth_rate(&series).is_none());
    }

    #[test]
    fn growth_rate_with_short_history() {
        let mut series = BTreeMap::new();
        series.insert(month(2024, 1), Money::from_cents(100));
        series.insert(month(2024, 2), Money::from_cents(50));
        let rate = period_growth_rate(&series).unwrap();
        assert!((rate + 50.0).abs() < 1e-9);
    }

    #[test]
    fn customer_metrics_from_orders_and_invoices() {
        let config = AnalysisConfig::default();
        let orders = vec![
            order("1", "2024-01-05", "c1", &[]),
            order("2", "2024-06-05", "c1", &[]),
            order("3", "2024-06-10", "c2", &[]),
            order("4", "2024-01-20", "c3", &[]),
        ];
        let orders: Vec<RawOrder> = orders
            .into_iter()
            .map(|mut o| {
                o.total_price = Some(Money::from_cents(10_000));
                o
            })
            .collect();
        let invoices = vec![RawInvoice {
            id: "9".into(),
            txn_date: Some("2024-05-01".into()),
            total_amt: Some(Money::from_cents(40_000)),
            customer_ref: Some(cashpilot_import::RawRef {
                value: "c1".into(),
                name: None,
            }),
            ..RawInvoice::default()
        }];

        let customers = DataAdapter::new(&[], &config)
            .with_orders(&orders)
            .with_invoices(&invoices)
            .customer_data()
            .unwrap();
        // shopify:c1, shopify:c2, shopify:c3 and quickbooks:c1
        assert_eq!(customers.total_customers, 4);
        assert_eq!(customers.reference_period, month(2024, 6));
        assert_eq!(customers.new_customers, 1);
        assert_eq!(customers.returning_customers, 1);
        assert_eq!(customers.order_count, 5);
        assert_eq!(customers.customer_lifetime_value, Money::from_cents(20_000));
        assert_eq!(customers.average_order_value, Money::from_cents(16_000));
        // Only shopify:c3 (last seen January) is past the three-month window.
        assert!((customers.churn_rate - 25.0).abs() < 1e-9);
    }

    #[test]
    fn orders_without_customers_give_no_customer_data() {
        let config = AnalysisConfig::default();
        let orders = vec![RawOrder {
            created_at: Some("2024-01-01".into()),
            ..RawOrder::default()
        }];
        assert!(DataAdapter::new(&[], &config)
            .with_orders(&orders)
            .customer_data()
            .is_none());
    }

    #[test]
    fn products_ranked_by_revenue_with_stable_ties() {
        let config = AnalysisConfig {
            top_products: 2,
            ..AnalysisConfig::default()
        };
        let orders = vec![
            order("1", "2024-01-05", "c1", &[("p1", 1, 500), ("p2", 2, 500)]),
            order("2", "2024-01-06", "c2", &[("p3", 1, 2_000), ("p1", 1, 500)]),
        ];
        let products = DataAdapter::new(&[], &config)
            .with_orders(&orders)
            .product_data()
            .unwrap();
        assert_eq!(products.total_products, 3);
        assert_eq!(products.total_product_revenue, Money::from_cents(4_000));
        let ids: Vec<&str> = products
            .top_selling_products
            .iter()
            .map(|p| p.product_id.as_str())
            .collect();
        // p1 and p2 both total 10.00; p1 was seen first.
        assert_eq!(ids, vec!["p3", "p1"]);
        assert_eq!(products.top_selling_products[1].units_sold, 2);
        assert_eq!(products.top_selling_products[1].revenue, Money::from_cents(1_000));
        assert_eq!(products.top_selling_products[1].order_count, 2);
        let share = products.top_product_share().unwrap();
        assert!((share - 50.0).abs() < 1e-9);
    }

    #[test]
    fn cancelled_orders_are_excluded() {
        let config = AnalysisConfig::default();
        let mut cancelled = order("1", "2024-01-05", "c1", &[("p1", 1, 500)]);
        cancelled.cancelled_at = Some("2024-01-06".into());
        let adapter = DataAdapter::new(&[], &config);
        let orders = [cancelled];
        let adapter = adapter.with_orders(&orders);
        assert!(adapter.product_data().is_none());
        assert!(adapter.customer_data().is_none());
    }
}
