use cashpilot_core::{AnalysisConfig, Money, Transaction};
use cashpilot_import::{sync, Categorizer, RawBill, RawInvoice, RawOrder};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::adapter::{CustomerData, DataAdapter, ExpenseData, ProductData, RevenueData};
use crate::insight::{Impact, Insight, InsightCategory, InsightType};
use crate::quality::{analyze_sources, DataSourceAnalysis};
use crate::report::AnalysisReport;

// Rule thresholds, all percentages.
const GROWTH_UP: f64 = 10.0;
const GROWTH_DOWN: f64 = -10.0;
const STRONG_GROWTH: f64 = 25.0;
const RECURRING_HIGH: f64 = 70.0;
const RECURRING_LOW: f64 = 30.0;
const EXPENSE_RATIO_CRITICAL: f64 = 80.0;
const EXPENSE_RATIO_HEALTHY: f64 = 50.0;
const EXPENSE_CONCENTRATION: f64 = 40.0;
const HEALTHY_MARGIN: f64 = 30.0;
const NEW_CUSTOMER_SHARE: f64 = 20.0;
const LIFETIME_VALUE_MULTIPLE: f64 = 5.0;
const CHURN_WARNING: f64 = 10.0;
const PRODUCT_CONCENTRATION: f64 = 50.0;

/// The request payload: transactions plus optional raw connector records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisInput {
    pub transactions: Vec<Transaction>,
    #[serde(default)]
    pub shopify_orders: Vec<RawOrder>,
    #[serde(default)]
    pub quickbooks_invoices: Vec<RawInvoice>,
    #[serde(default)]
    pub quickbooks_bills: Vec<RawBill>,
}

impl AnalysisInput {
    pub fn new(transactions: Vec<Transaction>) -> Self {
        AnalysisInput {
            transactions,
            ..AnalysisInput::default()
        }
    }

    /// The transaction set plus converted connector records that are not already
    /// present under the same id.
    pub fn merged_transactions(&self, categorizer: &Categorizer) -> Vec<Transaction> {
        let user_id = self
            .transactions
            .first()
            .map(|t| t.user_id.as_str())
            .unwrap_or_default();
        let known: HashSet<&str> = self.transactions.iter().map(|t| t.id.as_str()).collect();
        let converted = sync::convert_all(
            &self.shopify_orders,
            &self.quickbooks_invoices,
            &self.quickbooks_bills,
            user_id,
            categorizer,
        );

        let mut merged = self.transactions.clone();
        merged.extend(converted.into_iter().filter(|t| !known.contains(t.id.as_str())));
        merged
    }
}

/// The four summary views derived from one transaction snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryViews {
    pub revenue: RevenueData,
    pub expenses: ExpenseData,
    pub customers: Option<CustomerData>,
    pub products: Option<ProductData>,
}

impl SummaryViews {
    pub fn collect(adapter: &DataAdapter<'_>) -> Self {
        SummaryViews {
            revenue: adapter.revenue_data(),
            expenses: adapter.expense_data(),
            customers: adapter.customer_data(),
            products: adapter.product_data(),
        }
    }

    pub fn net_cash_flow(&self) -> Money {
        self.revenue.total_revenue - self.expenses.total_expenses
    }
}

/// Runs the fixed rule battery over the summary views and data-quality records.
pub struct InsightEngine {
    config: AnalysisConfig,
    categorizer: Categorizer,
}

impl InsightEngine {
    pub fn new(config: AnalysisConfig) -> Self {
        let categorizer = Categorizer::new(&config);
        Self { config, categorizer }
    }

    pub fn with_categorizer(config: AnalysisConfig, categorizer: Categorizer) -> Self {
        Self { config, categorizer }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn categorizer(&self) -> &Categorizer {
        &self.categorizer
    }

    pub fn analyze(&self, input: &AnalysisInput) -> AnalysisReport {
        self.analyze_at(input, Utc::now())
    }

    pub fn analyze_at(&self, input: &AnalysisInput, now: DateTime<Utc>) -> AnalysisReport {
        let transactions = input.merged_transactions(&self.categorizer);
        let adapter = DataAdapter::new(&transactions, &self.config)
            .with_orders(&input.shopify_orders)
            .with_invoices(&input.quickbooks_invoices);
        let views = SummaryViews::collect(&adapter);
        let data_quality = analyze_sources(&transactions, &self.config);
        let insights = self.generate_insights(&views, &data_quality, now);
        AnalysisReport::build(&views, insights, data_quality, &self.config.grades, now)
    }

    /// Every rule is evaluated independently; output order follows rule order.
    pub fn generate_insights(
        &self,
        views: &SummaryViews,
        data_quality: &[DataSourceAnalysis],
        now: DateTime<Utc>,
    ) -> Vec<Insight> {
        let mut insights = Vec::new();
        revenue_growth(&views.revenue, now, &mut insights);
        recurring_revenue(&views.revenue, now, &mut insights);
        expense_ratio(views, now, &mut insights);
        expense_concentration(&views.expenses, now, &mut insights);
        cash_flow(views, now, &mut insights);
        if let Some(customers) = &views.customers {
            customer_rules(customers, self.config.churn_window_months, now, &mut insights);
        }
        if let Some(products) = &views.products {
            product_concentration(products, now, &mut insights);
        }
        for source in data_quality {
            source_quality(source, now, &mut insights);
        }

        for insight in &insights {
            tracing::debug!(kind = ?insight.kind, category = %insight.category, title = %insight.title, "insight");
        }
        insights
    }
}

fn revenue_growth(revenue: &RevenueData, now: DateTime<Utc>, out: &mut Vec<Insight>) {
    let Some(rate) = revenue.growth_rate() else {
        return;
    };
    if rate > GROWTH_UP {
        let impact = if rate > STRONG_GROWTH { Impact::High } else { Impact::Medium };
        out.push(Insight::new(
            InsightType::Positive,
            InsightCategory::Revenue,
            impact,
            "Revenue is growing",
            format!(
                "Average monthly revenue over the last three months is up {rate:.1}% on the three months before."
            ),
            85,
            now,
        ));
    } else if rate < GROWTH_DOWN {
        out.push(
            Insight::new(
                InsightType::Warning,
                InsightCategory::Revenue,
                Impact::High,
                "Revenue is declining",
                format!(
                    "Average monthly revenue over the last three months is down {:.1}% on the three months before.",
                    rate.abs()
                ),
                85,
                now,
            )
            .with_actions([
                "Review pricing and the sales pipeline for recent drop-offs",
                "Re-engage customers who have not purchased recently",
                "Identify which revenue categories fell the most",
            ]),
        );
    }
}

fn recurring_revenue(revenue: &RevenueData, now: DateTime<Utc>, out: &mut Vec<Insight>) {
    let Some(ratio) = revenue.recurring_revenue.percent_of(revenue.total_revenue) else {
        return;
    };
    if ratio > RECURRING_HIGH {
        out.push(Insight::new(
            InsightType::Positive,
            InsightCategory::Revenue,
            Impact::Medium,
            "Strong recurring revenue base",
            format!("{ratio:.1}% of revenue comes from subscriptions and retainers."),
            80,
            now,
        ));
    } else if ratio < RECURRING_LOW {
        out.push(
            Insight::new(
                InsightType::Opportunity,
                InsightCategory::Growth,
                Impact::Medium,
                "Grow recurring revenue",
                format!("Only {ratio:.1}% of revenue is recurring, which makes income harder to predict."),
                80,
                now,
            )
            .with_actions([
                "Introduce a subscription or retainer offering",
                "Convert repeat customers to recurring plans",
            ]),
        );
    }
}

fn expense_ratio(views: &SummaryViews, now: DateTime<Utc>, out: &mut Vec<Insight>) {
    let Some(ratio) = views
        .expenses
        .total_expenses
        .percent_of(views.revenue.total_revenue)
    else {
        return;
    };
    if ratio > EXPENSE_RATIO_CRITICAL {
        out.push(
            Insight::new(
                InsightType::Critical,
                InsightCategory::Expenses,
                Impact::High,
                "Expenses are consuming most revenue",
                format!("Expenses equal {ratio:.1}% of revenue."),
                90,
                now,
            )
            .with_actions([
                "Audit the largest expense categories",
                "Renegotiate or cancel low-value subscriptions",
                "Set a monthly spending cap",
            ]),
        );
    } else if ratio < EXPENSE_RATIO_HEALTHY {
        out.push(Insight::new(
            InsightType::Positive,
            InsightCategory::Expenses,
            Impact::Medium,
            "Healthy expense ratio",
            format!("Expenses equal {ratio:.1}% of revenue."),
            90,
            now,
        ));
    }
}

fn expense_concentration(expenses: &ExpenseData, now: DateTime<Utc>, out: &mut Vec<Insight>) {
    if expenses.expenses_by_category.len() < 2 {
        return;
    }
    let Some((name, total)) = expenses.largest_category() else {
        return;
    };
    let Some(share) = total.percent_of(expenses.total_expenses) else {
        return;
    };
    if share > EXPENSE_CONCENTRATION {
        out.push(
            Insight::new(
                InsightType::Warning,
                InsightCategory::Expenses,
                Impact::Medium,
                format!("{name} dominates spending"),
                format!("{name} accounts for {share:.1}% of all expenses."),
                75,
                now,
            )
            .with_actions([
                format!("Compare {name} costs against alternative providers"),
                format!("Set a budget for {name}"),
            ]),
        );
    }
}

fn cash_flow(views: &SummaryViews, now: DateTime<Utc>, out: &mut Vec<Insight>) {
    let net = views.net_cash_flow();
    if net.is_negative() {
        out.push(
            Insight::new(
                InsightType::Critical,
                InsightCategory::CashFlow,
                Impact::High,
                "Negative cash flow",
                format!("Spending exceeds income by {}.", net.abs()),
                95,
                now,
            )
            .with_actions([
                "Delay non-essential purchases",
                "Follow up on outstanding invoices",
                "Review expense categories for immediate savings",
            ]),
        );
        return;
    }
    let Some(margin) = net.percent_of(views.revenue.total_revenue) else {
        return;
    };
    if margin > HEALTHY_MARGIN {
        out.push(Insight::new(
            InsightType::Positive,
            InsightCategory::CashFlow,
            Impact::Medium,
            "Healthy profit margin",
            format!("Net cash flow is {net}, a {margin:.1}% margin on revenue."),
            90,
            now,
        ));
    }
}

fn customer_rules(customers: &CustomerData, churn_window: u32, now: DateTime<Utc>, out: &mut Vec<Insight>) {
    if customers.total_customers > 0 {
        let new_share = customers.new_customers as f64 / customers.total_customers as f64 * 100.0;
        if new_share > NEW_CUSTOMER_SHARE {
            out.push(Insight::new(
                InsightType::Positive,
                InsightCategory::Customers,
                Impact::Medium,
                "Customer base is growing",
                format!(
                    "{} of {} customers placed their first order in {}.",
                    customers.new_customers, customers.total_customers, customers.reference_period
                ),
                70,
                now,
            ));
        }
    }

    let aov = customers.average_order_value.to_f64();
    if aov > 0.0 && customers.customer_lifetime_value.to_f64() > aov * LIFETIME_VALUE_MULTIPLE {
        out.push(Insight::new(
            InsightType::Positive,
            InsightCategory::Customers,
            Impact::Medium,
            "High customer lifetime value",
            format!(
                "Customers spend {} over their lifetime against an average order of {}.",
                customers.customer_lifetime_value, customers.average_order_value
            ),
            70,
            now,
        ));
    }

    if customers.churn_rate > CHURN_WARNING {
        out.push(
            Insight::new(
                InsightType::Warning,
                InsightCategory::Customers,
                Impact::High,
                "Customer churn is elevated",
                format!(
                    "{:.1}% of customers have not ordered in over {churn_window} months.",
                    customers.churn_rate
                ),
                75,
                now,
            )
            .with_actions([
                format!("Reach out to customers inactive for {churn_window}+ months"),
                "Offer a win-back promotion".to_string(),
            ]),
        );
    }
}

fn product_concentration(products: &ProductData, now: DateTime<Utc>, out: &mut Vec<Insight>) {
    let (Some(top), Some(share)) = (products.top_selling_products.first(), products.top_product_share()) else {
        return;
    };
    if share > PRODUCT_CONCENTRATION {
        let title = &top.title;
        out.push(
            Insight::new(
                InsightType::Warning,
                InsightCategory::Revenue,
                Impact::Medium,
                "Revenue depends on one product",
                format!("{title} brings in {share:.1}% of product revenue."),
                80,
                now,
            )
            .with_actions([
                format!("Promote other products alongside {title}"),
                format!("Bundle {title} with slower sellers"),
            ]),
        );
    }
}

fn source_quality(source: &DataSourceAnalysis, now: DateTime<Utc>, out: &mut Vec<Insight>) {
    if source.is_low_quality() {
        let mut insight = Insight::new(
            InsightType::Warning,
            InsightCategory::Operations,
            Impact::Medium,
            format!("{} data quality is low", source.source),
            format!(
                "Quality score {}/100: {}.",
                source.quality_score,
                source.issues.join("; ")
            ),
            90,
            now,
        );
        if !source.recommendations.is_empty() {
            insight = insight.with_actions(source.recommendations.iter().cloned());
        }
        out.push(insight);
    }
    if source.is_low_coverage() {
        out.push(
            Insight::new(
                InsightType::Opportunity,
                InsightCategory::Operations,
                Impact::Low,
                format!("Connect more {} history", source.source),
                format!(
                    "{} records cover {:.0}% of the months in this report.",
                    source.source, source.coverage
                ),
                70,
                now,
            )
            .with_actions([format!(
                "Import earlier {} records to cover the full reporting period",
                source.source
            )]),
        );
    }
}
