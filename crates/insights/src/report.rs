use cashpilot_core::{GradeThresholds, Money, YearMonth};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;

use crate::engine::SummaryViews;
use crate::insight::{Insight, InsightCategory, InsightType};
use crate::quality::DataSourceAnalysis;

pub const MAX_RECOMMENDATIONS: usize = 10;
const MAX_PRIORITIES: usize = 3;

const CRITICAL_PENALTY: i32 = 15;
const WARNING_PENALTY: i32 = 5;
const POSITIVE_BONUS: i32 = 3;
const LOW_QUALITY_SOURCE_PENALTY: i32 = 10;

/// Growth-rate gap (percentage points) between revenue and expenses that counts
/// as a direction change.
const TREND_MARGIN: f64 = 5.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthScore {
    pub score: u8,
    pub grade: char,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
}

/// Deterministic 0-100 score over the insight list and per-source quality.
pub fn health_score(
    insights: &[Insight],
    sources: &[DataSourceAnalysis],
    grades: &GradeThresholds,
) -> HealthScore {
    let mut score = 100i32;
    for insight in insights {
        score += match insight.kind {
            InsightType::Critical => -CRITICAL_PENALTY,
            InsightType::Warning => -WARNING_PENALTY,
            InsightType::Positive => POSITIVE_BONUS,
            InsightType::Opportunity | InsightType::Trend => 0,
        };
    }
    let low_quality = sources.iter().filter(|s| s.is_low_quality()).count() as i32;
    score -= low_quality * LOW_QUALITY_SOURCE_PENALTY;
    let score = score.clamp(0, 100) as u8;

    let issues = insights
        .iter()
        .filter(|i| matches!(i.kind, InsightType::Critical | InsightType::Warning))
        .map(|i| i.title.clone())
        .collect();

    let mut suggestions: Vec<String> = sources
        .iter()
        .filter(|s| s.is_low_quality())
        .flat_map(|s| s.recommendations.iter().cloned())
        .collect();
    suggestions.extend(
        insights
            .iter()
            .filter(|i| i.kind == InsightType::Critical)
            .filter_map(|i| i.action_items().first().cloned()),
    );

    HealthScore {
        score,
        grade: grades.grade(score),
        issues,
        suggestions,
    }
}

/// High-impact action items first, then one line per low-quality source, then
/// the lead action of each opportunity. Capped at [`MAX_RECOMMENDATIONS`].
pub fn recommendations(insights: &[Insight], sources: &[DataSourceAnalysis]) -> Vec<String> {
    let high_impact = insights
        .iter()
        .filter(|i| i.is_high_impact_actionable())
        .flat_map(|i| i.action_items().iter().cloned());
    let quality = sources
        .iter()
        .filter(|s| s.is_low_quality())
        .map(|s| format!("Clean up {} data (quality {}/100)", s.source, s.quality_score));
    let opportunities = insights
        .iter()
        .filter(|i| i.kind == InsightType::Opportunity)
        .filter_map(|i| i.action_items().first().cloned());

    high_impact
        .chain(quality)
        .chain(opportunities)
        .take(MAX_RECOMMENDATIONS)
        .collect()
}

/// Headline KPI values.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiSummary {
    pub total_revenue: Money,
    pub total_expenses: Money,
    pub net_cash_flow: Money,
    /// Net over revenue as a percentage; absent without revenue.
    pub profit_margin: Option<f64>,
    pub transaction_count: usize,
}

impl KpiSummary {
    pub fn from_views(views: &SummaryViews) -> Self {
        let net_cash_flow = views.net_cash_flow();
        KpiSummary {
            total_revenue: views.revenue.total_revenue,
            total_expenses: views.expenses.total_expenses,
            net_cash_flow,
            profit_margin: net_cash_flow.percent_of(views.revenue.total_revenue),
            transaction_count: views.revenue.transaction_count + views.expenses.transaction_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodTrend {
    pub period: YearMonth,
    pub revenue: Money,
    pub expenses: Money,
    pub net: Money,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Improving,
    Stable,
    Declining,
    /// Not enough history for a growth comparison.
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Trends {
    pub monthly: Vec<PeriodTrend>,
    pub revenue_growth_rate: Option<f64>,
    pub expense_growth_rate: Option<f64>,
    pub direction: TrendDirection,
}

impl Trends {
    pub fn from_views(views: &SummaryViews) -> Self {
        let revenue = &views.revenue.revenue_by_period;
        let expenses = &views.expenses.expenses_by_period;
        let periods: BTreeSet<YearMonth> = revenue.keys().chain(expenses.keys()).copied().collect();
        let monthly = periods
            .into_iter()
            .map(|period| {
                let revenue = revenue.get(&period).copied().unwrap_or_default();
                let expenses = expenses.get(&period).copied().unwrap_or_default();
                PeriodTrend {
                    period,
                    revenue,
                    expenses,
                    net: revenue - expenses,
                }
            })
            .collect();

        let revenue_growth_rate = views.revenue.growth_rate();
        let expense_growth_rate = views.expenses.growth_rate();
        let direction = match (revenue_growth_rate, expense_growth_rate) {
            (None, None) => TrendDirection::Unknown,
            (r, e) => {
                let gap = r.unwrap_or(0.0) - e.unwrap_or(0.0);
                if gap > TREND_MARGIN {
                    TrendDirection::Improving
                } else if gap < -TREND_MARGIN {
                    TrendDirection::Declining
                } else {
                    TrendDirection::Stable
                }
            }
        };

        Trends {
            monthly,
            revenue_growth_rate,
            expense_growth_rate,
            direction,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskItem {
    pub title: String,
    pub category: InsightCategory,
    pub level: RiskLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mitigation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Risks {
    pub level: RiskLevel,
    pub items: Vec<RiskItem>,
}

impl Risks {
    /// Critical insights are high risks, warnings medium; the overall level is the worst item.
    pub fn from_insights(insights: &[Insight]) -> Self {
        let items: Vec<RiskItem> = insights
            .iter()
            .filter_map(|i| {
                let level = match i.kind {
                    InsightType::Critical => RiskLevel::High,
                    InsightType::Warning => RiskLevel::Medium,
                    _ => return None,
                };
                Some(RiskItem {
                    title: i.title.clone(),
                    category: i.category,
                    level,
                    mitigation: i.action_items().first().cloned(),
                })
            })
            .collect();
        let level = items.iter().map(|r| r.level).max().unwrap_or(RiskLevel::Low);
        Risks { level, items }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyMode {
    Growth,
    Optimize,
    Stabilize,
    Survival,
}

impl StrategyMode {
    pub fn for_score(score: u8) -> Self {
        if score >= 80 {
            StrategyMode::Growth
        } else if score >= 60 {
            StrategyMode::Optimize
        } else if score >= 40 {
            StrategyMode::Stabilize
        } else {
            StrategyMode::Survival
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdaptiveStrategy {
    pub mode: StrategyMode,
    /// Distinct categories of critical, then warning, then opportunity insights.
    pub focus_areas: Vec<InsightCategory>,
    pub priorities: Vec<String>,
}

impl AdaptiveStrategy {
    pub fn new(score: u8, insights: &[Insight], recommendations: &[String]) -> Self {
        let mut focus_areas: Vec<InsightCategory> = Vec::new();
        for kind in [InsightType::Critical, InsightType::Warning, InsightType::Opportunity] {
            for insight in insights.iter().filter(|i| i.kind == kind) {
                if !focus_areas.contains(&insight.category) {
                    focus_areas.push(insight.category);
                }
            }
        }
        AdaptiveStrategy {
            mode: StrategyMode::for_score(score),
            focus_areas,
            priorities: recommendations.iter().take(MAX_PRIORITIES).cloned().collect(),
        }
    }
}

/// Everything returned for one analysis request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub insights: Vec<Insight>,
    pub recommendations: Vec<String>,
    pub health_score: HealthScore,
    pub data_quality: Vec<DataSourceAnalysis>,
    pub trends: Trends,
    pub risks: Risks,
    pub adaptive_strategy: AdaptiveStrategy,
    pub summary: KpiSummary,
    pub generated_at: DateTime<Utc>,
}

impl AnalysisReport {
    pub fn build(
        views: &SummaryViews,
        insights: Vec<Insight>,
        data_quality: Vec<DataSourceAnalysis>,
        grades: &GradeThresholds,
        generated_at: DateTime<Utc>,
    ) -> Self {
        let health_score = health_score(&insights, &data_quality, grades);
        let recommendations = recommendations(&insights, &data_quality);
        let adaptive_strategy = AdaptiveStrategy::new(health_score.score, &insights, &recommendations);
        AnalysisReport {
            trends: Trends::from_views(views),
            risks: Risks::from_insights(&insights),
            summary: KpiSummary::from_views(views),
            insights,
            recommendations,
            health_score,
            data_quality,
            adaptive_strategy,
            generated_at,
        }
    }

    pub fn count_of(&self, kind: InsightType) -> usize {
        self.insights.iter().filter(|i| i.kind == kind).count()
    }
}
