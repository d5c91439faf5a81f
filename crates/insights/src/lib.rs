pub mod adapter;
pub mod engine;
pub mod insight;
pub mod quality;
pub mod report;

pub use adapter::{
    period_growth_rate, CustomerData, DataAdapter, ExpenseData, ProductData, ProductSales,
    RevenueData,
};
pub use engine::{AnalysisInput, InsightEngine, SummaryViews};
pub use insight::{Impact, Insight, InsightCategory, InsightType};
pub use quality::{analyze_source, analyze_sources, find_duplicates, DataSourceAnalysis};
pub use report::{
    health_score, recommendations, AdaptiveStrategy, AnalysisReport, HealthScore, KpiSummary,
    PeriodTrend, RiskItem, RiskLevel, Risks, StrategyMode, TrendDirection, Trends,
    MAX_RECOMMENDATIONS,
};
