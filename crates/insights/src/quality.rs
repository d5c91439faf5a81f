use cashpilot_core::{AnalysisConfig, DateRange, Transaction, TransactionSource, YearMonth};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

const MISSING_DESCRIPTION_WEIGHT: f64 = 30.0;
const UNCATEGORIZED_WEIGHT: f64 = 25.0;
const DUPLICATE_WEIGHT: f64 = 20.0;

/// Quality below this marks a source as unreliable.
pub const LOW_QUALITY_THRESHOLD: u8 = 70;
/// Sources with fewer records still report issues but are never flagged low quality.
pub const MIN_SCORED_TRANSACTIONS: usize = 5;
/// Coverage (percent of months with data) below this suggests connecting more history.
pub const LOW_COVERAGE_THRESHOLD: f64 = 50.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceAnalysis {
    pub source: TransactionSource,
    pub transaction_count: usize,
    pub quality_score: u8,
    pub coverage: f64,
    pub missing_descriptions: usize,
    pub uncategorized: usize,
    pub duplicates: usize,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
}

impl DataSourceAnalysis {
    pub fn is_low_quality(&self) -> bool {
        self.transaction_count >= MIN_SCORED_TRANSACTIONS && self.quality_score < LOW_QUALITY_THRESHOLD
    }

    pub fn is_low_coverage(&self) -> bool {
        self.coverage < LOW_COVERAGE_THRESHOLD
    }
}

type DuplicateKey = (NaiveDate, Decimal, String);

fn duplicate_key(tx: &Transaction) -> DuplicateKey {
    (tx.day(), tx.amount.amount().normalize(), tx.description.clone())
}

/// Pairs of `(original id, duplicate id)`: same day, same amount and exactly the
/// same description. Every later copy pairs with the first occurrence.
pub fn find_duplicates<'a, I>(transactions: I) -> Vec<(String, String)>
where
    I: IntoIterator<Item = &'a Transaction>,
{
    let mut first_seen: HashMap<DuplicateKey, &str> = HashMap::new();
    let mut duplicates = Vec::new();
    for tx in transactions {
        match first_seen.get(&duplicate_key(tx)) {
            Some(original) => duplicates.push((original.to_string(), tx.id.clone())),
            None => {
                first_seen.insert(duplicate_key(tx), &tx.id);
            }
        }
    }
    duplicates
}

/// One analysis per source that has transactions, in source order.
pub fn analyze_sources(transactions: &[Transaction], config: &AnalysisConfig) -> Vec<DataSourceAnalysis> {
    let span_months = DateRange::covering(transactions.iter().map(Transaction::day))
        .map(|r| r.months().len())
        .unwrap_or(0);

    TransactionSource::ALL
        .iter()
        .filter_map(|source| {
            let txs: Vec<&Transaction> = transactions.iter().filter(|t| t.source == *source).collect();
            (!txs.is_empty()).then(|| analyze_source(*source, &txs, span_months, config))
        })
        .collect()
}

/// Scores one source: 100 minus weighted shares of missing descriptions,
/// uncategorized records and duplicates.
pub fn analyze_source(
    source: TransactionSource,
    transactions: &[&Transaction],
    span_months: usize,
    config: &AnalysisConfig,
) -> DataSourceAnalysis {
    let n = transactions.len();
    let missing_descriptions = transactions
        .iter()
        .filter(|t| t.description.trim().is_empty())
        .count();
    let uncategorized = transactions
        .iter()
        .filter(|t| config.is_uncategorized(&t.category))
        .count();
    let duplicates = find_duplicates(transactions.iter().copied()).len();

    let quality_score = if n == 0 {
        100
    } else {
        let share = |count: usize| count as f64 / n as f64;
        let score = 100.0
            - share(missing_descriptions) * MISSING_DESCRIPTION_WEIGHT
            - share(uncategorized) * UNCATEGORIZED_WEIGHT
            - share(duplicates) * DUPLICATE_WEIGHT;
        score.round().clamp(0.0, 100.0) as u8
    };

    let active_months: BTreeSet<YearMonth> = transactions.iter().map(|t| YearMonth::of(t.day())).collect();
    let coverage = if span_months == 0 {
        0.0
    } else {
        (active_months.len() as f64 / span_months as f64 * 100.0).min(100.0)
    };

    let mut issues = Vec::new();
    let mut recommendations = Vec::new();
    if missing_descriptions > 0 {
        issues.push(format!("{missing_descriptions} {source} transactions have no description"));
        recommendations.push(format!("Add descriptions to {missing_descriptions} {source} transactions"));
    }
    if uncategorized > 0 {
        issues.push(format!("{uncategorized} {source} transactions are uncategorized"));
        recommendations.push(format!("Categorize {uncategorized} {source} transactions"));
    }
    if duplicates > 0 {
        issues.push(format!("{duplicates} possible duplicate {source} transactions"));
        recommendations.push(format!("Review and remove {duplicates} duplicate {source} transactions"));
    }

    DataSourceAnalysis {
        source,
        transaction_count: n,
        quality_score,
        coverage,
        missing_descriptions,
        uncategorized,
        duplicates,
        issues,
        recommendations,
    }
}
