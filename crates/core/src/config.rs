use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Grade thresholds must descend (A > B > C > D), got {0:?}")]
    GradeOrder(GradeThresholds),
}

/// Minimum scores for each letter grade. Anything below `d` is an F.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradeThresholds {
    pub a: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
}

impl Default for GradeThresholds {
    fn default() -> Self {
        Self { a: 90, b: 80, c: 70, d: 60 }
    }
}

impl GradeThresholds {
    pub fn grade(&self, score: u8) -> char {
        match score {
            s if s >= self.a => 'A',
            s if s >= self.b => 'B',
            s if s >= self.c => 'C',
            s if s >= self.d => 'D',
            _ => 'F',
        }
    }
}

/// Tunables for aggregation and categorization. Insight rule thresholds are fixed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub grades: GradeThresholds,
    /// Category substrings (case-insensitive) that mark revenue as recurring.
    pub recurring_keywords: Vec<String>,
    /// Category labels treated as "not categorized" by the data-quality check.
    pub uncategorized_labels: Vec<String>,
    /// A customer with no order in this many months before the latest month counts as churned.
    pub churn_window_months: u32,
    pub top_products: usize,
    pub max_suggestions: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            grades: GradeThresholds::default(),
            recurring_keywords: ["subscription", "recurring", "retainer", "membership"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            uncategorized_labels: ["uncategorized", "other", "misc"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            churn_window_months: 3,
            top_products: 10,
            max_suggestions: 3,
        }
    }
}

impl AnalysisConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: AnalysisConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let g = self.grades;
        if !(g.a > g.b && g.b > g.c && g.c > g.d) {
            return Err(ConfigError::GradeOrder(g));
        }
        Ok(())
    }

    pub fn is_recurring_category(&self, category: &str) -> bool {
        let category = category.to_lowercase();
        self.recurring_keywords
            .iter()
            .any(|k| category.contains(&k.to_lowercase()))
    }

    pub fn is_uncategorized(&self, category: &str) -> bool {
        let category = category.trim();
        category.is_empty()
            || self
                .uncategorized_labels
                .iter()
                .any(|l| l.eq_ignore_ascii_case(category))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_grades() {
        let g = GradeThresholds::default();
        assert_eq!(g.grade(100), 'A');
        assert_eq!(g.grade(90), 'A');
        assert_eq!(g.grade(89), 'B');
        assert_eq!(g.grade(70), 'C');
        assert_eq!(g.grade(65), 'D');
        assert_eq!(g.grade(0), 'F');
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = AnalysisConfig::from_toml(
            r#"
            churn_window_months = 6

            [grades]
            a = 95
            "#,
        )
        .unwrap();
        assert_eq!(config.churn_window_months, 6);
        assert_eq!(config.grades.a, 95);
        assert_eq!(config.grades.b, 80);
        assert_eq!(config.top_products, 10);
    }

    #[test]
    fn rejects_non_descending_grades() {
        let err = AnalysisConfig::from_toml("[grades]\na = 70\nb = 80\n").unwrap_err();
        assert!(matches!(err, ConfigError::GradeOrder(_)));
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(matches!(
            AnalysisConfig::from_toml("top_products = \"many\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_suggestions = 5").unwrap();
        let config = AnalysisConfig::load(file.path()).unwrap();
        assert_eq!(config.max_suggestions, 5);
    }

    #[test]
    fn recurring_and_uncategorized_matching() {
        let config = AnalysisConfig::default();
        assert!(config.is_recurring_category("Monthly Subscriptions"));
        assert!(!config.is_recurring_category("Consulting"));
        assert!(config.is_uncategorized(""));
        assert!(config.is_uncategorized("  Uncategorized "));
        assert!(!config.is_uncategorized("Rent"));
    }
}
