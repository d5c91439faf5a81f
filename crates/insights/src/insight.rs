use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightType {
    Positive,
    Warning,
    Critical,
    Opportunity,
    Trend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InsightCategory {
    Revenue,
    Expenses,
    CashFlow,
    Customers,
    Operations,
    Growth,
}

impl fmt::Display for InsightCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InsightCategory::Revenue => write!(f, "revenue"),
            InsightCategory::Expenses => write!(f, "expenses"),
            InsightCategory::CashFlow => write!(f, "cash-flow"),
            InsightCategory::Customers => write!(f, "customers"),
            InsightCategory::Operations => write!(f, "operations"),
            InsightCategory::Growth => write!(f, "growth"),
        }
    }
}

/// A generated advisory record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Insight {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: InsightType,
    pub title: String,
    pub description: String,
    pub impact: Impact,
    pub category: InsightCategory,
    pub actionable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_items: Option<Vec<String>>,
    /// 0-100.
    pub confidence: u8,
    pub created_at: DateTime<Utc>,
}

impl Insight {
    pub fn new(
        kind: InsightType,
        category: InsightCategory,
        impact: Impact,
        title: impl Into<String>,
        description: impl Into<String>,
        confidence: u8,
        created_at: DateTime<Utc>,
    ) -> Self {
        Insight {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            title: title.into(),
            description: description.into(),
            impact,
            category,
            actionable: false,
            action_items: None,
            confidence: confidence.min(100),
            created_at,
        }
    }

    /// Marks the insight actionable with the given steps, in order.
    pub fn with_actions<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.actionable = true;
        self.action_items = Some(items.into_iter().map(Into::into).collect());
        self
    }

    pub fn action_items(&self) -> &[String] {
        self.action_items.as_deref().unwrap_or_default()
    }

    pub fn is_high_impact_actionable(&self) -> bool {
        self.actionable && self.impact == Impact::High
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn serializes_with_wire_names() {
        let insight = Insight::new(
            InsightType::Critical,
            InsightCategory::CashFlow,
            Impact::High,
            "Negative cash flow",
            "Spending exceeds income",
            95,
            now(),
        )
        .with_actions(["Cut costs"]);
        let value = serde_json::to_value(&insight).unwrap();
        assert_eq!(value["type"], "critical");
        assert_eq!(value["category"], "cash-flow");
        assert_eq!(value["impact"], "high");
        assert_eq!(value["actionable"], true);
        assert_eq!(value["actionItems"][0], "Cut costs");
        assert_eq!(value["confidence"], 95);
        assert!(value.get("createdAt").is_some());
    }

    #[test]
    fn non_actionable_omits_action_items() {
        let insight = Insight::new(
            InsightType::Positive,
            InsightCategory::Revenue,
            Impact::Medium,
            "t",
            "d",
            80,
            now(),
        );
        let value = serde_json::to_value(&insight).unwrap();
        assert!(value.get("actionItems").is_none());
        assert!(insight.action_items().is_empty());
        assert!(!insight.is_high_impact_actionable());
    }

    #[test]
    fn confidence_is_capped() {
        let insight = Insight::new(
            InsightType::Trend,
            InsightCategory::Growth,
            Impact::Low,
            "t",
            "d",
            150,
            now(),
        );
        assert_eq!(insight.confidence, 100);
    }

    #[test]
    fn ids_are_unique() {
        let a = Insight::new(InsightType::Trend, InsightCategory::Growth, Impact::Low, "t", "d", 1, now());
        let b = Insight::new(InsightType::Trend, InsightCategory::Growth, Impact::Low, "t", "d", 1, now());
        assert_ne!(a.id, b.id);
    }
}
