//! Opportunity: the observed retention deviation under analysis.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Category of a retention deviation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityKind {
    /// Churn rose above baseline.
    ChurnSpike,
    /// Retention fell below baseline.
    RetentionDrop,
    /// Engagement declined.
    EngagementDecline,
    /// Caller-defined deviation.
    Custom,
}

impl std::fmt::Display for OpportunityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ChurnSpike => write!(f, "churn_spike"),
            Self::RetentionDrop => write!(f, "retention_drop"),
            Self::EngagementDecline => write!(f, "engagement_decline"),
            Self::Custom => write!(f, "custom"),
        }
    }
}

/// How severe the deviation is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Minor deviation.
    Low,
    /// Notable deviation.
    Medium,
    /// Urgent deviation.
    High,
}

/// An observed deviation in a retention metric for some cohort.
///
/// Created by the caller, read by every stage, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    /// Stable identifier.
    pub id: String,
    /// Deviation category.
    pub kind: OpportunityKind,
    /// Human title.
    pub title: String,
    /// Human description.
    pub description: String,
    /// Affected cohort: dimension name to value.
    pub affected_cohort: BTreeMap<String, String>,
    /// The retention metric (and outcome column) name.
    pub metric: String,
    /// Metric value before the deviation.
    pub baseline_value: f64,
    /// Metric value now.
    pub current_value: f64,
    /// Cohort size behind the observation.
    pub sample_size: usize,
    /// Severity of the deviation.
    pub severity: Severity,
}

impl Opportunity {
    /// Create an opportunity with a generated id.
    #[must_use]
    pub fn new(kind: OpportunityKind, title: impl Into<String>, metric: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            title: title.into(),
            description: String::new(),
            affected_cohort: BTreeMap::new(),
            metric: metric.into(),
            baseline_value: 0.0,
            current_value: 0.0,
            sample_size: 0,
            severity: Severity::Medium,
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add a cohort dimension.
    #[must_use]
    pub fn with_cohort(mut self, dimension: impl Into<String>, value: impl Into<String>) -> Self {
        self.affected_cohort.insert(dimension.into(), value.into());
        self
    }

    /// Set baseline and current metric values.
    #[must_use]
    pub const fn with_values(mut self, baseline: f64, current: f64) -> Self {
        self.baseline_value = baseline;
        self.current_value = current;
        self
    }

    /// Set the cohort sample size.
    #[must_use]
    pub const fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size;
        self
    }

    /// Set the severity.
    #[must_use]
    pub const fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Signed deviation of the metric (current minus baseline).
    #[must_use]
    pub fn deviation(&self) -> f64 {
        self.current_value - self.baseline_value
    }

    /// Cohort rendered as `dim=value` pairs for prompts and logs.
    #[must_use]
    pub fn cohort_summary(&self) -> String {
        if self.affected_cohort.is_empty() {
            return "all customers".to_string();
        }
        self.affected_cohort
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    fn sample_opportunity() -> Opportunity {
        Opportunity::new(OpportunityKind::ChurnSpike, "Referral churn spike", "churn_30d")
            .with_description("Churn among referral signups jumped")
            .with_cohort("channel", "Referral")
            .with_values(0.15, 0.32)
            .with_sample_size(600)
            .with_severity(Severity::High)
    }

    #[test]
    fn test_builder_populates_fields() {
        let opp = sample_opportunity();
        assert_eq!(opp.kind, OpportunityKind::ChurnSpike);
        assert_eq!(opp.metric, "churn_30d");
        assert_eq!(opp.sample_size, 600);
        assert_eq!(opp.severity, Severity::High);
        assert_eq!(opp.affected_cohort.get("channel").unwrap(), "Referral");
    }

    #[test]
    fn test_deviation() {
        let opp = sample_opportunity();
        assert!((opp.deviation() - 0.17).abs() < 1e-12);
    }

    #[test]
    fn test_cohort_summary() {
        assert_eq!(sample_opportunity().cohort_summary(), "channel=Referral");
        let empty = Opportunity::new(OpportunityKind::Custom, "t", "m");
        assert_eq!(empty.cohort_summary(), "all customers");
    }

    #[test]
    fn test_kind_serde() {
        assert_eq!(
            serde_json::to_string(&OpportunityKind::ChurnSpike).unwrap(),
            "\"churn_spike\""
        );
        assert_eq!(
            serde_json::to_string(&OpportunityKind::EngagementDecline).unwrap(),
            "\"engagement_decline\""
        );
    }

    #[test]
    fn test_ids_unique() {
        let a = Opportunity::new(OpportunityKind::Custom, "a", "m");
        let b = Opportunity::new(OpportunityKind::Custom, "b", "m");
        assert_ne!(a.id, b.id);
    }
}
