//! Hypotheses, test results, and causal structures.

use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Statistical test methods a hypothesis can declare.
///
/// The kernel implements the first four; the remainder are accepted from the
/// generator but recorded as skipped by the tester.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestMethod {
    /// Lagged-predictor test on temporally indexed data.
    GrangerCausality,
    /// Propensity-score matching of treated to untreated rows.
    PropensityMatching,
    /// Regression of outcome on treatment plus controls.
    RegressionAdjustment,
    /// Regression discontinuity design.
    RegressionDiscontinuity,
    /// Instrumental variables.
    InstrumentalVariables,
    /// Difference in differences.
    DifferenceInDifferences,
    /// Synthetic control.
    SyntheticControl,
    /// DAG-based identification.
    DagBased,
}

impl TestMethod {
    /// Whether the statistical kernel implements this method.
    #[must_use]
    pub const fn is_supported(&self) -> bool {
        matches!(
            self,
            Self::GrangerCausality
                | Self::PropensityMatching
                | Self::RegressionAdjustment
        )
    }
}

impl std::fmt::Display for TestMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::GrangerCausality => "granger_causality",
            Self::PropensityMatching => "propensity_matching",
            Self::RegressionAdjustment => "regression_adjustment",
            Self::RegressionDiscontinuity => "regression_discontinuity",
            Self::InstrumentalVariables => "instrumental_variables",
            Self::DifferenceInDifferences => "difference_in_differences",
            Self::SyntheticControl => "synthetic_control",
            Self::DagBased => "dag_based",
        };
        write!(f, "{name}")
    }
}

/// Qualitative likelihood assigned by the generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Likelihood {
    /// Unlikely but worth testing.
    Low,
    /// Plausible.
    Medium,
    /// Strongly suspected.
    High,
}

/// Direction of a causal effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectDirection {
    /// Cause increases the outcome.
    Positive,
    /// Cause decreases the outcome.
    Negative,
    /// No measurable direction.
    None,
}

impl EffectDirection {
    /// Direction of a signed estimate.
    #[must_use]
    pub fn from_estimate(estimate: f64) -> Self {
        if estimate > 0.0 {
            Self::Positive
        } else if estimate < 0.0 {
            Self::Negative
        } else {
            Self::None
        }
    }

    /// The opposite direction (`None` stays `None`).
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Positive => Self::Negative,
            Self::Negative => Self::Positive,
            Self::None => Self::None,
        }
    }
}

/// Qualitative confidence derived from effect sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    /// |effect size| below 0.2.
    Low,
    /// |effect size| in [0.2, 0.5).
    Medium,
    /// |effect size| at or above 0.5.
    High,
}

impl ConfidenceLevel {
    /// Threshold an absolute effect size into a confidence level.
    #[must_use]
    pub fn from_effect_size(effect_size: f64) -> Self {
        let abs = effect_size.abs();
        if abs >= 0.5 {
            Self::High
        } else if abs >= 0.2 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Ranking weight used when ordering levers.
    #[must_use]
    pub const fn weight(&self) -> f64 {
        match self {
            Self::High => 1.0,
            Self::Medium => 0.66,
            Self::Low => 0.33,
        }
    }

    /// Midpoint of the band, for mapping levels back onto [0, 1].
    #[must_use]
    pub const fn as_score(&self) -> f64 {
        match self {
            Self::High => 0.9,
            Self::Medium => 0.6,
            Self::Low => 0.3,
        }
    }
}

/// Outcome of one statistical test.
///
/// Appended by the tester, never mutated afterward. A skipped method still
/// produces a result so the session records why it did not run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    /// Unique identifier.
    pub id: String,
    /// Owning hypothesis.
    pub hypothesis_id: String,
    /// The method that ran (or was skipped).
    pub method: TestMethod,
    /// Whether the test rejected the null at the configured alpha.
    pub is_significant: bool,
    /// Two-tailed p-value.
    pub p_value: f64,
    /// Standardized effect size.
    pub effect_size: f64,
    /// Raw estimate on the outcome scale.
    pub point_estimate: f64,
    /// 95% confidence interval for the point estimate.
    pub confidence_interval: (f64, f64),
    /// Rows that entered the test.
    pub sample_size: usize,
    /// Direction of the estimated effect.
    pub effect_direction: EffectDirection,
    /// Qualitative confidence from the effect size.
    pub confidence: ConfidenceLevel,
    /// Data-quality and feasibility warnings.
    pub warnings: Vec<String>,
}

impl TestResult {
    /// Create a result for an executed test.
    #[must_use]
    // A test outcome needs every statistic at once to stay immutable
    #[allow(clippy::too_many_arguments)]
    pub fn executed(
        hypothesis_id: impl Into<String>,
        method: TestMethod,
        point_estimate: f64,
        effect_size: f64,
        p_value: f64,
        confidence_interval: (f64, f64),
        sample_size: usize,
        alpha: f64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            hypothesis_id: hypothesis_id.into(),
            method,
            is_significant: p_value < alpha,
            p_value,
            effect_size,
            point_estimate,
            confidence_interval,
            sample_size,
            effect_direction: EffectDirection::from_estimate(point_estimate),
            confidence: ConfidenceLevel::from_effect_size(effect_size),
            warnings: Vec::new(),
        }
    }

    /// Create a result for a skipped method.
    ///
    /// Skips are never significant and carry low confidence; the warning
    /// explains why the method did not run.
    #[must_use]
    pub fn skipped(
        hypothesis_id: impl Into<String>,
        method: TestMethod,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            hypothesis_id: hypothesis_id.into(),
            method,
            is_significant: false,
            p_value: 1.0,
            effect_size: 0.0,
            point_estimate: 0.0,
            confidence_interval: (0.0, 0.0),
            sample_size: 0,
            effect_direction: EffectDirection::None,
            confidence: ConfidenceLevel::Low,
            warnings: vec![reason.into()],
        }
    }

    /// Append a warning.
    #[must_use]
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    /// Whether this result came from an executed (non-skipped) test.
    #[must_use]
    pub fn was_executed(&self) -> bool {
        self.sample_size > 0
    }

    /// Standard error recovered from the CI half-width, when available.
    #[must_use]
    pub fn standard_error(&self) -> Option<f64> {
        let half_width = (self.confidence_interval.1 - self.confidence_interval.0) / 2.0;
        if half_width > 0.0 {
            Some(half_width / 1.96)
        } else {
            None
        }
    }
}

/// Role of an edge in the hypothesis DAG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeRole {
    /// Direct causal edge.
    Cause,
    /// Confounding edge (confounder into cause or effect).
    Confounder,
    /// Mediation edge (cause into mediator, mediator into effect).
    Mediator,
    /// Collider edge (cause or effect into the collider).
    Collider,
}

/// A node in the hypothesis DAG.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DagNode {
    /// Node id (the column name).
    pub id: String,
    /// Display label.
    pub label: String,
}

impl DagNode {
    /// Create a node whose label equals its id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
        }
    }
}

/// A typed edge in the hypothesis DAG.
///
/// Edges reference node ids rather than node pointers so the graph
/// serializes cleanly and owns no cycles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DagEdge {
    /// Source node id.
    pub source: String,
    /// Target node id.
    pub target: String,
    /// Edge role.
    pub role: EdgeRole,
}

impl DagEdge {
    /// Create an edge.
    #[must_use]
    pub fn new(source: impl Into<String>, target: impl Into<String>, role: EdgeRole) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            role,
        }
    }
}

/// Post-analysis causal summary for one hypothesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CausalStructure {
    /// Effect of the cause holding mediators fixed.
    pub direct_effect: f64,
    /// Effect transmitted through mediators.
    pub indirect_effect: f64,
    /// Direct plus indirect effect.
    pub total_effect: f64,
    /// Mediating variables.
    pub mediators: Vec<String>,
    /// Confounding variables.
    pub confounders: Vec<String>,
    /// Collider variables (never conditioned on).
    pub colliders: Vec<String>,
    /// The deepest driver behind the deviation.
    pub true_cause: String,
    /// The surface cause named by the hypothesis.
    pub proximate_cause: String,
    /// Human-readable intervention on the true cause.
    pub actionable_lever: String,
    /// DAG nodes.
    pub nodes: Vec<DagNode>,
    /// DAG edges.
    pub edges: Vec<DagEdge>,
    /// Confidence in the structure, in [0, 1].
    pub structure_confidence: f64,
}

impl CausalStructure {
    /// Create an initial structure with effects not yet estimated.
    #[must_use]
    pub fn initial(proximate_cause: impl Into<String>) -> Self {
        let proximate_cause = proximate_cause.into();
        Self {
            direct_effect: 0.0,
            indirect_effect: 0.0,
            total_effect: 0.0,
            mediators: Vec::new(),
            confounders: Vec::new(),
            colliders: Vec::new(),
            true_cause: proximate_cause.clone(),
            proximate_cause,
            actionable_lever: String::new(),
            nodes: Vec::new(),
            edges: Vec::new(),
            structure_confidence: 0.0,
        }
    }
}

/// A single testable causal claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hypothesis {
    /// Unique identifier.
    pub id: String,
    /// Owning session.
    pub session_id: String,
    /// Cause column (or composite condition name).
    pub cause: String,
    /// Outcome column.
    pub effect: String,
    /// One-sentence mechanism.
    pub mechanism: String,
    /// Why this hypothesis is worth testing.
    pub rationale: String,
    /// The effect direction the mechanism claims.
    pub expected_direction: EffectDirection,
    /// Suspected confounders.
    pub confounders: Vec<String>,
    /// Suspected mediators.
    pub mediators: Vec<String>,
    /// Suspected moderators.
    pub moderators: Vec<String>,
    /// Declared test methods.
    pub test_methods: Vec<TestMethod>,
    /// Generator-assigned likelihood.
    pub likelihood: Likelihood,
    /// Validation verdict: `None` until the tester rules.
    pub validated: Option<bool>,
    /// Test results, in execution order.
    pub test_results: Vec<TestResult>,
    /// Causal structure from the analyzer and tester.
    pub causal_structure: Option<CausalStructure>,
}

impl Hypothesis {
    /// Create an untested hypothesis.
    #[must_use]
    pub fn new(
        session_id: impl Into<String>,
        cause: impl Into<String>,
        effect: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            cause: cause.into(),
            effect: effect.into(),
            mechanism: String::new(),
            rationale: String::new(),
            expected_direction: EffectDirection::Positive,
            confounders: Vec::new(),
            mediators: Vec::new(),
            moderators: Vec::new(),
            test_methods: Vec::new(),
            likelihood: Likelihood::Medium,
            validated: None,
            test_results: Vec::new(),
            causal_structure: None,
        }
    }

    /// Record the validation verdict.
    ///
    /// The verdict transitions `None -> Some(_)` exactly once.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::VerdictAlreadyRecorded`] on a second call.
    pub fn record_verdict(&mut self, validated: bool) -> Result<(), SessionError> {
        if self.validated.is_some() {
            return Err(SessionError::VerdictAlreadyRecorded {
                hypothesis_id: self.id.clone(),
            });
        }
        self.validated = Some(validated);
        Ok(())
    }

    /// Whether the tester validated this hypothesis.
    #[must_use]
    pub fn is_validated(&self) -> bool {
        self.validated == Some(true)
    }

    /// The deepest driver: the structure's true cause, falling back to the
    /// surface cause.
    #[must_use]
    pub fn true_cause(&self) -> &str {
        self.causal_structure
            .as_ref()
            .filter(|s| !s.true_cause.is_empty())
            .map_or(self.cause.as_str(), |s| s.true_cause.as_str())
    }

    /// The executed test result with the smallest p-value, if any.
    #[must_use]
    pub fn dominant_result(&self) -> Option<&TestResult> {
        self.test_results
            .iter()
            .filter(|r| r.was_executed())
            .min_by(|a, b| {
                a.p_value
                    .partial_cmp(&b.p_value)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    }
}
