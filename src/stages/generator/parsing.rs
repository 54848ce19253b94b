//! Draft types and validation for the hypothesis generator.
//!
//! The LLM replies with a [`GeneratorDraft`]; validation turns each draft
//! into a domain [`Hypothesis`] or drops it with a warning. Schema-level
//! problems (wrong shape, bad enum values for direction or likelihood) are
//! handled upstream by the corrective retry loop.

use schemars::JsonSchema;
use serde::Deserialize;

use crate::data::DataTable;
use crate::domain::{EffectDirection, Hypothesis, Likelihood, TestMethod};

/// Top-level generator response.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GeneratorDraft {
    /// Proposed hypotheses.
    pub hypotheses: Vec<HypothesisDraft>,
}

/// Direction the mechanism claims. The generator never emits "none".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DirectionDraft {
    /// Cause raises the outcome.
    Positive,
    /// Cause lowers the outcome.
    Negative,
}

impl From<DirectionDraft> for EffectDirection {
    fn from(value: DirectionDraft) -> Self {
        match value {
            DirectionDraft::Positive => Self::Positive,
            DirectionDraft::Negative => Self::Negative,
        }
    }
}

/// Likelihood the generator assigns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LikelihoodDraft {
    /// Unlikely but worth testing.
    Low,
    /// Plausible.
    Medium,
    /// Strongly suspected.
    High,
}

impl From<LikelihoodDraft> for Likelihood {
    fn from(value: LikelihoodDraft) -> Self {
        match value {
            LikelihoodDraft::Low => Self::Low,
            LikelihoodDraft::Medium => Self::Medium,
            LikelihoodDraft::High => Self::High,
        }
    }
}

/// One proposed hypothesis, as the LLM emits it.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct HypothesisDraft {
    /// Cause column name.
    pub cause: String,
    /// Outcome column name.
    pub effect: String,
    /// One-sentence mechanism.
    pub mechanism: String,
    /// Why this hypothesis is worth testing.
    #[serde(default)]
    pub rationale: String,
    /// Claimed direction of the effect.
    pub expected_direction: DirectionDraft,
    /// Suspected confounders.
    #[serde(default)]
    pub confounders: Vec<String>,
    /// Suspected mediators.
    #[serde(default)]
    pub mediators: Vec<String>,
    /// Suspected moderators.
    #[serde(default)]
    pub moderators: Vec<String>,
    /// Declared test method names.
    pub test_methods: Vec<String>,
    /// Qualitative likelihood.
    pub likelihood: LikelihoodDraft,
}

/// Why a draft was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DraftRejection {
    /// Cause equals effect.
    CauseEqualsEffect,
    /// A named column is absent from the dataset.
    MissingColumn(String),
    /// No recognizable test method survived parsing.
    NoUsableTestMethods,
    /// The (cause, effect) pair repeats an earlier draft.
    DuplicatePair,
}

impl std::fmt::Display for DraftRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CauseEqualsEffect => write!(f, "cause equals effect"),
            Self::MissingColumn(column) => write!(f, "column {column} not in dataset"),
            Self::NoUsableTestMethods => write!(f, "no usable test methods"),
            Self::DuplicatePair => write!(f, "duplicate (cause, effect) pair"),
        }
    }
}

/// Parse a method name into the closed [`TestMethod`] set.
#[must_use]
pub fn parse_test_method(name: &str) -> Option<TestMethod> {
    serde_json::from_value(serde_json::Value::String(name.trim().to_lowercase())).ok()
}

/// Validate one draft against the dataset and the pairs already accepted.
///
/// # Errors
///
/// Returns the [`DraftRejection`] explaining why the draft is unusable.
pub fn validate_draft(
    draft: &HypothesisDraft,
    table: &DataTable,
    accepted_pairs: &[(String, String)],
) -> Result<Vec<TestMethod>, DraftRejection> {
    if draft.cause == draft.effect {
        return Err(DraftRejection::CauseEqualsEffect);
    }
    if !table.has_column(&draft.cause) {
        return Err(DraftRejection::MissingColumn(draft.cause.clone()));
    }
    if !table.has_column(&draft.effect) {
        return Err(DraftRejection::MissingColumn(draft.effect.clone()));
    }
    if accepted_pairs
        .iter()
        .any(|(c, e)| c == &draft.cause && e == &draft.effect)
    {
        return Err(DraftRejection::DuplicatePair);
    }

    let methods: Vec<TestMethod> = draft
        .test_methods
        .iter()
        .filter_map(|name| parse_test_method(name))
        .collect();

    let mut deduped: Vec<TestMethod> = Vec::new();
    for method in methods {
        if !deduped.contains(&method) {
            deduped.push(method);
        }
    }

    if deduped.is_empty() {
        return Err(DraftRejection::NoUsableTestMethods);
    }

    Ok(deduped)
}

/// Convert an accepted draft into a domain hypothesis.
#[must_use]
pub fn into_hypothesis(
    draft: HypothesisDraft,
    methods: Vec<TestMethod>,
    session_id: &str,
) -> Hypothesis {
    let mut hypothesis = Hypothesis::new(session_id, draft.cause, draft.effect);
    hypothesis.mechanism = draft.mechanism;
    hypothesis.rationale = draft.rationale;
    hypothesis.expected_direction = draft.expected_direction.into();
    hypothesis.confounders = draft.confounders;
    hypothesis.mediators = draft.mediators;
    hypothesis.moderators = draft.moderators;
    hypothesis.test_methods = methods;
    hypothesis.likelihood = draft.likelihood.into();
    hypothesis
}
