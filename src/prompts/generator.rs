//! Hypothesis generation prompt.

#![allow(clippy::missing_const_for_fn)]

/// Prompt for the hypothesis generator.
///
/// The caller appends the opportunity summary, the feature catalog table,
/// and any business context before sending.
#[must_use]
pub fn hypothesis_generation_prompt() -> &'static str {
    r#"You are a causal analyst for customer retention. Given an observed
retention deviation and a catalog of customer features, propose candidate
causal hypotheses that explain the deviation.

Your task is to:
1. Propose between 3 and 10 testable hypotheses
2. Name a cause column taken from the feature catalog for each
3. Name the outcome column matching the opportunity's metric as the effect
4. State the mechanism in one sentence and the expected direction
5. Suggest confounders and mediators drawn from the catalog
6. Pick the statistical tests that could validate each claim

Respond with a JSON object in this exact format:
{
  "hypotheses": [
    {
      "cause": "late_delivery",
      "effect": "churn_30d",
      "mechanism": "Late deliveries erode trust during onboarding",
      "rationale": "Strong correlation with the outcome in the affected cohort",
      "expected_direction": "positive",
      "confounders": ["tenure_days"],
      "mediators": ["low_onboarding_engagement"],
      "moderators": [],
      "test_methods": ["propensity_matching", "regression_adjustment"],
      "likelihood": "high"
    }
  ]
}

Important:
- cause must be a column name from the catalog; never invent columns
- effect must equal the opportunity's metric column
- expected_direction is "positive" when the cause raises the outcome,
  "negative" when it lowers it
- test_methods is a non-empty subset of: granger_causality,
  propensity_matching, regression_adjustment, regression_discontinuity,
  instrumental_variables, difference_in_differences, synthetic_control,
  dag_based
- likelihood is one of: low, medium, high
- every (cause, effect) pair must be distinct"#
}
