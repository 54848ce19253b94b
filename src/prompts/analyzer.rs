//! Confounder classification prompt.

#![allow(clippy::missing_const_for_fn)]

/// Prompt for the confounder analyzer.
///
/// The caller appends the hypothesis, the candidate variable list with
/// their profiles, and the correlation scan results before sending.
#[must_use]
pub fn confounder_classification_prompt() -> &'static str {
    r#"You are analyzing the causal structure around a single hypothesis.
For each candidate variable, decide what role it plays relative to the
stated cause and effect.

Definitions:
- confounder: influences both the cause and the effect
- mediator: sits on the causal path from cause to effect
- collider: is influenced by both the cause and the effect
- irrelevant: none of the above

Respond with a JSON object in this exact format:
{
  "classifications": [
    {
      "variable": "tenure_days",
      "role": "confounder",
      "reasoning": "Longer-tenured customers order differently and churn less"
    }
  ],
  "true_cause": "low_onboarding_engagement",
  "proximate_cause": "late_delivery",
  "actionable_lever": "Rescue onboarding engagement after a late delivery",
  "structure_confidence": 0.7
}

Important:
- classify every candidate variable exactly once
- true_cause is the deepest driver: the last mediator on the path when one
  exists, otherwise the stated cause
- proximate_cause is the stated cause
- actionable_lever is a short imperative intervention on the true cause
- structure_confidence is a number between 0 and 1"#
}
