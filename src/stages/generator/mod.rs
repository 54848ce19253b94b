//! Hypothesis generation stage.
//!
//! One structured LLM call proposes 3-10 candidate hypotheses from the
//! opportunity, the data profile, and optional business context. Drafts
//! referencing absent columns are dropped with a warning; fewer than two
//! survivors fail the stage.

mod parsing;

pub use parsing::{GeneratorDraft, HypothesisDraft};

use parsing::{into_hypothesis, validate_draft};

use crate::config::EngineConfig;
use crate::data::{DataProfile, DataTable};
use crate::domain::{Opportunity, ReasoningSession};
use crate::error::StageError;
use crate::llm::structured::{request_structured, StructuredOptions};
use crate::prompts::hypothesis_generation_prompt;
use crate::traits::LlmClientTrait;

/// Generate candidate hypotheses onto the session.
///
/// # Errors
///
/// - [`StageError::SchemaViolation`] when the LLM cannot produce a valid
///   draft within the retry budget.
/// - [`StageError::InsufficientHypotheses`] when fewer than the configured
///   minimum survive validation.
/// - [`StageError::ApiUnavailable`] on transport failures.
pub async fn generate_hypotheses<C: LlmClientTrait>(
    client: &C,
    config: &EngineConfig,
    opportunity: &Opportunity,
    profile: &DataProfile,
    table: &DataTable,
    business_context: Option<&str>,
    session: &mut ReasoningSession,
) -> Result<(), StageError> {
    let prompt = build_prompt(opportunity, profile, business_context);
    let options = StructuredOptions::new()
        .with_retry_budget(config.schema_retry_budget)
        .with_system_prompt("You are a rigorous causal analyst. Output JSON only.");

    let outcome = request_structured::<GeneratorDraft, _>(client, &prompt, &options).await?;
    if outcome.attempts > 1 {
        tracing::info!(
            attempts = outcome.attempts,
            "Hypothesis draft accepted after corrective retries"
        );
    }

    let mut accepted_pairs: Vec<(String, String)> = Vec::new();
    let mut dropped = 0usize;

    for draft in outcome.value.hypotheses {
        if accepted_pairs.len() >= config.max_hypotheses {
            tracing::warn!(
                limit = config.max_hypotheses,
                "Hypothesis limit reached, discarding the remainder"
            );
            break;
        }
        match validate_draft(&draft, table, &accepted_pairs) {
            Ok(methods) => {
                accepted_pairs.push((draft.cause.clone(), draft.effect.clone()));
                let hypothesis = into_hypothesis(draft, methods, &session.id);
                tracing::info!(
                    cause = %hypothesis.cause,
                    effect = %hypothesis.effect,
                    methods = hypothesis.test_methods.len(),
                    "Hypothesis accepted"
                );
                session.hypotheses.push(hypothesis);
            }
            Err(rejection) => {
                dropped += 1;
                tracing::warn!(
                    cause = %draft.cause,
                    effect = %draft.effect,
                    reason = %rejection,
                    "Hypothesis dropped"
                );
            }
        }
    }

    session.recompute_rollups();

    if session.hypotheses.len() < config.min_valid_hypotheses {
        return Err(StageError::InsufficientHypotheses {
            found: session.hypotheses.len(),
            required: config.min_valid_hypotheses,
        });
    }

    tracing::info!(
        accepted = session.hypotheses.len(),
        dropped,
        "Hypothesis generation complete"
    );
    Ok(())
}

/// Assemble the generator prompt from the opportunity and profile.
fn build_prompt(
    opportunity: &Opportunity,
    profile: &DataProfile,
    business_context: Option<&str>,
) -> String {
    let mut sections = vec![hypothesis_generation_prompt().to_string()];

    sections.push(format!(
        "Opportunity:\n- kind: {}\n- title: {}\n- description: {}\n- affected cohort: {}\n- metric (outcome column): {}\n- baseline {:.4} -> current {:.4} over {} customers\n- severity: {:?}",
        opportunity.kind,
        opportunity.title,
        opportunity.description,
        opportunity.cohort_summary(),
        opportunity.metric,
        opportunity.baseline_value,
        opportunity.current_value,
        opportunity.sample_size,
        opportunity.severity,
    ));

    let mut catalog_lines = vec![
        "Feature catalog (name | type | missing | prevalence | corr with outcome):".to_string(),
    ];
    for column in &profile.columns {
        catalog_lines.push(format!(
            "- {} | {} | {:.0}% | {} | {}",
            column.name,
            column.semantic_type,
            column.missing_fraction * 100.0,
            column
                .prevalence
                .map_or_else(|| "-".to_string(), |p| format!("{p:.2}")),
            column
                .outcome_correlation
                .map_or_else(|| "-".to_string(), |r| format!("{r:+.2}")),
        ));
    }
    sections.push(catalog_lines.join("\n"));

    if let Some(context) = business_context {
        if !context.trim().is_empty() {
            sections.push(format!("Business context:\n{context}"));
        }
    }

    sections.join("\n\n")
}
