//! Explanation stage.
//!
//! Assembles the reasoning chain deterministically from the structured
//! session data, then asks the LLM to polish the concluding sentence. Any
//! LLM failure leaves the template text in place, so this stage never
//! fails a session.

use crate::data::DataProfile;
use crate::domain::{Opportunity, ReasoningChain, ReasoningSession, ReasoningStep};
use crate::prompts::narrative_polish_prompt;
use crate::traits::{CompletionConfig, LlmClientTrait, Message};

/// Missingness fraction above which a column becomes a caveat.
const MISSINGNESS_CAVEAT_THRESHOLD: f64 = 0.3;

/// Sample size below which a caveat is attached.
const SMALL_SAMPLE_THRESHOLD: usize = 100;

/// Attach the reasoning chain to the session.
///
/// Infallible by design: the deterministic template always completes, and
/// the LLM polish is best-effort.
pub async fn generate_explanation<C: LlmClientTrait>(
    client: &C,
    opportunity: &Opportunity,
    profile: &DataProfile,
    session: &mut ReasoningSession,
) {
    let mut chain = assemble_chain(opportunity, profile, session);

    match polish_conclusion(client, &chain.conclusion).await {
        Some(polished) => chain.conclusion = polished,
        None => {
            tracing::warn!("Narrative polish unavailable, keeping the template conclusion");
        }
    }

    session.reasoning_chain = Some(chain);
}

/// Build the full chain from structured data only.
fn assemble_chain(
    opportunity: &Opportunity,
    profile: &DataProfile,
    session: &ReasoningSession,
) -> ReasoningChain {
    let mut steps: Vec<ReasoningStep> = Vec::new();

    for hypothesis in session.hypotheses.iter().filter(|h| h.is_validated()) {
        let evidence = hypothesis.dominant_result().map_or_else(
            || "no executed test".to_string(),
            |result| {
                format!(
                    "{} (p={:.4}, effect size {:+.2}, n={})",
                    result.method, result.p_value, result.effect_size, result.sample_size
                )
            },
        );
        let confidence = hypothesis
            .dominant_result()
            .map_or(0.3, |r| r.confidence.as_score());

        steps.push(ReasoningStep {
            step_number: steps.len() + 1,
            claim: format!(
                "{} drives {} in the affected cohort",
                hypothesis.cause, hypothesis.effect
            ),
            evidence,
            confidence,
            reasoning: hypothesis.mechanism.clone(),
        });
    }

    // Mediation insight: when the indirect path dominates, the surface
    // cause is not the deepest driver
    let mediated = session.hypotheses.iter().filter(|h| h.is_validated()).find(|h| {
        h.causal_structure
            .as_ref()
            .is_some_and(|s| s.indirect_effect.abs() > s.direct_effect.abs() && !s.mediators.is_empty())
    });
    if let Some(hypothesis) = mediated {
        if let Some(structure) = hypothesis.causal_structure.as_ref() {
            steps.push(ReasoningStep {
                step_number: steps.len() + 1,
                claim: format!(
                    "The effect of {} flows mainly through {}",
                    hypothesis.cause, structure.true_cause
                ),
                evidence: format!(
                    "indirect effect {:+.3} exceeds direct effect {:+.3}",
                    structure.indirect_effect, structure.direct_effect
                ),
                confidence: structure.structure_confidence,
                reasoning: format!(
                    "Mediation decomposition points at {} as the deepest controllable driver",
                    structure.true_cause
                ),
            });
        }
    }

    let primary_lever = session
        .recommended_levers
        .first()
        .map(|l| l.name.clone())
        .unwrap_or_default();
    let secondary_levers: Vec<String> = session
        .recommended_levers
        .iter()
        .skip(1)
        .take(2)
        .map(|l| l.name.clone())
        .collect();

    let expected_impact = session.recommended_levers.first().map_or_else(
        || "no measurable impact identified".to_string(),
        |lever| {
            format!(
                "about {:.0} percentage-point reduction in {} across {} affected customers",
                lever.expected_impact * 100.0,
                opportunity.metric,
                opportunity.sample_size
            )
        },
    );

    let conclusion = if primary_lever.is_empty() {
        format!(
            "No validated causal driver was found for the {} deviation; the correlations in this cohort do not survive causal testing",
            opportunity.metric
        )
    } else {
        format!(
            "The deviation in {} traces back to {}; start with: {}",
            opportunity.metric,
            session
                .validated_causes
                .first()
                .map_or("the validated drivers", String::as_str),
            primary_lever
        )
    };

    let caveats = collect_caveats(profile, session);

    #[allow(clippy::cast_precision_loss)]
    let step_count = steps.len() as f64;
    let overall_confidence = if steps.is_empty() {
        0.0
    } else {
        steps.iter().map(|s| s.confidence).sum::<f64>() / step_count
    };

    ReasoningChain {
        steps,
        conclusion,
        primary_lever,
        secondary_levers,
        expected_impact,
        overall_confidence,
        caveats,
    }
}

/// Sample-size, missingness, skipped-test, and no-evidence caveats.
fn collect_caveats(profile: &DataProfile, session: &ReasoningSession) -> Vec<String> {
    let mut caveats: Vec<String> = Vec::new();

    if profile.n_rows < SMALL_SAMPLE_THRESHOLD {
        caveats.push(format!(
            "small sample: only {} rows support these estimates",
            profile.n_rows
        ));
    }

    for column in profile.high_missingness(MISSINGNESS_CAVEAT_THRESHOLD) {
        caveats.push(format!(
            "column {} is {:.0}% missing",
            column.name,
            column.missing_fraction * 100.0
        ));
    }

    for hypothesis in &session.hypotheses {
        for result in hypothesis.test_results.iter().filter(|r| !r.was_executed()) {
            let reason = result
                .warnings
                .first()
                .map_or("skipped", String::as_str);
            caveats.push(format!(
                "{} was skipped for '{} -> {}': {}",
                result.method, hypothesis.cause, hypothesis.effect, reason
            ));
        }
    }

    if session.validated_hypotheses_count == 0 {
        caveats.push(
            "no hypothesis survived causal testing; observed correlations lack causal evidence"
                .to_string(),
        );
    }

    caveats
}

/// Best-effort LLM polish of the conclusion sentence.
async fn polish_conclusion<C: LlmClientTrait>(client: &C, conclusion: &str) -> Option<String> {
    let prompt = format!("{}\n{conclusion}", narrative_polish_prompt());
    let config = CompletionConfig::new()
        .with_max_tokens(256)
        .with_temperature(0.3);

    match client.complete(vec![Message::user(prompt)], config).await {
        Ok(response) => {
            let text = response.content.trim().to_string();
            if text.is_empty() {
                None
            } else {
                Some(text)
            }
        }
        Err(error) => {
            tracing::warn!(error = %error, "Conclusion polish failed");
            None
        }
    }
}
