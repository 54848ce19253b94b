//! Lever estimation stage.
//!
//! Deterministic: one lever per validated hypothesis, ranked by expected
//! impact weighted by confidence, deduplicated by name.

use crate::domain::{Effort, Lever, ReasoningSession};
use crate::error::StageError;
use crate::stats::aggregate_verdict;

/// Keyword-to-effort mapping for common lever families.
///
/// Matching is case-insensitive on the lever name; the first matching
/// keyword wins, otherwise effort defaults to medium.
const EFFORT_KEYWORDS: &[(&str, Effort)] = &[
    ("onboarding", Effort::Low),
    ("email", Effort::Low),
    ("notification", Effort::Low),
    ("engagement", Effort::Low),
    ("delivery", Effort::Medium),
    ("support", Effort::Medium),
    ("ticket", Effort::Medium),
    ("pricing", Effort::High),
    ("price", Effort::High),
    ("infrastructure", Effort::High),
];

/// Derive ranked levers from the validated hypotheses.
///
/// # Errors
///
/// Currently infallible; the signature matches the other stages so the
/// orchestrator treats every stage uniformly.
pub fn estimate_levers(session: &mut ReasoningSession) -> Result<(), StageError> {
    let mut levers: Vec<Lever> = Vec::new();

    for hypothesis in session.hypotheses.iter().filter(|h| h.is_validated()) {
        let verdict = aggregate_verdict(hypothesis.expected_direction, &hypothesis.test_results);

        let (name, impact) = hypothesis.causal_structure.as_ref().map_or_else(
            || (hypothesis.true_cause().to_string(), 0.0),
            |structure| {
                let name = if structure.actionable_lever.trim().is_empty() {
                    structure.true_cause.clone()
                } else {
                    structure.actionable_lever.clone()
                };
                (name, structure.total_effect.abs())
            },
        );

        let effort = infer_effort(&name);
        let mut lever = Lever::new(name, impact);
        lever.description = format!(
            "Intervene on {} to reduce {} ({})",
            hypothesis.true_cause(),
            hypothesis.effect,
            hypothesis.mechanism
        );
        lever.confidence = verdict.confidence;
        lever.effort = effort;
        lever.timeframe = timeframe_for(effort).to_string();

        tracing::info!(
            lever = %lever.name,
            impact = lever.expected_impact,
            effort = ?lever.effort,
            "Lever derived"
        );
        levers.push(lever);
    }

    // Strongest first, then dedupe by name keeping the strongest
    levers.sort_by(|a, b| {
        b.rank_score()
            .partial_cmp(&a.rank_score())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let mut deduped: Vec<Lever> = Vec::new();
    for lever in levers {
        if !deduped.iter().any(|kept| kept.name == lever.name) {
            deduped.push(lever);
        }
    }

    session.recommended_levers = deduped;
    Ok(())
}

/// Effort from the static keyword map, defaulting to medium.
fn infer_effort(name: &str) -> Effort {
    let lowered = name.to_lowercase();
    EFFORT_KEYWORDS
        .iter()
        .find(|(keyword, _)| lowered.contains(keyword))
        .map_or(Effort::Medium, |(_, effort)| *effort)
}

/// Timeframe implied by the effort band.
const fn timeframe_for(effort: Effort) -> &'static str {
    match effort {
        Effort::Low => "2 weeks",
        Effort::Medium => "4-6 weeks",
        Effort::High => "one quarter",
    }
}
