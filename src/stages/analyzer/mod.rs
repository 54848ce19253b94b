//! Confounder analysis stage.
//!
//! For each hypothesis: union the generator's confounder suggestions with a
//! correlation scan over the catalog, ask the LLM to classify every
//! candidate, and assemble the preliminary causal structure and DAG. Effect
//! fields stay zero until the tester fills them.

mod parsing;

pub use parsing::{AnalyzerDraft, ClassificationDraft, RoleDraft};

use parsing::build_structure;

use crate::config::EngineConfig;
use crate::data::{DataProfile, DataTable};
use crate::domain::{CausalStructure, ReasoningSession};
use crate::error::StageError;
use crate::llm::structured::{request_structured, StructuredOptions};
use crate::prompts::confounder_classification_prompt;
use crate::stats::pearson;
use crate::traits::LlmClientTrait;

/// Structure confidence assigned when there is nothing to classify.
const BARE_STRUCTURE_CONFIDENCE: f64 = 0.5;

/// Augment every hypothesis with confounders, mediators, and a DAG.
///
/// # Errors
///
/// - [`StageError::SchemaViolation`] when the LLM cannot produce a valid
///   classification within the retry budget.
/// - [`StageError::ApiUnavailable`] on transport failures.
pub async fn analyze_confounders<C: LlmClientTrait>(
    client: &C,
    config: &EngineConfig,
    profile: &DataProfile,
    table: &DataTable,
    session: &mut ReasoningSession,
) -> Result<(), StageError> {
    for index in 0..session.hypotheses.len() {
        let hypothesis = session.hypotheses[index].clone();
        let candidates = candidate_variables(&hypothesis, profile, table, config);
        tracing::info!(
            cause = %hypothesis.cause,
            candidates = candidates.len(),
            "Classifying confounder candidates"
        );

        let structure = if candidates.is_empty() {
            let mut bare = CausalStructure::initial(&hypothesis.cause);
            bare.actionable_lever = format!("Address {}", hypothesis.cause);
            bare.structure_confidence = BARE_STRUCTURE_CONFIDENCE;
            bare
        } else {
            let prompt = build_prompt(&hypothesis, &candidates, profile);
            let options = StructuredOptions::new()
                .with_retry_budget(config.schema_retry_budget)
                .with_system_prompt("You are a rigorous causal analyst. Output JSON only.");
            let outcome = request_structured::<AnalyzerDraft, _>(client, &prompt, &options).await?;
            build_structure(&hypothesis, &outcome.value, &candidates)
        };

        let slot = &mut session.hypotheses[index];
        slot.confounders.clone_from(&structure.confounders);
        slot.mediators.clone_from(&structure.mediators);
        slot.causal_structure = Some(structure);
    }

    session.recompute_rollups();
    Ok(())
}

/// Candidate variables: generator suggestions plus the correlation scan.
///
/// The scan adds every profiled column whose absolute correlation with both
/// the cause and the effect clears the configured threshold.
fn candidate_variables(
    hypothesis: &crate::domain::Hypothesis,
    profile: &DataProfile,
    table: &DataTable,
    config: &EngineConfig,
) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::new();

    for name in hypothesis
        .confounders
        .iter()
        .chain(&hypothesis.mediators)
        .chain(&hypothesis.moderators)
    {
        push_unique(&mut candidates, hypothesis, name);
    }

    let cause_values = table.encoded_numeric(&hypothesis.cause);
    let effect_values = table.encoded_numeric(&hypothesis.effect);

    if let (Some(cause_values), Some(effect_values)) =
        (cause_values.as_deref(), effect_values.as_deref())
    {
        for column in &profile.columns {
            let Some(column_values) = table.encoded_numeric(&column.name) else {
                continue;
            };
            let with_cause = pearson(&column_values, cause_values).unwrap_or(0.0);
            let with_effect = pearson(&column_values, effect_values).unwrap_or(0.0);
            if with_cause.abs() > config.correlation_threshold
                && with_effect.abs() > config.correlation_threshold
            {
                push_unique(&mut candidates, hypothesis, &column.name);
            }
        }
    }

    candidates
}

fn push_unique(candidates: &mut Vec<String>, hypothesis: &crate::domain::Hypothesis, name: &str) {
    if name != hypothesis.cause && name != hypothesis.effect && !candidates.iter().any(|c| c == name)
    {
        candidates.push(name.to_string());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::data::{FeatureCatalog, FeatureSpec, SemanticType};
    use crate::domain::Hypothesis;
    use crate::traits::{CompletionResponse, MockLlmClientTrait, Usage};

    /// Table where `driver` correlates strongly with both cause and effect.
    fn table() -> DataTable {
        let n = 40;
        let cause: Vec<Option<f64>> = (0..n).map(|i| Some(f64::from(u8::from(i % 2 == 0)))).collect();
        let effect: Vec<Option<f64>> = cause.clone();
        let driver: Vec<Option<f64>> = cause.iter().map(|v| v.map(|x| x * 2.0 + 1.0)).collect();
        let unrelated: Vec<Option<f64>> = (0..n).map(|i| Some(f64::from(i % 7))).collect();
        DataTable::new()
            .with_numeric("late_delivery", cause)
            .unwrap()
            .with_numeric("churn_30d", effect)
            .unwrap()
            .with_numeric("driver", driver)
            .unwrap()
            .with_numeric("unrelated", unrelated)
            .unwrap()
    }

    fn profile() -> DataProfile {
        let catalog = FeatureCatalog::new(vec![
            FeatureSpec::new("late_delivery", SemanticType::Binary),
            FeatureSpec::new("driver", SemanticType::Continuous),
            FeatureSpec::new("unrelated", SemanticType::Ordinal),
        ]);
        DataProfile::profile(&table(), &catalog, "churn_30d").unwrap()
    }

    fn session_with_hypothesis() -> ReasoningSession {
        let mut session = ReasoningSession::new("opp-1");
        let mut hypothesis = Hypothesis::new(&session.id, "late_delivery", "churn_30d");
        hypothesis.confounders = vec!["driver".to_string()];
        session.hypotheses.push(hypothesis);
        session
    }

    #[test]
    fn test_candidate_variables_unions_suggestions_and_scan() {
        let session = session_with_hypothesis();
        let candidates = candidate_variables(
            &session.hypotheses[0],
            &profile(),
            &table(),
            &EngineConfig::default(),
        );
        // "driver" appears once despite being both suggested and scanned;
        // "unrelated" fails the correlation gate
        assert_eq!(candidates, vec!["driver".to_string()]);
    }

    #[tokio::test]
    async fn test_analyzer_builds_structure() {
        let mut mock = MockLlmClientTrait::new();
        mock.expect_complete().returning(|_, _| {
            Ok(CompletionResponse::new(
                r#"{
                    "classifications": [
                        {"variable": "driver", "role": "confounder", "reasoning": "r"}
                    ],
                    "true_cause": "late_delivery",
                    "proximate_cause": "late_delivery",
                    "actionable_lever": "Fix late deliveries",
                    "structure_confidence": 0.75
                }"#,
                Usage::new(10, 10),
            ))
        });

        let mut session = session_with_hypothesis();
        analyze_confounders(
            &mock,
            &EngineConfig::default(),
            &profile(),
            &table(),
            &mut session,
        )
        .await
        .unwrap();

        let hypothesis = &session.hypotheses[0];
        let structure = hypothesis.causal_structure.as_ref().unwrap();
        assert_eq!(structure.confounders, vec!["driver".to_string()]);
        assert_eq!(hypothesis.confounders, vec!["driver".to_string()]);
        assert_eq!(structure.structure_confidence, 0.75);
        assert_eq!(structure.total_effect, 0.0);
        assert!(!structure.nodes.is_empty());
    }

    #[tokio::test]
    async fn test_analyzer_no_candidates_skips_llm() {
        // No suggestions and no correlated columns: the mock must not be
        // called at all
        let mock = MockLlmClientTrait::new();

        let table = DataTable::new()
            .with_numeric(
                "late_delivery",
                vec![Some(1.0), Some(0.0), Some(1.0), Some(0.0)],
            )
            .unwrap()
            .with_numeric("churn_30d", vec![Some(1.0), Some(0.0), Some(0.0), Some(1.0)])
            .unwrap();
        let catalog = FeatureCatalog::new(vec![FeatureSpec::new(
            "late_delivery",
            SemanticType::Binary,
        )]);
        let profile = DataProfile::profile(&table, &catalog, "churn_30d").unwrap();

        let mut session = ReasoningSession::new("opp-1");
        session
            .hypotheses
            .push(Hypothesis::new(&session.id, "late_delivery", "churn_30d"));

        analyze_confounders(&mock, &EngineConfig::default(), &profile, &table, &mut session)
            .await
            .unwrap();

        let structure = session.hypotheses[0].causal_structure.as_ref().unwrap();
        assert_eq!(structure.structure_confidence, BARE_STRUCTURE_CONFIDENCE);
        assert_eq!(structure.true_cause, "late_delivery");
    }

    #[tokio::test]
    async fn test_analyzer_schema_failure_propagates() {
        let mut mock = MockLlmClientTrait::new();
        mock.expect_complete()
            .times(3)
            .returning(|_, _| Ok(CompletionResponse::new("garbage", Usage::new(1, 1))));

        let mut session = session_with_hypothesis();
        let result = analyze_confounders(
            &mock,
            &EngineConfig::default(),
            &profile(),
            &table(),
            &mut session,
        )
        .await;

        assert!(matches!(result, Err(StageError::SchemaViolation { .. })));
    }
}

/// Assemble the classification prompt for one hypothesis.
fn build_prompt(
    hypothesis: &crate::domain::Hypothesis,
    candidates: &[String],
    profile: &DataProfile,
) -> String {
    let mut sections = vec![confounder_classification_prompt().to_string()];

    sections.push(format!(
        "Hypothesis:\n- cause: {}\n- effect: {}\n- mechanism: {}",
        hypothesis.cause, hypothesis.effect, hypothesis.mechanism
    ));

    let mut lines = vec!["Candidate variables:".to_string()];
    for candidate in candidates {
        let detail = profile.get(candidate).map_or_else(String::new, |column| {
            format!(
                " ({}, {:.0}% missing, corr with outcome {})",
                column.semantic_type,
                column.missing_fraction * 100.0,
                column
                    .outcome_correlation
                    .map_or_else(|| "-".to_string(), |r| format!("{r:+.2}")),
            )
        });
        lines.push(format!("- {candidate}{detail}"));
    }
    sections.push(lines.join("\n"));

    sections.join("\n\n")
}
