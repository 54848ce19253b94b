//! Causal testing stage.
//!
//! Runs each hypothesis's declared methods through the statistical kernel
//! under the feasibility rules, triggers mediation for hypotheses that
//! carry mediators, and records the validation verdict from the
//! aggregation rule. Purely synchronous: no LLM involvement.
//!
//! Ordering: hypotheses in declared order, methods in declared order. Each
//! test only appends its own result; the session-level rollups are
//! recomputed once at the end by the single writer.

use std::time::Instant;

use crate::config::EngineConfig;
use crate::data::DataTable;
use crate::domain::{CausalStructure, ReasoningSession, TestMethod, TestResult};
use crate::error::StageError;
use crate::stats::{
    aggregate_verdict, granger_lag_test, is_binary_column, mediation_decomposition,
    propensity_matching, regression_adjustment, TestContext,
};

/// Lag depth for the Granger test.
const GRANGER_LAGS: usize = 2;

/// Run every feasible declared test and set each hypothesis's verdict.
///
/// # Errors
///
/// Returns [`StageError::InvalidValue`] only on internal invariant
/// violations (a verdict recorded twice); data problems never error.
pub fn run_causal_tests(
    config: &EngineConfig,
    table: &DataTable,
    session: &mut ReasoningSession,
) -> Result<(), StageError> {
    for index in 0..session.hypotheses.len() {
        run_hypothesis_tests(config, table, session, index)?;
    }

    session.recompute_rollups();
    tracing::info!(
        validated = session.validated_hypotheses_count,
        total = session.hypotheses_count,
        confidence = session.confidence_score,
        "Causal testing complete"
    );
    Ok(())
}

fn run_hypothesis_tests(
    config: &EngineConfig,
    table: &DataTable,
    session: &mut ReasoningSession,
    index: usize,
) -> Result<(), StageError> {
    let hypothesis = session.hypotheses[index].clone();
    let ctx = TestContext::new(hypothesis.id.clone()).with_alpha(config.alpha);

    let mut results: Vec<TestResult> = Vec::with_capacity(hypothesis.test_methods.len());
    for method in &hypothesis.test_methods {
        let started = Instant::now();
        let result = match method {
            TestMethod::GrangerCausality => {
                if table.has_time_index() {
                    granger_lag_test(table, &hypothesis.cause, &hypothesis.effect, GRANGER_LAGS, &ctx)
                } else {
                    TestResult::skipped(
                        &ctx.hypothesis_id,
                        TestMethod::GrangerCausality,
                        "cross-sectional dataset has no time index",
                    )
                }
            }
            TestMethod::PropensityMatching => run_matching(config, table, &hypothesis, &ctx),
            TestMethod::RegressionAdjustment => {
                let mut result = regression_adjustment(
                    table,
                    &hypothesis.cause,
                    &hypothesis.effect,
                    &hypothesis.confounders,
                    &ctx,
                );
                // Below the comfortable floor the fit still runs, flagged
                if table.n_rows() < config.min_rows_regression {
                    result = result.with_warning(format!(
                        "sample size {} below the {} recommended for regression",
                        table.n_rows(),
                        config.min_rows_regression
                    ));
                }
                result
            }
            unsupported => TestResult::skipped(
                &ctx.hypothesis_id,
                *unsupported,
                format!("{unsupported} is not implemented by the engine"),
            ),
        };

        let result = enforce_budget(result, &started, config.test_budget_ms);
        tracing::info!(
            method = %result.method,
            significant = result.is_significant,
            p = result.p_value,
            "Test finished"
        );
        results.push(result);
    }

    // Mediation runs once per (hypothesis, mediator) pair and feeds the
    // causal structure rather than the result list
    let mediation = run_mediation(table, &hypothesis, &ctx);

    let slot = &mut session.hypotheses[index];
    slot.test_results.extend(results);

    if let Some((direct, indirect)) = mediation {
        let structure = slot
            .causal_structure
            .get_or_insert_with(|| CausalStructure::initial(&hypothesis.cause));
        structure.direct_effect = direct;
        structure.indirect_effect = indirect;
        structure.total_effect = direct + indirect;
    }

    let verdict = aggregate_verdict(slot.expected_direction, &slot.test_results);
    slot.record_verdict(verdict.validated)
        .map_err(|e| StageError::InvalidValue {
            field: "validated".to_string(),
            reason: e.to_string(),
        })?;

    Ok(())
}

/// Propensity matching with the binarizable-treatment rule.
fn run_matching(
    config: &EngineConfig,
    table: &DataTable,
    hypothesis: &crate::domain::Hypothesis,
    ctx: &TestContext,
) -> TestResult {
    let (view, binarize_warning) = if is_binary_column(table, &hypothesis.cause) {
        (None, None)
    } else if let Some((derived, threshold)) = table.binarize_at_median(&hypothesis.cause) {
        (
            Some(derived),
            Some(format!(
                "treatment {} binarized at its median ({threshold})",
                hypothesis.cause
            )),
        )
    } else {
        return TestResult::skipped(
            &ctx.hypothesis_id,
            TestMethod::PropensityMatching,
            format!("treatment {} is not binary or binarizable", hypothesis.cause),
        );
    };
    let effective = view.as_ref().unwrap_or(table);

    // Feasibility: both arms need enough rows
    let arm_counts = effective.encoded_numeric(&hypothesis.cause).map(|values| {
        let treated = values.iter().flatten().filter(|v| **v == 1.0).count();
        let untreated = values.iter().flatten().filter(|v| **v == 0.0).count();
        (treated, untreated)
    });
    if let Some((treated, untreated)) = arm_counts {
        if treated < config.min_rows_per_arm || untreated < config.min_rows_per_arm {
            let mut result = TestResult::skipped(
                &ctx.hypothesis_id,
                TestMethod::PropensityMatching,
                format!(
                    "fewer than {} matched pairs achievable ({treated} treated / {untreated} untreated)",
                    config.min_rows_per_arm
                ),
            );
            if let Some(warning) = binarize_warning {
                result = result.with_warning(warning);
            }
            return result;
        }
    }

    let mut result = propensity_matching(
        effective,
        &hypothesis.cause,
        &hypothesis.effect,
        &hypothesis.confounders,
        config.match_neighbors,
        ctx,
    );
    if let Some(warning) = binarize_warning {
        result = result.with_warning(warning);
    }
    result
}

/// Mediation per declared mediator; returns (direct, indirect) when any ran.
fn run_mediation(
    table: &DataTable,
    hypothesis: &crate::domain::Hypothesis,
    ctx: &TestContext,
) -> Option<(f64, f64)> {
    if hypothesis.mediators.is_empty() {
        return None;
    }

    let mut directs: Vec<f64> = Vec::new();
    let mut indirect_sum = 0.0;
    for mediator in &hypothesis.mediators {
        let outcome = mediation_decomposition(
            table,
            &hypothesis.cause,
            mediator,
            &hypothesis.effect,
            &hypothesis.confounders,
            ctx,
        );
        if outcome.was_executed() {
            tracing::info!(
                mediator = %mediator,
                direct = outcome.direct_effect,
                indirect = outcome.indirect_effect,
                "Mediation decomposition finished"
            );
            directs.push(outcome.direct_effect);
            indirect_sum += outcome.indirect_effect;
        } else {
            tracing::warn!(
                mediator = %mediator,
                warnings = ?outcome.warnings,
                "Mediation decomposition skipped"
            );
        }
    }

    if directs.is_empty() {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let direct = directs.iter().sum::<f64>() / directs.len() as f64;
    Some((direct, indirect_sum))
}

/// Apply the soft wall-clock budget to a finished test.
fn enforce_budget(mut result: TestResult, started: &Instant, budget_ms: u64) -> TestResult {
    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    if elapsed_ms > budget_ms {
        result.is_significant = false;
        result
            .warnings
            .push(format!("test exceeded its {budget_ms}ms budget ({elapsed_ms}ms)"));
    }
    result
}
