//! Mediation decomposition.
//!
//! Product-of-coefficients method on two regressions:
//!
//! 1. mediator ~ treatment + confounders, giving the path `a`
//! 2. outcome ~ treatment + mediator + confounders, giving the mediator
//!    path `b` and the direct effect `c'`
//!
//! The indirect effect is `a * b` with a Sobel standard error; the total
//! effect is `c' + a * b`.

#![allow(clippy::cast_precision_loss)]

use super::regression::ols;
use super::{normal_two_tailed_p, prepare_rows, TestContext};
use crate::data::DataTable;

/// Outcome of one mediation decomposition.
#[derive(Debug, Clone, PartialEq)]
pub struct MediationOutcome {
    /// Effect of treatment on outcome holding the mediator fixed (`c'`).
    pub direct_effect: f64,
    /// Effect transmitted through the mediator (`a * b`).
    pub indirect_effect: f64,
    /// Direct plus indirect.
    pub total_effect: f64,
    /// 95% confidence interval for the indirect effect (Sobel).
    pub indirect_ci: (f64, f64),
    /// Sobel-test p-value for the indirect effect.
    pub p_value: f64,
    /// Whether direct and indirect effects share a sign.
    pub sign_consistent: bool,
    /// Rows that entered both regressions.
    pub sample_size: usize,
    /// Data-preparation and fit warnings.
    pub warnings: Vec<String>,
}

impl MediationOutcome {
    fn degenerate(reason: impl Into<String>) -> Self {
        Self {
            direct_effect: 0.0,
            indirect_effect: 0.0,
            total_effect: 0.0,
            indirect_ci: (0.0, 0.0),
            p_value: 1.0,
            sign_consistent: true,
            sample_size: 0,
            warnings: vec![reason.into()],
        }
    }

    /// Whether the decomposition actually ran.
    #[must_use]
    pub const fn was_executed(&self) -> bool {
        self.sample_size > 0
    }
}

/// Decompose the treatment effect through one mediator.
///
/// Never errors: degraded inputs produce a zeroed outcome whose warnings
/// explain what went wrong.
#[must_use]
pub fn mediation_decomposition(
    table: &DataTable,
    treatment: &str,
    mediator: &str,
    outcome: &str,
    confounders: &[String],
    _ctx: &TestContext,
) -> MediationOutcome {
    if table.encoded_numeric(mediator).is_none() {
        return MediationOutcome::degenerate(format!(
            "mediator {mediator} missing or not numerically encodable"
        ));
    }

    // The mediator rides along as a control so rows align across both fits
    let mut with_mediator = vec![mediator.to_string()];
    with_mediator.extend(confounders.iter().cloned());

    let Some(prepared) = prepare_rows(table, treatment, outcome, &with_mediator) else {
        return MediationOutcome::degenerate(format!(
            "column {treatment}, {mediator}, or {outcome} missing or not numerically encodable"
        ));
    };

    let n = prepared.n();
    let k_outcome = prepared.controls.len() + 2;
    if n <= k_outcome + 1 {
        let mut outcome_result =
            MediationOutcome::degenerate(format!("only {n} usable rows for mediation"));
        outcome_result.warnings.extend(prepared.warnings);
        return outcome_result;
    }

    let mediator_values = &prepared.controls[0];
    let confounder_values = &prepared.controls[1..];

    // Fit 1: mediator on treatment (+ confounders) -> a
    let mediator_rows: Vec<Vec<f64>> = (0..n)
        .map(|i| {
            let mut row = vec![1.0, prepared.treatment[i]];
            for confounder in confounder_values {
                row.push(confounder[i]);
            }
            row
        })
        .collect();

    // Fit 2: outcome on treatment + mediator (+ confounders) -> c', b
    let outcome_rows: Vec<Vec<f64>> = (0..n)
        .map(|i| {
            let mut row = vec![1.0, prepared.treatment[i], mediator_values[i]];
            for confounder in confounder_values {
                row.push(confounder[i]);
            }
            row
        })
        .collect();

    let (Some(mediator_fit), Some(outcome_fit)) = (
        ols(mediator_values, &mediator_rows),
        ols(&prepared.outcome, &outcome_rows),
    ) else {
        let mut outcome_result =
            MediationOutcome::degenerate("mediation regression is singular");
        outcome_result.warnings.extend(prepared.warnings);
        return outcome_result;
    };

    let a = mediator_fit.beta[1];
    let se_a = mediator_fit.se[1];
    let direct = outcome_fit.beta[1];
    let b = outcome_fit.beta[2];
    let se_b = outcome_fit.se[2];

    let indirect = a * b;
    let sobel_se = (a * a * se_b * se_b + b * b * se_a * se_a).sqrt();
    let p_value = if sobel_se > f64::EPSILON {
        normal_two_tailed_p(indirect / sobel_se)
    } else {
        1.0
    };

    MediationOutcome {
        direct_effect: direct,
        indirect_effect: indirect,
        total_effect: direct + indirect,
        indirect_ci: (indirect - 1.96 * sobel_se, indirect + 1.96 * sobel_se),
        p_value,
        sign_consistent: direct * indirect >= 0.0,
        sample_size: n,
        warnings: prepared.warnings,
    }
}
