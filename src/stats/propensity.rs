//! Propensity-score matching.
//!
//! Fits a logistic model of treatment on confounders, matches each treated
//! row to its nearest untreated rows by predicted propensity within a
//! caliper, and tests the matched outcome differences.

#![allow(clippy::cast_precision_loss)]

use super::regression::logistic;
use super::{pooled_std_dev, prepare_rows, std_dev, t_two_tailed_p, TestContext};
use crate::data::DataTable;
use crate::domain::{TestMethod, TestResult};

/// Caliper width as a multiple of the propensity-score SD.
const CALIPER_SD_MULTIPLE: f64 = 0.2;

/// Matched-pair count below which the result is flagged.
const MIN_MATCHED_PAIRS: usize = 30;

/// Minimum propensity-range overlap between arms.
const MIN_OVERLAP: f64 = 0.1;

/// Missingness fraction above which a confounder is flagged.
const CONFOUNDER_MISSINGNESS_LIMIT: f64 = 0.5;

/// Propensity matching of treated to untreated rows.
///
/// `point_estimate` is the average treatment effect on the treated (ATT),
/// `p_value` comes from a paired t-test on matched outcome differences, and
/// `effect_size` standardizes the ATT by the pooled outcome SD. Warnings
/// flag thin matching (< 30 pairs), weak common support (propensity overlap
/// below 0.1), and confounders with > 50% missingness.
#[must_use]
pub fn propensity_matching(
    table: &DataTable,
    treatment: &str,
    outcome: &str,
    confounders: &[String],
    n_neighbors: usize,
    ctx: &TestContext,
) -> TestResult {
    let Some(prepared) = prepare_rows(table, treatment, outcome, confounders) else {
        return TestResult::skipped(
            &ctx.hypothesis_id,
            TestMethod::PropensityMatching,
            format!("column {treatment} or {outcome} missing or not numerically encodable"),
        );
    };

    let mut warnings = prepared.warnings.clone();

    for name in confounders {
        if let Some(column) = table.column(name) {
            let missing = column.values.missing_fraction();
            if missing > CONFOUNDER_MISSINGNESS_LIMIT {
                warnings.push(format!(
                    "confounder {name} is {:.0}% missing",
                    missing * 100.0
                ));
            }
        }
    }

    let n = prepared.n();
    let k = prepared.controls.len() + 1;
    if n <= k + 1 {
        let mut result = TestResult::skipped(
            &ctx.hypothesis_id,
            TestMethod::PropensityMatching,
            format!("only {n} usable rows"),
        );
        for warning in warnings {
            result = result.with_warning(warning);
        }
        return result;
    }

    // Propensity model: treatment on confounders
    let rows: Vec<Vec<f64>> = (0..n)
        .map(|i| {
            let mut row = Vec::with_capacity(k);
            row.push(1.0);
            for confounder in &prepared.controls {
                row.push(confounder[i]);
            }
            row
        })
        .collect();

    let Some(fit) = logistic(&prepared.treatment, &rows) else {
        let mut result = TestResult::skipped(
            &ctx.hypothesis_id,
            TestMethod::PropensityMatching,
            "propensity model fit failed (separation or collinearity)",
        );
        for warning in warnings {
            result = result.with_warning(warning);
        }
        return result;
    };

    let scores: Vec<f64> = rows
        .iter()
        .map(|row| {
            let eta: f64 = row.iter().zip(&fit.beta).map(|(x, b)| x * b).sum();
            1.0 / (1.0 + (-eta).exp())
        })
        .collect();

    let treated: Vec<usize> = (0..n).filter(|&i| prepared.treatment[i] == 1.0).collect();
    let untreated: Vec<usize> = (0..n).filter(|&i| prepared.treatment[i] == 0.0).collect();

    if treated.is_empty() || untreated.is_empty() {
        let mut result = TestResult::skipped(
            &ctx.hypothesis_id,
            TestMethod::PropensityMatching,
            "one treatment arm is empty",
        );
        for warning in warnings {
            result = result.with_warning(warning);
        }
        return result;
    }

    // Common support: how much the two propensity ranges overlap
    let range = |idx: &[usize]| {
        let values: Vec<f64> = idx.iter().map(|&i| scores[i]).collect();
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        (min, max)
    };
    let (t_min, t_max) = range(&treated);
    let (c_min, c_max) = range(&untreated);
    let overlap = (t_max.min(c_max) - t_min.max(c_min)).max(0.0);
    let degenerate_scores = std_dev(&scores).unwrap_or(0.0) <= f64::EPSILON;
    if overlap < MIN_OVERLAP && !degenerate_scores {
        warnings.push(format!(
            "weak common support: propensity overlap {overlap:.2} below {MIN_OVERLAP}"
        ));
    }

    let caliper = if degenerate_scores {
        f64::INFINITY
    } else {
        CALIPER_SD_MULTIPLE * std_dev(&scores).unwrap_or(0.0)
    };

    // Nearest untreated neighbors per treated row, within the caliper
    let neighbors = n_neighbors.max(1);
    let mut differences: Vec<f64> = Vec::with_capacity(treated.len());
    for &i in &treated {
        let mut candidates: Vec<(f64, usize)> = untreated
            .iter()
            .map(|&j| ((scores[i] - scores[j]).abs(), j))
            .filter(|(distance, _)| *distance <= caliper)
            .collect();
        if candidates.is_empty() {
            continue;
        }
        candidates.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        candidates.truncate(neighbors);

        let matched_mean: f64 = candidates
            .iter()
            .map(|&(_, j)| prepared.outcome[j])
            .sum::<f64>()
            / candidates.len() as f64;
        differences.push(prepared.outcome[i] - matched_mean);
    }

    if differences.len() < 2 {
        let mut result = TestResult::skipped(
            &ctx.hypothesis_id,
            TestMethod::PropensityMatching,
            format!("only {} matched pairs inside the caliper", differences.len()),
        );
        for warning in warnings {
            result = result.with_warning(warning);
        }
        return result;
    }

    if differences.len() < MIN_MATCHED_PAIRS {
        warnings.push(format!(
            "fewer than {MIN_MATCHED_PAIRS} matched pairs ({})",
            differences.len()
        ));
    }

    let att = differences.iter().sum::<f64>() / differences.len() as f64;
    let diff_sd = std_dev(&differences).unwrap_or(0.0);
    let se = if diff_sd > 0.0 {
        diff_sd / (differences.len() as f64).sqrt()
    } else {
        0.0
    };

    let p_value = if se > f64::EPSILON {
        let t = att / se;
        t_two_tailed_p(t, (differences.len() - 1) as f64)
    } else {
        1.0
    };

    let treated_outcomes: Vec<f64> = treated.iter().map(|&i| prepared.outcome[i]).collect();
    let untreated_outcomes: Vec<f64> = untreated.iter().map(|&i| prepared.outcome[i]).collect();
    let pooled = pooled_std_dev(&treated_outcomes, &untreated_outcomes).unwrap_or(0.0);
    let effect_size = if pooled > f64::EPSILON { att / pooled } else { 0.0 };

    let mut result = TestResult::executed(
        &ctx.hypothesis_id,
        TestMethod::PropensityMatching,
        att,
        effect_size,
        p_value,
        (att - 1.96 * se, att + 1.96 * se),
        differences.len(),
        ctx.alpha,
    );
    for warning in warnings {
        result = result.with_warning(warning);
    }
    result
}
