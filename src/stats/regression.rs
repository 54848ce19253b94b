//! Regression adjustment and the shared linear-model machinery.
//!
//! Ordinary least squares is solved by normal equations with Gauss-Jordan
//! inversion; logistic models use Newton-Raphson. Both operate on plain
//! `Vec<f64>` design rows with an explicit intercept column.

#![allow(clippy::cast_precision_loss, clippy::similar_names)]

use super::{
    is_binary_column, normal_two_tailed_p, prepare_rows, std_dev, t_two_tailed_p, TestContext,
};
use crate::data::DataTable;
use crate::domain::{TestMethod, TestResult};

/// Condition number above which controls are reported collinear.
const CONDITION_NUMBER_LIMIT: f64 = 30.0;

/// Newton-Raphson iteration cap for logistic fits.
const LOGISTIC_MAX_ITER: usize = 25;

/// Fit of an ordinary least squares model.
#[derive(Debug, Clone)]
pub(crate) struct OlsFit {
    /// Coefficients, intercept first.
    pub beta: Vec<f64>,
    /// Standard errors per coefficient.
    pub se: Vec<f64>,
    /// Residual sum of squares.
    pub rss: f64,
    /// Rows used.
    pub n: usize,
    /// Coefficients fitted.
    pub k: usize,
}

impl OlsFit {
    /// Residual degrees of freedom.
    pub(crate) fn df(&self) -> f64 {
        (self.n - self.k) as f64
    }
}

/// Fit an OLS model. Rows carry the intercept as their first entry.
///
/// Returns `None` for underdetermined or singular designs.
pub(crate) fn ols(y: &[f64], rows: &[Vec<f64>]) -> Option<OlsFit> {
    let n = y.len();
    if n == 0 || rows.len() != n {
        return None;
    }
    let k = rows[0].len();
    if n <= k {
        return None;
    }

    let xtx = cross_product(rows, k);
    let xty: Vec<f64> = (0..k)
        .map(|j| rows.iter().zip(y).map(|(row, yi)| row[j] * yi).sum())
        .collect();

    let inverse = invert(&xtx)?;
    let beta: Vec<f64> = (0..k)
        .map(|i| (0..k).map(|j| inverse[i][j] * xty[j]).sum())
        .collect();

    let rss: f64 = rows
        .iter()
        .zip(y)
        .map(|(row, yi)| {
            let fitted: f64 = row.iter().zip(&beta).map(|(x, b)| x * b).sum();
            (yi - fitted).powi(2)
        })
        .sum();

    let sigma2 = rss / (n - k) as f64;
    let se: Vec<f64> = (0..k)
        .map(|i| (sigma2 * inverse[i][i]).max(0.0).sqrt())
        .collect();

    Some(OlsFit {
        beta,
        se,
        rss,
        n,
        k,
    })
}

/// Fit of a logistic model.
#[derive(Debug, Clone)]
pub(crate) struct LogisticFit {
    /// Coefficients, intercept first.
    pub beta: Vec<f64>,
    /// Standard errors per coefficient.
    pub se: Vec<f64>,
    /// Whether Newton-Raphson converged.
    pub converged: bool,
}

/// Fit a logistic model by Newton-Raphson.
///
/// Returns `None` when the Hessian becomes singular (perfect separation or
/// collinear predictors).
pub(crate) fn logistic(y: &[f64], rows: &[Vec<f64>]) -> Option<LogisticFit> {
    let n = y.len();
    if n == 0 || rows.len() != n {
        return None;
    }
    let k = rows[0].len();
    if n <= k {
        return None;
    }

    let mut beta = vec![0.0; k];
    let mut converged = false;
    let mut inverse_hessian = None;

    for _ in 0..LOGISTIC_MAX_ITER {
        let probabilities: Vec<f64> = rows
            .iter()
            .map(|row| {
                let eta: f64 = row.iter().zip(&beta).map(|(x, b)| x * b).sum();
                sigmoid(eta).clamp(1e-9, 1.0 - 1e-9)
            })
            .collect();

        let gradient: Vec<f64> = (0..k)
            .map(|j| {
                rows.iter()
                    .zip(y)
                    .zip(&probabilities)
                    .map(|((row, yi), p)| row[j] * (yi - p))
                    .sum()
            })
            .collect();

        let mut hessian = vec![vec![0.0; k]; k];
        for (row, p) in rows.iter().zip(&probabilities) {
            let w = p * (1.0 - p);
            for i in 0..k {
                for j in i..k {
                    hessian[i][j] += w * row[i] * row[j];
                }
            }
        }
        for i in 0..k {
            for j in 0..i {
                hessian[i][j] = hessian[j][i];
            }
        }

        let inv = invert(&hessian)?;
        let step: Vec<f64> = (0..k)
            .map(|i| (0..k).map(|j| inv[i][j] * gradient[j]).sum())
            .collect();

        for (b, s) in beta.iter_mut().zip(&step) {
            *b += s;
        }

        inverse_hessian = Some(inv);
        if step.iter().map(|s| s.abs()).fold(0.0, f64::max) < 1e-8 {
            converged = true;
            break;
        }
    }

    let inv = inverse_hessian?;
    let se: Vec<f64> = (0..k).map(|i| inv[i][i].max(0.0).sqrt()).collect();

    Some(LogisticFit {
        beta,
        se,
        converged,
    })
}

fn sigmoid(eta: f64) -> f64 {
    1.0 / (1.0 + (-eta).exp())
}

/// X'X of design rows.
fn cross_product(rows: &[Vec<f64>], k: usize) -> Vec<Vec<f64>> {
    let mut xtx = vec![vec![0.0; k]; k];
    for row in rows {
        for i in 0..k {
            for j in i..k {
                xtx[i][j] += row[i] * row[j];
            }
        }
    }
    for i in 0..k {
        for j in 0..i {
            xtx[i][j] = xtx[j][i];
        }
    }
    xtx
}

/// Gauss-Jordan inversion with partial pivoting.
fn invert(matrix: &[Vec<f64>]) -> Option<Vec<Vec<f64>>> {
    let k = matrix.len();
    let mut work: Vec<Vec<f64>> = matrix
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let mut extended = row.clone();
            extended.extend((0..k).map(|j| f64::from(u8::from(i == j))));
            extended
        })
        .collect();

    for col in 0..k {
        let pivot_row = (col..k)
            .max_by(|&a, &b| {
                work[a][col]
                    .abs()
                    .partial_cmp(&work[b][col].abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })?;
        if work[pivot_row][col].abs() < 1e-12 {
            return None;
        }
        work.swap(col, pivot_row);

        let pivot = work[col][col];
        for value in &mut work[col] {
            *value /= pivot;
        }

        for row in 0..k {
            if row == col {
                continue;
            }
            let factor = work[row][col];
            if factor == 0.0 {
                continue;
            }
            let pivot_values = work[col].clone();
            for (value, pivot_value) in work[row].iter_mut().zip(&pivot_values) {
                *value -= factor * pivot_value;
            }
        }
    }

    Some(work.into_iter().map(|row| row[k..].to_vec()).collect())
}

/// Condition number of the standardized predictor cross-product.
///
/// Power iteration for the largest eigenvalue, power iteration on the
/// inverse for the smallest. Returns `None` when the matrix is singular.
fn condition_number(columns: &[Vec<f64>]) -> Option<f64> {
    let k = columns.len();
    if k < 2 {
        return Some(1.0);
    }
    let n = columns[0].len();
    if n == 0 {
        return None;
    }

    // Standardize each column so scale differences do not masquerade as
    // collinearity
    let standardized: Vec<Vec<f64>> = columns
        .iter()
        .map(|col| {
            let m = super::mean(col).unwrap_or(0.0);
            let s = std_dev(col).unwrap_or(0.0);
            if s <= f64::EPSILON {
                vec![0.0; n]
            } else {
                col.iter().map(|v| (v - m) / s).collect()
            }
        })
        .collect();

    let mut gram = vec![vec![0.0; k]; k];
    for i in 0..k {
        for j in i..k {
            let dot: f64 = standardized[i]
                .iter()
                .zip(&standardized[j])
                .map(|(a, b)| a * b)
                .sum();
            gram[i][j] = dot;
            gram[j][i] = dot;
        }
    }

    let lambda_max = power_iteration(&gram)?;
    let inverse = invert(&gram)?;
    let lambda_min = power_iteration(&inverse).map(|l| 1.0 / l)?;

    if lambda_min <= 0.0 {
        return None;
    }
    Some((lambda_max / lambda_min).sqrt())
}

fn power_iteration(matrix: &[Vec<f64>]) -> Option<f64> {
    let k = matrix.len();
    let mut vector = vec![1.0; k];
    let mut eigenvalue = 0.0;

    for _ in 0..100 {
        let next: Vec<f64> = (0..k)
            .map(|i| (0..k).map(|j| matrix[i][j] * vector[j]).sum())
            .collect();
        let norm = next.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm <= f64::EPSILON {
            return None;
        }
        vector = next.iter().map(|v| v / norm).collect();
        eigenvalue = norm;
    }

    Some(eigenvalue)
}

/// Regression adjustment: outcome on treatment plus controls.
///
/// Linear for continuous outcomes; logistic with the marginal effect at the
/// means for binary outcomes. Collinear controls (condition number above 30)
/// and degraded inputs are reported as warnings, never as errors.
#[must_use]
pub fn regression_adjustment(
    table: &DataTable,
    treatment: &str,
    outcome: &str,
    controls: &[String],
    ctx: &TestContext,
) -> TestResult {
    let Some(prepared) = prepare_rows(table, treatment, outcome, controls) else {
        return TestResult::skipped(
            &ctx.hypothesis_id,
            TestMethod::RegressionAdjustment,
            format!("column {treatment} or {outcome} missing or not numerically encodable"),
        );
    };

    let n = prepared.n();
    let k = prepared.controls.len() + 2;
    if n <= k + 1 {
        let mut result = TestResult::skipped(
            &ctx.hypothesis_id,
            TestMethod::RegressionAdjustment,
            format!("only {n} usable rows for {k} coefficients"),
        );
        for warning in prepared.warnings {
            result = result.with_warning(warning);
        }
        return result;
    }

    let rows: Vec<Vec<f64>> = (0..n)
        .map(|i| {
            let mut row = Vec::with_capacity(k);
            row.push(1.0);
            row.push(prepared.treatment[i]);
            for control in &prepared.controls {
                row.push(control[i]);
            }
            row
        })
        .collect();

    let mut warnings = prepared.warnings.clone();

    // Collinearity check over treatment + controls
    let mut predictor_columns = vec![prepared.treatment.clone()];
    predictor_columns.extend(prepared.controls.iter().cloned());
    match condition_number(&predictor_columns) {
        Some(cond) if cond > CONDITION_NUMBER_LIMIT => {
            warnings.push(format!(
                "controls are collinear (condition number {cond:.0})"
            ));
        }
        Some(_) => {}
        None => warnings.push("predictor matrix is singular".to_string()),
    }

    let outcome_sd = std_dev(&prepared.outcome).unwrap_or(0.0);
    let outcome_is_binary = is_binary_column(table, outcome);

    let fitted = if outcome_is_binary {
        fit_logistic_marginal(&prepared.outcome, &rows)
    } else {
        fit_linear(&prepared.outcome, &rows)
    };

    let Some((point, se, p_value)) = fitted else {
        let mut result = TestResult::skipped(
            &ctx.hypothesis_id,
            TestMethod::RegressionAdjustment,
            "model fit failed (singular design or separation)",
        );
        for warning in warnings {
            result = result.with_warning(warning);
        }
        return result;
    };

    let effect_size = if outcome_sd > f64::EPSILON {
        point / outcome_sd
    } else {
        0.0
    };

    let mut result = TestResult::executed(
        &ctx.hypothesis_id,
        TestMethod::RegressionAdjustment,
        point,
        effect_size,
        p_value,
        (point - 1.96 * se, point + 1.96 * se),
        n,
        ctx.alpha,
    );
    for warning in warnings {
        result = result.with_warning(warning);
    }
    result
}

/// Linear treatment coefficient: (estimate, se, p).
fn fit_linear(y: &[f64], rows: &[Vec<f64>]) -> Option<(f64, f64, f64)> {
    let fit = ols(y, rows)?;
    let beta = fit.beta[1];
    let se = fit.se[1];
    if se <= f64::EPSILON {
        return Some((beta, se, 1.0));
    }
    let t = beta / se;
    Some((beta, se, t_two_tailed_p(t, fit.df())))
}

/// Logistic treatment effect on the probability scale: (estimate, se, p).
///
/// Marginal effect at the means via the delta method.
fn fit_logistic_marginal(y: &[f64], rows: &[Vec<f64>]) -> Option<(f64, f64, f64)> {
    let fit = logistic(y, rows)?;
    let k = rows[0].len();
    let n = rows.len() as f64;

    let mean_row: Vec<f64> = (0..k)
        .map(|j| rows.iter().map(|row| row[j]).sum::<f64>() / n)
        .collect();
    let eta: f64 = mean_row.iter().zip(&fit.beta).map(|(x, b)| x * b).sum();
    let p_hat = sigmoid(eta);
    let density = p_hat * (1.0 - p_hat);

    let marginal = fit.beta[1] * density;
    let marginal_se = fit.se[1] * density;

    if fit.se[1] <= f64::EPSILON {
        return Some((marginal, marginal_se, 1.0));
    }
    let z = fit.beta[1] / fit.se[1];
    Some((marginal, marginal_se, normal_two_tailed_p(z)))
}
