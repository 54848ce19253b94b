//! Granger-style lag test.
//!
//! Tests whether lagged values of one series improve prediction of another
//! beyond the other's own lags. Only meaningful for temporally indexed data;
//! the tester is responsible for skipping this method on cross-sectional
//! tables.

#![allow(clippy::cast_precision_loss)]

use super::regression::ols;
use super::{f_upper_p, std_dev, TestContext};
use crate::data::DataTable;
use crate::domain::{TestMethod, TestResult};

/// Lagged-predictor test of `x` on `y`.
///
/// Fits the restricted model (y on its own lags) and the unrestricted model
/// (adding x lags), then F-tests the improvement. `point_estimate` is the
/// sum of the x-lag coefficients, so its sign carries the direction of the
/// association.
#[must_use]
pub fn granger_lag_test(
    table: &DataTable,
    x: &str,
    y: &str,
    lags: usize,
    ctx: &TestContext,
) -> TestResult {
    if !table.has_time_index() {
        return TestResult::skipped(
            &ctx.hypothesis_id,
            TestMethod::GrangerCausality,
            "dataset has no ordered time index",
        );
    }

    let lags = lags.max(1);
    let (Some(x_col), Some(y_col)) = (table.encoded_numeric(x), table.encoded_numeric(y)) else {
        return TestResult::skipped(
            &ctx.hypothesis_id,
            TestMethod::GrangerCausality,
            format!("column {x} or {y} missing or not numerically encodable"),
        );
    };

    // Complete cases only, preserving row order
    let pairs: Vec<(f64, f64)> = x_col
        .iter()
        .zip(&y_col)
        .filter_map(|(xv, yv)| Some(((*xv)?, (*yv)?)))
        .collect();

    let usable = pairs.len().saturating_sub(lags);
    // The unrestricted model spends 2 * lags + 1 coefficients
    if usable < 2 * lags + 5 {
        return TestResult::skipped(
            &ctx.hypothesis_id,
            TestMethod::GrangerCausality,
            format!("only {usable} usable observations for {lags} lags"),
        );
    }

    let targets: Vec<f64> = pairs[lags..].iter().map(|(_, yv)| *yv).collect();

    let restricted_rows: Vec<Vec<f64>> = (lags..pairs.len())
        .map(|t| {
            let mut row = vec![1.0];
            for lag in 1..=lags {
                row.push(pairs[t - lag].1);
            }
            row
        })
        .collect();

    let unrestricted_rows: Vec<Vec<f64>> = (lags..pairs.len())
        .map(|t| {
            let mut row = vec![1.0];
            for lag in 1..=lags {
                row.push(pairs[t - lag].1);
            }
            for lag in 1..=lags {
                row.push(pairs[t - lag].0);
            }
            row
        })
        .collect();

    let (Some(restricted), Some(unrestricted)) =
        (ols(&targets, &restricted_rows), ols(&targets, &unrestricted_rows))
    else {
        return TestResult::skipped(
            &ctx.hypothesis_id,
            TestMethod::GrangerCausality,
            "lagged design is singular",
        );
    };

    let df2 = unrestricted.df();
    let improvement = (restricted.rss - unrestricted.rss).max(0.0);
    let f_statistic = if unrestricted.rss > f64::EPSILON && df2 > 0.0 {
        (improvement / lags as f64) / (unrestricted.rss / df2)
    } else {
        0.0
    };
    let p_value = f_upper_p(f_statistic, lags as f64, df2);

    // Direction: the summed x-lag coefficients
    let x_betas = &unrestricted.beta[1 + lags..];
    let point_estimate: f64 = x_betas.iter().sum();
    let x_ses = &unrestricted.se[1 + lags..];
    let sum_se = x_ses.iter().map(|se| se * se).sum::<f64>().sqrt();

    // Effect size: share of restricted residual variance explained by x lags
    let effect_size = if restricted.rss > f64::EPSILON {
        let signed = (improvement / restricted.rss).sqrt();
        if point_estimate < 0.0 {
            -signed
        } else {
            signed
        }
    } else {
        0.0
    };

    let y_sd = std_dev(&targets).unwrap_or(0.0);
    let mut result = TestResult::executed(
        &ctx.hypothesis_id,
        TestMethod::GrangerCausality,
        point_estimate,
        effect_size,
        p_value,
        (point_estimate - 1.96 * sum_se, point_estimate + 1.96 * sum_se),
        targets.len(),
        ctx.alpha,
    );
    if y_sd <= f64::EPSILON {
        result = result.with_warning("target series has no variance".to_string());
    }
    result
}
