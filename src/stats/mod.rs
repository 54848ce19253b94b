//! Statistical kernel.
//!
//! Pure operations over a [`DataTable`]:
//! - [`propensity_matching`]: matched treated/untreated comparison
//! - [`regression_adjustment`]: outcome on treatment plus controls
//! - [`granger_lag_test`]: lagged-predictor test on temporal data
//! - [`mediation_decomposition`]: direct/indirect/total effect split
//!
//! The kernel never errors on data-dependent problems. Every operation
//! returns a [`TestResult`] (or a mediation outcome) whose warnings explain
//! degraded inputs: dropped rows, imputed controls, thin samples.
//!
//! Exact p-values come from statrs distributions (normal, Student's t,
//! Fisher-Snedecor); design matrices are plain `Vec<f64>` rows solved by
//! Gaussian elimination.

#![allow(clippy::cast_precision_loss)]

mod granger;
mod mediation;
mod propensity;
mod regression;

pub use granger::granger_lag_test;
pub use mediation::{mediation_decomposition, MediationOutcome};
pub use propensity::propensity_matching;
pub use regression::regression_adjustment;

use statrs::distribution::{ContinuousCDF, FisherSnedecor, Normal, StudentsT};

use crate::data::{ColumnValues, DataTable};
use crate::domain::{ConfidenceLevel, EffectDirection, TestResult};

/// Default significance threshold.
pub const DEFAULT_ALPHA: f64 = 0.05;

/// Identification context threaded into every kernel call.
#[derive(Debug, Clone)]
pub struct TestContext {
    /// The hypothesis the result belongs to.
    pub hypothesis_id: String,
    /// Significance threshold.
    pub alpha: f64,
}

impl TestContext {
    /// Create a context with the default alpha.
    #[must_use]
    pub fn new(hypothesis_id: impl Into<String>) -> Self {
        Self {
            hypothesis_id: hypothesis_id.into(),
            alpha: DEFAULT_ALPHA,
        }
    }

    /// Override the significance threshold.
    #[must_use]
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }
}

// ============================================================================
// Aggregation rule
// ============================================================================

/// Aggregated validation verdict over a hypothesis's test results.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregateVerdict {
    /// Whether the hypothesis is validated.
    pub validated: bool,
    /// Inverse-variance-weighted mean effect size of executed tests.
    pub effect_size: f64,
    /// Confidence level derived from the aggregate effect size.
    pub confidence: ConfidenceLevel,
}

/// Decide validation from a fixed set of test results.
///
/// A hypothesis is validated iff at least one executed test is significant
/// with the expected direction and no executed test is significant with the
/// opposite direction. This is a pure function of its inputs.
#[must_use]
pub fn aggregate_verdict(expected: EffectDirection, results: &[TestResult]) -> AggregateVerdict {
    let executed: Vec<&TestResult> = results.iter().filter(|r| r.was_executed()).collect();

    let supporting = executed
        .iter()
        .any(|r| r.is_significant && r.effect_direction == expected);
    let opposing = expected != EffectDirection::None
        && executed
            .iter()
            .any(|r| r.is_significant && r.effect_direction == expected.opposite());

    let validated = supporting && !opposing && expected != EffectDirection::None;

    // Inverse-variance weighting; tests without a usable CI fall back to a
    // plain mean over the same set.
    let weighted: Vec<(f64, f64)> = executed
        .iter()
        .filter_map(|r| r.standard_error().map(|se| (r.effect_size, 1.0 / (se * se))))
        .collect();

    let effect_size = if weighted.is_empty() {
        let sizes: Vec<f64> = executed.iter().map(|r| r.effect_size).collect();
        mean(&sizes).unwrap_or(0.0)
    } else {
        let total_weight: f64 = weighted.iter().map(|(_, w)| w).sum();
        weighted.iter().map(|(e, w)| e * w).sum::<f64>() / total_weight
    };

    AggregateVerdict {
        validated,
        effect_size,
        confidence: ConfidenceLevel::from_effect_size(effect_size),
    }
}

// ============================================================================
// Shared numeric helpers
// ============================================================================

/// Mean of a slice, `None` when empty.
#[must_use]
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample variance (n - 1 denominator), `None` below two points.
#[must_use]
pub fn variance(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    Some(values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64)
}

/// Sample standard deviation.
#[must_use]
pub fn std_dev(values: &[f64]) -> Option<f64> {
    variance(values).map(f64::sqrt)
}

/// Pooled standard deviation of two groups.
#[must_use]
pub fn pooled_std_dev(a: &[f64], b: &[f64]) -> Option<f64> {
    let (va, vb) = (variance(a)?, variance(b)?);
    let (na, nb) = (a.len() as f64, b.len() as f64);
    let pooled = ((na - 1.0) * va + (nb - 1.0) * vb) / (na + nb - 2.0);
    Some(pooled.sqrt())
}

/// Pearson correlation over complete cases, `None` when undefined.
///
/// Requires at least three complete pairs and nonzero variance on both
/// sides.
#[must_use]
pub fn pearson(xs: &[Option<f64>], ys: &[Option<f64>]) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = xs
        .iter()
        .zip(ys.iter())
        .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
        .collect();

    if pairs.len() < 3 {
        return None;
    }

    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in &pairs {
        cov += (x - mean_x) * (y - mean_y);
        var_x += (x - mean_x).powi(2);
        var_y += (y - mean_y).powi(2);
    }

    if var_x <= f64::EPSILON || var_y <= f64::EPSILON {
        return None;
    }

    Some(cov / (var_x.sqrt() * var_y.sqrt()))
}

/// Two-tailed p-value from a standard normal statistic.
#[must_use]
pub fn normal_two_tailed_p(z: f64) -> f64 {
    Normal::new(0.0, 1.0).map_or(1.0, |dist| {
        (2.0 * (1.0 - dist.cdf(z.abs()))).clamp(0.0, 1.0)
    })
}

/// Two-tailed p-value from a Student's t statistic.
#[must_use]
pub fn t_two_tailed_p(t: f64, df: f64) -> f64 {
    if df < 1.0 {
        return 1.0;
    }
    StudentsT::new(0.0, 1.0, df).map_or(1.0, |dist| {
        (2.0 * (1.0 - dist.cdf(t.abs()))).clamp(0.0, 1.0)
    })
}

/// Upper-tail p-value from an F statistic.
#[must_use]
pub fn f_upper_p(f: f64, df1: f64, df2: f64) -> f64 {
    if f <= 0.0 || df1 < 1.0 || df2 < 1.0 {
        return 1.0;
    }
    FisherSnedecor::new(df1, df2).map_or(1.0, |dist| (1.0 - dist.cdf(f)).clamp(0.0, 1.0))
}

// ============================================================================
// Shared data preparation
// ============================================================================

/// Rows prepared for a treatment/outcome analysis.
#[derive(Debug, Clone)]
pub(crate) struct PreparedRows {
    /// Treatment values, complete.
    pub treatment: Vec<f64>,
    /// Outcome values, complete.
    pub outcome: Vec<f64>,
    /// Control columns, imputed; one inner vec per control, row-aligned.
    pub controls: Vec<Vec<f64>>,
    /// Data-preparation warnings.
    pub warnings: Vec<String>,
}

impl PreparedRows {
    pub(crate) fn n(&self) -> usize {
        self.outcome.len()
    }
}

/// Collect complete treatment/outcome rows, imputing controls.
///
/// Rows missing treatment or outcome are dropped with a warning; missing
/// control cells are mean-imputed (mode for the 0/1 encoding of categorical
/// controls collapses to the mean rounding) with a warning. Returns `None`
/// when a required column is absent or not numerically encodable.
pub(crate) fn prepare_rows(
    table: &DataTable,
    treatment: &str,
    outcome: &str,
    controls: &[String],
) -> Option<PreparedRows> {
    let t_col = table.encoded_numeric(treatment)?;
    let y_col = table.encoded_numeric(outcome)?;

    let mut control_cols: Vec<(String, Vec<Option<f64>>)> = Vec::new();
    let mut warnings = Vec::new();
    for name in controls {
        if let Some(values) = table.encoded_numeric(name) {
            control_cols.push((name.clone(), values));
        } else {
            warnings.push(format!("control {name} not numerically encodable, excluded"));
        }
    }

    // Keep rows where both treatment and outcome are present
    let keep: Vec<usize> = (0..table.n_rows())
        .filter(|&i| t_col[i].is_some() && y_col[i].is_some())
        .collect();

    let dropped = table.n_rows() - keep.len();
    if dropped > 0 {
        warnings.push(format!(
            "{dropped} rows dropped for missing treatment or outcome"
        ));
    }

    if keep.is_empty() {
        return Some(PreparedRows {
            treatment: Vec::new(),
            outcome: Vec::new(),
            controls: vec![Vec::new(); control_cols.len()],
            warnings,
        });
    }

    let treatment_values: Vec<f64> = keep.iter().filter_map(|&i| t_col[i]).collect();
    let outcome_values: Vec<f64> = keep.iter().filter_map(|&i| y_col[i]).collect();

    let mut control_values = Vec::with_capacity(control_cols.len());
    for (name, values) in &control_cols {
        let present: Vec<f64> = keep.iter().filter_map(|&i| values[i]).collect();
        let fill = mean(&present).unwrap_or(0.0);
        let mut imputed_count = 0usize;
        let column: Vec<f64> = keep
            .iter()
            .map(|&i| {
                values[i].unwrap_or_else(|| {
                    imputed_count += 1;
                    fill
                })
            })
            .collect();
        if imputed_count > 0 {
            warnings.push(format!(
                "{imputed_count} missing values in control {name} imputed with the mean"
            ));
        }
        control_values.push(column);
    }

    Some(PreparedRows {
        treatment: treatment_values,
        outcome: outcome_values,
        controls: control_values,
        warnings,
    })
}

/// Whether every non-missing value of a column is 0 or 1.
pub(crate) fn is_binary_column(table: &DataTable, name: &str) -> bool {
    match table.column(name).map(|c| &c.values) {
        Some(ColumnValues::Numeric(values)) => {
            let mut saw_any = false;
            for v in values.iter().flatten() {
                if *v != 0.0 && *v != 1.0 {
                    return false;
                }
                saw_any = true;
            }
            saw_any
        }
        Some(ColumnValues::Categorical(_)) => table
            .column(name)
            .is_some_and(|c| c.distinct().len() == 2),
        None => false,
    }
}
