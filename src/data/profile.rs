//! Data profiler.
//!
//! Produces the compact per-column profile that feeds the generator prompt
//! and the analyzer's confounder scan. Profiling is the engine's data-quality
//! gate: a missing or degenerate outcome column fails the session before any
//! hypothesis generation.

use serde::{Deserialize, Serialize};

use super::catalog::{FeatureCatalog, SemanticType};
use super::table::{ColumnValues, DataTable};
use crate::error::DataQualityError;
use crate::stats::pearson;

/// Distinct-value ceiling for treating a numeric column as ordinal.
const ORDINAL_MAX_DISTINCT: usize = 10;

/// Profile of a single column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnProfile {
    /// Column name.
    pub name: String,
    /// Semantic type observed in the data.
    pub semantic_type: SemanticType,
    /// Fraction of missing cells.
    pub missing_fraction: f64,
    /// Fraction of positive cells (binary columns only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prevalence: Option<f64>,
    /// Distinct-value count (categorical columns only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cardinality: Option<usize>,
    /// Pearson correlation with the outcome column, when computable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome_correlation: Option<f64>,
}

/// Profile of the whole dataset relative to one outcome column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataProfile {
    /// The outcome column the profile is oriented around.
    pub outcome: String,
    /// Row count.
    pub n_rows: usize,
    /// Per-column profiles, in catalog order.
    pub columns: Vec<ColumnProfile>,
}

impl DataProfile {
    /// Profile a table against a catalog and outcome column.
    ///
    /// Catalog entries absent from the table are skipped with a warning;
    /// downstream stages treat hypotheses that reference them as invalid.
    ///
    /// # Errors
    ///
    /// - [`DataQualityError::EmptyTable`] when the table has no rows.
    /// - [`DataQualityError::MissingOutcome`] when the outcome column is
    ///   absent.
    /// - [`DataQualityError::DegenerateOutcome`] when the outcome has fewer
    ///   than two unique non-missing values.
    pub fn profile(
        table: &DataTable,
        catalog: &FeatureCatalog,
        outcome: &str,
    ) -> Result<Self, DataQualityError> {
        if table.is_empty() {
            return Err(DataQualityError::EmptyTable);
        }

        let outcome_column = table
            .column(outcome)
            .ok_or_else(|| DataQualityError::MissingOutcome {
                column: outcome.to_string(),
            })?;

        if outcome_column.distinct().len() < 2 {
            return Err(DataQualityError::DegenerateOutcome {
                column: outcome.to_string(),
            });
        }

        let outcome_numeric = table.encoded_numeric(outcome);

        let mut columns = Vec::with_capacity(catalog.len());
        for spec in catalog.features() {
            let Some(column) = table.column(&spec.name) else {
                tracing::warn!(column = %spec.name, "Catalog column absent from dataset, skipping");
                continue;
            };

            let semantic_type = observed_type(&column.values, &column.distinct());
            let encoded = table.encoded_numeric(&spec.name);

            let prevalence = if semantic_type == SemanticType::Binary {
                encoded.as_deref().and_then(mean_present)
            } else {
                None
            };

            let cardinality = match &column.values {
                ColumnValues::Categorical(_) => Some(column.distinct().len()),
                ColumnValues::Numeric(_) => None,
            };

            let outcome_correlation = if spec.name == outcome {
                Some(1.0)
            } else {
                match (encoded.as_deref(), outcome_numeric.as_deref()) {
                    (Some(xs), Some(ys)) => pearson(xs, ys),
                    _ => None,
                }
            };

            columns.push(ColumnProfile {
                name: spec.name.clone(),
                semantic_type,
                missing_fraction: column.values.missing_fraction(),
                prevalence,
                cardinality,
                outcome_correlation,
            });
        }

        Ok(Self {
            outcome: outcome.to_string(),
            n_rows: table.n_rows(),
            columns,
        })
    }

    /// Look up a column profile by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ColumnProfile> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Columns with missingness above the given fraction.
    #[must_use]
    pub fn high_missingness(&self, threshold: f64) -> Vec<&ColumnProfile> {
        self.columns
            .iter()
            .filter(|c| c.missing_fraction > threshold)
            .collect()
    }
}

fn observed_type(values: &ColumnValues, distinct: &[String]) -> SemanticType {
    match values {
        ColumnValues::Numeric(cells) => {
            let non_missing: Vec<f64> = cells.iter().flatten().copied().collect();
            let is_01 = non_missing.iter().all(|v| *v == 0.0 || *v == 1.0);
            if distinct.len() <= 2 && is_01 {
                SemanticType::Binary
            } else if distinct.len() <= ORDINAL_MAX_DISTINCT
                && non_missing.iter().all(|v| v.fract() == 0.0)
            {
                SemanticType::Ordinal
            } else {
                SemanticType::Continuous
            }
        }
        ColumnValues::Categorical(_) => {
            if distinct.len() == 2 {
                SemanticType::Binary
            } else {
                SemanticType::Categorical
            }
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean_present(cells: &[Option<f64>]) -> Option<f64> {
    let present: Vec<f64> = cells.iter().flatten().copied().collect();
    if present.is_empty() {
        return None;
    }
    Some(present.iter().sum::<f64>() / present.len() as f64)
}
