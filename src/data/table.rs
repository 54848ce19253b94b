//! The tabular view the engine analyzes.
//!
//! A [`DataTable`] is a set of equally sized named columns, each numeric or
//! categorical, with per-cell missingness. An optional time-index column
//! marks the table as temporally ordered (rows are assumed sorted by it),
//! which gates the Granger test.

use serde::{Deserialize, Serialize};

use crate::error::DataQualityError;

/// Cell values for one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnValues {
    /// Numeric cells; `None` is a missing value.
    Numeric(Vec<Option<f64>>),
    /// Categorical cells; `None` is a missing value.
    Categorical(Vec<Option<String>>),
}

impl ColumnValues {
    /// Number of cells.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Numeric(v) => v.len(),
            Self::Categorical(v) => v.len(),
        }
    }

    /// Whether the column has no cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fraction of missing cells.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn missing_fraction(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        let missing = match self {
            Self::Numeric(v) => v.iter().filter(|c| c.is_none()).count(),
            Self::Categorical(v) => v.iter().filter(|c| c.is_none()).count(),
        };
        missing as f64 / self.len() as f64
    }
}

/// A named column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Cell values.
    pub values: ColumnValues,
}

impl Column {
    /// Create a numeric column.
    #[must_use]
    pub fn numeric(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            values: ColumnValues::Numeric(values),
        }
    }

    /// Create a categorical column.
    #[must_use]
    pub fn categorical(name: impl Into<String>, values: Vec<Option<String>>) -> Self {
        Self {
            name: name.into(),
            values: ColumnValues::Categorical(values),
        }
    }

    /// Distinct non-missing values, as display strings.
    #[must_use]
    pub fn distinct(&self) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        match &self.values {
            ColumnValues::Numeric(v) => {
                for cell in v.iter().flatten() {
                    let s = format!("{cell}");
                    if !seen.contains(&s) {
                        seen.push(s);
                    }
                }
            }
            ColumnValues::Categorical(v) => {
                for cell in v.iter().flatten() {
                    if !seen.contains(cell) {
                        seen.push(cell.clone());
                    }
                }
            }
        }
        seen.sort();
        seen
    }
}

/// A read-only table of named columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataTable {
    columns: Vec<Column>,
    n_rows: usize,
    time_index: Option<String>,
}

impl DataTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column.
    ///
    /// The first column fixes the row count; later columns must match it.
    ///
    /// # Errors
    ///
    /// Returns [`DataQualityError::ColumnLengthMismatch`] on disagreeing
    /// lengths.
    pub fn push_column(&mut self, column: Column) -> Result<(), DataQualityError> {
        if self.columns.is_empty() {
            self.n_rows = column.values.len();
        } else if column.values.len() != self.n_rows {
            return Err(DataQualityError::ColumnLengthMismatch {
                column: column.name,
                expected: self.n_rows,
                actual: column.values.len(),
            });
        }
        self.columns.push(column);
        Ok(())
    }

    /// Builder-style numeric column.
    ///
    /// # Errors
    ///
    /// Returns [`DataQualityError::ColumnLengthMismatch`] on disagreeing
    /// lengths.
    pub fn with_numeric(
        mut self,
        name: impl Into<String>,
        values: Vec<Option<f64>>,
    ) -> Result<Self, DataQualityError> {
        self.push_column(Column::numeric(name, values))?;
        Ok(self)
    }

    /// Builder-style categorical column.
    ///
    /// # Errors
    ///
    /// Returns [`DataQualityError::ColumnLengthMismatch`] on disagreeing
    /// lengths.
    pub fn with_categorical(
        mut self,
        name: impl Into<String>,
        values: Vec<Option<String>>,
    ) -> Result<Self, DataQualityError> {
        self.push_column(Column::categorical(name, values))?;
        Ok(self)
    }

    /// Mark a column as the time index (rows assumed sorted by it).
    #[must_use]
    pub fn with_time_index(mut self, column: impl Into<String>) -> Self {
        self.time_index = Some(column.into());
        self
    }

    /// Number of rows.
    #[must_use]
    pub const fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Number of columns.
    #[must_use]
    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    /// Whether the table has no rows.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.n_rows == 0
    }

    /// Look up a column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Whether a column exists.
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// All column names, in declared order.
    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// The time-index column name, if any.
    #[must_use]
    pub fn time_index(&self) -> Option<&str> {
        self.time_index.as_deref()
    }

    /// Whether the table carries an ordered time index.
    #[must_use]
    pub fn has_time_index(&self) -> bool {
        self.time_index
            .as_deref()
            .is_some_and(|name| self.has_column(name))
    }

    /// Derive a table whose named numeric column is binarized at its median.
    ///
    /// Cells at or below the median become 0, cells above become 1; missing
    /// cells stay missing. Returns the derived table and the threshold, or
    /// `None` when the column is absent, non-numeric, or all-missing.
    #[must_use]
    pub fn binarize_at_median(&self, name: &str) -> Option<(Self, f64)> {
        let column = self.column(name)?;
        let ColumnValues::Numeric(values) = &column.values else {
            return None;
        };

        let mut present: Vec<f64> = values.iter().flatten().copied().collect();
        if present.is_empty() {
            return None;
        }
        present.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let median = present[present.len() / 2];

        let binarized: Vec<Option<f64>> = values
            .iter()
            .map(|cell| cell.map(|v| f64::from(u8::from(v > median))))
            .collect();

        let mut derived = self.clone();
        for column in &mut derived.columns {
            if column.name == name {
                column.values = ColumnValues::Numeric(binarized);
                break;
            }
        }
        Some((derived, median))
    }

    /// Numeric view of a column.
    ///
    /// Numeric columns are returned as-is. Categorical columns with exactly
    /// two distinct values are encoded 0/1 by sorted order. Returns `None`
    /// for absent columns and categorical columns with other cardinalities.
    #[must_use]
    pub fn encoded_numeric(&self, name: &str) -> Option<Vec<Option<f64>>> {
        let column = self.column(name)?;
        match &column.values {
            ColumnValues::Numeric(v) => Some(v.clone()),
            ColumnValues::Categorical(v) => {
                let distinct = column.distinct();
                if distinct.len() != 2 {
                    return None;
                }
                let one = &distinct[1];
                Some(
                    v.iter()
                        .map(|cell| cell.as_ref().map(|s| f64::from(u8::from(s == one))))
                        .collect(),
                )
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_table() -> DataTable {
        DataTable::new()
            .with_numeric("churn_30d", vec![Some(1.0), Some(0.0), None, Some(1.0)])
            .unwrap()
            .with_categorical(
                "channel",
                vec![
                    Some("Referral".to_string()),
                    Some("Paid".to_string()),
                    Some("Referral".to_string()),
                    None,
                ],
            )
            .unwrap()
    }

    #[test]
    fn test_push_column_sets_row_count() {
        let table = sample_table();
        assert_eq!(table.n_rows(), 4);
        assert_eq!(table.n_columns(), 2);
        assert!(!table.is_empty());
    }

    #[test]
    fn test_push_column_length_mismatch() {
        let result = sample_table().with_numeric("extra", vec![Some(1.0)]);
        assert!(matches!(
            result,
            Err(DataQualityError::ColumnLengthMismatch {
                expected: 4,
                actual: 1,
                ..
            })
        ));
    }

    #[test]
    fn test_column_lookup() {
        let table = sample_table();
        assert!(table.has_column("churn_30d"));
        assert!(!table.has_column("unknown"));
        assert_eq!(table.column_names(), vec!["churn_30d", "channel"]);
    }

    #[test]
    fn test_missing_fraction() {
        let table = sample_table();
        let churn = table.column("churn_30d").unwrap();
        assert_eq!(churn.values.missing_fraction(), 0.25);
    }

    #[test]
    fn test_time_index() {
        let table = sample_table();
        assert!(!table.has_time_index());

        let with_index = DataTable::new()
            .with_numeric("week", vec![Some(1.0), Some(2.0)])
            .unwrap()
            .with_time_index("week");
        assert!(with_index.has_time_index());
        assert_eq!(with_index.time_index(), Some("week"));

        // A time index naming an absent column does not count
        let dangling = DataTable::new()
            .with_numeric("x", vec![Some(1.0)])
            .unwrap()
            .with_time_index("week");
        assert!(!dangling.has_time_index());
    }

    #[test]
    fn test_encoded_numeric_passthrough() {
        let table = sample_table();
        let encoded = table.encoded_numeric("churn_30d").unwrap();
        assert_eq!(encoded, vec![Some(1.0), Some(0.0), None, Some(1.0)]);
    }

    #[test]
    fn test_encoded_numeric_binary_categorical() {
        let table = sample_table();
        // Sorted distinct: ["Paid", "Referral"]; Referral encodes to 1
        let encoded = table.encoded_numeric("channel").unwrap();
        assert_eq!(encoded, vec![Some(1.0), Some(0.0), Some(1.0), None]);
    }

    #[test]
    fn test_encoded_numeric_high_cardinality_is_none() {
        let table = DataTable::new()
            .with_categorical(
                "plan",
                vec![
                    Some("basic".to_string()),
                    Some("pro".to_string()),
                    Some("enterprise".to_string()),
                ],
            )
            .unwrap();
        assert!(table.encoded_numeric("plan").is_none());
        assert!(table.encoded_numeric("absent").is_none());
    }

    #[test]
    fn test_distinct_sorted() {
        let table = sample_table();
        assert_eq!(
            table.column("channel").unwrap().distinct(),
            vec!["Paid".to_string(), "Referral".to_string()]
        );
    }

    #[test]
    fn test_binarize_at_median() {
        let table = DataTable::new()
            .with_numeric("spend", vec![Some(10.0), Some(20.0), Some(30.0), None])
            .unwrap();
        let (derived, threshold) = table.binarize_at_median("spend").unwrap();
        assert_eq!(threshold, 20.0);
        let encoded = derived.encoded_numeric("spend").unwrap();
        assert_eq!(encoded, vec![Some(0.0), Some(0.0), Some(1.0), None]);
        // The source table is untouched
        assert_eq!(
            table.encoded_numeric("spend").unwrap()[2],
            Some(30.0)
        );
    }

    #[test]
    fn test_binarize_rejects_categorical() {
        let table = sample_table();
        assert!(table.binarize_at_median("channel").is_none());
        assert!(table.binarize_at_median("absent").is_none());
    }

    #[test]
    fn test_serde_round_trip() {
        let table = sample_table().with_time_index("churn_30d");
        let json = serde_json::to_string(&table).unwrap();
        let back: DataTable = serde_json::from_str(&json).unwrap();
        assert_eq!(table, back);
    }
}
