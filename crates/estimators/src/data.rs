//! Training and prediction inputs
//!
//! Converts a [`DataTable`] into a numeric feature matrix plus class labels,
//! and prediction requests into a matrix aligned with a model's features.

use std::collections::{BTreeSet, HashMap};

use common::{ClassLabel, DataTable, Error, Result};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Smallest dataset a fit is attempted on
pub const MIN_TRAINING_ROWS: usize = 4;

/// Fraction of rows held out for evaluation
pub const TEST_FRACTION: f64 = 0.2;

/// Numeric training data extracted from a table
#[derive(Debug, Clone)]
pub struct TrainingData {
    /// Feature column names, in matrix column order
    pub feature_names: Vec<String>,
    /// Name of the target column
    pub target_column: String,
    /// Row-major feature matrix
    pub features: Array2<f64>,
    /// One label per row
    pub labels: Vec<ClassLabel>,
}

impl TrainingData {
    /// Extracts features and labels from `table`
    ///
    /// The target is `target_column`, or the last column when `None`. An
    /// unknown target is an [`Error::InvalidArgument`]; non-numeric or missing
    /// feature values and missing targets are an [`Error::TrainingFailure`].
    pub fn from_table(table: &DataTable, target_column: Option<&str>) -> Result<Self> {
        table.validate()?;

        let target_idx = match target_column {
            Some(name) => table.column_index(name).ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "target column '{}' not found; available columns: {}",
                    name,
                    table.columns.join(", ")
                ))
            })?,
            None => table.columns.len() - 1,
        };

        let feature_idx: Vec<usize> = (0..table.columns.len()).filter(|i| *i != target_idx).collect();
        if feature_idx.is_empty() {
            return Err(Error::TrainingFailure("dataset has no feature columns".to_string()));
        }

        let mut features = Array2::<f64>::zeros((table.row_count(), feature_idx.len()));
        let mut labels = Vec::with_capacity(table.row_count());

        for (r, row) in table.rows.iter().enumerate() {
            for (c, &col) in feature_idx.iter().enumerate() {
                features[[r, c]] = numeric_cell(&row[col]).ok_or_else(|| {
                    Error::TrainingFailure(format!(
                        "feature column '{}' has a non-numeric value at row {}: {}",
                        table.columns[col], r, row[col]
                    ))
                })?;
            }
            let label = ClassLabel::from_cell(&row[target_idx]).ok_or_else(|| {
                Error::TrainingFailure(format!("target value missing at row {}", r))
            })?;
            labels.push(label);
        }

        Ok(Self {
            feature_names: feature_idx.iter().map(|&i| table.columns[i].clone()).collect(),
            target_column: table.columns[target_idx].clone(),
            features,
            labels,
        })
    }

    /// Number of rows
    pub fn n_samples(&self) -> usize {
        self.labels.len()
    }

    /// Number of feature columns
    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Distinct labels in sorted order
    pub fn classes(&self) -> Vec<ClassLabel> {
        self.labels.iter().cloned().collect::<BTreeSet<_>>().into_iter().collect()
    }

    /// Label of each row as an index into `classes`
    pub fn encode_labels(&self, classes: &[ClassLabel]) -> Vec<usize> {
        self.labels
            .iter()
            .map(|l| classes.binary_search(l).unwrap_or(0))
            .collect()
    }
}

/// Seeded shuffle and train/test split of `n` row indices
///
/// The test side gets `ceil(n * TEST_FRACTION)` rows; both sides get at
/// least one row.
pub fn train_test_split(n: usize, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let test_size = ((n as f64) * TEST_FRACTION).ceil() as usize;
    let test_size = test_size.clamp(1, n.saturating_sub(1).max(1));
    let test = indices.split_off(n - test_size.min(n));
    (indices, test)
}

/// Rows of `matrix` selected by `indices`
pub fn select_rows(matrix: &Array2<f64>, indices: &[usize]) -> Array2<f64> {
    matrix.select(ndarray::Axis(0), indices)
}

/// Prediction request payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredictInput {
    /// Positional rows in the model's feature order
    Rows(Vec<Vec<f64>>),
    /// Named records, reordered by the model's feature names
    Records(Vec<HashMap<String, f64>>),
}

impl PredictInput {
    /// Number of rows requested
    pub fn len(&self) -> usize {
        match self {
            PredictInput::Rows(rows) => rows.len(),
            PredictInput::Records(records) => records.len(),
        }
    }

    /// Whether the request carries no rows
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Builds the feature matrix for a model with `feature_names`
    pub fn to_matrix(&self, feature_names: &[String]) -> Result<Array2<f64>> {
        let width = feature_names.len();
        let mut matrix = Array2::<f64>::zeros((self.len(), width));

        match self {
            PredictInput::Rows(rows) => {
                for (r, row) in rows.iter().enumerate() {
                    if row.len() != width {
                        return Err(Error::PredictionFailure(format!(
                            "row {} has {} features, model expects {} ({})",
                            r,
                            row.len(),
                            width,
                            feature_names.join(", ")
                        )));
                    }
                    for (c, value) in row.iter().enumerate() {
                        matrix[[r, c]] = finite(*value, r, &feature_names[c])?;
                    }
                }
            }
            PredictInput::Records(records) => {
                for (r, record) in records.iter().enumerate() {
                    if let Some(extra) = record.keys().find(|k| !feature_names.contains(k)) {
                        return Err(Error::PredictionFailure(format!(
                            "record {} has unknown feature '{}'",
                            r, extra
                        )));
                    }
                    for (c, name) in feature_names.iter().enumerate() {
                        let value = record.get(name).ok_or_else(|| {
                            Error::PredictionFailure(format!("record {} is missing feature '{}'", r, name))
                        })?;
                        matrix[[r, c]] = finite(*value, r, name)?;
                    }
                }
            }
        }

        Ok(matrix)
    }
}

fn finite(value: f64, row: usize, feature: &str) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(Error::PredictionFailure(format!(
            "row {} has a non-finite value for '{}'",
            row, feature
        )))
    }
}

fn numeric_cell(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table() -> DataTable {
        DataTable::new(
            vec!["a".into(), "label".into(), "b".into()],
            vec![
                vec![json!(1.0), json!("x"), json!(true)],
                vec![json!(2), json!("y"), json!(false)],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_explicit_target() {
        let data = TrainingData::from_table(&table(), Some("label")).unwrap();
        assert_eq!(data.feature_names, vec!["a", "b"]);
        assert_eq!(data.features[[0, 1]], 1.0);
        assert_eq!(data.features[[1, 0]], 2.0);
        assert_eq!(data.classes(), vec![ClassLabel::Text("x".into()), ClassLabel::Text("y".into())]);
        assert_eq!(data.encode_labels(&data.classes()), vec![0, 1]);
    }

    #[test]
    fn test_default_target_is_last_column() {
        let data = TrainingData::from_table(&table(), None);
        // "label" becomes a feature and is not numeric.
        assert!(matches!(data, Err(Error::TrainingFailure(_))));
    }

    #[test]
    fn test_unknown_target() {
        let result = TrainingData::from_table(&table(), Some("species"));
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_split_sizes() {
        let (train, test) = train_test_split(150, 42);
        assert_eq!(test.len(), 30);
        assert_eq!(train.len(), 120);

        let (train, test) = train_test_split(7, 1);
        assert_eq!(test.len(), 2);
        assert_eq!(train.len(), 5);

        let (train, test) = train_test_split(2, 1);
        assert_eq!((train.len(), test.len()), (1, 1));

        let mut all: Vec<usize> = train_test_split(10, 3).0;
        all.extend(train_test_split(10, 3).1);
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_predict_input_alignment() {
        let names = vec!["a".to_string(), "b".to_string()];

        let rows = PredictInput::Rows(vec![vec![1.0, 2.0]]);
        assert_eq!(rows.to_matrix(&names).unwrap()[[0, 1]], 2.0);

        let narrow = PredictInput::Rows(vec![vec![1.0]]);
        assert!(matches!(narrow.to_matrix(&names), Err(Error::PredictionFailure(_))));

        let records: PredictInput = serde_json::from_value(json!([{"b": 5.0, "a": 4.0}])).unwrap();
        let m = records.to_matrix(&names).unwrap();
        assert_eq!((m[[0, 0]], m[[0, 1]]), (4.0, 5.0));

        let missing: PredictInput = serde_json::from_value(json!([{"a": 1.0}])).unwrap();
        assert!(matches!(missing.to_matrix(&names), Err(Error::PredictionFailure(_))));

        let extra: PredictInput = serde_json::from_value(json!([{"a": 1.0, "b": 2.0, "c": 3.0}])).unwrap();
        assert!(matches!(extra.to_matrix(&names), Err(Error::PredictionFailure(_))));
    }
}
