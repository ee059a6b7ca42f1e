//! Estimator registry implementation
//!
//! This module provides the [`EstimatorRegistry`]: the single entry point the
//! lifecycle service uses to list model types, validate hyperparameters, fit
//! and predict.

use std::collections::BTreeMap;
use std::time::Instant;

use common::{ClassLabel, Error, HyperparameterBag, ModelType, Result};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::data::{self, PredictInput, TrainingData, MIN_TRAINING_ROWS};
use crate::forest::ForestModel;
use crate::logistic::LogisticModel;
use crate::metrics::classification_metrics;
use crate::schema::{self, ModelTypeInfo};
use crate::spec::EstimatorSpec;

/// Fitted parameters of one estimator family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FittedEstimator {
    LogisticRegression(LogisticModel),
    RandomForest(ForestModel),
}

/// A fitted, servable model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    /// Model family
    pub model_type: ModelType,
    /// Feature names in input order
    pub feature_names: Vec<String>,
    /// Column the model predicts
    pub target_column: String,
    /// Class labels, indexed by the estimator's class indices
    pub classes: Vec<ClassLabel>,
    /// Fitted parameters
    pub estimator: FittedEstimator,
}

/// Result of a successful fit
#[derive(Debug, Clone)]
pub struct FitOutcome {
    /// Model fitted on the train split
    pub model: TrainedModel,
    /// Evaluation metrics on the held-out split
    pub metrics: BTreeMap<String, f64>,
    /// Rows used for fitting
    pub train_rows: usize,
    /// Rows used for evaluation
    pub test_rows: usize,
}

/// Catalogue of model types and the fit / predict entry point
#[derive(Debug, Clone)]
pub struct EstimatorRegistry {
    types: Vec<ModelTypeInfo>,
}

impl Default for EstimatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EstimatorRegistry {
    /// Creates a registry with every supported model type
    pub fn new() -> Self {
        Self {
            types: schema::catalogue(),
        }
    }

    /// Supported model types with their schemas
    pub fn list_types(&self) -> &[ModelTypeInfo] {
        &self.types
    }

    /// Resolves a model type name or alias
    pub fn resolve_type(&self, model_type: &str) -> Result<ModelType> {
        model_type.parse::<ModelType>().map_err(|_| {
            let known: Vec<&str> = self.types.iter().map(|t| t.name.as_str()).collect();
            Error::InvalidHyperparameters(format!(
                "unknown model type '{}'; supported: {}",
                model_type,
                known.join(", ")
            ))
        })
    }

    /// Validates `hyperparameters` for `model_type` into a typed spec
    pub fn validate(&self, model_type: &str, hyperparameters: &HyperparameterBag) -> Result<EstimatorSpec> {
        let model_type = self.resolve_type(model_type)?;
        EstimatorSpec::from_bag(model_type, hyperparameters)
    }

    /// Fits `spec` on a seeded 80/20 split of `data` and evaluates it
    ///
    /// Blocking and CPU-bound; callers run it off the async runtime. The
    /// token is polled between iterations and trees.
    pub fn fit(&self, spec: &EstimatorSpec, data: &TrainingData, cancel: &CancellationToken) -> Result<FitOutcome> {
        let n_samples = data.n_samples();
        if n_samples < MIN_TRAINING_ROWS {
            return Err(Error::TrainingFailure(format!(
                "dataset has {} rows, at least {} are required",
                n_samples, MIN_TRAINING_ROWS
            )));
        }

        let classes = data.classes();
        if classes.len() < 2 {
            return Err(Error::TrainingFailure(format!(
                "target column '{}' has fewer than two classes",
                data.target_column
            )));
        }
        let encoded = data.encode_labels(&classes);

        let (train_idx, test_idx) = data::train_test_split(n_samples, spec.random_state());
        let x_train = data::select_rows(&data.features, &train_idx);
        let y_train: Vec<usize> = train_idx.iter().map(|&i| encoded[i]).collect();
        let x_test = data::select_rows(&data.features, &test_idx);
        let y_test: Vec<usize> = test_idx.iter().map(|&i| encoded[i]).collect();

        let distinct_train = y_train.iter().collect::<std::collections::BTreeSet<_>>().len();
        if distinct_train < 2 {
            return Err(Error::TrainingFailure(
                "training split contains a single class; provide more rows per class".to_string(),
            ));
        }

        let started = Instant::now();
        let estimator = match spec {
            EstimatorSpec::LogisticRegression(params) => FittedEstimator::LogisticRegression(
                LogisticModel::fit(&x_train, &y_train, classes.len(), params, cancel)?,
            ),
            EstimatorSpec::RandomForest(params) => FittedEstimator::RandomForest(
                ForestModel::fit(&x_train, &y_train, classes.len(), params, cancel)?,
            ),
        };

        let model = TrainedModel {
            model_type: spec.model_type(),
            feature_names: data.feature_names.clone(),
            target_column: data.target_column.clone(),
            classes,
            estimator,
        };

        let y_pred = model.predict_indices(&x_test);
        let metrics = classification_metrics(&y_test, &y_pred);

        info!(
            model_type = %spec.model_type(),
            train_rows = train_idx.len(),
            test_rows = test_idx.len(),
            accuracy = metrics.get("accuracy").copied().unwrap_or_default(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Estimator fitted"
        );

        Ok(FitOutcome {
            model,
            metrics,
            train_rows: train_idx.len(),
            test_rows: test_idx.len(),
        })
    }

    /// Predicts one label per input row
    pub fn predict(&self, model: &TrainedModel, input: &PredictInput) -> Result<Vec<ClassLabel>> {
        if input.is_empty() {
            return Err(Error::PredictionFailure("no rows to predict".to_string()));
        }
        let x = input.to_matrix(&model.feature_names)?;
        let labels = model
            .predict_indices(&x)
            .into_iter()
            .map(|idx| {
                model.classes.get(idx).cloned().ok_or_else(|| {
                    Error::PredictionFailure(format!("estimator produced unknown class index {}", idx))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        debug!(rows = labels.len(), "Prediction complete");
        Ok(labels)
    }
}

impl TrainedModel {
    fn predict_indices(&self, x: &ndarray::Array2<f64>) -> Vec<usize> {
        match &self.estimator {
            FittedEstimator::LogisticRegression(m) => m.predict(x),
            FittedEstimator::RandomForest(m) => m.predict(x),
        }
    }
}
