//! Model records
//!
//! This module defines the authoritative per-model state owned by the
//! registry. Callers only ever see cloned snapshots of a [`ModelRecord`].

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use common::{ClassLabel, ErrorKind, ModelType};
use estimators::EstimatorSpec;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    /// Record inserted, job not started
    Creating,
    /// First fit in progress
    Training,
    /// Servable
    Ready,
    /// Refit in progress
    Retraining,
    /// Last job failed
    Failed,
    /// Removed from the registry
    Deleted,
}

impl ModelStatus {
    /// Whether a training job is running in this state
    pub fn is_busy(&self) -> bool {
        matches!(self, ModelStatus::Creating | ModelStatus::Training | ModelStatus::Retraining)
    }

    /// Stable name used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelStatus::Creating => "creating",
            ModelStatus::Training => "training",
            ModelStatus::Ready => "ready",
            ModelStatus::Retraining => "retraining",
            ModelStatus::Failed => "failed",
            ModelStatus::Deleted => "deleted",
        }
    }
}

impl fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the last job failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureReason {
    /// Error classification
    pub kind: ErrorKind,
    /// Error message
    pub message: String,
}

/// Authoritative state of one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    /// Unique identifier
    pub model_id: String,
    /// Validated estimator configuration
    pub spec: EstimatorSpec,
    /// Lifecycle state
    pub status: ModelStatus,
    /// Dataset of the last successful fit, or of the pending first fit
    pub dataset_id: String,
    /// Target column of the last successful fit
    pub target_column: Option<String>,
    /// Feature columns the estimator expects, in order
    pub feature_names: Vec<String>,
    /// Class labels the estimator predicts
    pub classes: Vec<ClassLabel>,
    /// Evaluation metrics of the last successful fit
    pub metrics: BTreeMap<String, f64>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last state change
    pub updated_at: DateTime<Utc>,
    /// 0 until the first successful fit, then bumped on every successful retrain
    pub version: u64,
    /// Failure of the last job, cleared on success
    pub last_error: Option<FailureReason>,
    /// Advisory messages from best-effort calls of the last job
    pub warnings: Vec<String>,
    /// Tracker run of the last tracked job
    pub tracker_run_id: Option<String>,
}

impl ModelRecord {
    /// Creates a record for a model that has not been fitted yet
    pub fn new(model_id: String, spec: EstimatorSpec, dataset_id: String, target_column: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            model_id,
            spec,
            status: ModelStatus::Creating,
            dataset_id,
            target_column,
            feature_names: Vec::new(),
            classes: Vec::new(),
            metrics: BTreeMap::new(),
            created_at: now,
            updated_at: now,
            version: 0,
            last_error: None,
            warnings: Vec::new(),
            tracker_run_id: None,
        }
    }

    /// Model family
    pub fn model_type(&self) -> ModelType {
        self.spec.model_type()
    }

    /// Moves to `status` and stamps the change
    pub fn transition(&mut self, status: ModelStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::HyperparameterBag;

    #[test]
    fn test_new_record_defaults() {
        let spec = EstimatorSpec::from_bag(ModelType::RandomForest, &HyperparameterBag::new()).unwrap();
        let record = ModelRecord::new("m1".into(), spec, "iris".into(), None);
        assert_eq!(record.status, ModelStatus::Creating);
        assert_eq!(record.version, 0);
        assert_eq!(record.model_type(), ModelType::RandomForest);
        assert!(record.status.is_busy());
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_string(&ModelStatus::Retraining).unwrap(), "\"retraining\"");
        assert_eq!(ModelStatus::Ready.to_string(), "ready");
        assert!(!ModelStatus::Failed.is_busy());
    }
}
