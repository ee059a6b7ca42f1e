//! REST request and response bodies

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::{ClassLabel, DataTable, DatasetFormat, Error, HyperparameterBag, Result};
use estimators::PredictInput;
use gateways::table_codec;
use model_manager::{FailureReason, ModelRecord, ModelStatus};
use serde::{Deserialize, Serialize};

/// Body of `POST /api/models/train`
#[derive(Debug, Clone, Deserialize)]
pub struct TrainBody {
    pub model_id: Option<String>,
    pub model_type: String,
    pub hyperparameters: Option<HyperparameterBag>,
    pub dataset_id: String,
    pub target_column: Option<String>,
    pub timeout_secs: Option<f64>,
}

/// Body of `PUT /api/models/:model_id/retrain`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetrainBody {
    pub hyperparameters: Option<HyperparameterBag>,
    pub dataset_id: Option<String>,
    pub target_column: Option<String>,
    pub timeout_secs: Option<f64>,
}

/// Body of `POST /api/models/predict`
#[derive(Debug, Clone, Deserialize)]
pub struct PredictBody {
    pub model_id: String,
    /// Rows as arrays of numbers or as objects keyed by feature name
    pub data: PredictInput,
    pub timeout_secs: Option<f64>,
}

/// Query of `GET /api/models`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListModelsQuery {
    #[serde(default)]
    pub include_unready: bool,
}

/// Body of `POST /api/datasets/upload`
///
/// Either `content` (CSV or JSON text, per `format`) or `table` must be set.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadBody {
    pub dataset_id: String,
    pub format: Option<String>,
    pub content: Option<String>,
    pub table: Option<DataTable>,
}

/// Model as returned by the REST API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelView {
    pub model_id: String,
    pub model_type: String,
    pub hyperparameters: HyperparameterBag,
    pub status: ModelStatus,
    pub dataset_id: String,
    pub target_column: Option<String>,
    pub feature_names: Vec<String>,
    pub classes: Vec<ClassLabel>,
    pub metrics: BTreeMap<String, f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
    pub last_error: Option<FailureReason>,
    pub warnings: Vec<String>,
    pub tracker_run_id: Option<String>,
}

impl From<ModelRecord> for ModelView {
    fn from(record: ModelRecord) -> Self {
        Self {
            model_type: record.model_type().to_string(),
            hyperparameters: record.spec.hyperparameters(),
            model_id: record.model_id,
            status: record.status,
            dataset_id: record.dataset_id,
            target_column: record.target_column,
            feature_names: record.feature_names,
            classes: record.classes,
            metrics: record.metrics,
            created_at: record.created_at,
            updated_at: record.updated_at,
            version: record.version,
            last_error: record.last_error,
            warnings: record.warnings,
            tracker_run_id: record.tracker_run_id,
        }
    }
}

/// Converts a seconds field into a timeout
pub fn timeout_from_secs(secs: Option<f64>) -> Result<Option<std::time::Duration>> {
    match secs {
        None => Ok(None),
        Some(s) if s.is_finite() && s > 0.0 => std::time::Duration::try_from_secs_f64(s)
            .map(Some)
            .map_err(|e| Error::InvalidArgument(format!("timeout_secs {} is out of range: {}", s, e))),
        Some(s) => Err(Error::InvalidArgument(format!("timeout_secs must be positive, got {}", s))),
    }
}

/// Parses uploaded dataset text in the given format, CSV when unset
pub fn decode_upload(format: Option<&str>, content: &[u8]) -> Result<(DataTable, DatasetFormat)> {
    let format = match format.filter(|f| !f.is_empty()) {
        Some(f) => f.parse::<DatasetFormat>()?,
        None => DatasetFormat::Csv,
    };
    let table = match format {
        DatasetFormat::Json => table_codec::parse_json(content)?,
        DatasetFormat::Csv => table_codec::parse_csv(content)?,
        DatasetFormat::Memory => {
            return Err(Error::InvalidArgument("uploads must be csv or json".to_string()));
        }
    };
    Ok((table, format))
}
