//! gRPC API implementation
//!
//! Implements `mlops.v1.ModelLifecycle` over the shared [`ModelService`].
//! Optional proto3 scalars use their zero value for "not set": an empty
//! string or a zero timeout falls back to the service default.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use common::{ClassLabel, DatasetDescriptor, HyperparameterBag};
use estimators::PredictInput;
use model_manager::{GatewayHealth, ModelRecord, ModelService, RetrainRequest, TrainRequest};
use serde_json::Value;
use tonic::{Request, Response, Status};
use tracing::{info, instrument};

use crate::dto::decode_upload;
use crate::error::grpc_status;
use crate::proto;
use crate::proto::model_lifecycle_server::{ModelLifecycle, ModelLifecycleServer};

/// gRPC handler set
#[derive(Clone)]
pub struct LifecycleGrpc {
    service: Arc<ModelService>,
}

impl LifecycleGrpc {
    pub fn new(service: Arc<ModelService>) -> Self {
        Self { service }
    }

    /// Wraps the handlers in the generated tonic server
    pub fn into_server(self) -> ModelLifecycleServer<Self> {
        ModelLifecycleServer::new(self)
    }
}

/// Serves the gRPC API on `addr` until `shutdown` resolves
pub async fn serve(
    addr: SocketAddr,
    service: Arc<ModelService>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), tonic::transport::Error> {
    info!("gRPC API listening on {}", addr);
    tonic::transport::Server::builder()
        .add_service(LifecycleGrpc::new(service).into_server())
        .serve_with_shutdown(addr, shutdown)
        .await
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

fn timeout_ms(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

fn parse_bag(json: &str) -> Result<Option<HyperparameterBag>, Status> {
    if json.trim().is_empty() {
        return Ok(None);
    }
    match serde_json::from_str::<Value>(json) {
        Ok(Value::Object(bag)) => Ok(Some(bag)),
        Ok(Value::Null) => Ok(None),
        Ok(_) => Err(Status::invalid_argument("hyperparameters_json must be a JSON object")),
        Err(e) => Err(Status::invalid_argument(format!("hyperparameters_json is not valid JSON: {}", e))),
    }
}

fn label(value: ClassLabel) -> proto::Label {
    let value = match value {
        ClassLabel::Int(v) => proto::label::Value::IntValue(v),
        ClassLabel::Text(v) => proto::label::Value::TextValue(v),
    };
    proto::Label { value: Some(value) }
}

fn predict_input(rows: Vec<proto::FeatureRow>) -> Result<PredictInput, Status> {
    if rows.iter().all(|r| r.named.is_empty()) {
        return Ok(PredictInput::Rows(rows.into_iter().map(|r| r.values).collect()));
    }
    if rows.iter().all(|r| r.values.is_empty()) {
        return Ok(PredictInput::Records(rows.into_iter().map(|r| r.named).collect()));
    }
    Err(Status::invalid_argument(
        "every row must use either positional values or named features, not a mix",
    ))
}

fn model_info(record: ModelRecord) -> proto::ModelInfo {
    proto::ModelInfo {
        model_type: record.model_type().to_string(),
        hyperparameters_json: Value::Object(record.spec.hyperparameters()).to_string(),
        status: record.status.to_string(),
        model_id: record.model_id,
        dataset_id: record.dataset_id,
        target_column: record.target_column.unwrap_or_default(),
        feature_names: record.feature_names,
        classes: record.classes.into_iter().map(label).collect(),
        metrics: record.metrics.into_iter().collect(),
        created_at: record.created_at.to_rfc3339(),
        updated_at: record.updated_at.to_rfc3339(),
        version: record.version,
        last_error: record.last_error.map(|e| proto::ErrorInfo {
            kind: e.kind.as_str().to_string(),
            message: e.message,
        }),
        warnings: record.warnings,
        tracker_run_id: record.tracker_run_id.unwrap_or_default(),
    }
}

fn dataset_info(descriptor: DatasetDescriptor) -> proto::DatasetInfo {
    proto::DatasetInfo {
        dataset_id: descriptor.dataset_id,
        columns: descriptor.columns,
        row_count: descriptor.row_count as u64,
        size_bytes: descriptor.size_bytes,
        version: descriptor.version,
        format: descriptor.format.as_str().to_string(),
        updated_at: descriptor.updated_at.to_rfc3339(),
    }
}

fn gateway_status(health: GatewayHealth) -> proto::GatewayStatus {
    proto::GatewayStatus {
        name: health.name,
        enabled: health.enabled,
        reachable: health.reachable,
        detail: health.detail.unwrap_or_default(),
    }
}

#[tonic::async_trait]
impl ModelLifecycle for LifecycleGrpc {
    async fn health_check(
        &self,
        _request: Request<proto::HealthCheckRequest>,
    ) -> Result<Response<proto::HealthCheckResponse>, Status> {
        let report = self.service.health().await;
        Ok(Response::new(proto::HealthCheckResponse {
            status: report.status,
            version: report.version,
            uptime_secs: report.uptime_secs,
            models: report.models.into_iter().map(|(k, v)| (k, v as u64)).collect(),
            active_jobs: report.active_jobs as u32,
            max_concurrent_jobs: report.max_concurrent_jobs as u32,
            dataset_store: Some(gateway_status(report.dataset_store)),
            tracker: Some(gateway_status(report.tracker)),
        }))
    }

    async fn get_model_types(
        &self,
        _request: Request<proto::GetModelTypesRequest>,
    ) -> Result<Response<proto::GetModelTypesResponse>, Status> {
        let model_types = self
            .service
            .model_types()
            .into_iter()
            .map(|info| proto::ModelTypeInfo {
                name: info.name,
                aliases: info.aliases,
                description: info.description,
                hyperparameters: info
                    .hyperparameters
                    .into_iter()
                    .map(|p| proto::HyperparameterSpec {
                        default_json: p.default.to_string(),
                        name: p.name,
                        kind: p.kind,
                        constraint: p.constraint,
                        description: p.description,
                    })
                    .collect(),
            })
            .collect();
        Ok(Response::new(proto::GetModelTypesResponse { model_types }))
    }

    #[instrument(skip(self, request), fields(model_id = %request.get_ref().model_id))]
    async fn train_model(
        &self,
        request: Request<proto::TrainModelRequest>,
    ) -> Result<Response<proto::ModelInfo>, Status> {
        let req = request.into_inner();
        let request = TrainRequest {
            model_id: non_empty(req.model_id),
            model_type: req.model_type,
            hyperparameters: parse_bag(&req.hyperparameters_json)?.unwrap_or_default(),
            dataset_id: req.dataset_id,
            target_column: non_empty(req.target_column),
            timeout: timeout_ms(req.timeout_ms),
        };
        let record = self.service.train(request).await.map_err(grpc_status)?;
        Ok(Response::new(model_info(record)))
    }

    #[instrument(skip(self, request), fields(model_id = %request.get_ref().model_id))]
    async fn retrain_model(
        &self,
        request: Request<proto::RetrainModelRequest>,
    ) -> Result<Response<proto::ModelInfo>, Status> {
        let req = request.into_inner();
        let retrain = RetrainRequest {
            hyperparameters: parse_bag(&req.hyperparameters_json)?,
            dataset_id: non_empty(req.dataset_id),
            target_column: non_empty(req.target_column),
            timeout: timeout_ms(req.timeout_ms),
        };
        let record = self
            .service
            .retrain(&req.model_id, retrain)
            .await
            .map_err(grpc_status)?;
        Ok(Response::new(model_info(record)))
    }

    async fn predict(
        &self,
        request: Request<proto::PredictRequest>,
    ) -> Result<Response<proto::PredictResponse>, Status> {
        let req = request.into_inner();
        let input = predict_input(req.rows)?;
        let response = self
            .service
            .predict(&req.model_id, input, timeout_ms(req.timeout_ms))
            .await
            .map_err(grpc_status)?;
        Ok(Response::new(proto::PredictResponse {
            model_id: response.model_id,
            version: response.version,
            predictions: response.predictions.into_iter().map(label).collect(),
        }))
    }

    async fn list_models(
        &self,
        request: Request<proto::ListModelsRequest>,
    ) -> Result<Response<proto::ListModelsResponse>, Status> {
        let models = self
            .service
            .list_models(request.into_inner().include_unready)
            .into_iter()
            .map(model_info)
            .collect();
        Ok(Response::new(proto::ListModelsResponse { models }))
    }

    async fn get_model(
        &self,
        request: Request<proto::GetModelRequest>,
    ) -> Result<Response<proto::ModelInfo>, Status> {
        let record = self
            .service
            .get_model(&request.into_inner().model_id)
            .map_err(grpc_status)?;
        Ok(Response::new(model_info(record)))
    }

    async fn delete_model(
        &self,
        request: Request<proto::DeleteModelRequest>,
    ) -> Result<Response<proto::DeleteModelResponse>, Status> {
        let record = self
            .service
            .delete(&request.into_inner().model_id)
            .await
            .map_err(grpc_status)?;
        Ok(Response::new(proto::DeleteModelResponse {
            status: record.status.to_string(),
            model_id: record.model_id,
            version: record.version,
        }))
    }

    async fn list_datasets(
        &self,
        _request: Request<proto::ListDatasetsRequest>,
    ) -> Result<Response<proto::ListDatasetsResponse>, Status> {
        let datasets = self.service.list_datasets().await.map_err(grpc_status)?;
        Ok(Response::new(proto::ListDatasetsResponse {
            datasets: datasets.into_iter().map(dataset_info).collect(),
        }))
    }

    async fn get_dataset(
        &self,
        request: Request<proto::GetDatasetRequest>,
    ) -> Result<Response<proto::DatasetInfo>, Status> {
        let descriptor = self
            .service
            .get_dataset(&request.into_inner().dataset_id)
            .await
            .map_err(grpc_status)?;
        Ok(Response::new(dataset_info(descriptor)))
    }

    #[instrument(skip(self, request), fields(dataset_id = %request.get_ref().dataset_id))]
    async fn upload_dataset(
        &self,
        request: Request<proto::UploadDatasetRequest>,
    ) -> Result<Response<proto::DatasetInfo>, Status> {
        let req = request.into_inner();
        let (table, format) = decode_upload(Some(req.format.as_str()), &req.content).map_err(grpc_status)?;
        let descriptor = self
            .service
            .upload_dataset(&req.dataset_id, table, format)
            .await
            .map_err(grpc_status)?;
        Ok(Response::new(dataset_info(descriptor)))
    }

    async fn delete_dataset(
        &self,
        request: Request<proto::DeleteDatasetRequest>,
    ) -> Result<Response<proto::DeleteDatasetResponse>, Status> {
        let dataset_id = request.into_inner().dataset_id;
        self.service.delete_dataset(&dataset_id).await.map_err(grpc_status)?;
        Ok(Response::new(proto::DeleteDatasetResponse { dataset_id }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parse_bag() {
        assert_eq!(parse_bag("").unwrap(), None);
        let bag = parse_bag(r#"{"C": 0.5}"#).unwrap().unwrap();
        assert_eq!(bag["C"], 0.5);
        assert_eq!(parse_bag("[1]").unwrap_err().code(), tonic::Code::InvalidArgument);
        assert_eq!(parse_bag("{").unwrap_err().code(), tonic::Code::InvalidArgument);
    }

    #[test]
    fn test_predict_input_shapes() {
        let positional = vec![proto::FeatureRow {
            values: vec![1.0, 2.0],
            named: HashMap::new(),
        }];
        assert!(matches!(predict_input(positional).unwrap(), PredictInput::Rows(_)));

        let mut named = HashMap::new();
        named.insert("x1".to_string(), 1.0);
        let keyed = vec![proto::FeatureRow {
            values: Vec::new(),
            named: named.clone(),
        }];
        assert!(matches!(predict_input(keyed).unwrap(), PredictInput::Records(_)));

        let mixed = vec![
            proto::FeatureRow {
                values: vec![1.0],
                named: HashMap::new(),
            },
            proto::FeatureRow {
                values: Vec::new(),
                named,
            },
        ];
        assert_eq!(predict_input(mixed).unwrap_err().code(), tonic::Code::InvalidArgument);
    }
}
