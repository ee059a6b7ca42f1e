//! REST API implementation
//!
//! An axum router over the shared [`ModelService`]. Handlers only decode
//! bodies, call the service and encode the result; every error goes through
//! [`ApiError`].

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use common::{DatasetDescriptor, DatasetFormat};
use estimators::ModelTypeInfo;
use model_manager::{HealthReport, ModelService, PredictResponse, RetrainRequest, TrainRequest};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::dto::{
    decode_upload, timeout_from_secs, ListModelsQuery, ModelView, PredictBody, RetrainBody, TrainBody, UploadBody,
};
use crate::error::ApiError;

type ApiResult<T> = Result<T, ApiError>;
type Shared = State<Arc<ModelService>>;

/// Builds the REST router
pub fn router(service: Arc<ModelService>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/models", get(list_models))
        .route("/api/models/types", get(model_types))
        .route("/api/models/train", post(train_model))
        .route("/api/models/predict", post(predict))
        .route("/api/models/:model_id", get(get_model).delete(delete_model))
        .route("/api/models/:model_id/retrain", put(retrain_model))
        .route("/api/datasets", get(list_datasets))
        .route("/api/datasets/upload", post(upload_dataset))
        .route("/api/datasets/:dataset_id", get(get_dataset).delete(delete_dataset))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(service)
}

/// Serves the REST API on `addr` until `shutdown` resolves
pub async fn serve(
    addr: SocketAddr,
    service: Arc<ModelService>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), hyper::Error> {
    let server = axum::Server::try_bind(&addr)?.serve(router(service).into_make_service());
    info!("REST API listening on {}", server.local_addr());
    server.with_graceful_shutdown(shutdown).await
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError::bad_request(rejection.body_text()))
}

/// Service banner
async fn root() -> Json<Value> {
    Json(json!({
        "service": "mlops-service",
        "version": env!("CARGO_PKG_VERSION"),
        "health": "/health",
        "models": "/api/models",
        "datasets": "/api/datasets",
    }))
}

/// Reports service health
async fn health(State(service): Shared) -> Json<HealthReport> {
    Json(service.health().await)
}

/// Lists supported model types
async fn model_types(State(service): Shared) -> Json<Vec<ModelTypeInfo>> {
    Json(service.model_types())
}

/// Lists models, only ready ones unless asked otherwise
async fn list_models(
    State(service): Shared,
    query: Result<Query<ListModelsQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<ModelView>>> {
    let Query(query) = query.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    let models = service
        .list_models(query.include_unready)
        .into_iter()
        .map(ModelView::from)
        .collect();
    Ok(Json(models))
}

/// Gets one model in any status
async fn get_model(State(service): Shared, Path(model_id): Path<String>) -> ApiResult<Json<ModelView>> {
    Ok(Json(service.get_model(&model_id)?.into()))
}

/// Trains a new model
async fn train_model(
    State(service): Shared,
    payload: Result<Json<TrainBody>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ModelView>)> {
    let body = json_body(payload)?;
    let request = TrainRequest {
        model_id: body.model_id,
        model_type: body.model_type,
        hyperparameters: body.hyperparameters.unwrap_or_default(),
        dataset_id: body.dataset_id,
        target_column: body.target_column,
        timeout: timeout_from_secs(body.timeout_secs)?,
    };
    let record = service.train(request).await?;
    Ok((StatusCode::CREATED, Json(record.into())))
}

/// Retrains an existing model
async fn retrain_model(
    State(service): Shared,
    Path(model_id): Path<String>,
    payload: Result<Json<RetrainBody>, JsonRejection>,
) -> ApiResult<Json<ModelView>> {
    let body = json_body(payload)?;
    let request = RetrainRequest {
        hyperparameters: body.hyperparameters,
        dataset_id: body.dataset_id,
        target_column: body.target_column,
        timeout: timeout_from_secs(body.timeout_secs)?,
    };
    let record = service.retrain(&model_id, request).await?;
    Ok(Json(record.into()))
}

/// Predicts with a ready model
async fn predict(
    State(service): Shared,
    payload: Result<Json<PredictBody>, JsonRejection>,
) -> ApiResult<Json<PredictResponse>> {
    let body = json_body(payload)?;
    let timeout = timeout_from_secs(body.timeout_secs)?;
    Ok(Json(service.predict(&body.model_id, body.data, timeout).await?))
}

/// Deletes a model
async fn delete_model(State(service): Shared, Path(model_id): Path<String>) -> ApiResult<Json<Value>> {
    let record = service.delete(&model_id).await?;
    Ok(Json(json!({
        "model_id": record.model_id,
        "version": record.version,
        "status": record.status,
    })))
}

/// Lists datasets in the dataset store
async fn list_datasets(State(service): Shared) -> ApiResult<Json<Vec<DatasetDescriptor>>> {
    Ok(Json(service.list_datasets().await?))
}

/// Describes one dataset
async fn get_dataset(State(service): Shared, Path(dataset_id): Path<String>) -> ApiResult<Json<DatasetDescriptor>> {
    Ok(Json(service.get_dataset(&dataset_id).await?))
}

/// Uploads a dataset as CSV/JSON text or as a table
async fn upload_dataset(
    State(service): Shared,
    payload: Result<Json<UploadBody>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<DatasetDescriptor>)> {
    let body = json_body(payload)?;
    let (table, format) = match (body.content, body.table) {
        (Some(content), None) => decode_upload(body.format.as_deref(), content.as_bytes())?,
        (None, Some(table)) => {
            let format = match body.format.as_deref().filter(|f| !f.is_empty()) {
                Some(f) => f.parse::<DatasetFormat>()?,
                None => DatasetFormat::Csv,
            };
            (table, format)
        }
        _ => return Err(ApiError::bad_request("exactly one of 'content' or 'table' is required")),
    };
    let descriptor = service.upload_dataset(&body.dataset_id, table, format).await?;
    Ok((StatusCode::CREATED, Json(descriptor)))
}

/// Deletes a dataset
async fn delete_dataset(State(service): Shared, Path(dataset_id): Path<String>) -> ApiResult<StatusCode> {
    service.delete_dataset(&dataset_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
